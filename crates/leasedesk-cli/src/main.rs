//! leasedesk - terminal front-end for rental administration sign-in.
//!
//! Commands:
//!   leasedesk login [identifier]   sign in (secret is prompted)
//!   leasedesk logout               end the persisted session
//!   leasedesk status               show session / lockout state
//!   leasedesk watch                follow the session, warn before expiry

use std::io::{self, Write};

use anyhow::{bail, Result};
use chrono::Local;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use leasedesk_core::utils::format_remaining;
use leasedesk_core::{AuthFacade, AuthState, Config, Credentials, ExpiryWarningPresenter, WarningView};

/// Log file name inside the data directory
const LOG_FILE: &str = "leasedesk.log";

const USAGE: &str = "usage: leasedesk <login [identifier] | logout | status | watch>";

/// Initialize the tracing subscriber for logging.
///
/// Output goes to a file so it never interleaves with prompts. Use RUST_LOG
/// to control the level (e.g., RUST_LOG=leasedesk_core=debug).
fn init_tracing() -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let log_dir = match Config::data_dir()
        .and_then(|dir| std::fs::create_dir_all(&dir).map(|_| dir).map_err(Into::into))
    {
        Ok(dir) => dir,
        Err(_) => {
            tracing_subscriber::registry()
                .with(fmt::layer().with_writer(io::stderr))
                .with(filter)
                .init();
            return None;
        }
    };

    let appender = tracing_appender::rolling::never(log_dir, LOG_FILE);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(writer).with_ansi(false))
        .with(filter)
        .init();
    Some(guard)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let _log_guard = init_tracing();
    let mut config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            warn!(error = %e, "Could not read config file, using defaults");
            Config::default()
        }
    }
    .with_env_overrides();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = args.first().map(String::as_str).unwrap_or("status");

    let auth = AuthFacade::from_config(&config)?;
    if auth.persistence_degraded() || auth.check_persistence().is_err() {
        eprintln!("Warning: sign-in state cannot be saved and will not survive a restart.");
    }
    info!(command, "leasedesk starting");

    let result = match command {
        "login" => login(&auth, &mut config, args.get(1).cloned()).await,
        "logout" => {
            auth.logout();
            println!("Signed out.");
            Ok(())
        }
        "status" => {
            print_status(&auth);
            Ok(())
        }
        "watch" => watch(&auth).await,
        _ => bail!(USAGE),
    };

    auth.shutdown();
    result
}

async fn login(auth: &AuthFacade, config: &mut Config, identifier: Option<String>) -> Result<()> {
    if let AuthState::Locked { until } = auth.state() {
        bail!("Too many failed attempts. Try again after {}.", until.with_timezone(&Local).format("%H:%M"));
    }

    let identifier = match identifier.or_else(|| config.last_identifier.clone()) {
        Some(identifier) => identifier,
        None => prompt("Identifier: ")?,
    };
    let secret = rpassword::prompt_password(format!("Secret for {}: ", identifier))?;

    match auth.login(&Credentials::new(identifier.clone(), secret)).await {
        Ok(user) => {
            println!("Signed in as {} ({}).", user.display(), user.role);
            if let Some(expires_at) = auth.session_expiry() {
                println!("Session valid until {}.", expires_at.with_timezone(&Local).format("%H:%M"));
            }
            config.last_identifier = Some(identifier);
            if let Err(e) = config.save() {
                warn!(error = %e, "Could not save config");
            }
            Ok(())
        }
        Err(e) => bail!(e.user_message()),
    }
}

fn print_status(auth: &AuthFacade) {
    match auth.state() {
        AuthState::Active { expires_at } => {
            let who = auth
                .current_user()
                .map(|u| u.display().to_string())
                .unwrap_or_default();
            println!(
                "Signed in as {}. Session expires at {} ({} left).",
                who,
                expires_at.with_timezone(&Local).format("%H:%M"),
                format_remaining(auth.time_remaining())
            );
        }
        AuthState::Locked { until } => {
            println!("Locked out until {}.", until.with_timezone(&Local).format("%H:%M"));
        }
        AuthState::LoggedOut => {
            let failures = auth.failed_attempts();
            if failures > 0 {
                println!("Signed out. {} attempt(s) remaining before lockout.", auth.attempts_remaining());
            } else {
                println!("Signed out.");
            }
        }
    }
}

/// Follow the session until it ends, showing the expiry warning.
///
/// Type `extend` or `logout` while the countdown is showing.
async fn watch(auth: &AuthFacade) -> Result<()> {
    if !auth.is_authenticated() {
        bail!("Not signed in.");
    }
    print_status(auth);

    let presenter = ExpiryWarningPresenter::new(auth.clone());
    let mut ticker = tokio::time::interval(auth.policy().tick_interval);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut showing = false;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match presenter.poll() {
                    WarningView::Hidden => {
                        if showing {
                            println!();
                            showing = false;
                        }
                    }
                    view @ WarningView::Countdown { .. } => {
                        if let Some(message) = view.message() {
                            print!("\r{} [extend/logout] ", message);
                            io::stdout().flush()?;
                        }
                        showing = true;
                    }
                    view @ WarningView::Expired => {
                        if showing {
                            println!();
                        }
                        if let Some(message) = view.message() {
                            println!("{}", message);
                        }
                        return Ok(());
                    }
                }
            }
            line = lines.next_line() => {
                let Some(line) = line? else {
                    return Ok(());
                };
                match line.trim() {
                    "extend" => match presenter.extend().await {
                        Ok(expires_at) => println!(
                            "Session extended until {}.",
                            expires_at.with_timezone(&Local).format("%H:%M")
                        ),
                        Err(e) => println!("{}", e.user_message()),
                    },
                    "logout" => {
                        presenter.logout();
                        println!("Signed out.");
                        return Ok(());
                    }
                    "" => {}
                    other => println!("Unknown command '{}'. Type extend or logout.", other),
                }
                showing = false;
            }
            _ = tokio::signal::ctrl_c() => {
                println!();
                return Ok(());
            }
        }
    }
}

fn prompt(label: &str) -> Result<String> {
    print!("{}", label);
    io::stdout().flush()?;
    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    let input = input.trim().to_string();
    if input.is_empty() {
        bail!("An identifier is required.");
    }
    Ok(input)
}
