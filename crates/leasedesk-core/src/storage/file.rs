use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::debug;

use super::{KeyValueStore, StoreError};
use crate::utils::lock;

/// Store file name in the data directory
pub const STORE_FILE: &str = "auth-store.json";

/// JSON-file backed store.
///
/// The whole map is rewritten on every mutation (write to a temp file, then
/// rename) so a crash never leaves a half-written file behind.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl FileStore {
    /// Open the store file in `dir`, creating the directory if needed
    pub fn open_in(dir: &Path) -> Result<Self, StoreError> {
        std::fs::create_dir_all(dir)?;
        Self::open(dir.join(STORE_FILE))
    }

    pub fn open(path: PathBuf) -> Result<Self, StoreError> {
        let entries = if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            if contents.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_json::from_str(&contents)?
            }
        } else {
            BTreeMap::new()
        };
        debug!(path = %path.display(), keys = entries.len(), "Opened file store");

        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self, entries: &BTreeMap<String, String>) -> Result<(), StoreError> {
        let contents = serde_json::to_string_pretty(entries)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, contents)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(lock(&self.entries).get(key).cloned())
    }

    fn put(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut entries = lock(&self.entries);
        entries.insert(key.to_string(), value.to_string());
        self.flush(&entries)
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        let mut entries = lock(&self.entries);
        if entries.remove(key).is_some() {
            self.flush(&entries)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();

        {
            let store = FileStore::open_in(dir.path()).unwrap();
            store.put("auth.failedAttempts", "3").unwrap();
            store.put("auth.token", "tok").unwrap();
            store.remove("auth.token").unwrap();
        }

        let reopened = FileStore::open_in(dir.path()).unwrap();
        assert_eq!(reopened.get("auth.failedAttempts").unwrap().as_deref(), Some("3"));
        assert_eq!(reopened.get("auth.token").unwrap(), None);
    }

    #[test]
    fn test_file_store_rejects_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(STORE_FILE);
        std::fs::write(&path, "{not json").unwrap();

        let result = FileStore::open(path);
        assert!(matches!(result, Err(StoreError::Serialization(_))));
    }

    #[test]
    fn test_file_store_empty_file_is_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(STORE_FILE);
        std::fs::write(&path, "").unwrap();

        let store = FileStore::open(path).unwrap();
        assert_eq!(store.get("auth.token").unwrap(), None);
    }

    #[test]
    fn test_file_store_put_fails_when_directory_removed() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("nested");
        let store = FileStore::open_in(&nested).unwrap();

        std::fs::remove_dir_all(&nested).unwrap();
        assert!(matches!(store.put("auth.token", "tok"), Err(StoreError::Io(_))));
    }
}
