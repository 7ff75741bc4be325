//! StorageBackend trait for abstracting the persistence medium.
//!
//! This trait allows the mail store to work with different backends:
//! - Browser `localStorage` (via JS imports in WASM)
//! - Native files (one JSON file per key)
//! - In-memory (for testing)
//!
//! The interface mirrors the subset of a browser key/value store the
//! append-only mail store needs: string keys, string values, whole-value
//! replacement. There is no locking; a backend shared by
//! several writers gives last-writer-wins semantics.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// Error types for backend operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    #[error("storage quota exceeded")]
    QuotaExceeded,
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Abstract key/value persistence
pub trait StorageBackend {
    /// Read the value stored under `key`, `None` if absent
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Replace the value stored under `key`
    fn set_item(&mut self, key: &str, value: &str) -> Result<(), StorageError>;
}

/// In-memory backend for testing
/// Uses Rc<RefCell<...>> so clones share the same underlying storage
#[derive(Default, Clone)]
pub struct InMemoryStorage {
    items: Rc<RefCell<HashMap<String, String>>>,
    /// Total byte budget across keys and values (None = unlimited)
    quota: Rc<RefCell<Option<usize>>>,
    /// Simulates a medium that refuses all access
    unavailable: Rc<RefCell<bool>>,
    /// Write counters per key (for testing)
    write_counts: Rc<RefCell<HashMap<String, usize>>>,
}

impl InMemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Backend that rejects writes once the total stored size would exceed `bytes`
    #[must_use]
    pub fn with_quota(bytes: usize) -> Self {
        let storage = Self::new();
        *storage.quota.borrow_mut() = Some(bytes);
        storage
    }

    /// Toggle simulated unavailability
    pub fn set_unavailable(&self, unavailable: bool) {
        *self.unavailable.borrow_mut() = unavailable;
    }

    /// Get a copy of a raw value (for testing)
    #[must_use]
    pub fn raw(&self, key: &str) -> Option<String> {
        self.items.borrow().get(key).cloned()
    }

    /// Overwrite a raw value, bypassing quota (for testing)
    pub fn put_raw(&self, key: &str, value: &str) {
        self.items.borrow_mut().insert(key.to_string(), value.to_string());
    }

    /// Get write count for a key (for testing)
    #[must_use]
    pub fn write_count(&self, key: &str) -> usize {
        *self.write_counts.borrow().get(key).unwrap_or(&0)
    }

    /// Bytes currently used by all keys and values
    #[must_use]
    pub fn used_bytes(&self) -> usize {
        self.items
            .borrow()
            .iter()
            .map(|(k, v)| k.len() + v.len())
            .sum()
    }

    fn check_available(&self) -> Result<(), StorageError> {
        if *self.unavailable.borrow() {
            return Err(StorageError::Unavailable("simulated outage".to_string()));
        }
        Ok(())
    }
}

impl StorageBackend for InMemoryStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.check_available()?;
        Ok(self.items.borrow().get(key).cloned())
    }

    fn set_item(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        self.check_available()?;

        if let Some(quota) = *self.quota.borrow() {
            let current = self.items.borrow().get(key).map_or(0, |v| key.len() + v.len());
            let projected = self.used_bytes() - current + key.len() + value.len();
            if projected > quota {
                return Err(StorageError::QuotaExceeded);
            }
        }

        self.items.borrow_mut().insert(key.to_string(), value.to_string());
        *self.write_counts.borrow_mut().entry(key.to_string()).or_insert(0) += 1;
        Ok(())
    }
}

#[cfg(not(target_arch = "wasm32"))]
pub use file::FileStorage;

#[cfg(not(target_arch = "wasm32"))]
mod file {
    use std::fs;
    use std::io::ErrorKind;
    use std::path::{Path, PathBuf};

    use super::{StorageBackend, StorageError};

    /// Native backend: one `<key>.json` file per key inside a directory
    ///
    /// Keys are escaped into file names: ASCII alphanumerics, `_`, `-` and `.`
    /// are kept, every other byte becomes `%XX`, so distinct keys never
    /// share a file and no key can leave the directory.
    ///
    /// Writes go to a temporary file that is renamed over the target, so a
    /// crash leaves either the old or the new value.
    #[derive(Clone, Debug)]
    pub struct FileStorage {
        dir: PathBuf,
    }

    impl FileStorage {
        /// Open (creating if needed) a storage directory
        pub fn open(dir: impl AsRef<Path>) -> Result<Self, StorageError> {
            let dir = dir.as_ref().to_path_buf();
            fs::create_dir_all(&dir).map_err(io_error)?;
            Ok(Self { dir })
        }

        #[must_use]
        pub fn dir(&self) -> &Path {
            &self.dir
        }

        fn path_for(&self, key: &str) -> PathBuf {
            self.dir.join(format!("{}.json", file_name(key)))
        }
    }

    fn file_name(key: &str) -> String {
        let mut name = String::with_capacity(key.len());
        for byte in key.bytes() {
            if byte.is_ascii_alphanumeric() || matches!(byte, b'_' | b'-' | b'.') {
                name.push(char::from(byte));
            } else {
                name.push_str(&format!("%{:02x}", byte));
            }
        }
        name
    }

    fn io_error(e: std::io::Error) -> StorageError {
        // ENOSPC / EDQUOT surface as the quota error the store reports
        match e.raw_os_error() {
            Some(28) | Some(122) => StorageError::QuotaExceeded,
            _ => StorageError::Unavailable(e.to_string()),
        }
    }

    impl StorageBackend for FileStorage {
        fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
            match fs::read_to_string(self.path_for(key)) {
                Ok(value) => Ok(Some(value)),
                Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
                Err(e) => Err(io_error(e)),
            }
        }

        fn set_item(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
            let target = self.path_for(key);
            let tmp = target.with_extension("json.tmp");
            fs::write(&tmp, value).map_err(io_error)?;
            fs::rename(&tmp, &target).map_err(io_error)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_memory_get_set() {
        let mut storage = InMemoryStorage::new();

        assert_eq!(storage.get_item("k").unwrap(), None);

        storage.set_item("k", "v1").unwrap();
        assert_eq!(storage.get_item("k").unwrap(), Some("v1".to_string()));

        storage.set_item("k", "v2").unwrap();
        assert_eq!(storage.get_item("k").unwrap(), Some("v2".to_string()));
        assert_eq!(storage.write_count("k"), 2);
    }

    #[test]
    fn test_in_memory_clones_share_state() {
        let storage = InMemoryStorage::new();
        let mut writer = storage.clone();
        writer.set_item("shared", "yes").unwrap();
        assert_eq!(storage.raw("shared"), Some("yes".to_string()));
    }

    #[test]
    fn test_in_memory_quota() {
        let mut storage = InMemoryStorage::with_quota(10);

        // key (1) + value (9) = 10 bytes fits exactly
        storage.set_item("k", "123456789").unwrap();

        // Replacing the value counts only the new size
        storage.set_item("k", "abcdefghi").unwrap();

        assert_eq!(storage.set_item("k", "0123456789"), Err(StorageError::QuotaExceeded));
        assert_eq!(storage.set_item("x", "1"), Err(StorageError::QuotaExceeded));

        // Failed writes leave the old value in place
        assert_eq!(storage.raw("k"), Some("abcdefghi".to_string()));
    }

    #[test]
    fn test_in_memory_unavailable() {
        let mut storage = InMemoryStorage::new();
        storage.set_unavailable(true);
        assert!(matches!(storage.get_item("k"), Err(StorageError::Unavailable(_))));
        assert!(matches!(storage.set_item("k", "v"), Err(StorageError::Unavailable(_))));

        storage.set_unavailable(false);
        assert!(storage.set_item("k", "v").is_ok());
    }

    #[test]
    fn test_file_storage_persists_across_instances() {
        let dir = tempfile::TempDir::new().unwrap();

        let mut storage = FileStorage::open(dir.path()).unwrap();
        assert_eq!(storage.get_item("zamail_encrypted_mails").unwrap(), None);
        storage.set_item("zamail_encrypted_mails", "[]").unwrap();

        let reopened = FileStorage::open(dir.path()).unwrap();
        assert_eq!(
            reopened.get_item("zamail_encrypted_mails").unwrap(),
            Some("[]".to_string())
        );
        assert!(dir.path().join("zamail_encrypted_mails.json").exists());
    }

    #[test]
    fn test_file_storage_keys_never_collide() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut storage = FileStorage::open(dir.path()).unwrap();

        storage.set_item("a/b", "slash").unwrap();
        storage.set_item("a_b", "underscore").unwrap();
        storage.set_item("a%2fb", "escaped").unwrap();

        assert_eq!(storage.get_item("a/b").unwrap(), Some("slash".to_string()));
        assert_eq!(storage.get_item("a_b").unwrap(), Some("underscore".to_string()));
        assert_eq!(storage.get_item("a%2fb").unwrap(), Some("escaped".to_string()));

        assert!(dir.path().join("a%2fb.json").exists());
        assert!(dir.path().join("a_b.json").exists());
        assert!(dir.path().join("a%252fb.json").exists());
    }

    #[test]
    fn test_file_storage_keys_stay_inside_dir() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut storage = FileStorage::open(dir.path()).unwrap();

        storage.set_item("../escape/attempt", "x").unwrap();
        assert!(dir.path().join("..%2fescape%2fattempt.json").exists());
        assert_eq!(storage.get_item("../escape/attempt").unwrap(), Some("x".to_string()));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }
}
