//! Browser-scoped key-value persistence.
//!
//! Values are plain strings, exactly as they would sit in local storage; the
//! typed layer on top lives in [`crate::flags`].

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    sync::Mutex,
};

use tracing::{debug, info};

use crate::error::{Context, Result};

/// Synchronous string store. Reads must not touch the network.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
    fn keys(&self) -> Vec<String>;
}

/// In-memory store for tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemoryKeyValueStore {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, String>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl KeyValueStore for MemoryKeyValueStore {
    fn get(&self, key: &str) -> Option<String> {
        self.lock().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.lock().remove(key);
        Ok(())
    }

    fn keys(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }
}

/// JSON-file-backed store at e.g. `~/.local/share/quill/local_storage.json`.
///
/// The whole map is cached in memory; every write rewrites the file.
#[derive(Debug)]
pub struct FileKeyValueStore {
    path: PathBuf,
    cache: Mutex<BTreeMap<String, String>>,
}

impl FileKeyValueStore {
    /// Open the store, loading existing entries. A missing file is an empty
    /// store; an unparseable one is an error rather than silently discarded.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let cache = match std::fs::read_to_string(&path) {
            Ok(data) => serde_json::from_str(&data)
                .with_context(|| format!("parse {}", path.display()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "storage file not found, starting empty");
                BTreeMap::new()
            },
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            path,
            cache: Mutex::new(cache),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, String>> {
        self.cache.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn flush(&self, entries: &BTreeMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_string_pretty(entries)?;
        std::fs::write(&self.path, data)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&self.path, std::fs::Permissions::from_mode(0o600))?;
        }
        Ok(())
    }
}

impl KeyValueStore for FileKeyValueStore {
    fn get(&self, key: &str) -> Option<String> {
        self.lock().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self.lock();
        let mut next = entries.clone();
        next.insert(key.to_string(), value.to_string());
        self.flush(&next)?;
        *entries = next;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut entries = self.lock();
        if !entries.contains_key(key) {
            return Ok(());
        }
        let mut next = entries.clone();
        next.remove(key);
        self.flush(&next)?;
        *entries = next;
        info!(path = %self.path.display(), key, "removed storage entry");
        Ok(())
    }

    fn keys(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_store_basic_ops() {
        let kv = MemoryKeyValueStore::new();
        assert!(kv.get("a").is_none());
        kv.set("a", "1").unwrap();
        assert_eq!(kv.get("a").as_deref(), Some("1"));
        kv.remove("a").unwrap();
        assert!(kv.get("a").is_none());
    }

    #[test]
    fn file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("local_storage.json");

        let kv = FileKeyValueStore::open(&path).unwrap();
        kv.set("user_u1_profile_completed", "true").unwrap();
        kv.set("currentUser", "{}").unwrap();
        kv.remove("currentUser").unwrap();
        drop(kv);

        let reopened = FileKeyValueStore::open(&path).unwrap();
        assert_eq!(
            reopened.get("user_u1_profile_completed").as_deref(),
            Some("true")
        );
        assert!(reopened.get("currentUser").is_none());
        assert_eq!(reopened.keys(), vec!["user_u1_profile_completed"]);
    }

    #[test]
    fn failed_write_leaves_cache_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("local_storage.json");
        let kv = FileKeyValueStore::open(&path).unwrap();
        kv.set("user_u1_profile_completed", "false").unwrap();
        kv.set("currentUser", "{}").unwrap();

        // A directory in place of the file makes every flush fail.
        std::fs::remove_file(&path).unwrap();
        std::fs::create_dir(&path).unwrap();

        assert!(kv.set("user_u1_profile_completed", "true").is_err());
        assert_eq!(
            kv.get("user_u1_profile_completed").as_deref(),
            Some("false")
        );
        assert!(kv.remove("currentUser").is_err());
        assert_eq!(kv.get("currentUser").as_deref(), Some("{}"));
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("local_storage.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(FileKeyValueStore::open(&path).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn file_store_is_private() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("local_storage.json");
        let kv = FileKeyValueStore::open(&path).unwrap();
        kv.set("k", "v").unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
