//! Host-list persistence over an opaque key-value store.
//!
//! The client never interprets the store beyond `get`/`set` of strings.
//! [`HostListStore`] serializes the [`HostList`] as JSON under the key
//! [`HOSTS_KEY`].
//!
//! Two stores are provided:
//! - [`MemoryStore`] – process-local, used in tests and when persistence is
//!   disabled.
//! - [`JsonFileStore`] – one JSON object per file, keys at the top level.
//!   Default location:
//!   - Windows:  `%APPDATA%\RemoteMouse\client.json`
//!   - Linux:    `$XDG_CONFIG_HOME/remotemouse/client.json` or `~/.config/remotemouse/client.json`
//!   - macOS:    `~/Library/Application Support/RemoteMouse/client.json`

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use rmouse_core::discovery::HostList;
use thiserror::Error;
use tracing::debug;

/// Key under which the host list is stored.
pub const HOSTS_KEY: &str = "hosts";

/// Error type for store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A file system I/O error occurred.
    #[error("I/O error accessing {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Stored content is not valid JSON of the expected shape.
    #[error("invalid stored JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// The platform config directory could not be determined.
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,
}

/// Opaque string key-value store.
#[cfg_attr(test, mockall::automock)]
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn set(&self, key: &str, value: String) -> Result<(), StoreError>;
}

// ── MemoryStore ───────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned())
    }

    fn set(&self, key: &str, value: String) -> Result<(), StoreError> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value);
        Ok(())
    }
}

// ── JsonFileStore ─────────────────────────────────────────────────────────────

/// File-backed store.  Every `set` rewrites the whole file.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    // Serializes read-modify-write cycles within this process.
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Store at the platform default location.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NoPlatformConfigDir`] when the config base
    /// directory cannot be determined from the environment.
    pub fn at_default_location() -> Result<Self, StoreError> {
        let dir = platform_config_dir().ok_or(StoreError::NoPlatformConfigDir)?;
        Ok(Self::new(dir.join("client.json")))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<BTreeMap<String, String>, StoreError> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) if content.trim().is_empty() => Ok(BTreeMap::new()),
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(source) => Err(StoreError::Io {
                path: self.path.clone(),
                source,
            }),
        }
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.read_all()?.remove(key))
    }

    fn set(&self, key: &str, value: String) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut all = self.read_all()?;
        all.insert(key.to_string(), value);

        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir).map_err(|source| StoreError::Io {
                path: dir.to_path_buf(),
                source,
            })?;
        }
        let content = serde_json::to_string_pretty(&all)?;
        std::fs::write(&self.path, content).map_err(|source| StoreError::Io {
            path: self.path.clone(),
            source,
        })
    }
}

// ── HostListStore ─────────────────────────────────────────────────────────────

/// Loads and saves the host list through any [`KeyValueStore`].
#[derive(Clone)]
pub struct HostListStore {
    store: Arc<dyn KeyValueStore>,
}

impl HostListStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Returns the saved list, or an empty list if nothing was saved yet.
    ///
    /// # Errors
    ///
    /// Propagates store failures and [`StoreError::Json`] for corrupt data.
    pub fn load(&self) -> Result<HostList, StoreError> {
        match self.store.get(HOSTS_KEY)? {
            Some(json) => Ok(serde_json::from_str(&json)?),
            None => Ok(HostList::new()),
        }
    }

    /// Replaces the saved list with `hosts`.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub fn save(&self, hosts: &HostList) -> Result<(), StoreError> {
        let json = serde_json::to_string(hosts)?;
        debug!("saving {} host(s)", hosts.len());
        self.store.set(HOSTS_KEY, json)
    }
}

impl std::fmt::Debug for HostListStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostListStore").finish_non_exhaustive()
    }
}

/// Resolves the platform config directory including the `RemoteMouse` folder.
fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("RemoteMouse"))
    }

    #[cfg(target_os = "linux")]
    {
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("remotemouse"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| {
            PathBuf::from(h)
                .join("Library")
                .join("Application Support")
                .join("RemoteMouse")
        })
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::predicate::function;
    use rmouse_core::discovery::HostRecord;
    use std::net::IpAddr;

    fn record(ip: &str, name: &str) -> HostRecord {
        HostRecord {
            name: name.to_string(),
            address: ip.parse::<IpAddr>().unwrap(),
            port: 8765,
            version: "2.0".to_string(),
            pin_required: true,
            capabilities: vec!["mouse".to_string()],
        }
    }

    fn temp_file() -> PathBuf {
        let unique = format!(
            "rmouse_store_{}_{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        );
        std::env::temp_dir().join(unique).join("client.json")
    }

    #[test]
    fn test_memory_store_get_missing_is_none() {
        assert_eq!(MemoryStore::new().get("nope").unwrap(), None);
    }

    #[test]
    fn test_host_list_round_trips_through_memory_store() {
        // Arrange
        let store = HostListStore::new(Arc::new(MemoryStore::new()));
        let hosts = HostList::from(vec![record("10.0.0.2", "Den"), record("10.0.0.3", "Office")]);

        // Act
        store.save(&hosts).unwrap();
        let loaded = store.load().unwrap();

        // Assert
        assert_eq!(loaded, hosts);
    }

    #[test]
    fn test_load_without_saved_list_is_empty() {
        let store = HostListStore::new(Arc::new(MemoryStore::new()));
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn test_corrupt_saved_list_is_an_error() {
        let kv = Arc::new(MemoryStore::new());
        kv.set(HOSTS_KEY, "{not json".to_string()).unwrap();

        let result = HostListStore::new(kv).load();

        assert!(matches!(result, Err(StoreError::Json(_))));
    }

    #[test]
    fn test_save_writes_json_array_under_hosts_key() {
        // Arrange
        let mut kv = MockKeyValueStore::new();
        kv.expect_set()
            .with(
                function(|k: &str| k == HOSTS_KEY),
                function(|v: &String| v.starts_with('[')),
            )
            .times(1)
            .returning(|_, _| Ok(()));
        let store = HostListStore::new(Arc::new(kv));

        // Act / Assert
        store
            .save(&HostList::from(vec![record("10.0.0.2", "Den")]))
            .unwrap();
    }

    #[test]
    fn test_store_failure_is_propagated() {
        let mut kv = MockKeyValueStore::new();
        kv.expect_get().returning(|_| Err(StoreError::NoPlatformConfigDir));

        let result = HostListStore::new(Arc::new(kv)).load();

        assert!(matches!(result, Err(StoreError::NoPlatformConfigDir)));
    }

    #[test]
    fn test_json_file_store_persists_across_instances() {
        // Arrange
        let path = temp_file();
        let first = HostListStore::new(Arc::new(JsonFileStore::new(&path)));
        let hosts = HostList::from(vec![record("192.168.1.7", "Laptop")]);

        // Act
        first.save(&hosts).unwrap();
        let second = HostListStore::new(Arc::new(JsonFileStore::new(&path)));

        // Assert
        assert_eq!(second.load().unwrap(), hosts);

        // Cleanup
        if let Some(dir) = path.parent() {
            std::fs::remove_dir_all(dir).ok();
        }
    }

    #[test]
    fn test_json_file_store_keeps_other_keys() {
        let path = temp_file();
        let store = JsonFileStore::new(&path);

        store.set("theme", "dark".to_string()).unwrap();
        store.set(HOSTS_KEY, "[]".to_string()).unwrap();

        assert_eq!(store.get("theme").unwrap().as_deref(), Some("dark"));
        assert_eq!(store.get(HOSTS_KEY).unwrap().as_deref(), Some("[]"));

        if let Some(dir) = path.parent() {
            std::fs::remove_dir_all(dir).ok();
        }
    }

    #[test]
    fn test_json_file_store_missing_file_reads_as_empty() {
        let store = JsonFileStore::new(temp_file());
        assert_eq!(store.get(HOSTS_KEY).unwrap(), None);
    }
}
