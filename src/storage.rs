use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::{debug, warn};

use crate::MirrorError;

/// Storage key for the serialized registry selection. Present only when
/// at least one selection differs from the compiled-in defaults.
pub const API_LIST_KEY: &str = "apiList_2";
/// Presence of this key disables automatic probing on load.
pub const AUTO_FETCH_KEY: &str = "apiAutoFetch";

/// Flat key -> string persistence, the shape the original client got
/// from browser local storage.
pub trait Storage {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str) -> Result<(), MirrorError>;
    fn remove(&self, key: &str) -> Result<(), MirrorError>;
}

/// In-memory storage, used in tests and as a no-persistence fallback.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    map: Mutex<BTreeMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for MemoryStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.map.lock().unwrap().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), MirrorError> {
        self.map
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), MirrorError> {
        self.map.lock().unwrap().remove(key);
        Ok(())
    }
}

/// Key/value store backed by a single JSON file, written through on
/// every mutation. The file holds one flat string map.
#[derive(Debug)]
pub struct JsonFileStorage {
    path: PathBuf,
    map: Mutex<BTreeMap<String, String>>,
}

impl JsonFileStorage {
    /// Open (or create) a store at `path`. An unreadable or malformed
    /// file is treated as empty rather than an error.
    pub fn open(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let map = match std::fs::read_to_string(&path) {
            Ok(text) => match serde_json::from_str::<BTreeMap<String, String>>(&text) {
                Ok(map) => map,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Malformed storage file, starting empty");
                    BTreeMap::new()
                }
            },
            Err(_) => BTreeMap::new(),
        };
        debug!(path = %path.display(), entries = map.len(), "Opened key/value store");
        Self {
            path,
            map: Mutex::new(map),
        }
    }

    /// Open the store at the platform config location
    /// (`<config_dir>/tube_mirrors/storage.json`).
    pub fn open_default() -> Self {
        let base = dirs::config_dir().unwrap_or_else(std::env::temp_dir);
        Self::open(base.join("tube_mirrors").join("storage.json"))
    }

    fn flush(&self, map: &BTreeMap<String, String>) -> Result<(), MirrorError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let text = serde_json::to_string_pretty(map)?;
        std::fs::write(&self.path, text)?;
        Ok(())
    }
}

impl Storage for JsonFileStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.map.lock().unwrap().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), MirrorError> {
        let mut map = self.map.lock().unwrap();
        map.insert(key.to_string(), value.to_string());
        self.flush(&map)
    }

    fn remove(&self, key: &str) -> Result<(), MirrorError> {
        let mut map = self.map.lock().unwrap();
        if map.remove(key).is_some() {
            self.flush(&map)?;
        }
        Ok(())
    }
}
