//! Durable storage of the last selected device id.
//!
//! Modeled as a small string key-value store so it can be backed by whatever
//! the host application already persists preferences in.

use crate::errors::CameraError;
use crate::lock;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Key the last selected device id is stored under
pub const LAST_DEVICE_ID_KEY: &str = "last-device-id";

pub trait DeviceIdStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, CameraError>;

    fn set(&self, key: &str, value: &str) -> Result<(), CameraError>;
}

/// Process-local store, forgotten on exit
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with a last device id
    pub fn with_last_device(id: &str) -> Self {
        let store = Self::new();
        lock(&store.values).insert(LAST_DEVICE_ID_KEY.to_string(), id.to_string());
        store
    }
}

impl DeviceIdStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, CameraError> {
        Ok(lock(&self.values).get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), CameraError> {
        lock(&self.values).insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Store backed by a JSON object on disk.
///
/// The whole file is rewritten on every `set`; it only ever holds a handful
/// of keys.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    write: Mutex<()>,
}

impl FileStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            write: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<HashMap<String, String>, CameraError> {
        if !self.path.exists() {
            return Ok(HashMap::new());
        }
        let contents = fs::read_to_string(&self.path).map_err(|e| {
            CameraError::StorageError(format!("Failed to read {:?}: {}", self.path, e))
        })?;
        if contents.trim().is_empty() {
            return Ok(HashMap::new());
        }
        serde_json::from_str(&contents).map_err(|e| {
            CameraError::StorageError(format!("Failed to parse {:?}: {}", self.path, e))
        })
    }
}

impl DeviceIdStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, CameraError> {
        Ok(self.read_all()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), CameraError> {
        let _write = lock(&self.write);
        let mut values = self.read_all().unwrap_or_else(|e| {
            log::warn!("Discarding unreadable store: {}", e);
            HashMap::new()
        });
        values.insert(key.to_string(), value.to_string());

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                CameraError::StorageError(format!("Failed to create {:?}: {}", parent, e))
            })?;
        }
        let json = serde_json::to_string_pretty(&values)
            .map_err(|e| CameraError::StorageError(format!("Failed to serialize store: {}", e)))?;
        fs::write(&self.path, json).map_err(|e| {
            CameraError::StorageError(format!("Failed to write {:?}: {}", self.path, e))
        })
    }
}
