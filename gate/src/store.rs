//! Persistent key/value state that survives process restarts. The install
//! identifier and the cached destination live here.
use crate::config::StateStoreConfig;
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const INSTALL_ID_KEY: &str = "device_uuid_lower";
pub const FINAL_URL_KEY: &str = "cached_final_url";

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("decode error: {0}")]
    Decode(#[from] serde_json::Error),
}

pub trait StateStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
    /// Removes every key. This is the only way a cached destination goes away.
    fn clear(&self) -> Result<(), StoreError>;
}

/// Stores all keys in a single JSON document on disk.
pub struct FilesystemStateStore {
    path: PathBuf,
    // Serializes read-modify-write cycles within this process
    lock: Mutex<()>,
}

impl FilesystemStateStore {
    pub fn new(base_dir: &str, filename: &str) -> Self {
        FilesystemStateStore {
            path: Path::new(base_dir).join(filename),
            lock: Mutex::new(()),
        }
    }

    fn read_all(&self) -> Result<BTreeMap<String, String>, StoreError> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_reader(BufReader::new(file))?)
    }

    fn write_all(&self, data: &BTreeMap<String, String>) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        // Create or overwrite file
        let file = File::create(&self.path)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, data)?;
        writer.flush()?;
        Ok(())
    }
}

impl StateStore for FilesystemStateStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let _guard = self.lock.lock();
        Ok(self.read_all()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let _guard = self.lock.lock();
        let mut data = match self.read_all() {
            Ok(data) => data,
            Err(StoreError::Decode(err)) => {
                // A torn write leaves an undecodable file, which gets replaced
                tracing::warn!(path = ?self.path, error = %err, "Overwriting corrupt state file");
                BTreeMap::new()
            }
            Err(err) => return Err(err),
        };
        data.insert(key.to_string(), value.to_string());
        self.write_all(&data)?;
        tracing::debug!(key, path = ?self.path, "Stored state");
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        let _guard = self.lock.lock();
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Process-local store. Nothing survives a restart.
#[derive(Default)]
pub struct MemoryStateStore {
    data: RwLock<HashMap<String, String>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateStore for MemoryStateStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.data.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.data.write().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        self.data.write().clear();
        Ok(())
    }
}

/// Builds the store selected in config.
pub fn get_state_store(config: &StateStoreConfig) -> Arc<dyn StateStore> {
    match config {
        StateStoreConfig::Filesystem { base_dir, filename } => {
            Arc::new(FilesystemStateStore::new(base_dir, filename))
        }
        StateStoreConfig::Memory => Arc::new(MemoryStateStore::new()),
    }
}
