/// Durable key-value storage for pending messages and config dumps
/// Keys are plain strings: pending:<destination>:<seq> and dump:<owner>:<variant>
use crate::error::{CourierError, Result};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

/// Opaque keyed store. A successful `put`/`delete` is durable.
pub trait KvStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    fn put(&self, key: &str, value: &[u8]) -> Result<()>;

    /// Removing an absent key is not an error
    fn delete(&self, key: &str) -> Result<()>;

    /// All entries under `prefix`, in key order
    fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>>;

    /// Keys under `prefix` without loading values
    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        Ok(self
            .scan_prefix(prefix)?
            .into_iter()
            .map(|(key, _)| key)
            .collect())
    }
}

/// Store backed by sled embedded database
#[derive(Clone)]
pub struct SledStore {
    db: sled::Db,
}

impl SledStore {
    /// Open (or create) the store in the given data directory
    pub fn open(data_dir: &Path) -> Result<Self> {
        let db_path = data_dir.join("courier.db");
        debug!("Opening store at {:?}", db_path);

        let db = sled::open(&db_path)
            .map_err(|e| CourierError::Storage(format!("Failed to open store: {}", e)))?;

        info!("Store initialized at {:?}", db_path);
        Ok(Self { db })
    }

    /// Store that lives only as long as the process, for scratch sessions
    pub fn temporary() -> Result<Self> {
        let db = sled::Config::new()
            .temporary(true)
            .open()
            .map_err(|e| CourierError::Storage(format!("Failed to open temporary store: {}", e)))?;
        Ok(Self { db })
    }

    fn flush(&self) -> Result<()> {
        self.db
            .flush()
            .map_err(|e| CourierError::Storage(format!("Failed to flush store: {}", e)))?;
        Ok(())
    }
}

impl KvStore for SledStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match self.db.get(key.as_bytes()) {
            Ok(Some(value)) => Ok(Some(value.to_vec())),
            Ok(None) => Ok(None),
            Err(e) => Err(CourierError::Storage(format!("Failed to read {}: {}", key, e))),
        }
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        self.db
            .insert(key.as_bytes(), value)
            .map_err(|e| CourierError::Storage(format!("Failed to write {}: {}", key, e)))?;
        self.flush()
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.db
            .remove(key.as_bytes())
            .map_err(|e| CourierError::Storage(format!("Failed to delete {}: {}", key, e)))?;
        self.flush()
    }

    fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>> {
        let mut out = Vec::new();
        for entry in self.db.scan_prefix(prefix.as_bytes()) {
            match entry {
                Ok((key, value)) => {
                    if let Ok(key) = String::from_utf8(key.to_vec()) {
                        out.push((key, value.to_vec()));
                    }
                }
                Err(e) => {
                    return Err(CourierError::Storage(format!("Failed to scan {}: {}", prefix, e)))
                }
            }
        }
        Ok(out)
    }
}

/// In-process store. Clones share the same map, so handing a clone to a
/// fresh session behaves like reopening the same database.
#[derive(Clone, Default)]
pub struct MemoryStore {
    entries: Arc<Mutex<BTreeMap<String, Vec<u8>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.lock().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, Vec<u8>>>> {
        self.entries
            .lock()
            .map_err(|_| CourierError::Storage("memory store lock poisoned".to_string()))
    }
}

impl KvStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        self.lock()?.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.lock()?.remove(key);
        Ok(())
    }

    fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>> {
        Ok(self
            .lock()?
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect())
    }
}
