use rocksdb::{DBCompressionType, Options, DB};
use std::collections::HashMap;
use std::path::Path;
use std::sync::RwLock;
use log::{info, warn};
use thiserror::Error;

use crate::config::StorageConfig;

/// Error type for node store operations
#[derive(Debug, Error)]
pub enum KVStoreError {
    /// RocksDB error
    #[error("RocksDB error: {0}")]
    RocksDBError(String),

    /// A store lock was poisoned by a panicking writer
    #[error("Store lock poisoned: {0}")]
    LockPoisoned(String),
}

impl From<rocksdb::Error> for KVStoreError {
    fn from(err: rocksdb::Error) -> Self {
        KVStoreError::RocksDBError(err.to_string())
    }
}

/// Byte-addressed store holding encoded trie nodes under their commitment hash
pub trait NodeStore: Send + Sync {
    /// Put a key-value pair
    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), KVStoreError>;

    /// Get a value by key
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, KVStoreError>;

    /// Delete a key-value pair
    fn delete(&self, key: &[u8]) -> Result<(), KVStoreError>;

    /// Check if a key exists
    fn exists(&self, key: &[u8]) -> Result<bool, KVStoreError> {
        Ok(self.get(key)?.is_some())
    }

    /// Flush any pending writes to disk
    fn flush(&self) -> Result<(), KVStoreError> {
        Ok(())
    }
}

/// In-memory node store
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<Vec<u8>, Vec<u8>>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries
    pub fn len(&self) -> usize {
        self.entries.read().map(|m| m.len()).unwrap_or(0)
    }

    /// Whether the store holds no entries
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl NodeStore for MemoryStore {
    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), KVStoreError> {
        let mut entries = self.entries.write()
            .map_err(|e| KVStoreError::LockPoisoned(e.to_string()))?;
        entries.insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, KVStoreError> {
        let entries = self.entries.read()
            .map_err(|e| KVStoreError::LockPoisoned(e.to_string()))?;
        Ok(entries.get(key).cloned())
    }

    fn delete(&self, key: &[u8]) -> Result<(), KVStoreError> {
        let mut entries = self.entries.write()
            .map_err(|e| KVStoreError::LockPoisoned(e.to_string()))?;
        entries.remove(key);
        Ok(())
    }

    fn exists(&self, key: &[u8]) -> Result<bool, KVStoreError> {
        let entries = self.entries.read()
            .map_err(|e| KVStoreError::LockPoisoned(e.to_string()))?;
        Ok(entries.contains_key(key))
    }
}

/// RocksDB implementation of NodeStore
pub struct RocksDBStore {
    /// RocksDB instance
    db: DB,
}

impl RocksDBStore {
    /// Open (or create) a RocksDB store at the given path
    pub fn new(path: &Path) -> Result<Self, KVStoreError> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        Self::with_options(path, opts)
    }

    /// Open a RocksDB store using the storage section of the configuration
    pub fn with_config(config: &StorageConfig) -> Result<Self, KVStoreError> {
        let mut opts = Options::default();
        opts.create_if_missing(config.create_if_missing);
        opts.set_max_open_files(config.max_open_files);
        opts.set_write_buffer_size(config.write_buffer_size * 1024 * 1024);

        let compression = if config.enable_compression {
            match config.compression_type.as_str() {
                "snappy" => DBCompressionType::Snappy,
                "lz4" => DBCompressionType::Lz4,
                "zstd" => DBCompressionType::Zstd,
                "zlib" => DBCompressionType::Zlib,
                other => {
                    warn!("Unknown compression type {}, falling back to lz4", other);
                    DBCompressionType::Lz4
                }
            }
        } else {
            DBCompressionType::None
        };
        opts.set_compression_type(compression);

        Self::with_options(Path::new(&config.db_path), opts)
    }

    /// Open a RocksDB store with custom options
    pub fn with_options(path: &Path, options: Options) -> Result<Self, KVStoreError> {
        let db = DB::open(&options, path)
            .map_err(|e| KVStoreError::RocksDBError(format!("Failed to open RocksDB: {}", e)))?;
        info!("Opened node store at {:?}", path);
        Ok(Self { db })
    }
}

impl NodeStore for RocksDBStore {
    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), KVStoreError> {
        self.db.put(key, value)
            .map_err(|e| KVStoreError::RocksDBError(format!("Failed to put key: {}", e)))
    }

    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, KVStoreError> {
        self.db.get(key)
            .map_err(|e| KVStoreError::RocksDBError(format!("Failed to get key: {}", e)))
    }

    fn delete(&self, key: &[u8]) -> Result<(), KVStoreError> {
        self.db.delete(key)
            .map_err(|e| KVStoreError::RocksDBError(format!("Failed to delete key: {}", e)))
    }

    fn flush(&self) -> Result<(), KVStoreError> {
        self.db.flush()
            .map_err(|e| KVStoreError::RocksDBError(format!("Failed to flush: {}", e)))
    }
}
