use serde::{Serialize, Deserialize};

/// Storage configuration for the RocksDB node store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Database path
    pub db_path: String,

    /// Create the database if it is missing
    pub create_if_missing: bool,

    /// Maximum open files
    pub max_open_files: i32,

    /// Write buffer size in MB
    pub write_buffer_size: usize,

    /// Enable compression
    pub enable_compression: bool,

    /// Compression type (snappy, lz4, zstd, zlib)
    pub compression_type: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: "./data/forestry/db".to_string(),
            create_if_missing: true,
            max_open_files: 1000,
            write_buffer_size: 64, // 64MB
            enable_compression: true,
            compression_type: "lz4".to_string(),
        }
    }
}
