//! Configuration for the recovery engine
//!
//! These structures are deserialized from the node's config file by the
//! embedding daemon and handed to the engine as-is.

use serde::{Deserialize, Serialize};

/// Buffer-pool configuration, one class per task family
///
/// A class with `buf_size == 0` and `capacity == 0` is disabled; asking
/// it for a buffer fails immediately.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct BufPoolConfig {
    /// Size of each migrate-class buffer in bytes
    pub migrate_buf_size: usize,
    /// Maximum number of outstanding migrate-class buffers
    pub migrate_buf_capacity: usize,
    /// Size of each repair-class buffer in bytes
    pub repair_buf_size: usize,
    /// Maximum number of outstanding repair-class buffers
    pub repair_buf_capacity: usize,
}

impl Default for BufPoolConfig {
    fn default() -> Self {
        Self {
            migrate_buf_size: 4 * 1024 * 1024,
            migrate_buf_capacity: 64,
            repair_buf_size: 16 * 1024 * 1024,
            repair_buf_capacity: 16,
        }
    }
}

/// Top-level engine configuration
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Buffer-pool sizing
    pub buf_pool: BufPoolConfig,
    /// Concurrent shard fetches per recovery call
    pub concurrency: usize,
    /// Allow the distributed partial-repair pass
    pub enable_partial: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            buf_pool: BufPoolConfig::default(),
            concurrency: 10,
            enable_partial: false,
        }
    }
}
