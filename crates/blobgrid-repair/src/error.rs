//! Error types for the recovery engine
//!
//! Two of these are wire-visible and their messages are stable contract:
//! [`Error::ShardPartialRepairFailed`] (an expected shard was never
//! filled) and [`Error::BidCanNotRecover`] (no strategy recovered a bid).

use blobgrid_erasure::ErasureError;
use thiserror::Error;

/// Result type for recovery operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors from the recovery engine
#[derive(Debug, Error)]
pub enum Error {
    /// Read of a shard that was expected to be repaired but never was
    #[error("shard partial repair failed")]
    ShardPartialRepairFailed,

    /// The bid is not part of the planned batch
    #[error("bid not found")]
    BidNotFound,

    /// Terminal: at least one bid survived every recovery strategy
    #[error("bid can not recover")]
    BidCanNotRecover,

    /// The buffer pool is exhausted or the class is disabled
    #[error("no free buffer")]
    NoFreeBuffer,

    /// The batch does not fit one pool buffer
    #[error("buffer capacity exceeded: need {need} bytes, capacity {cap}")]
    BufferTooSmall { need: u64, cap: u64 },

    /// A reader handed `put_shard` the wrong number of bytes
    #[error("shard size mismatch: expected {expected} bytes, got {actual}")]
    ShardSizeMismatch { expected: u64, actual: u64 },

    /// Bad index outside `[0, total_shards)`
    #[error("invalid shard index {0}")]
    InvalidShardIndex(u8),

    /// Location vector does not match the code mode
    #[error("location count mismatch: expected {expected}, got {actual}")]
    LocationCountMismatch { expected: usize, actual: usize },

    /// I/O failure while draining a shard reader
    #[error("shard read: {0}")]
    ShardRead(#[from] std::io::Error),

    /// Shard fetch failed at the transport
    #[error("shard fetch failed: {0}")]
    Fetch(String),

    /// Erasure math failure
    #[error(transparent)]
    Erasure(#[from] ErasureError),
}
