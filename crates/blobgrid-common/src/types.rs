//! Core type definitions for BlobGrid
//!
//! This module defines the fundamental identifiers used throughout the
//! system: blob IDs, volume-unit IDs, and shard locations.

use derive_more::{From, Into};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier for a blob (one logical object, erasure coded into
/// one shard per volume unit)
#[derive(
    Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, From, Into,
)]
pub struct BlobId(u64);

impl BlobId {
    /// Create a blob ID from its raw value
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the raw value
    #[must_use]
    pub const fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Debug for BlobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlobId({})", self.0)
    }
}

impl fmt::Display for BlobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

const VUID_INDEX_SHIFT: u64 = 24;
const VUID_VID_SHIFT: u64 = 32;
const VUID_EPOCH_MASK: u64 = (1 << VUID_INDEX_SHIFT) - 1;

/// Volume-unit identifier
///
/// Packs `(vid, index, epoch)` into one 64-bit value: the volume ID in the
/// high 32 bits, the unit's position within the volume's location vector
/// in the next 8, and a 24-bit epoch in the low bits.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, From, Into)]
pub struct Vuid(u64);

impl Vuid {
    /// Compose a vuid from its parts. `epoch` is truncated to 24 bits.
    #[must_use]
    pub const fn new(vid: u32, index: u8, epoch: u32) -> Self {
        Self(
            ((vid as u64) << VUID_VID_SHIFT)
                | ((index as u64) << VUID_INDEX_SHIFT)
                | (epoch as u64 & VUID_EPOCH_MASK),
        )
    }

    /// Volume ID this unit belongs to
    #[must_use]
    pub const fn vid(&self) -> u32 {
        (self.0 >> VUID_VID_SHIFT) as u32
    }

    /// Position of this unit in the volume's location vector
    #[must_use]
    pub const fn index(&self) -> u8 {
        (self.0 >> VUID_INDEX_SHIFT) as u8
    }

    /// Generation of this unit (bumped when the unit is rebuilt)
    #[must_use]
    pub const fn epoch(&self) -> u32 {
        (self.0 & VUID_EPOCH_MASK) as u32
    }
}

impl fmt::Debug for Vuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Vuid({}-{}-{})",
            self.vid(),
            self.index(),
            self.epoch()
        )
    }
}

impl fmt::Display for Vuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Network location of one volume unit
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    /// The unit itself
    pub vuid: Vuid,
    /// Host serving the unit
    pub host: String,
}

impl Location {
    /// Create a new location
    #[must_use]
    pub fn new(vuid: Vuid, host: impl Into<String>) -> Self {
        Self {
            vuid,
            host: host.into(),
        }
    }
}

/// Size descriptor of one blob inside a recovery batch
///
/// A size of zero means the shard is logically empty: no bytes are ever
/// fetched for it, but the bid still participates in bookkeeping.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardInfo {
    /// Blob ID
    pub bid: BlobId,
    /// Per-unit shard size in bytes
    pub size: u64,
}

impl ShardInfo {
    /// Create a new shard descriptor
    #[must_use]
    pub const fn new(bid: BlobId, size: u64) -> Self {
        Self { bid, size }
    }
}

/// Kind of background task driving a recovery
///
/// Selects which buffer-pool class the recovery draws from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskType {
    /// Disk-repair driver
    Repair,
    /// Migration driver (balance, drop, manual migrate)
    Migrate,
}
