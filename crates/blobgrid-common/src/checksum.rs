//! Shard checksums
//!
//! Recovered shards are verified against the CRC32C of the original
//! bytes; CRC32C is hardware-accelerated on most targets and cheap enough
//! to run inline on every repaired window.

use serde::{Deserialize, Serialize};

/// CRC32C checksum of one shard window
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Checksum(u32);

impl Checksum {
    /// Compute the checksum of `data`
    #[must_use]
    pub fn compute(data: &[u8]) -> Self {
        Self(crc32c::crc32c(data))
    }

    /// Wrap a known checksum value
    #[must_use]
    pub const fn from_value(value: u32) -> Self {
        Self(value)
    }

    /// Raw CRC32C value
    #[must_use]
    pub const fn value(&self) -> u32 {
        self.0
    }

    /// Verify `data` against this checksum
    #[must_use]
    pub fn verify(&self, data: &[u8]) -> bool {
        crc32c::crc32c(data) == self.0
    }
}
