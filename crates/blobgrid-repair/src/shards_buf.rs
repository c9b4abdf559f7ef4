//! Per-unit shard buffer
//!
//! One `ShardsBuf` owns a pool buffer and lays the batch's shards out
//! contiguously in input order, one fixed window per bid. Windows are
//! written exactly once; a window that was never filled reads back as
//! [`Error::ShardPartialRepairFailed`].

use blobgrid_common::{BlobId, ShardInfo};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::io::Read;
use std::sync::Arc;

use crate::error::{Error, Result};

/// Sparse table of per-unit buffers, indexed by unit position
///
/// Built before any parallel work; only the `ShardsBuf`s behind the
/// mutexes are touched during a recovery pass.
pub type ChunkTable = Vec<Option<Arc<Mutex<ShardsBuf>>>>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ShardState {
    /// Window reserved, bytes not yet written
    Planned,
    /// Window holds the shard; immutable from here on
    Filled,
    /// A fetch for this window failed
    Failed,
}

#[derive(Clone, Copy, Debug)]
struct Window {
    offset: usize,
    size: usize,
    state: ShardState,
}

/// One unit's buffer with planned per-bid windows
pub struct ShardsBuf {
    buf: Vec<u8>,
    windows: HashMap<BlobId, Window>,
    planned_bytes: usize,
}

impl ShardsBuf {
    /// Wrap a pool buffer; call [`Self::plan_layout`] before use
    #[must_use]
    pub fn new(buf: Vec<u8>) -> Self {
        Self {
            buf,
            windows: HashMap::new(),
            planned_bytes: 0,
        }
    }

    /// Reserve one window per bid, contiguously in input order
    ///
    /// Zero-size bids are born `Filled`: nothing will ever be fetched
    /// for them but they stay part of the bookkeeping.
    pub fn plan_layout(&mut self, shards: &[ShardInfo]) -> Result<()> {
        let need: u64 = shards.iter().map(|s| s.size).sum();
        let cap = self.buf.len() as u64;
        if need > cap {
            return Err(Error::BufferTooSmall { need, cap });
        }

        self.windows.clear();
        let mut offset = 0usize;
        for info in shards {
            let size = info.size as usize;
            self.windows.insert(
                info.bid,
                Window {
                    offset,
                    size,
                    state: if size == 0 {
                        ShardState::Filled
                    } else {
                        ShardState::Planned
                    },
                },
            );
            offset += size;
        }
        self.planned_bytes = offset;
        Ok(())
    }

    /// Total bytes reserved by the current plan
    #[must_use]
    pub const fn planned_bytes(&self) -> usize {
        self.planned_bytes
    }

    /// The window with its current length: full once filled, empty before
    pub fn get_shard_buf(&self, bid: BlobId) -> Result<&[u8]> {
        let w = self.windows.get(&bid).ok_or(Error::BidNotFound)?;
        match w.state {
            ShardState::Filled => Ok(&self.buf[w.offset..w.offset + w.size]),
            _ => Ok(&self.buf[w.offset..w.offset]),
        }
    }

    /// Drain exactly the planned size from `reader` into the window
    ///
    /// Short or long input fails without changing the window state, so a
    /// later strategy may still fill it. Filling twice is a no-op.
    pub fn put_shard(&mut self, bid: BlobId, reader: &mut dyn Read) -> Result<()> {
        let w = *self.windows.get(&bid).ok_or(Error::BidNotFound)?;
        if w.state == ShardState::Filled {
            return Ok(());
        }

        let window = &mut self.buf[w.offset..w.offset + w.size];
        let mut filled = 0usize;
        while filled < w.size {
            let read = reader.read(&mut window[filled..])?;
            if read == 0 {
                break;
            }
            filled += read;
        }
        if filled < w.size {
            return Err(Error::ShardSizeMismatch {
                expected: w.size as u64,
                actual: filled as u64,
            });
        }
        let mut probe = [0u8; 1];
        if reader.read(&mut probe)? > 0 {
            return Err(Error::ShardSizeMismatch {
                expected: w.size as u64,
                actual: w.size as u64 + 1,
            });
        }

        self.set_state(bid, ShardState::Filled);
        Ok(())
    }

    /// The filled window
    ///
    /// [`Error::BidNotFound`] for bids outside the plan,
    /// [`Error::ShardPartialRepairFailed`] for planned windows that were
    /// never filled. Zero-size shards return an empty window.
    pub fn fetch_shard(&self, bid: BlobId) -> Result<&[u8]> {
        let w = self.windows.get(&bid).ok_or(Error::BidNotFound)?;
        if w.state != ShardState::Filled {
            return Err(Error::ShardPartialRepairFailed);
        }
        Ok(&self.buf[w.offset..w.offset + w.size])
    }

    /// Readiness probe: true iff the window is filled
    #[must_use]
    pub fn shard_is_ok(&self, bid: BlobId) -> bool {
        self.windows
            .get(&bid)
            .is_some_and(|w| w.state == ShardState::Filled)
    }

    /// Record a fetch failure; filled windows are left alone
    pub fn mark_failed(&mut self, bid: BlobId) {
        if let Some(w) = self.windows.get_mut(&bid)
            && w.state != ShardState::Filled
        {
            w.state = ShardState::Failed;
        }
    }

    /// Mutable access to an unfilled window for in-place reconstruction
    pub(crate) fn window_mut(&mut self, bid: BlobId) -> Result<&mut [u8]> {
        let w = self.windows.get(&bid).ok_or(Error::BidNotFound)?;
        debug_assert_ne!(w.state, ShardState::Filled, "filled windows are immutable");
        Ok(&mut self.buf[w.offset..w.offset + w.size])
    }

    /// Mark a window repaired after an in-place write
    pub(crate) fn set_filled(&mut self, bid: BlobId) {
        self.set_state(bid, ShardState::Filled);
    }

    /// Give the underlying buffer back for pool release
    pub fn take_buf(&mut self) -> Vec<u8> {
        self.windows.clear();
        self.planned_bytes = 0;
        std::mem::take(&mut self.buf)
    }

    fn set_state(&mut self, bid: BlobId, state: ShardState) {
        if let Some(w) = self.windows.get_mut(&bid) {
            w.state = state;
        }
    }
}
