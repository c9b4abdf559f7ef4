//! Concurrent shard download
//!
//! Fans `(vuid, bid)` fetches out over a bounded number of in-flight
//! requests and pipes each response into its unit's buffer window.
//! Failures are strictly per-shard: a dead unit or a truncated response
//! marks that one window `Failed` and the rest of the batch proceeds.

use async_trait::async_trait;
use blobgrid_common::{BlobId, Location, ShardInfo, Vuid};
use bytes::Bytes;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tracing::warn;

use crate::error::Result;
use crate::shards_buf::ChunkTable;

/// Transport capability: fetch one shard from the unit that stores it
///
/// Implementations must yield exactly the advertised shard size on
/// success; the window layer rejects anything else.
#[async_trait]
pub trait ShardGetter: Send + Sync {
    /// Fetch the shard of `bid` stored on `vuid`
    async fn get(&self, vuid: Vuid, bid: BlobId) -> Result<Bytes>;
}

/// Bounded-concurrency downloader over a [`ShardGetter`]
pub struct ShardFetcher<'a> {
    getter: &'a dyn ShardGetter,
    concurrency: usize,
}

impl<'a> ShardFetcher<'a> {
    /// Create a fetcher; `concurrency` caps in-flight fetches
    #[must_use]
    pub fn new(getter: &'a dyn ShardGetter, concurrency: usize) -> Self {
        Self {
            getter,
            concurrency: concurrency.max(1),
        }
    }

    /// Download every `(location, bid)` pair into the chunk table
    ///
    /// Skips zero-size bids, already-filled windows, and locations
    /// without an allocated buffer. Completes when every pair has
    /// terminated; callers inspect the windows for the outcome.
    pub async fn download(&self, bids: &[ShardInfo], locations: &[Location], chunks: &ChunkTable) {
        let mut jobs = Vec::new();
        for loc in locations {
            let idx = loc.vuid.index() as usize;
            let Some(chunk) = chunks.get(idx).and_then(Option::as_ref) else {
                continue;
            };
            for info in bids {
                if info.size == 0 || chunk.lock().shard_is_ok(info.bid) {
                    continue;
                }
                jobs.push((loc.clone(), *info, Arc::clone(chunk)));
            }
        }

        stream::iter(jobs.into_iter().map(|(loc, info, chunk)| async move {
            match self.getter.get(loc.vuid, info.bid).await {
                Ok(data) => {
                    let mut guard = chunk.lock();
                    let mut reader = data.as_ref();
                    if let Err(err) = guard.put_shard(info.bid, &mut reader) {
                        warn!(vuid = %loc.vuid, bid = %info.bid, %err, "fetched shard rejected");
                        guard.mark_failed(info.bid);
                    }
                }
                Err(err) => {
                    warn!(vuid = %loc.vuid, bid = %info.bid, %err, "shard fetch failed");
                    chunk.lock().mark_failed(info.bid);
                }
            }
        }))
        .buffer_unordered(self.concurrency)
        .for_each(|()| async {})
        .await;
    }

    /// Try to read the bad units' own shards directly
    ///
    /// Covers the case where the bad flag was a false positive. Returns
    /// the bids still missing on at least one of the given locations.
    pub async fn direct_get_shard(
        &self,
        bids: &[ShardInfo],
        bad_locations: &[Location],
        chunks: &ChunkTable,
    ) -> Vec<BlobId> {
        self.download(bids, bad_locations, chunks).await;

        bids.iter()
            .filter(|info| {
                bad_locations.iter().any(|loc| {
                    let idx = loc.vuid.index() as usize;
                    !chunks
                        .get(idx)
                        .and_then(Option::as_ref)
                        .is_some_and(|c| c.lock().shard_is_ok(info.bid))
                })
            })
            .map(|info| info.bid)
            .collect()
    }
}
