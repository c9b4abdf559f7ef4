//! The recovery orchestrator
//!
//! [`ShardRecover`] owns the per-call state: the code mode, the volume's
//! location vector, the bid batch, and one buffer per unit. A call to
//! [`ShardRecover::recover_shards`] walks the strategy ladder until every
//! `(bid, bad index)` pair is satisfied or declared unrecoverable; the
//! driver then reads windows back with [`ShardRecover::get_shard`] and
//! returns the buffers with [`ShardRecover::release_buf`].
//!
//! A failed call deliberately keeps its buffers until `release_buf` so
//! the driver can inspect whatever was recovered.

use blobgrid_common::{BlobId, CodeMode, Location, ShardInfo, TaskType};
use blobgrid_erasure::{Encoder, gf256};
use bytes::Bytes;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, error};

use crate::bufpool::TaskBufPool;
use crate::error::{Error, Result};
use crate::fetcher::{ShardFetcher, ShardGetter};
use crate::partial::{GetterPartialRepairer, PartialRepairEngine, PartialRepairer};
use crate::planner::{RepairStripe, StripePlanner};
use crate::shards_buf::{ChunkTable, ShardsBuf};

/// Per-call shard recovery state and strategy ladder
pub struct ShardRecover {
    code_mode: CodeMode,
    encoder: Encoder,
    locations: Vec<Location>,
    repair_bids: Vec<ShardInfo>,
    chunks: ChunkTable,
    getter: Arc<dyn ShardGetter>,
    repairer: Arc<dyn PartialRepairer>,
    pool: Arc<TaskBufPool>,
    task_type: TaskType,
    concurrency: usize,
    enable_partial: bool,
}

impl ShardRecover {
    /// Create a recovery context for one task
    ///
    /// `locations` must be the volume's full location vector; buffers are
    /// drawn from `pool`'s class for `task_type` and allocated lazily per
    /// unit index.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        locations: Vec<Location>,
        code_mode: CodeMode,
        bid_infos: Vec<ShardInfo>,
        getter: Arc<dyn ShardGetter>,
        pool: Arc<TaskBufPool>,
        concurrency: usize,
        task_type: TaskType,
        enable_partial: bool,
    ) -> Result<Self> {
        let total = code_mode.total_shards() as usize;
        if locations.len() != total {
            return Err(Error::LocationCountMismatch {
                expected: total,
                actual: locations.len(),
            });
        }
        let encoder = Encoder::new(code_mode)?;
        let repairer: Arc<dyn PartialRepairer> =
            Arc::new(GetterPartialRepairer::new(Arc::clone(&getter)));
        Ok(Self {
            code_mode,
            encoder,
            locations,
            repair_bids: bid_infos,
            chunks: (0..total).map(|_| None).collect(),
            getter,
            repairer,
            pool,
            task_type,
            concurrency,
            enable_partial,
        })
    }

    /// Swap the partial-repair transport (RPC in production)
    #[must_use]
    pub fn with_partial_repairer(mut self, repairer: Arc<dyn PartialRepairer>) -> Self {
        self.repairer = repairer;
        self
    }

    /// Recover every bid on every bad index
    ///
    /// With `direct` set, only re-reads the bad units themselves (the
    /// bad flag may have been transient) and never decodes. Otherwise
    /// runs the ladder: download live shards, local-stripe decode,
    /// global decode, partial repair (opt-in), local-parity re-encode.
    ///
    /// Fails with [`Error::BidCanNotRecover`] when any bid is left
    /// unrepaired on any bad index. Idempotent on re-entry: windows that
    /// are already filled are skipped.
    pub async fn recover_shards(&mut self, bad_idxes: &[u8], direct: bool) -> Result<()> {
        let total = self.code_mode.total_shards();
        if let Some(&bad) = bad_idxes.iter().find(|&&b| b >= total) {
            return Err(Error::InvalidShardIndex(bad));
        }

        if direct {
            self.alloc_buf(bad_idxes)?;
            let fetcher = ShardFetcher::new(self.getter.as_ref(), self.concurrency);
            let bad_locs: Vec<Location> = bad_idxes
                .iter()
                .map(|&i| self.locations[i as usize].clone())
                .collect();
            let failed = fetcher
                .direct_get_shard(&self.repair_bids, &bad_locs, &self.chunks)
                .await;
            if failed.is_empty() {
                return Ok(());
            }
            error!(count = failed.len(), "direct read left bids unrecovered");
            return Err(Error::BidCanNotRecover);
        }

        let all: Vec<u8> = (0..total).collect();
        self.alloc_buf(&all)?;

        let live: Vec<Location> = self
            .locations
            .iter()
            .enumerate()
            .filter(|&(i, _)| !bad_idxes.contains(&(i as u8)))
            .map(|(_, loc)| loc.clone())
            .collect();
        let fetcher = ShardFetcher::new(self.getter.as_ref(), self.concurrency);
        fetcher
            .download(&self.repair_bids, &live, &self.chunks)
            .await;
        debug!(mode = %self.code_mode, bad = ?bad_idxes, "live download complete");

        let planner = StripePlanner::new(self.code_mode, &self.locations);

        if self.code_mode.is_local_stripe_decodable() {
            for stripe in planner.gen_local_stripes(bad_idxes) {
                self.repair_stripe_shards(&stripe);
            }
        }

        let global = planner.global_stripe(bad_idxes);
        self.repair_stripe_shards(&global);

        if self.enable_partial && !self.collect_fail_bids(bad_idxes).is_empty() {
            let engine = PartialRepairEngine {
                encoder: &self.encoder,
                repairer: self.repairer.as_ref(),
                locations: &self.locations,
                chunks: &self.chunks,
                concurrency: self.concurrency,
            };
            engine
                .partial_repair_bids(&planner, &self.repair_bids, &global, bad_idxes)
                .await;
        }

        self.recover_local_replica_shards(bad_idxes);

        let failed = self.collect_fail_bids(bad_idxes);
        if failed.is_empty() {
            Ok(())
        } else {
            error!(count = failed.len(), "recovery exhausted all strategies");
            Err(Error::BidCanNotRecover)
        }
    }

    /// Run only the partial-repair pass for `stripe`
    ///
    /// Allocates the target buffers if needed; helper bytes travel
    /// through the configured [`PartialRepairer`], not the local chunk
    /// table. Check [`Self::collect_fail_bids`] for the outcome.
    pub async fn partial_repair_bids(
        &mut self,
        bids: &[ShardInfo],
        stripe: &RepairStripe,
        bad_idxes: &[u8],
    ) -> Result<()> {
        self.alloc_buf(&stripe.bad_idxes)?;
        let planner = StripePlanner::new(self.code_mode, &self.locations);
        let engine = PartialRepairEngine {
            encoder: &self.encoder,
            repairer: self.repairer.as_ref(),
            locations: &self.locations,
            chunks: &self.chunks,
            concurrency: self.concurrency,
        };
        engine
            .partial_repair_bids(&planner, bids, stripe, bad_idxes)
            .await;
        Ok(())
    }

    /// Read one recovered (or directly fetched) shard window
    pub fn get_shard(&self, idx: u8, bid: BlobId) -> Result<Bytes> {
        if idx >= self.code_mode.total_shards() {
            return Err(Error::InvalidShardIndex(idx));
        }
        let Some(chunk) = self.chunks[idx as usize].as_ref() else {
            return Err(Error::ShardPartialRepairFailed);
        };
        let guard = chunk.lock();
        let data = guard.fetch_shard(bid)?;
        Ok(Bytes::copy_from_slice(data))
    }

    /// Bids still missing on at least one of `bad_idxes`
    #[must_use]
    pub fn collect_fail_bids(&self, bad_idxes: &[u8]) -> Vec<BlobId> {
        self.repair_bids
            .iter()
            .filter(|info| bad_idxes.iter().any(|&i| !self.shard_ok(i, info.bid)))
            .map(|info| info.bid)
            .collect()
    }

    /// Return every unit buffer to the pool
    ///
    /// Also run on drop; afterwards all windows read as missing.
    pub fn release_buf(&mut self) {
        for slot in &mut self.chunks {
            if let Some(chunk) = slot.take() {
                let buf = chunk.lock().take_buf();
                self.pool.release(self.task_type, buf);
            }
        }
    }

    /// The sparse per-unit buffer table
    #[must_use]
    pub const fn chunks_shards_buf(&self) -> &ChunkTable {
        &self.chunks
    }

    /// The volume's location vector
    #[must_use]
    pub fn locations(&self) -> &[Location] {
        &self.locations
    }

    /// The code mode under recovery
    #[must_use]
    pub const fn code_mode(&self) -> CodeMode {
        self.code_mode
    }

    /// The read-only bid batch
    #[must_use]
    pub fn repair_bids(&self) -> &[ShardInfo] {
        &self.repair_bids
    }

    /// Allocate and plan a buffer for each index that lacks one
    fn alloc_buf(&mut self, idxs: &[u8]) -> Result<()> {
        for &idx in idxs {
            if self.chunks[idx as usize].is_some() {
                continue;
            }
            let buf = self.pool.acquire(self.task_type)?;
            let mut sb = ShardsBuf::new(buf);
            if let Err(err) = sb.plan_layout(&self.repair_bids) {
                self.pool.release(self.task_type, sb.take_buf());
                return Err(err);
            }
            self.chunks[idx as usize] = Some(Arc::new(Mutex::new(sb)));
        }
        Ok(())
    }

    /// Decode the stripe's bad positions for every bid that its
    /// surviving members can cover
    fn repair_stripe_shards(&self, stripe: &RepairStripe) {
        let member_idxs = stripe.indexes();
        for &target in &stripe.bad_idxes {
            let Some(target_chunk) = self.chunks[target as usize].as_ref() else {
                continue;
            };
            for info in &self.repair_bids {
                if info.size == 0 || target_chunk.lock().shard_is_ok(info.bid) {
                    continue;
                }
                let helpers: Vec<u8> = member_idxs
                    .iter()
                    .copied()
                    .filter(|&i| i != target && self.shard_ok(i, info.bid))
                    .collect();
                if helpers.len() < stripe.n as usize {
                    continue;
                }
                let coeffs = match self.encoder.decode_coefficients(target, &helpers) {
                    Ok(coeffs) => coeffs,
                    Err(err) => {
                        debug!(bad_idx = target, %err, "stripe decode infeasible");
                        continue;
                    }
                };

                let mut out = vec![0u8; info.size as usize];
                let mut complete = true;
                for (&helper, &coef) in helpers.iter().zip(&coeffs) {
                    if coef == 0 {
                        continue;
                    }
                    let Some(chunk) = self.chunks[helper as usize].as_ref() else {
                        complete = false;
                        break;
                    };
                    let guard = chunk.lock();
                    match guard.fetch_shard(info.bid) {
                        Ok(src) => gf256::mul_slice_xor(coef, src, &mut out),
                        Err(_) => {
                            complete = false;
                            break;
                        }
                    }
                }
                if !complete {
                    continue;
                }
                let mut guard = target_chunk.lock();
                if let Ok(window) = guard.window_mut(info.bid) {
                    window.copy_from_slice(&out);
                    guard.set_filled(info.bid);
                }
            }
        }
    }

    /// Re-encode bad local parities from their stripe members
    ///
    /// Runs last: members may themselves have been repaired by the
    /// stripe passes.
    fn recover_local_replica_shards(&self, bad_idxes: &[u8]) {
        if !self.code_mode.has_local_parity() {
            return;
        }
        let base = self.code_mode.data_shards + self.code_mode.parity_shards;
        for &bad in bad_idxes {
            if bad < base {
                continue;
            }
            let Ok(coeffs) = self.encoder.local_parity_coeffs(bad) else {
                continue;
            };
            let members: Vec<(u8, u8)> = coeffs
                .iter()
                .copied()
                .filter(|&(_, coef)| coef != 0)
                .collect();
            let Some(target_chunk) = self.chunks[bad as usize].as_ref() else {
                continue;
            };
            for info in &self.repair_bids {
                if info.size == 0 || target_chunk.lock().shard_is_ok(info.bid) {
                    continue;
                }
                if !members
                    .iter()
                    .all(|&(member, _)| self.shard_ok(member, info.bid))
                {
                    continue;
                }
                let mut out = vec![0u8; info.size as usize];
                for &(member, coef) in &members {
                    let Some(chunk) = self.chunks[member as usize].as_ref() else {
                        continue;
                    };
                    let guard = chunk.lock();
                    if let Ok(src) = guard.fetch_shard(info.bid) {
                        gf256::mul_slice_xor(coef, src, &mut out);
                    }
                }
                let mut guard = target_chunk.lock();
                if let Ok(window) = guard.window_mut(info.bid) {
                    window.copy_from_slice(&out);
                    guard.set_filled(info.bid);
                }
            }
        }
    }

    fn shard_ok(&self, idx: u8, bid: BlobId) -> bool {
        self.chunks
            .get(idx as usize)
            .and_then(Option::as_ref)
            .is_some_and(|c| c.lock().shard_is_ok(bid))
    }
}

impl Drop for ShardRecover {
    fn drop(&mut self) {
        self.release_buf();
    }
}
