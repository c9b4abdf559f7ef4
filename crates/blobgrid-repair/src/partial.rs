//! Distributed partial repair
//!
//! Instead of hauling `n` whole shards to the coordinator, the decode
//! combination is pushed out: every helper unit receives its coefficient
//! of the decode row, multiplies its own shard bytes by it, and returns
//! the partial product. The coordinator XOR-reduces the partials into
//! the reconstructed window.
//!
//! A helper failure poisons only the bids it failed for; sibling bids
//! with complete partial sets still land.

use async_trait::async_trait;
use blobgrid_common::{Location, ShardInfo};
use blobgrid_erasure::{Encoder, gf256};
use bytes::Bytes;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::Result;
use crate::fetcher::ShardGetter;
use crate::planner::{RepairStripe, StripePlanner};
use crate::shards_buf::ChunkTable;

/// Helpers requested beyond the decode minimum, to ride out stragglers
pub(crate) const PARTIAL_HELPER_DELTA: usize = 2;

/// Helper-side compute capability
///
/// `partial_reconstruct` runs on (or on behalf of) the unit at
/// `location`: for each bid it multiplies the unit's shard bytes by
/// `coef` and returns the product. Per-bid failures come back as `None`
/// slots; a transport-level failure fails the whole call.
#[async_trait]
pub trait PartialRepairer: Send + Sync {
    /// Compute `coef ⊗ shard(vuid, bid)` for each bid
    async fn partial_reconstruct(
        &self,
        location: &Location,
        coef: u8,
        bids: &[ShardInfo],
    ) -> Result<Vec<Option<Bytes>>>;
}

/// [`PartialRepairer`] that reads helper shards through a [`ShardGetter`]
///
/// Stands in for the RPC implementation when helpers cannot compute
/// locally; the multiply then happens on the coordinator.
pub struct GetterPartialRepairer {
    getter: Arc<dyn ShardGetter>,
}

impl GetterPartialRepairer {
    /// Wrap a shard getter
    #[must_use]
    pub fn new(getter: Arc<dyn ShardGetter>) -> Self {
        Self { getter }
    }
}

#[async_trait]
impl PartialRepairer for GetterPartialRepairer {
    async fn partial_reconstruct(
        &self,
        location: &Location,
        coef: u8,
        bids: &[ShardInfo],
    ) -> Result<Vec<Option<Bytes>>> {
        let mut out = Vec::with_capacity(bids.len());
        for info in bids {
            match self.getter.get(location.vuid, info.bid).await {
                Ok(data) if data.len() as u64 == info.size => {
                    let mut product = vec![0u8; data.len()];
                    gf256::mul_slice(coef, &data, &mut product);
                    out.push(Some(Bytes::from(product)));
                }
                Ok(data) => {
                    warn!(vuid = %location.vuid, bid = %info.bid, len = data.len(),
                        "helper shard has unexpected size");
                    out.push(None);
                }
                Err(err) => {
                    warn!(vuid = %location.vuid, bid = %info.bid, %err, "helper read failed");
                    out.push(None);
                }
            }
        }
        Ok(out)
    }
}

/// One partial-repair pass over a stripe's bad positions
pub(crate) struct PartialRepairEngine<'a> {
    pub encoder: &'a Encoder,
    pub repairer: &'a dyn PartialRepairer,
    pub locations: &'a [Location],
    pub chunks: &'a ChunkTable,
    pub concurrency: usize,
}

impl PartialRepairEngine<'_> {
    /// Repair `stripe.bad_idxes` for every bid still missing
    ///
    /// Gathers up to `stripe.n + 2` live helpers per target, dispatches
    /// the coefficient-weighted reads concurrently, and reduces complete
    /// partial sets into the target windows. Bids with an incomplete set
    /// are left for the caller to count.
    pub(crate) async fn partial_repair_bids(
        &self,
        planner: &StripePlanner<'_>,
        bids: &[ShardInfo],
        stripe: &RepairStripe,
        bad_idxes: &[u8],
    ) {
        for &target in &stripe.bad_idxes {
            let Some(chunk) = self.chunks.get(target as usize).and_then(Option::as_ref) else {
                continue;
            };
            let todo: Vec<ShardInfo> = bids
                .iter()
                .filter(|info| !chunk.lock().shard_is_ok(info.bid))
                .copied()
                .collect();
            if todo.is_empty() {
                continue;
            }

            let plan = planner.partial_plan(
                target,
                stripe.n as usize + PARTIAL_HELPER_DELTA,
                bad_idxes,
            );
            let helpers = plan.helpers();
            if helpers.len() < stripe.n as usize {
                debug!(bad_idx = target, live = helpers.len(), "not enough live helpers");
                continue;
            }
            let coeffs = match self.encoder.decode_coefficients(target, &helpers) {
                Ok(coeffs) => coeffs,
                Err(err) => {
                    debug!(bad_idx = target, %err, "partial decode infeasible");
                    continue;
                }
            };
            let active: Vec<(u8, u8)> = helpers
                .into_iter()
                .zip(coeffs)
                .filter(|&(_, coef)| coef != 0)
                .collect();

            let todo_ref = &todo;
            let results: Vec<(u8, Result<Vec<Option<Bytes>>>)> =
                stream::iter(active.iter().map(|&(helper, coef)| async move {
                    let location = &self.locations[helper as usize];
                    let partials = self
                        .repairer
                        .partial_reconstruct(location, coef, todo_ref)
                        .await;
                    (helper, partials)
                }))
                .buffer_unordered(self.concurrency.max(1))
                .collect()
                .await;

            for (helper, result) in &results {
                if let Err(err) = result {
                    warn!(bad_idx = target, helper = *helper, %err, "partial repair helper failed");
                }
            }

            'bids: for (pos, info) in todo.iter().enumerate() {
                let size = info.size as usize;
                let mut out = vec![0u8; size];
                for (helper, result) in &results {
                    let product = result
                        .as_ref()
                        .ok()
                        .and_then(|partials| partials.get(pos))
                        .and_then(Option::as_ref)
                        .filter(|p| p.len() == size);
                    match product {
                        Some(p) => gf256::xor_slice(p, &mut out),
                        None => {
                            debug!(bad_idx = target, helper = *helper, bid = %info.bid,
                                "partial set incomplete");
                            continue 'bids;
                        }
                    }
                }
                let mut guard = chunk.lock();
                if let Ok(window) = guard.window_mut(info.bid) {
                    window.copy_from_slice(&out);
                    guard.set_filled(info.bid);
                }
            }
        }
    }
}
