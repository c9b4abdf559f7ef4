//! BlobGrid Repair - shard recovery engine
//!
//! Reconstructs the shards of a batch of bids for a set of bad volume
//! unit indexes, using the surviving units, and exposes the recovered
//! bytes to the migration/repair driver.
//!
//! The engine runs a strategy ladder, cheapest first:
//!
//! 1. **Direct** — re-read the purportedly bad units (the bad flag may
//!    have been transient). Only in direct-only mode.
//! 2. **Local stripe** — decode inside one AZ's repair group (LRC).
//! 3. **Global stripe** — full-width decode from any `n` survivors.
//! 4. **Partial** — distribute the decode combination across helper
//!    units and XOR-reduce their partial products (opt-in).
//!
//! Local parity positions are re-encoded from their (possibly just
//! repaired) stripe members at the end. Per-bid and per-unit failures
//! are isolated throughout: one unreachable shard never aborts its
//! siblings, and a bid is only declared lost after the whole ladder.
//!
//! # Example
//!
//! ```ignore
//! let pool = Arc::new(TaskBufPool::new(&config.buf_pool));
//! let mut recover = ShardRecover::new(
//!     locations, CodeMode::EC6P6, bid_infos, getter, pool,
//!     config.concurrency, TaskType::Repair, config.enable_partial,
//! )?;
//! recover.recover_shards(&bad_idxes, false).await?;
//! for info in recover.repair_bids() {
//!     let bytes = recover.get_shard(bad_idxes[0], info.bid)?;
//!     // hand `bytes` to the writer
//! }
//! recover.release_buf();
//! ```

pub mod bufpool;
pub mod error;
pub mod fetcher;
pub mod partial;
pub mod planner;
pub mod recover;
pub mod shards_buf;

pub use bufpool::TaskBufPool;
pub use error::{Error, Result};
pub use fetcher::{ShardFetcher, ShardGetter};
pub use partial::{GetterPartialRepairer, PartialRepairer};
pub use planner::{PartialPlan, RepairStripe, StripePlanner};
pub use recover::ShardRecover;
pub use shards_buf::{ChunkTable, ShardsBuf};
