//! End-to-end recovery scenarios over a mock transport
//!
//! The mock pre-encodes every bid with the real codec and serves shards
//! per `(unit, bid)`, with injectable failures at the same granularity.
//! Recovered windows are checked against the CRC32C of the originals.

use async_trait::async_trait;
use blobgrid_common::{
    BlobId, BufPoolConfig, Checksum, CodeMode, Location, ShardInfo, TaskType, Vuid,
};
use blobgrid_erasure::Encoder;
use blobgrid_repair::{
    Error, GetterPartialRepairer, Result, ShardGetter, ShardRecover, StripePlanner, TaskBufPool,
};
use bytes::Bytes;
use rand::RngCore;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

const CONCURRENCY: usize = 4;

/// In-memory volume: every unit holds one pre-encoded shard per bid
struct MockGetter {
    shards: HashMap<(u8, BlobId), Bytes>,
    crcs: HashMap<(u8, BlobId), Checksum>,
    fail: HashSet<(u8, BlobId)>,
}

impl MockGetter {
    fn new(mode: CodeMode, bid_sizes: &[u64]) -> (Arc<Self>, Vec<Location>, Vec<ShardInfo>) {
        let encoder = Encoder::new(mode).unwrap();
        let total = mode.total_shards();
        let locations: Vec<Location> = (0..total)
            .map(|i| Location::new(Vuid::new(7, i, 1), format!("http://unit-{i}")))
            .collect();
        let bids: Vec<ShardInfo> = bid_sizes
            .iter()
            .enumerate()
            .map(|(i, &size)| ShardInfo::new(BlobId::new(i as u64 + 1), size))
            .collect();

        let mut shards = HashMap::new();
        let mut crcs = HashMap::new();
        for info in &bids {
            let mut volume = vec![vec![0u8; info.size as usize]; total as usize];
            for shard in volume.iter_mut().take(mode.data_shards as usize) {
                rand::thread_rng().fill_bytes(shard);
            }
            if info.size > 0 {
                encoder.encode(&mut volume).unwrap();
            }
            for (i, shard) in volume.into_iter().enumerate() {
                let key = (i as u8, info.bid);
                crcs.insert(key, Checksum::compute(&shard));
                shards.insert(key, Bytes::from(shard));
            }
        }

        (
            Arc::new(Self {
                shards,
                crcs,
                fail: HashSet::new(),
            }),
            locations,
            bids,
        )
    }

    /// Same volume, different failure set
    fn with_failures(&self, fail: impl IntoIterator<Item = (u8, BlobId)>) -> Arc<Self> {
        Arc::new(Self {
            shards: self.shards.clone(),
            crcs: self.crcs.clone(),
            fail: fail.into_iter().collect(),
        })
    }

    /// Fail every bid on the given units
    fn with_failed_units(&self, units: &[u8], bids: &[ShardInfo]) -> Arc<Self> {
        self.with_failures(
            units
                .iter()
                .flat_map(|&u| bids.iter().map(move |info| (u, info.bid))),
        )
    }

    fn shard_crc32(&self, idx: u8, bid: BlobId) -> Checksum {
        self.crcs[&(idx, bid)]
    }
}

#[async_trait]
impl ShardGetter for MockGetter {
    async fn get(&self, vuid: Vuid, bid: BlobId) -> Result<Bytes> {
        let key = (vuid.index(), bid);
        if self.fail.contains(&key) {
            return Err(Error::Fetch(format!("unit {} unreachable", vuid.index())));
        }
        self.shards.get(&key).cloned().ok_or(Error::BidNotFound)
    }
}

fn test_pool() -> Arc<TaskBufPool> {
    Arc::new(TaskBufPool::new(&BufPoolConfig {
        migrate_buf_size: 1 << 20,
        migrate_buf_capacity: 64,
        repair_buf_size: 1 << 20,
        repair_buf_capacity: 64,
    }))
}

fn new_recover(
    mode: CodeMode,
    getter: Arc<MockGetter>,
    locations: &[Location],
    bids: &[ShardInfo],
    enable_partial: bool,
) -> ShardRecover {
    ShardRecover::new(
        locations.to_vec(),
        mode,
        bids.to_vec(),
        getter,
        test_pool(),
        CONCURRENCY,
        TaskType::Repair,
        enable_partial,
    )
    .unwrap()
}

fn assert_recovered(
    recover: &ShardRecover,
    original: &MockGetter,
    bad_idxes: &[u8],
    bids: &[ShardInfo],
) {
    for &idx in bad_idxes {
        for info in bids {
            let data = recover.get_shard(idx, info.bid).unwrap();
            assert_eq!(data.len() as u64, info.size);
            assert!(
                original.shard_crc32(idx, info.bid).verify(&data),
                "crc mismatch on unit {idx} bid {}",
                info.bid
            );
        }
    }
}

/// All k-element subsets of `[0, n)`
fn combinations(n: u8, k: usize) -> Vec<Vec<u8>> {
    let mut out = Vec::new();
    let mut current = Vec::with_capacity(k);
    fn walk(start: u8, n: u8, k: usize, current: &mut Vec<u8>, out: &mut Vec<Vec<u8>>) {
        if current.len() == k {
            out.push(current.clone());
            return;
        }
        for next in start..n {
            current.push(next);
            walk(next + 1, n, k, current, out);
            current.pop();
        }
    }
    walk(0, n, k, &mut current, &mut out);
    out
}

#[tokio::test]
async fn test_rs_recovery_at_parity_budget() {
    // EC6P6 with six losses, exactly the RS threshold
    let bad = [0u8, 2, 4, 6, 8, 10];
    let (getter, locations, bids) = MockGetter::new(CodeMode::EC6P6, &[1024, 513, 7, 0]);
    let dead = getter.with_failed_units(&bad, &bids);

    let mut recover = new_recover(CodeMode::EC6P6, dead, &locations, &bids, false);
    recover.recover_shards(&bad, false).await.unwrap();
    assert_recovered(&recover, &getter, &bad, &bids);
}

#[tokio::test]
async fn test_rs_recovery_past_parity_budget_fails() {
    // Seven losses on EC6P6 cannot be decoded
    let bad = [1u8, 2, 3, 4, 6, 7, 8];
    let (getter, locations, bids) = MockGetter::new(CodeMode::EC6P6, &[1024, 64]);
    let dead = getter.with_failed_units(&bad, &bids);

    let mut recover = new_recover(CodeMode::EC6P6, dead, &locations, &bids, false);
    let err = recover.recover_shards(&bad, false).await;
    assert!(matches!(err, Err(Error::BidCanNotRecover)));

    // Partial results stay inspectable until release_buf
    let live = recover.get_shard(5, bids[0].bid).unwrap();
    assert!(getter.shard_crc32(5, bids[0].bid).verify(&live));
    assert_eq!(recover.collect_fail_bids(&bad).len(), bids.len());
}

#[tokio::test]
async fn test_lrc_local_parity_only_losses() {
    // Only the two local parities are bad; they are re-encoded from
    // their stripes without any global decode
    let bad = [16u8, 17];
    let (getter, locations, bids) = MockGetter::new(CodeMode::EC6P10L2, &[2048, 100, 0]);
    let dead = getter.with_failed_units(&bad, &bids);

    let mut recover = new_recover(CodeMode::EC6P10L2, dead, &locations, &bids, false);
    recover.recover_shards(&bad, false).await.unwrap();
    assert_recovered(&recover, &getter, &bad, &bids);
}

#[tokio::test]
async fn test_lrc_eleven_systematic_losses_fail() {
    let bad: Vec<u8> = (0..11).collect();
    let (getter, locations, bids) = MockGetter::new(CodeMode::EC6P10L2, &[1024]);
    let dead = getter.with_failed_units(&bad, &bids);

    let mut recover = new_recover(CodeMode::EC6P10L2, dead, &locations, &bids, false);
    let err = recover.recover_shards(&bad, false).await;
    assert!(matches!(err, Err(Error::BidCanNotRecover)));
}

#[tokio::test]
async fn test_azure_all_seven_loss_patterns() {
    // EC12P6L3: every 7-element subset of the data positions decodes,
    // courtesy of the group locals joining the global stripe
    let (getter, locations, bids) = MockGetter::new(CodeMode::EC12P6L3, &[512, 33]);

    for bad in combinations(12, 7) {
        let dead = getter.with_failed_units(&bad, &bids);
        let mut recover = new_recover(CodeMode::EC12P6L3, dead, &locations, &bids, false);
        recover
            .recover_shards(&bad, false)
            .await
            .unwrap_or_else(|err| panic!("pattern {bad:?} failed: {err}"));
        assert_recovered(&recover, &getter, &bad, &bids);
    }
}

#[tokio::test]
async fn test_partial_repair_per_bid_isolation() {
    // Partial repair of parity unit 8 with helper failures on units
    // {1, 2, 9} for every bid but the first: exactly one bid lands
    let bad = [8u8];
    let (getter, locations, bids) = MockGetter::new(CodeMode::EC6P6, &[1024, 700, 64, 33]);

    let helper_failures: Vec<(u8, BlobId)> = bids[1..]
        .iter()
        .flat_map(|info| [1u8, 2, 9].map(|u| (u, info.bid)))
        .collect();
    let flaky = getter.with_failures(helper_failures);

    let mut recover = new_recover(CodeMode::EC6P6, getter.clone(), &locations, &bids, true)
        .with_partial_repairer(Arc::new(GetterPartialRepairer::new(flaky)));

    let stripe = StripePlanner::new(CodeMode::EC6P6, &locations).global_stripe(&bad);
    recover
        .partial_repair_bids(&bids, &stripe, &bad)
        .await
        .unwrap();

    let failed = recover.collect_fail_bids(&bad);
    assert_eq!(failed.len(), bids.len() - 1);
    assert!(!failed.contains(&bids[0].bid));

    let data = recover.get_shard(8, bids[0].bid).unwrap();
    assert!(getter.shard_crc32(8, bids[0].bid).verify(&data));
}

#[tokio::test]
async fn test_partial_pass_backstops_dead_downloads() {
    // Coordinator-side downloads all fail, helper-side reads work: the
    // ladder falls through to the partial pass and still recovers
    let bad = [8u8];
    let (getter, locations, bids) = MockGetter::new(CodeMode::EC6P6, &[1024, 99]);
    let all_units: Vec<u8> = (0..12).collect();
    let dead_transport = getter.with_failed_units(&all_units, &bids);

    let mut recover = new_recover(CodeMode::EC6P6, dead_transport, &locations, &bids, true)
        .with_partial_repairer(Arc::new(GetterPartialRepairer::new(getter.clone())));
    recover.recover_shards(&bad, false).await.unwrap();
    assert_recovered(&recover, &getter, &bad, &bids);
}

#[tokio::test]
async fn test_rs_any_n_survivors_suffice() {
    // EC6P6: every 6-of-12 survivor set decodes every position
    let (getter, locations, bids) = MockGetter::new(CodeMode::EC6P6, &[256]);

    for bad in combinations(12, 6) {
        let dead = getter.with_failed_units(&bad, &bids);
        let mut recover = new_recover(CodeMode::EC6P6, dead, &locations, &bids, false);
        recover
            .recover_shards(&bad, false)
            .await
            .unwrap_or_else(|err| panic!("pattern {bad:?} failed: {err}"));
        assert_recovered(&recover, &getter, &bad, &bids);
    }
}

#[tokio::test]
async fn test_large_rs_mode_sampled_losses() {
    // EC15P12 with twelve losses (the full parity budget), sampled
    let (getter, locations, bids) = MockGetter::new(CodeMode::EC15P12, &[300, 17]);
    let mut rng = rand::thread_rng();

    for _ in 0..20 {
        let mut bad: Vec<u8> = Vec::new();
        while bad.len() < 12 {
            let candidate = (rng.next_u32() % 27) as u8;
            if !bad.contains(&candidate) {
                bad.push(candidate);
            }
        }
        bad.sort_unstable();
        let dead = getter.with_failed_units(&bad, &bids);
        let mut recover = new_recover(CodeMode::EC15P12, dead, &locations, &bids, false);
        recover
            .recover_shards(&bad, false)
            .await
            .unwrap_or_else(|err| panic!("pattern {bad:?} failed: {err}"));
        assert_recovered(&recover, &getter, &bad, &bids);
    }
}

#[tokio::test]
async fn test_lrc_mixed_losses_across_azs() {
    // Data, parity and local losses together, still within budget
    let bad = [0u8, 3, 7, 12, 16];
    let (getter, locations, bids) = MockGetter::new(CodeMode::EC6P10L2, &[1000, 0, 47]);
    let dead = getter.with_failed_units(&bad, &bids);

    let mut recover = new_recover(CodeMode::EC6P10L2, dead, &locations, &bids, false);
    recover.recover_shards(&bad, false).await.unwrap();
    assert_recovered(&recover, &getter, &bad, &bids);
}

#[tokio::test]
async fn test_direct_mode_reads_transient_bad_units() {
    // The bad flag was a false positive: direct mode fetches the shards
    // and allocates buffers only for the bad indexes
    let bad = [2u8, 5];
    let (getter, locations, bids) = MockGetter::new(CodeMode::EC6P6, &[128, 0, 256]);

    let mut recover = new_recover(CodeMode::EC6P6, getter.clone(), &locations, &bids, false);
    recover.recover_shards(&bad, true).await.unwrap();
    assert_recovered(&recover, &getter, &bad, &bids);

    let allocated: Vec<u8> = recover
        .chunks_shards_buf()
        .iter()
        .enumerate()
        .filter_map(|(i, c)| c.as_ref().map(|_| i as u8))
        .collect();
    assert_eq!(allocated, vec![2, 5]);
}

#[tokio::test]
async fn test_direct_mode_does_not_decode() {
    let bad = [2u8];
    let (getter, locations, bids) = MockGetter::new(CodeMode::EC6P6, &[128]);
    let dead = getter.with_failed_units(&bad, &bids);

    let mut recover = new_recover(CodeMode::EC6P6, dead, &locations, &bids, false);
    let err = recover.recover_shards(&bad, true).await;
    assert!(matches!(err, Err(Error::BidCanNotRecover)));
}

#[tokio::test]
async fn test_failed_live_unit_stays_unreadable() {
    // A live unit whose download failed reads back as missing while its
    // siblings and the repaired unit stay readable
    let bad = [0u8];
    let (getter, locations, bids) = MockGetter::new(CodeMode::EC6P6, &[512]);
    let flaky = getter.with_failed_units(&[0, 3], &bids);

    let mut recover = new_recover(CodeMode::EC6P6, flaky, &locations, &bids, false);
    recover.recover_shards(&bad, false).await.unwrap();

    assert_recovered(&recover, &getter, &bad, &bids);
    assert!(matches!(
        recover.get_shard(3, bids[0].bid),
        Err(Error::ShardPartialRepairFailed)
    ));
    let sibling = recover.get_shard(4, bids[0].bid).unwrap();
    assert!(getter.shard_crc32(4, bids[0].bid).verify(&sibling));
}

#[tokio::test]
async fn test_unknown_bid_and_release() {
    let bad = [1u8];
    let (getter, locations, bids) = MockGetter::new(CodeMode::EC6P6, &[64]);
    let dead = getter.with_failed_units(&bad, &bids);

    let mut recover = new_recover(CodeMode::EC6P6, dead, &locations, &bids, false);
    recover.recover_shards(&bad, false).await.unwrap();

    assert!(matches!(
        recover.get_shard(1, BlobId::new(404)),
        Err(Error::BidNotFound)
    ));
    assert!(matches!(
        recover.get_shard(200, bids[0].bid),
        Err(Error::InvalidShardIndex(200))
    ));

    recover.release_buf();
    assert!(matches!(
        recover.get_shard(1, bids[0].bid),
        Err(Error::ShardPartialRepairFailed)
    ));
}

#[tokio::test]
async fn test_recover_is_idempotent() {
    let bad = [0u8, 6];
    let (getter, locations, bids) = MockGetter::new(CodeMode::EC6P6, &[256, 0]);
    let dead = getter.with_failed_units(&bad, &bids);

    let mut recover = new_recover(CodeMode::EC6P6, dead, &locations, &bids, false);
    recover.recover_shards(&bad, false).await.unwrap();
    recover.recover_shards(&bad, false).await.unwrap();
    assert_recovered(&recover, &getter, &bad, &bids);
}

#[tokio::test]
async fn test_azure_parity_group_losses() {
    // Losses confined to the Azure parity group recover through its
    // local and the data re-encode path
    let bad = [12u8, 15, 20];
    let (getter, locations, bids) = MockGetter::new(CodeMode::EC12P6L3, &[640]);
    let dead = getter.with_failed_units(&bad, &bids);

    let mut recover = new_recover(CodeMode::EC12P6L3, dead, &locations, &bids, false);
    recover.recover_shards(&bad, false).await.unwrap();
    assert_recovered(&recover, &getter, &bad, &bids);
}
