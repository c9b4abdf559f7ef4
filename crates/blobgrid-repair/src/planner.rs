//! Stripe planning
//!
//! Turns a code mode plus a bad-index set into concrete repair attempts:
//! which local stripes are worth trying, what the global stripe looks
//! like, and which live units should serve as partial-repair helpers.

use blobgrid_common::{CodeMode, Location, Stripe};

/// One planned decode attempt over a set of unit positions
#[derive(Clone, Debug)]
pub struct RepairStripe {
    /// Member locations, in stripe order
    pub locations: Vec<Location>,
    /// Shards needed to decode within this stripe
    pub n: u8,
    /// Parity budget of this stripe
    pub m: u8,
    /// Bad positions that fall inside this stripe
    pub bad_idxes: Vec<u8>,
}

impl RepairStripe {
    /// Member positions, in stripe order
    #[must_use]
    pub fn indexes(&self) -> Vec<u8> {
        self.locations.iter().map(|loc| loc.vuid.index()).collect()
    }
}

/// Helper selection for one partial-repair target
#[derive(Clone, Debug, Default)]
pub struct PartialPlan {
    /// Live data positions, cheapest helpers first
    pub data_idxes: Vec<u8>,
    /// Live parity positions topping the plan up
    pub parity_idxes: Vec<u8>,
}

impl PartialPlan {
    /// All selected helpers, data first
    #[must_use]
    pub fn helpers(&self) -> Vec<u8> {
        let mut out = self.data_idxes.clone();
        out.extend_from_slice(&self.parity_idxes);
        out
    }
}

/// Plans repair stripes for one volume
pub struct StripePlanner<'a> {
    mode: CodeMode,
    locations: &'a [Location],
}

impl<'a> StripePlanner<'a> {
    /// Create a planner over the volume's location vector
    #[must_use]
    pub const fn new(mode: CodeMode, locations: &'a [Location]) -> Self {
        Self { mode, locations }
    }

    /// The local stripes touched by `bad_idxes`, in first-bad order
    ///
    /// Each stripe appears once even when it contains several bad
    /// positions; its `bad_idxes` lists all of them.
    #[must_use]
    pub fn gen_local_stripes(&self, bad_idxes: &[u8]) -> Vec<RepairStripe> {
        let mut out: Vec<RepairStripe> = Vec::new();
        let mut seen: Vec<u8> = Vec::new();
        for &bad in bad_idxes {
            let Some(stripe) = self.mode.local_stripe_of(bad) else {
                continue;
            };
            let key = stripe.indexes[0];
            if seen.contains(&key) {
                continue;
            }
            seen.push(key);
            out.push(self.to_repair_stripe(&stripe, bad_idxes));
        }
        out
    }

    /// The single global stripe with the bad positions inside it
    #[must_use]
    pub fn global_stripe(&self, bad_idxes: &[u8]) -> RepairStripe {
        self.to_repair_stripe(&self.mode.global_stripe(), bad_idxes)
    }

    /// Pick up to `requested` live helpers for a partial repair of
    /// `bad_idx`, data positions first
    ///
    /// Returns disjoint data and parity subsets whose union is
    /// `min(requested, live)` where `live` counts the global stripe's
    /// positions outside `bad_idxes`.
    #[must_use]
    pub fn partial_plan(&self, bad_idx: u8, requested: usize, bad_idxes: &[u8]) -> PartialPlan {
        let stripe = self.mode.global_stripe();
        let n = self.mode.data_shards;
        let mut plan = PartialPlan::default();
        let mut left = requested;
        for &idx in &stripe.indexes {
            if left == 0 {
                break;
            }
            if idx == bad_idx || bad_idxes.contains(&idx) {
                continue;
            }
            if idx < n {
                plan.data_idxes.push(idx);
                left -= 1;
            }
        }
        for &idx in &stripe.indexes {
            if left == 0 {
                break;
            }
            if idx == bad_idx || bad_idxes.contains(&idx) || idx < n {
                continue;
            }
            plan.parity_idxes.push(idx);
            left -= 1;
        }
        plan
    }

    fn to_repair_stripe(&self, stripe: &Stripe, bad_idxes: &[u8]) -> RepairStripe {
        RepairStripe {
            locations: stripe
                .indexes
                .iter()
                .map(|&i| self.locations[i as usize].clone())
                .collect(),
            n: stripe.n,
            m: stripe.m,
            bad_idxes: stripe
                .indexes
                .iter()
                .copied()
                .filter(|i| bad_idxes.contains(i))
                .collect(),
        }
    }
}
