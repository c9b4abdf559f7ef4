//! Erasure code modes and their stripe partitions
//!
//! A [`CodeMode`] is the tuple `(n, m, l, CodeType)`: `n` data shards,
//! `m` global parity shards, and `l` local parity shards laid out as
//! `data [0, n)`, `global parity [n, n+m)`, `local parity [n+m, n+m+l)`.
//!
//! The mode also defines the *local-stripe partition* — which positions
//! form a self-contained repair group around each local parity:
//!
//! - `Lrc` spreads data **and** global parity across `l` AZs; the stripe
//!   of AZ `i` is its `n/l` data positions, its `m/l` parity positions,
//!   and one local parity.
//! - `AzureLrcP1` groups data into `l - 1` groups with one local parity
//!   each, and gives the global parities their own group with the last
//!   local parity.
//! - `ReedSolomon` has no local stripes.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Erasure code family
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CodeType {
    /// Plain Reed-Solomon, no locality
    ReedSolomon,
    /// Local-reconstruction code with AZ-spread data and parity
    Lrc,
    /// Azure-style LRC: data-group locals plus one parity-group local
    AzureLrcP1,
}

/// Errors from code mode validation
#[derive(Debug, Clone, Error)]
pub enum CodeModeError {
    #[error("data shard count must be > 0")]
    NoDataShards,
    #[error("parity shard count must be > 0")]
    NoParityShards,
    #[error("total shard count {0} exceeds 255")]
    TooManyShards(usize),
    #[error("local shard count {local} does not partition {what} shards {count}")]
    UnevenPartition {
        local: u8,
        what: &'static str,
        count: u8,
    },
    #[error("code type {0:?} requires local shards")]
    MissingLocals(CodeType),
    #[error("code type {0:?} does not take local shards")]
    UnexpectedLocals(CodeType),
}

/// One decode group: a set of positions that together satisfy a decode
/// equation, with the local code's `(n, m)` parameters
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Stripe {
    /// Member positions, ascending
    pub indexes: Vec<u8>,
    /// Shards needed to decode within this stripe
    pub n: u8,
    /// Parity budget of this stripe
    pub m: u8,
}

/// Erasure code mode: shard counts plus code family
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CodeMode {
    /// Code family
    pub code_type: CodeType,
    /// Data shards (n)
    pub data_shards: u8,
    /// Global parity shards (m)
    pub parity_shards: u8,
    /// Local parity shards (l), 0 when the family has no locality
    pub local_shards: u8,
}

impl CodeMode {
    /// RS 6+6
    pub const EC6P6: Self = Self::rs(6, 6);
    /// RS 15+12
    pub const EC15P12: Self = Self::rs(15, 12);
    /// LRC 6+3 with one local per AZ across 3 AZs
    pub const EC6P3L3: Self = Self::lrc(6, 3, 3);
    /// LRC 6+10 across 2 AZs
    pub const EC6P10L2: Self = Self::lrc(6, 10, 2);
    /// LRC 12+3 across 3 AZs
    pub const EC12P3L3: Self = Self::lrc(12, 3, 3);
    /// LRC 16+20 across 2 AZs
    pub const EC16P20L2: Self = Self::lrc(16, 20, 2);
    /// Azure-style LRC 10+5, two data groups plus the parity group
    pub const EC10P5L3: Self = Self::azure_lrc_p1(10, 5, 3);
    /// Azure-style LRC 12+6, two data groups plus the parity group
    pub const EC12P6L3: Self = Self::azure_lrc_p1(12, 6, 3);
    /// Azure-style LRC 18+9, two data groups plus the parity group
    pub const EC18P9L3: Self = Self::azure_lrc_p1(18, 9, 3);

    /// Plain Reed-Solomon mode
    #[must_use]
    pub const fn rs(data: u8, parity: u8) -> Self {
        Self {
            code_type: CodeType::ReedSolomon,
            data_shards: data,
            parity_shards: parity,
            local_shards: 0,
        }
    }

    /// LRC mode with `local` AZs
    #[must_use]
    pub const fn lrc(data: u8, parity: u8, local: u8) -> Self {
        Self {
            code_type: CodeType::Lrc,
            data_shards: data,
            parity_shards: parity,
            local_shards: local,
        }
    }

    /// Azure-style LRC mode with `local - 1` data groups
    #[must_use]
    pub const fn azure_lrc_p1(data: u8, parity: u8, local: u8) -> Self {
        Self {
            code_type: CodeType::AzureLrcP1,
            data_shards: data,
            parity_shards: parity,
            local_shards: local,
        }
    }

    /// Validate the shard counts against the code family's partition rules
    pub fn validate(&self) -> Result<(), CodeModeError> {
        if self.data_shards == 0 {
            return Err(CodeModeError::NoDataShards);
        }
        if self.parity_shards == 0 {
            return Err(CodeModeError::NoParityShards);
        }
        let total =
            self.data_shards as usize + self.parity_shards as usize + self.local_shards as usize;
        if total > 255 {
            return Err(CodeModeError::TooManyShards(total));
        }
        match self.code_type {
            CodeType::ReedSolomon => {
                if self.local_shards != 0 {
                    return Err(CodeModeError::UnexpectedLocals(self.code_type));
                }
            }
            CodeType::Lrc => {
                let l = self.local_shards;
                if l == 0 {
                    return Err(CodeModeError::MissingLocals(self.code_type));
                }
                if !self.data_shards.is_multiple_of(l) {
                    return Err(CodeModeError::UnevenPartition {
                        local: l,
                        what: "data",
                        count: self.data_shards,
                    });
                }
                if !self.parity_shards.is_multiple_of(l) {
                    return Err(CodeModeError::UnevenPartition {
                        local: l,
                        what: "parity",
                        count: self.parity_shards,
                    });
                }
            }
            CodeType::AzureLrcP1 => {
                let l = self.local_shards;
                if l < 2 {
                    return Err(CodeModeError::MissingLocals(self.code_type));
                }
                if !self.data_shards.is_multiple_of(l - 1) {
                    return Err(CodeModeError::UnevenPartition {
                        local: l,
                        what: "data",
                        count: self.data_shards,
                    });
                }
            }
        }
        Ok(())
    }

    /// Total shard count `n + m + l`
    #[must_use]
    pub const fn total_shards(&self) -> u8 {
        self.data_shards + self.parity_shards + self.local_shards
    }

    /// Whether the mode carries local parity positions at all
    #[must_use]
    pub const fn has_local_parity(&self) -> bool {
        self.local_shards > 0
    }

    /// Whether the local-stripe decode pass applies
    ///
    /// Azure-style modes skip it: their locals carry independent
    /// equations and are folded into the global stripe instead.
    #[must_use]
    pub const fn is_local_stripe_decodable(&self) -> bool {
        matches!(self.code_type, CodeType::Lrc) && self.local_shards > 0
    }

    /// The global stripe
    ///
    /// `[0, n+m)` for Reed-Solomon and LRC (LRC local parities carry no
    /// equations independent of their members); the entire volume for
    /// Azure-style modes, whose locals do.
    #[must_use]
    pub fn global_stripe(&self) -> Stripe {
        let end = match self.code_type {
            CodeType::ReedSolomon | CodeType::Lrc => self.data_shards + self.parity_shards,
            CodeType::AzureLrcP1 => self.total_shards(),
        };
        Stripe {
            indexes: (0..end).collect(),
            n: self.data_shards,
            m: end - self.data_shards,
        }
    }

    /// All local stripes, in local-parity order
    #[must_use]
    pub fn local_stripes(&self) -> Vec<Stripe> {
        (0..self.local_shards)
            .map(|group| self.local_stripe_of_group(group))
            .collect()
    }

    /// The local stripe containing `index`, if the mode has one for it
    #[must_use]
    pub fn local_stripe_of(&self, index: u8) -> Option<Stripe> {
        if index >= self.total_shards() {
            return None;
        }
        let n = self.data_shards;
        let m = self.parity_shards;
        let group = match self.code_type {
            CodeType::ReedSolomon => return None,
            CodeType::Lrc => {
                if index < n {
                    index / (n / self.local_shards)
                } else if index < n + m {
                    (index - n) / (m / self.local_shards)
                } else {
                    index - n - m
                }
            }
            CodeType::AzureLrcP1 => {
                if index < n {
                    index / (n / (self.local_shards - 1))
                } else if index < n + m {
                    self.local_shards - 1
                } else {
                    index - n - m
                }
            }
        };
        Some(self.local_stripe_of_group(group))
    }

    fn local_stripe_of_group(&self, group: u8) -> Stripe {
        let n = self.data_shards;
        let m = self.parity_shards;
        let local = n + m + group;
        match self.code_type {
            CodeType::ReedSolomon => unreachable!("no local stripes for plain RS"),
            CodeType::Lrc => {
                let dn = n / self.local_shards;
                let pn = m / self.local_shards;
                let mut indexes: Vec<u8> = (group * dn..(group + 1) * dn).collect();
                indexes.extend(n + group * pn..n + (group + 1) * pn);
                indexes.push(local);
                Stripe {
                    indexes,
                    n: dn + pn,
                    m: 1,
                }
            }
            CodeType::AzureLrcP1 => {
                let groups = self.local_shards - 1;
                let mut indexes: Vec<u8> = if group < groups {
                    let gn = n / groups;
                    (group * gn..(group + 1) * gn).collect()
                } else {
                    (n..n + m).collect()
                };
                let stripe_n = indexes.len() as u8;
                indexes.push(local);
                Stripe {
                    indexes,
                    n: stripe_n,
                    m: 1,
                }
            }
        }
    }
}

impl fmt::Debug for CodeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CodeMode({:?} EC{}P{}L{})",
            self.code_type, self.data_shards, self.parity_shards, self.local_shards
        )
    }
}

impl fmt::Display for CodeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "EC{}P{}L{}",
            self.data_shards, self.parity_shards, self.local_shards
        )
    }
}
