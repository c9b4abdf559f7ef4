//! Per-mode encoder
//!
//! An [`Encoder`] owns the generator matrix of one [`CodeMode`] and
//! answers three questions:
//!
//! - `encode`: fill the parity and local positions from the data
//!   positions (used by writers and by test harnesses).
//! - `decode_coefficients`: which linear combination of a helper set
//!   reproduces a target position. Callers combine the helpers' bytes
//!   themselves with [`crate::gf256`] slice ops, which is what lets the
//!   combination be distributed across helper nodes.
//! - `local_parity_coeffs`: the defining combination of a local parity,
//!   for cheap re-encoding once its stripe members are whole.

use crate::gf256;
use crate::matrix::Matrix;
use blobgrid_common::{CodeMode, CodeModeError, CodeType};
use thiserror::Error;

/// Errors from erasure coding operations
#[derive(Debug, Error)]
pub enum ErasureError {
    #[error("invalid code mode: {0}")]
    InvalidCodeMode(#[from] CodeModeError),

    #[error("singular matrix")]
    SingularMatrix,

    #[error("shard count mismatch: expected {expected}, got {actual}")]
    ShardCountMismatch { expected: usize, actual: usize },

    #[error("shard size mismatch")]
    ShardSizeMismatch,

    #[error("shard index {0} out of range")]
    IndexOutOfRange(u8),

    #[error("index {0} is not recoverable from the given shards")]
    UnrecoverableIndex(u8),
}

/// Result type for erasure operations
pub type Result<T> = std::result::Result<T, ErasureError>;

/// Erasure encoder/decoder for one code mode
pub struct Encoder {
    mode: CodeMode,
    /// Generator rows, `total × n`: identity for data, systematic
    /// Vandermonde for global parity, combinations for locals
    rows: Vec<Vec<u8>>,
    /// Defining combination of each local parity over other positions
    local_coeffs: Vec<Vec<(u8, u8)>>,
}

impl Encoder {
    /// Build the encoder for `mode`
    pub fn new(mode: CodeMode) -> Result<Self> {
        mode.validate()?;
        let n = mode.data_shards as usize;
        let m = mode.parity_shards as usize;
        let l = mode.local_shards as usize;

        // Azure-style modes derive their data-group locals from one
        // extra systematic parity row; the groups are disjoint
        // restrictions of it, so together they contribute a full
        // independent equation to global decode.
        let extra = usize::from(mode.code_type == CodeType::AzureLrcP1);
        let vm = Matrix::vandermonde(n + m + extra, n);
        let top_inv = vm.top_square().invert()?;
        let sys = vm.multiply(&top_inv);

        let mut rows: Vec<Vec<u8>> = (0..n + m).map(|r| sys.row(r).to_vec()).collect();
        let mut local_coeffs: Vec<Vec<(u8, u8)>> = Vec::with_capacity(l);

        match mode.code_type {
            CodeType::ReedSolomon => {}
            CodeType::Lrc => {
                for stripe in mode.local_stripes() {
                    let mut row = vec![0u8; n];
                    let mut coeffs = Vec::new();
                    for &idx in &stripe.indexes {
                        if idx as usize >= n + m {
                            continue;
                        }
                        gf256::xor_slice(&rows[idx as usize], &mut row);
                        coeffs.push((idx, 1));
                    }
                    rows.push(row);
                    local_coeffs.push(coeffs);
                }
            }
            CodeType::AzureLrcP1 => {
                let r_extra = sys.row(n + m).to_vec();
                let groups = l - 1;
                let group_len = n / groups;
                for g in 0..groups {
                    let mut row = vec![0u8; n];
                    let mut coeffs = Vec::new();
                    for j in g * group_len..(g + 1) * group_len {
                        row[j] = r_extra[j];
                        coeffs.push((j as u8, r_extra[j]));
                    }
                    rows.push(row);
                    local_coeffs.push(coeffs);
                }
                let mut row = vec![0u8; n];
                let mut coeffs = Vec::new();
                for j in 0..m {
                    gf256::xor_slice(&rows[n + j], &mut row);
                    coeffs.push(((n + j) as u8, 1));
                }
                rows.push(row);
                local_coeffs.push(coeffs);
            }
        }

        debug_assert_eq!(rows.len(), mode.total_shards() as usize);
        Ok(Self {
            mode,
            rows,
            local_coeffs,
        })
    }

    /// The code mode this encoder serves
    #[must_use]
    pub const fn code_mode(&self) -> CodeMode {
        self.mode
    }

    /// Fill parity and local positions from the data positions
    ///
    /// `shards` must hold `total_shards` equal-length buffers with the
    /// first `n` containing data; the remainder are overwritten.
    pub fn encode(&self, shards: &mut [Vec<u8>]) -> Result<()> {
        let n = self.mode.data_shards as usize;
        let total = self.mode.total_shards() as usize;
        if shards.len() != total {
            return Err(ErasureError::ShardCountMismatch {
                expected: total,
                actual: shards.len(),
            });
        }
        let size = shards[0].len();
        if shards[..n].iter().any(|s| s.len() != size) {
            return Err(ErasureError::ShardSizeMismatch);
        }

        let (data, rest) = shards.split_at_mut(n);
        for (i, out) in rest.iter_mut().enumerate() {
            out.clear();
            out.resize(size, 0);
            for (j, d) in data.iter().enumerate() {
                gf256::mul_slice_xor(self.rows[n + i][j], d, out);
            }
        }
        Ok(())
    }

    /// Solve `Σ cᵢ · row(helperᵢ) = row(target)` for `c`
    ///
    /// Returns one coefficient per helper (zeroes are possible; such
    /// helpers contribute nothing and need not be read). Fails with
    /// [`ErasureError::UnrecoverableIndex`] when the target's row is not
    /// in the helpers' span — the caller falls through to its next
    /// strategy.
    pub fn decode_coefficients(&self, target: u8, helpers: &[u8]) -> Result<Vec<u8>> {
        let n = self.mode.data_shards as usize;
        let total = self.mode.total_shards();
        if target >= total {
            return Err(ErasureError::IndexOutOfRange(target));
        }
        if let Some(&bad) = helpers.iter().find(|&&h| h >= total) {
            return Err(ErasureError::IndexOutOfRange(bad));
        }

        let k = helpers.len();
        let mut aug = Matrix::zero(n, k + 1);
        for (i, &h) in helpers.iter().enumerate() {
            for r in 0..n {
                aug.set(r, i, self.rows[h as usize][r]);
            }
        }
        for r in 0..n {
            aug.set(r, k, self.rows[target as usize][r]);
        }

        // Reduce to row echelon over the helper columns
        let mut pivots: Vec<(usize, usize)> = Vec::new();
        let mut next_row = 0;
        for col in 0..k {
            if next_row >= n {
                break;
            }
            let Some(pivot) = (next_row..n).find(|&r| aug.get(r, col) != 0) else {
                continue;
            };
            aug.swap_rows(pivot, next_row);
            aug.scale_row(next_row, gf256::inv(aug.get(next_row, col)));
            for r in 0..n {
                let factor = aug.get(r, col);
                if r != next_row && factor != 0 {
                    aug.add_scaled_row(next_row, r, factor);
                }
            }
            pivots.push((next_row, col));
            next_row += 1;
        }

        // Rows without a pivot must have a zero right-hand side, or the
        // target is outside the span
        for r in next_row..n {
            if aug.get(r, k) != 0 {
                return Err(ErasureError::UnrecoverableIndex(target));
            }
        }

        let mut coeffs = vec![0u8; k];
        for (r, c) in pivots {
            coeffs[c] = aug.get(r, k);
        }
        Ok(coeffs)
    }

    /// Reconstruct `targets` in place from the available shards
    ///
    /// `shards` is the full volume-ordered vector with `None` for missing
    /// positions. Positions already present are left untouched.
    pub fn reconstruct(&self, shards: &mut [Option<Vec<u8>>], targets: &[u8]) -> Result<()> {
        let total = self.mode.total_shards() as usize;
        if shards.len() != total {
            return Err(ErasureError::ShardCountMismatch {
                expected: total,
                actual: shards.len(),
            });
        }
        let helpers: Vec<u8> = shards
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_ref().map(|_| i as u8))
            .collect();
        let Some(size) = shards.iter().flatten().map(Vec::len).next() else {
            return Err(ErasureError::ShardSizeMismatch);
        };
        if shards.iter().flatten().any(|s| s.len() != size) {
            return Err(ErasureError::ShardSizeMismatch);
        }

        for &target in targets {
            if usize::from(target) >= total {
                return Err(ErasureError::IndexOutOfRange(target));
            }
            if shards[target as usize].is_some() {
                continue;
            }
            let coeffs = self.decode_coefficients(target, &helpers)?;
            let mut out = vec![0u8; size];
            for (&coef, &h) in coeffs.iter().zip(&helpers) {
                if let Some(src) = &shards[h as usize] {
                    gf256::mul_slice_xor(coef, src, &mut out);
                }
            }
            shards[target as usize] = Some(out);
        }
        Ok(())
    }

    /// The defining combination of a local parity position
    ///
    /// Returns `(position, coefficient)` pairs over the local stripe's
    /// other members; re-encoding the local is summing
    /// `coefficient ⊗ member` over them.
    pub fn local_parity_coeffs(&self, local_idx: u8) -> Result<&[(u8, u8)]> {
        let base = self.mode.data_shards as usize + self.mode.parity_shards as usize;
        let group = (local_idx as usize)
            .checked_sub(base)
            .filter(|g| *g < self.local_coeffs.len())
            .ok_or(ErasureError::IndexOutOfRange(local_idx))?;
        Ok(&self.local_coeffs[group])
    }
}
