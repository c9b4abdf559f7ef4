//! BlobGrid Erasure Coding - matrix codec over GF(2^8)
//!
//! This crate implements the erasure math behind shard recovery. Every
//! code family is expressed through one generator matrix (`T × n` over
//! GF(2^8)): identity rows for data positions, systematic-Vandermonde
//! rows for global parity, and linear-combination rows for local parity.
//!
//! Decoding is uniform: reconstructing position `t` from surviving
//! positions `H` means solving `Σ cᵢ · row(Hᵢ) = row(t)` for the
//! coefficient vector `c`, then combining the survivors' bytes with
//! [`gf256::mul_slice_xor`]. The same coefficient solve backs whole-shard
//! decode, local-stripe decode, and the distributed partial-repair path,
//! where each helper contributes `cᵢ ⊗ shardᵢ` and the coordinator
//! XOR-reduces.
//!
//! # Code families
//!
//! - **ReedSolomon**: any `n` of `n + m` positions decode.
//! - **Lrc**: local parities are the XOR of their AZ's data and parity
//!   members; single-loss repair stays inside the AZ.
//! - **AzureLrcP1**: data-group locals are disjoint restrictions of one
//!   extra parity row, so together they add a full independent equation
//!   to global decode; the parity-group local is the XOR of the globals.

pub mod encoder;
pub mod gf256;
mod matrix;

pub use encoder::{Encoder, ErasureError};
