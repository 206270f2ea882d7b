//! The nul-padding tower.
//!
//! `nul_pad(d)` is the root of a depth-`d` all-zero subtree:
//! `nul_pad(0)` is 32 zero bytes and
//! `nul_pad(i) = H(nul_pad(i-1) ∥ nul_pad(i-1))`. The tower replaces any
//! absent subtree during tree construction and extends a piece digest to
//! a larger target size. Computed once per process, immutable after.

use crate::hash::node_hash;
use carproof_core::MAX_LAYERS;
use std::sync::OnceLock;

static TOWER: OnceLock<[[u8; 32]; MAX_LAYERS]> = OnceLock::new();

/// The full tower, indexed by subtree depth above the 32-byte leaves.
#[must_use]
pub fn tower() -> &'static [[u8; 32]; MAX_LAYERS] {
    TOWER.get_or_init(|| {
        let mut pads = [[0u8; 32]; MAX_LAYERS];
        for i in 1..MAX_LAYERS {
            pads[i] = node_hash(&pads[i - 1], &pads[i - 1]);
        }
        pads
    })
}

/// Zero-subtree hash for depth `d`.
///
/// `d` must be below [`MAX_LAYERS`]; the tree geometry guarantees this
/// for every piece within `MAX_PIECE_SIZE`.
#[must_use]
pub fn nul_pad(d: usize) -> &'static [u8; 32] {
    &tower()[d]
}
