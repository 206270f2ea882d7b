//! Piece commitment digest ↔ CID conversion.
//!
//! A sealed piece is addressed two ways: the raw 32-byte Merkle root
//! (the digest that the registry and level caches key on) and its CID
//! form `fil-commitment-unsealed` / `sha2-256-trunc254-padded`, which is
//! what external tooling exchanges.

use crate::error::{Error, Result};
use cid::multihash::Multihash;
use cid::Cid;

/// Multicodec for unsealed Filecoin commitments (CommP / CommD).
pub const FIL_COMMITMENT_UNSEALED: u64 = 0xf101;

/// Multihash for SHA2-256 with the two most significant bits of the
/// final byte zeroed, as used by Filecoin proving trees.
pub const SHA2_256_TRUNC254_PADDED: u64 = 0x1012;

/// Wrap a raw piece digest into its commitment CID.
pub fn piece_cid(digest: &[u8; 32]) -> Result<Cid> {
    let mh = Multihash::<64>::wrap(SHA2_256_TRUNC254_PADDED, digest)
        .map_err(|e| Error::codec(format!("wrap piece digest: {e}")))?;
    Ok(Cid::new_v1(FIL_COMMITMENT_UNSEALED, mh))
}

/// Extract the raw piece digest from a commitment CID, checking the
/// codec and multihash tags.
pub fn piece_digest_from_cid(cid: &Cid) -> Result<[u8; 32]> {
    if cid.codec() != FIL_COMMITMENT_UNSEALED {
        return Err(Error::invalid(format!(
            "cid codec {:#x} is not fil-commitment-unsealed",
            cid.codec()
        )));
    }
    if cid.hash().code() != SHA2_256_TRUNC254_PADDED {
        return Err(Error::invalid(format!(
            "cid multihash {:#x} is not sha2-256-trunc254-padded",
            cid.hash().code()
        )));
    }
    let digest = cid.hash().digest();
    let mut out = [0u8; 32];
    if digest.len() != out.len() {
        return Err(Error::invalid(format!(
            "piece digest must be exactly 32 bytes long, got {} bytes instead",
            digest.len()
        )));
    }
    out.copy_from_slice(digest);
    Ok(out)
}
