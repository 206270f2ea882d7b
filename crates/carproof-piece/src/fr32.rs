//! Fr32 expansion: 127 source bytes → 128 Fr-valid bytes.
//!
//! Each 127-byte chunk is cycled over four 31-byte groups with a two-bit
//! shim forced in between, so every 32-byte sub-slab ends with its top
//! two bits zero and decodes as a BLS12-381 scalar representative. The
//! expansion is pure and position-independent.

use carproof_core::{Error, Result, SLAB_SIZE, SOURCE_CHUNK_SIZE};

/// Expand one 127-byte source chunk into a 128-byte slab.
#[must_use]
pub fn expand_chunk(input: &[u8; SOURCE_CHUNK_SIZE]) -> [u8; SLAB_SIZE] {
    let mut out = [0u8; SLAB_SIZE];

    // First 31 bytes + 6 bits are taken as-is; the first shim trims the
    // two bits that spill into byte 31.
    out[..32].copy_from_slice(&input[..32]);
    out[31] &= 0x3F;

    for i in 31..63 {
        out[i + 1] = input[i + 1] << 2 | input[i] >> 6;
    }
    out[63] &= 0x3F;

    for i in 63..95 {
        out[i + 1] = input[i + 1] << 4 | input[i] >> 4;
    }
    out[95] &= 0x3F;

    for i in 95..126 {
        out[i + 1] = input[i + 1] << 6 | input[i] >> 2;
    }

    // The final 6-bit remainder is exactly the last expanded byte.
    out[127] = input[126] >> 2;

    out
}

/// Expand a span whose length is a multiple of 127 bytes.
pub fn expand(src: &[u8]) -> Result<Vec<u8>> {
    if src.len() % SOURCE_CHUNK_SIZE != 0 {
        return Err(Error::invalid(format!(
            "fr32 input length {} is not a multiple of {SOURCE_CHUNK_SIZE}",
            src.len()
        )));
    }
    let chunks = src.len() / SOURCE_CHUNK_SIZE;
    let mut out = Vec::with_capacity(chunks * SLAB_SIZE);
    let mut input = [0u8; SOURCE_CHUNK_SIZE];
    for chunk in src.chunks_exact(SOURCE_CHUNK_SIZE) {
        input.copy_from_slice(chunk);
        out.extend_from_slice(&expand_chunk(&input));
    }
    Ok(out)
}
