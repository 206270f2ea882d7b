//! File I/O conventions for carproof artifacts.
//!
//! Two families of artifacts exist:
//! - **human-readable** (mapping files, dataset proofs): JSON with a tab
//!   indent, digests as `0x`-prefixed hex, cids as canonical strings;
//! - **binary** (piece registry, level caches, challenge bundles): CBOR,
//!   self-describing and length-prefixed, via `ciborium`.
//!
//! All helpers create parent directories as needed and go through
//! buffered readers/writers.

use crate::error::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

/// Ensure the parent directory for a file exists (no-op if none).
pub fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() {
            fs::create_dir_all(dir)?;
        }
    }
    Ok(())
}

/// Write `value` as JSON indented with tabs.
pub fn write_json_tab<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    ensure_parent_dir(path)?;
    let f = File::create(path)?;
    let mut w = BufWriter::new(f);
    let fmt = serde_json::ser::PrettyFormatter::with_indent(b"\t");
    let mut ser = serde_json::Serializer::with_formatter(&mut w, fmt);
    value.serialize(&mut ser).map_err(Error::codec)?;
    w.flush()?;
    Ok(())
}

/// Read a JSON artifact.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let f = File::open(path)?;
    let rdr = BufReader::new(f);
    serde_json::from_reader(rdr).map_err(Error::codec)
}

/// Write `value` as CBOR.
pub fn write_cbor<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    ensure_parent_dir(path)?;
    let f = File::create(path)?;
    let mut w = BufWriter::new(f);
    ciborium::ser::into_writer(value, &mut w).map_err(Error::codec)?;
    w.flush()?;
    Ok(())
}

/// Read a CBOR artifact.
pub fn read_cbor<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let f = File::open(path)?;
    let mut rdr = BufReader::new(f);
    ciborium::de::from_reader(&mut rdr).map_err(Error::codec)
}

/// Encode bytes as hex with a `0x` prefix.
#[must_use]
pub fn to_hex_prefix(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

/// Decode a hex string with an optional `0x` prefix.
pub fn parse_hex_prefix(s: &str) -> Result<Vec<u8>> {
    let trimmed = s.strip_prefix("0x").unwrap_or(s);
    hex::decode(trimmed).map_err(Error::codec)
}

/// Decode a `0x`-prefixed hex string into a 32-byte digest.
pub fn parse_digest_hex(s: &str) -> Result<[u8; 32]> {
    let bytes = parse_hex_prefix(s)?;
    let mut out = [0u8; 32];
    if bytes.len() != out.len() {
        return Err(Error::codec(format!(
            "digest must be 32 bytes, got {}",
            bytes.len()
        )));
    }
    out.copy_from_slice(&bytes);
    Ok(out)
}

/// Serde adapter: a [`Cid`] as its canonical string form.
pub mod cid_string {
    use cid::Cid;
    use serde::{Deserialize, Deserializer, Serializer};

    /// Serialize a cid as its canonical string.
    pub fn serialize<S: Serializer>(cid: &Cid, ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_str(&cid.to_string())
    }

    /// Deserialize a cid from its canonical string.
    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Cid, D::Error> {
        let s = String::deserialize(de)?;
        Cid::try_from(s.as_str()).map_err(serde::de::Error::custom)
    }
}

/// Serde adapter: a `Vec<Cid>` as canonical strings.
pub mod cid_string_vec {
    use cid::Cid;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize cids as canonical strings.
    pub fn serialize<S: Serializer>(cids: &[Cid], ser: S) -> Result<S::Ok, S::Error> {
        let strings: Vec<String> = cids.iter().map(Cid::to_string).collect();
        strings.serialize(ser)
    }

    /// Deserialize cids from canonical strings.
    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Vec<Cid>, D::Error> {
        let strings = Vec::<String>::deserialize(de)?;
        strings
            .iter()
            .map(|s| Cid::try_from(s.as_str()).map_err(serde::de::Error::custom))
            .collect()
    }
}
