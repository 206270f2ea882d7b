//! End-to-end reconstruction: archives rebuilt from source data plus a
//! frozen mapping must match the original archive byte-for-byte.

use carproof_core::CancelToken;
use carproof_mapping::{
    build_archive, car, ChunkRebuilder, FileOracle, MappingIndex, RawBlockCodec,
};
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::fs;
use std::path::Path;
use std::sync::Arc;

const CHUNK: usize = 256;

/// Lay down a small deterministic source tree.
fn write_sources(root: &Path, seed: u64) {
    let mut rng = StdRng::seed_from_u64(seed);
    fs::create_dir_all(root.join("nested")).unwrap();
    for (name, len) in [
        ("alpha.bin", 700usize),
        ("beta.bin", 256),
        ("nested/gamma.bin", 1500),
    ] {
        let data: Vec<u8> = (0..len).map(|_| rng.gen()).collect();
        fs::write(root.join(name), data).unwrap();
    }
}

/// Build the archive and freeze its mapping; returns the archive bytes
/// and the mapping file path.
fn seal_sources(source_root: &Path, mapping_dir: &Path) -> (Vec<u8>, std::path::PathBuf) {
    let mut oracle = FileOracle::build(source_root, CHUNK).unwrap();
    let data_root = oracle.data_root();
    let index = Arc::new(MappingIndex::new());

    let mut archive = Vec::new();
    build_archive(&mut oracle, &index, &mut archive, data_root).unwrap();

    let name = format!("{data_root}.json");
    index.save(mapping_dir, &name).unwrap();
    (archive, mapping_dir.join(name))
}

#[test]
fn chunk_sizes_tile_the_archive_payload() {
    let dir = tempfile::tempdir().unwrap();
    write_sources(dir.path(), 1);

    let mut oracle = FileOracle::build(dir.path(), CHUNK).unwrap();
    let data_root = oracle.data_root();
    let index = Arc::new(MappingIndex::new());
    let mut archive = Vec::new();
    let total = build_archive(&mut oracle, &index, &mut archive, data_root).unwrap();

    let header = car::header_len(&data_root).unwrap();
    let summed: u64 = index.all().unwrap().iter().map(|m| m.chunk_size).sum();
    assert_eq!(summed, total - header);
}

#[test]
fn rebuilt_windows_match_original_archive_bytes() {
    let source = tempfile::tempdir().unwrap();
    let mappings = tempfile::tempdir().unwrap();
    write_sources(source.path(), 2);
    let (archive, mapping_path) = seal_sources(source.path(), mappings.path());

    let rebuilder = ChunkRebuilder::new(RawBlockCodec, source.path());
    let cancel = CancelToken::new();

    let len = archive.len() as u64;
    let windows = [
        (0u64, len),                    // whole archive, header included
        (0, 32),                        // header prefix
        (len / 2, (len / 4).max(1)),    // interior window
        (len - 32, 32),                 // tail
    ];
    for (offset, size) in windows {
        let got = rebuilder
            .challenge_window(&mapping_path, offset, size, &cancel)
            .unwrap();
        let expect = &archive[offset as usize..(offset + size) as usize];
        assert_eq!(got, expect, "window ({offset}, {size}) diverged");
    }
}

#[test]
fn tampered_source_fails_with_cid_mismatch() {
    let source = tempfile::tempdir().unwrap();
    let mappings = tempfile::tempdir().unwrap();
    write_sources(source.path(), 3);
    let (archive, mapping_path) = seal_sources(source.path(), mappings.path());

    // Flip one byte of one source file after sealing.
    let victim = source.path().join("beta.bin");
    let mut data = fs::read(&victim).unwrap();
    data[10] ^= 0xFF;
    fs::write(&victim, data).unwrap();

    let rebuilder = ChunkRebuilder::new(RawBlockCodec, source.path());
    let err = rebuilder
        .challenge_window(&mapping_path, 0, archive.len() as u64, &CancelToken::new())
        .unwrap_err();
    assert!(
        matches!(err, carproof_core::Error::CidMismatch { .. }),
        "expected CidMismatch, got {err:?}"
    );
}

#[test]
fn cancellation_aborts_reconstruction() {
    let source = tempfile::tempdir().unwrap();
    let mappings = tempfile::tempdir().unwrap();
    write_sources(source.path(), 4);
    let (archive, mapping_path) = seal_sources(source.path(), mappings.path());

    let cancel = CancelToken::new();
    cancel.cancel();
    let rebuilder = ChunkRebuilder::new(RawBlockCodec, source.path());
    let err = rebuilder
        .challenge_window(&mapping_path, 0, archive.len() as u64, &cancel)
        .unwrap_err();
    assert!(matches!(err, carproof_core::Error::Cancelled));
}
