// crates/carproof-cli/src/main.rs

#![forbid(unsafe_code)]
#![deny(
    rust_2018_idioms,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo
)]

use anyhow::{Context, Result};
use carproof_audit::{
    gen_challenge_proof, gen_dataset_proof, verify_challenge_proof, verify_dataset_proof,
    DatasetCheck,
};
use carproof_core::CancelToken;
use carproof_mapping::{mapping_file_path, MappingIndex, RawBlockCodec, MAPPING_FILE_SUFFIX};
use carproof_piece::seal;
use cid::Cid;
use clap::{Parser, Subcommand};
use std::fs;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(
    name = "carproof",
    about = "Piece commitments and retrievability proofs for content-addressed archives",
    long_about = "carproof seals content-addressed archives into Filecoin piece commitments \
                  and maintains the mapping and cache artifacts needed to prove, from a small \
                  slice of source data, that any byte of an archive is untampered.",
    version = env!("CARGO_PKG_VERSION"),
    disable_help_subcommand = true
)]
struct Cli {
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Seal an archive: compute its piece commitment, persist the level
    /// cache, and append the piece to the registry.
    Commp {
        /// Archive file (CAR) to seal
        archive: PathBuf,

        /// Root cid of the archive's DAG
        root: String,

        /// Cache directory for the registry and level caches
        cache_dir: PathBuf,

        /// Mapping directory holding `<root>.json`; when given, the
        /// mapping is re-frozen under the piece cid for later audits
        #[arg(long)]
        mapping_dir: Option<PathBuf>,

        /// Pad the piece to this byte size (0 = natural size)
        #[arg(long, default_value_t = 0)]
        target_padded_size: u64,
    },

    /// Build the dataset proof over every piece in the registry.
    DatasetProof {
        /// Cache directory with the piece registry
        cache_dir: PathBuf,

        /// Randomness for the post-build self-check
        #[arg(long, default_value_t = 1)]
        randomness: u64,
    },

    /// Generate challenge proofs for an audit seed.
    ChallengeProof {
        /// Audit randomness seed
        seed: u64,

        /// Cache directory with the registry and level caches
        cache_dir: PathBuf,

        /// Directory of piece-cid-keyed mapping files
        #[arg(long)]
        mapping_dir: PathBuf,

        /// Root directory of the original source files
        #[arg(long)]
        source_root: PathBuf,
    },

    /// Verify the last challenge proof bundle in a cache directory.
    Verify {
        /// Cache directory with the registry and bundle
        cache_dir: PathBuf,
    },
}

fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    match cli.cmd {
        Cmd::Commp {
            archive,
            root,
            cache_dir,
            mapping_dir,
            target_padded_size,
        } => commp(&archive, &root, &cache_dir, mapping_dir, target_padded_size),

        Cmd::DatasetProof {
            cache_dir,
            randomness,
        } => dataset_proof(&cache_dir, randomness),

        Cmd::ChallengeProof {
            seed,
            cache_dir,
            mapping_dir,
            source_root,
        } => challenge_proof(seed, &cache_dir, &mapping_dir, &source_root),

        Cmd::Verify { cache_dir } => verify(&cache_dir),
    }
}

/// Initialize tracing with an env-driven filter (default INFO).
fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = fmt::layer().with_target(false).with_level(true).compact();

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init();
}

fn commp(
    archive: &PathBuf,
    root: &str,
    cache_dir: &PathBuf,
    mapping_dir: Option<PathBuf>,
    target_padded_size: u64,
) -> Result<()> {
    let data_root = Cid::try_from(root).with_context(|| format!("parse data root cid {root}"))?;
    let payload =
        fs::read(archive).with_context(|| format!("read archive {}", archive.display()))?;
    let archive_size = payload.len() as u64;

    info!(archive = %archive.display(), %data_root, "sealing archive");
    let sealed = seal(payload, cache_dir, target_padded_size, &CancelToken::new())
        .with_context(|| format!("seal archive {}", archive.display()))?;
    let piece = sealed.cid().context("derive piece cid")?;

    // Re-freeze the mapping under the piece cid so audits can find it.
    if let Some(dir) = mapping_dir {
        let source = dir.join(format!("{data_root}{MAPPING_FILE_SUFFIX}"));
        let index = MappingIndex::load(&source)
            .with_context(|| format!("load mapping file {}", source.display()))?;
        let target = mapping_file_path(&dir, &piece);
        index
            .save(&dir, &format!("{piece}{MAPPING_FILE_SUFFIX}"))
            .with_context(|| format!("save mapping file {}", target.display()))?;
    }

    println!(
        "CommP cid: {piece}\npiece size: {} (archive {archive_size} bytes)",
        sealed.padded_size
    );
    Ok(())
}

fn dataset_proof(cache_dir: &PathBuf, randomness: u64) -> Result<()> {
    info!(cache_dir = %cache_dir.display(), "building dataset proof");
    let proof = gen_dataset_proof(cache_dir)
        .with_context(|| format!("build dataset proof under {}", cache_dir.display()))?;

    match verify_dataset_proof(cache_dir, randomness).context("re-check dataset proof")? {
        DatasetCheck::Valid => {}
        DatasetCheck::Mismatch { .. } => {
            anyhow::bail!("freshly built dataset proof failed its self-check")
        }
    }

    println!("dataset root: {} ({} pieces)", proof.root, proof.leaf_hashes.len());
    Ok(())
}

fn challenge_proof(
    seed: u64,
    cache_dir: &PathBuf,
    mapping_dir: &PathBuf,
    source_root: &PathBuf,
) -> Result<()> {
    info!(seed, cache_dir = %cache_dir.display(), "generating challenge proofs");
    let bundle = gen_challenge_proof(
        seed,
        cache_dir,
        mapping_dir,
        source_root,
        RawBlockCodec,
        &CancelToken::new(),
    )
    .with_context(|| format!("generate challenge proofs under {}", cache_dir.display()))?;

    println!("challenge proofs: {} (seed {seed})", bundle.len());
    Ok(())
}

fn verify(cache_dir: &PathBuf) -> Result<()> {
    info!(cache_dir = %cache_dir.display(), "verifying challenge proofs");
    verify_challenge_proof(cache_dir)
        .with_context(|| format!("verify challenge proofs under {}", cache_dir.display()))?;

    println!("OK: challenge proofs verified");
    Ok(())
}
