//! Tiered content digests with streaming reads.
//!
//! # Overview
//!
//! The [`Hasher`] computes two kinds of digests:
//! - a **partial digest** over the first and last `window` bytes of a file,
//!   used as a cheap pre-filter
//! - a **full digest** over the entire content
//!
//! Which algorithm backs each tier is a [`DigestAlgorithm`] chosen at
//! configuration time. All algorithms produce a [`Digest`] of 32 bytes;
//! narrower outputs (xxHash64) are zero-extended.

use std::fs::File;
use std::hash::Hasher as _;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sha2::Digest as _;
use twox_hash::XxHash64;

use super::HashError;

/// Fixed-length digest value shared by every algorithm.
pub type Digest = [u8; 32];

/// Default size of each sampled window for the partial digest (4KB).
pub const DEFAULT_PARTIAL_WINDOW: usize = 4096;

/// Buffer size for streaming reads (64KB).
const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Files above this size are hashed through a memory map when using BLAKE3.
const MMAP_THRESHOLD: u64 = 128 * 1024 * 1024;

/// Digest algorithm selectable for each hashing tier.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum DigestAlgorithm {
    /// xxHash64 - fast, non-cryptographic.
    Xxh64,
    /// BLAKE3 - cryptographic and parallel.
    #[default]
    Blake3,
    /// SHA-256 - cryptographic.
    Sha256,
}

impl DigestAlgorithm {
    /// Whether accidental collisions are cryptographically improbable.
    #[must_use]
    pub fn is_cryptographic(self) -> bool {
        !matches!(self, Self::Xxh64)
    }
}

impl std::fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Xxh64 => write!(f, "xxh64"),
            Self::Blake3 => write!(f, "blake3"),
            Self::Sha256 => write!(f, "sha256"),
        }
    }
}

/// In-progress digest state for one of the supported algorithms.
enum DigestState {
    Xxh64(XxHash64),
    Blake3(Box<blake3::Hasher>),
    Sha256(sha2::Sha256),
}

impl DigestState {
    fn new(algorithm: DigestAlgorithm) -> Self {
        match algorithm {
            DigestAlgorithm::Xxh64 => Self::Xxh64(XxHash64::with_seed(0)),
            DigestAlgorithm::Blake3 => Self::Blake3(Box::new(blake3::Hasher::new())),
            DigestAlgorithm::Sha256 => Self::Sha256(sha2::Sha256::new()),
        }
    }

    fn update(&mut self, data: &[u8]) {
        match self {
            Self::Xxh64(h) => h.write(data),
            Self::Blake3(h) => {
                h.update(data);
            }
            Self::Sha256(h) => h.update(data),
        }
    }

    fn finalize(self) -> Digest {
        let mut out = [0u8; 32];
        match self {
            Self::Xxh64(h) => out[..8].copy_from_slice(&h.finish().to_le_bytes()),
            Self::Blake3(h) => out.copy_from_slice(h.finalize().as_bytes()),
            Self::Sha256(h) => out.copy_from_slice(&h.finalize()),
        }
        out
    }
}

/// Digest an in-memory buffer with the given algorithm.
#[must_use]
pub fn digest_bytes(algorithm: DigestAlgorithm, data: &[u8]) -> Digest {
    let mut state = DigestState::new(algorithm);
    state.update(data);
    state.finalize()
}

/// Computes partial and full digests of file content.
#[derive(Debug, Clone)]
pub struct Hasher {
    partial_algorithm: DigestAlgorithm,
    full_algorithm: DigestAlgorithm,
    window: usize,
    shutdown_flag: Option<Arc<AtomicBool>>,
}

impl Default for Hasher {
    fn default() -> Self {
        Self::new(DigestAlgorithm::Xxh64, DigestAlgorithm::Blake3)
    }
}

impl Hasher {
    /// Create a hasher with the given partial and full digest algorithms.
    #[must_use]
    pub fn new(partial_algorithm: DigestAlgorithm, full_algorithm: DigestAlgorithm) -> Self {
        Self {
            partial_algorithm,
            full_algorithm,
            window: DEFAULT_PARTIAL_WINDOW,
            shutdown_flag: None,
        }
    }

    /// Set the size of each sampled window for partial digests.
    #[must_use]
    pub fn with_window(mut self, window: usize) -> Self {
        self.window = window.max(1);
        self
    }

    /// Abort reads promptly once this flag is set.
    #[must_use]
    pub fn with_shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown_flag = Some(flag);
        self
    }

    /// Size of each sampled window in bytes.
    #[must_use]
    pub fn window(&self) -> usize {
        self.window
    }

    /// Algorithm used for full digests.
    #[must_use]
    pub fn full_algorithm(&self) -> DigestAlgorithm {
        self.full_algorithm
    }

    fn is_shutdown_requested(&self) -> bool {
        self.shutdown_flag
            .as_ref()
            .is_some_and(|f| f.load(Ordering::SeqCst))
    }

    /// Compute the partial digest: first `window` bytes followed by the last
    /// `window` bytes. Files no longer than two windows are digested whole.
    ///
    /// # Errors
    ///
    /// Returns [`HashError`] if the file cannot be opened or read, or if the
    /// scan is cancelled mid-read.
    pub fn partial_digest(&self, path: &Path) -> Result<Digest, HashError> {
        let mut file = File::open(path).map_err(|e| HashError::from_io(path, e))?;
        let len = file
            .metadata()
            .map_err(|e| HashError::from_io(path, e))?
            .len();
        let window = self.window as u64;
        let mut state = DigestState::new(self.partial_algorithm);

        if len <= window.saturating_mul(2) {
            self.stream_into(&mut file, path, &mut state)?;
            return Ok(state.finalize());
        }

        let mut buffer = vec![0u8; self.window];
        file.read_exact(&mut buffer)
            .map_err(|e| HashError::from_io(path, e))?;
        state.update(&buffer);

        if self.is_shutdown_requested() {
            return Err(HashError::Interrupted(path.to_path_buf()));
        }

        file.seek(SeekFrom::Start(len - window))
            .map_err(|e| HashError::from_io(path, e))?;
        file.read_exact(&mut buffer)
            .map_err(|e| HashError::from_io(path, e))?;
        state.update(&buffer);

        Ok(state.finalize())
    }

    /// Compute the full digest over the entire content.
    ///
    /// # Errors
    ///
    /// Returns [`HashError`] if the file cannot be opened or read, or if the
    /// scan is cancelled mid-read.
    pub fn full_digest(&self, path: &Path) -> Result<Digest, HashError> {
        let mut file = File::open(path).map_err(|e| HashError::from_io(path, e))?;

        if self.full_algorithm == DigestAlgorithm::Blake3 {
            let len = file
                .metadata()
                .map_err(|e| HashError::from_io(path, e))?
                .len();
            if len > MMAP_THRESHOLD {
                log::trace!("Hashing via mmap: {}", path.display());
                let mut hasher = blake3::Hasher::new();
                hasher
                    .update_mmap_rayon(path)
                    .map_err(|e| HashError::from_io(path, e))?;
                return Ok(*hasher.finalize().as_bytes());
            }
        }

        let mut state = DigestState::new(self.full_algorithm);
        self.stream_into(&mut file, path, &mut state)?;
        Ok(state.finalize())
    }

    fn stream_into(
        &self,
        file: &mut File,
        path: &Path,
        state: &mut DigestState,
    ) -> Result<(), HashError> {
        let mut buffer = vec![0u8; READ_BUFFER_SIZE];
        loop {
            if self.is_shutdown_requested() {
                return Err(HashError::Interrupted(path.to_path_buf()));
            }
            let n = match file.read(&mut buffer) {
                Ok(0) => return Ok(()),
                Ok(n) => n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(HashError::from_io(path, e)),
            };
            state.update(&buffer[..n]);
        }
    }
}

/// Convert a digest to a lowercase hexadecimal string.
#[must_use]
pub fn digest_to_hex(digest: &Digest) -> String {
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}
