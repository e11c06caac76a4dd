//! Byte-for-byte verification of full-digest collisions.
//!
//! A shared digest makes identity overwhelmingly likely but not certain.
//! Every bucket is resolved against a reference member with chunked reads;
//! members that differ from the reference are re-checked among themselves
//! with a new reference, so a collision splits a bucket instead of merging
//! distinct content.

use std::collections::VecDeque;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rayon::prelude::*;

use super::clusters::{ExactCluster, ScanWarning, Stage};
use super::tiered::DigestBucket;
use crate::scanner::{FileRecord, HashError};

/// Size of each comparison read.
pub const VERIFY_CHUNK_SIZE: usize = 64 * 1024;

/// Result of verifying one or more buckets.
#[derive(Debug, Clone, Default)]
pub struct VerifyOutcome {
    /// Byte-identical clusters
    pub clusters: Vec<ExactCluster>,
    /// Members demoted because they could not be read
    pub warnings: Vec<ScanWarning>,
}

/// Chunked byte comparator.
#[derive(Debug, Clone)]
pub struct ByteVerifier {
    chunk_size: usize,
    shutdown_flag: Option<Arc<AtomicBool>>,
}

impl Default for ByteVerifier {
    fn default() -> Self {
        Self {
            chunk_size: VERIFY_CHUNK_SIZE,
            shutdown_flag: None,
        }
    }
}

impl ByteVerifier {
    /// Create a verifier with the default chunk size.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a different chunk size (minimum 1).
    #[must_use]
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Abandon comparisons once this flag is set.
    #[must_use]
    pub fn with_shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown_flag = Some(flag);
        self
    }

    fn is_shutdown_requested(&self) -> bool {
        self.shutdown_flag
            .as_ref()
            .is_some_and(|f| f.load(Ordering::SeqCst))
    }

    /// Verify every bucket in parallel.
    pub fn verify_all(&self, buckets: Vec<DigestBucket>) -> VerifyOutcome {
        log::info!("Verifying {} digest bucket(s) byte-for-byte", buckets.len());

        let outcomes: Vec<VerifyOutcome> = buckets
            .into_par_iter()
            .map(|bucket| self.verify_bucket(bucket))
            .collect();

        let mut merged = VerifyOutcome::default();
        for outcome in outcomes {
            merged.clusters.extend(outcome.clusters);
            merged.warnings.extend(outcome.warnings);
        }

        log::info!("Verification complete: {} exact cluster(s)", merged.clusters.len());
        merged
    }

    /// Split one bucket into byte-identical clusters.
    pub fn verify_bucket(&self, bucket: DigestBucket) -> VerifyOutcome {
        let mut outcome = VerifyOutcome::default();
        let mut pending: VecDeque<FileRecord> = bucket.files.into();

        while pending.len() > 1 {
            if self.is_shutdown_requested() {
                break;
            }
            let Some(reference) = pending.pop_front() else {
                break;
            };
            let mut members = vec![reference];
            let mut rest = VecDeque::new();

            while let Some(candidate) = pending.pop_front() {
                if self.is_shutdown_requested() {
                    pending.clear();
                    break;
                }
                match self.files_equal(&members[0].path, &candidate.path) {
                    Ok(true) => members.push(candidate),
                    Ok(false) => {
                        log::debug!(
                            "Digest collision without byte equality: {} vs {}",
                            members[0].path.display(),
                            candidate.path.display()
                        );
                        rest.push_back(candidate);
                    }
                    Err(e) if e.path() == members[0].path => {
                        outcome
                            .warnings
                            .push(ScanWarning::new(&members[0].path, Stage::Verify, &e));
                        // Reference demoted: everything still unresolved
                        // goes back in line, matches first.
                        members.remove(0);
                        rest.push_back(candidate);
                        rest.extend(pending.drain(..));
                        for m in members.drain(..).rev() {
                            rest.push_front(m);
                        }
                        break;
                    }
                    Err(e) => {
                        outcome
                            .warnings
                            .push(ScanWarning::new(&candidate.path, Stage::Verify, &e));
                    }
                }
            }

            if members.len() > 1 {
                log::debug!(
                    "Verified {} identical files of {} bytes",
                    members.len(),
                    bucket.size
                );
                outcome.clusters.push(ExactCluster {
                    size: bucket.size,
                    digest: bucket.digest,
                    files: members,
                });
            }
            pending = rest;
        }

        outcome
    }

    /// Compare two files chunk by chunk.
    ///
    /// # Errors
    ///
    /// Returns a [`HashError`] naming whichever file could not be read.
    pub fn files_equal(&self, a: &Path, b: &Path) -> Result<bool, HashError> {
        let mut fa = File::open(a).map_err(|e| HashError::from_io(a, e))?;
        let mut fb = File::open(b).map_err(|e| HashError::from_io(b, e))?;

        let len_a = fa.metadata().map_err(|e| HashError::from_io(a, e))?.len();
        let len_b = fb.metadata().map_err(|e| HashError::from_io(b, e))?.len();
        if len_a != len_b {
            return Ok(false);
        }

        let mut buf_a = vec![0u8; self.chunk_size];
        let mut buf_b = vec![0u8; self.chunk_size];
        loop {
            if self.is_shutdown_requested() {
                return Err(HashError::Interrupted(b.to_path_buf()));
            }
            let n_a = fill(&mut fa, &mut buf_a).map_err(|e| HashError::from_io(a, e))?;
            let n_b = fill(&mut fb, &mut buf_b).map_err(|e| HashError::from_io(b, e))?;
            if n_a != n_b || buf_a[..n_a] != buf_b[..n_b] {
                return Ok(false);
            }
            if n_a == 0 {
                return Ok(true);
            }
        }
    }
}

/// Read until `buf` is full or the reader is exhausted.
fn fill(reader: &mut impl Read, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
