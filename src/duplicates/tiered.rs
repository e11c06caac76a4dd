//! Two-tier content hashing over size groups.
//!
//! Each size group is one unit of work. Its members are first reduced by a
//! cheap partial digest over the leading and trailing windows; only members
//! whose partial digest collides are read in full for the strong digest.
//! The result is a set of buckets whose members share size and full digest,
//! ready for byte verification.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rayon::prelude::*;

use super::clusters::{ScanWarning, Stage};
use super::groups::SizeGroup;
use crate::scanner::{Digest, FileRecord, HashError, Hasher};

/// Files sharing size and full digest. Always two or more members.
#[derive(Debug, Clone, PartialEq)]
pub struct DigestBucket {
    /// Shared size in bytes
    pub size: u64,
    /// Shared full digest
    pub digest: Digest,
    /// Members in group order
    pub files: Vec<FileRecord>,
}

/// Counters for the hashing tiers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TierStats {
    /// Files that received a partial digest
    pub partial_hashed: usize,
    /// Files ruled out by a unique partial digest
    pub eliminated_by_partial: usize,
    /// Files that received a full digest
    pub full_hashed: usize,
    /// Bytes read for full digests
    pub bytes_fully_hashed: u64,
    /// Files dropped because they could not be read
    pub failed: usize,
}

impl TierStats {
    fn merge(&mut self, other: &Self) {
        self.partial_hashed += other.partial_hashed;
        self.eliminated_by_partial += other.eliminated_by_partial;
        self.full_hashed += other.full_hashed;
        self.bytes_fully_hashed += other.bytes_fully_hashed;
        self.failed += other.failed;
    }
}

/// Result of hashing one or more size groups.
#[derive(Debug, Clone, Default)]
pub struct TieredOutcome {
    /// Full-digest collisions
    pub buckets: Vec<DigestBucket>,
    /// One entry per file that failed to read
    pub warnings: Vec<ScanWarning>,
    /// Counters
    pub stats: TierStats,
}

impl TieredOutcome {
    fn absorb(&mut self, other: Self) {
        self.buckets.extend(other.buckets);
        self.warnings.extend(other.warnings);
        self.stats.merge(&other.stats);
    }
}

/// Runs partial then full digests over size groups.
///
/// Must be called from within the run's thread pool; members of a group are
/// digested in parallel with `rayon`.
pub struct TieredHasher {
    hasher: Arc<Hasher>,
    shutdown_flag: Option<Arc<AtomicBool>>,
}

impl TieredHasher {
    /// Create a tiered hasher around a configured [`Hasher`].
    #[must_use]
    pub fn new(hasher: Arc<Hasher>) -> Self {
        Self {
            hasher,
            shutdown_flag: None,
        }
    }

    /// Skip remaining work once this flag is set.
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

    /// Hash every size group in parallel and merge the results.
    pub fn digest_groups(&self, groups: HashMap<u64, Vec<FileRecord>>) -> TieredOutcome {
        let files: usize = groups.values().map(Vec::len).sum();
        log::info!(
            "Hashing {} candidate files in {} size groups",
            files,
            groups.len()
        );

        let outcomes: Vec<TieredOutcome> = groups
            .into_par_iter()
            .map(|(size, files)| self.digest_group(SizeGroup::with_files(size, files)))
            .collect();

        let mut merged = TieredOutcome::default();
        for outcome in outcomes {
            merged.absorb(outcome);
        }

        log::info!(
            "Hashing complete: {} partial, {} full ({} eliminated by partial digest), {} buckets",
            merged.stats.partial_hashed,
            merged.stats.full_hashed,
            merged.stats.eliminated_by_partial,
            merged.buckets.len()
        );
        merged
    }

    /// Hash one size group through both tiers.
    pub fn digest_group(&self, group: SizeGroup) -> TieredOutcome {
        let mut outcome = TieredOutcome::default();
        if self.is_shutdown_requested() {
            return outcome;
        }

        let size = group.size;
        let partials = self.digest_members(group.files, Stage::PartialHash, &mut outcome);
        outcome.stats.partial_hashed += partials.len();

        for (_, members) in bucket_by_digest(partials) {
            if members.len() < 2 {
                outcome.stats.eliminated_by_partial += members.len();
                continue;
            }

            let fulls = self.digest_members(members, Stage::FullHash, &mut outcome);
            outcome.stats.full_hashed += fulls.len();
            outcome.stats.bytes_fully_hashed += size * fulls.len() as u64;

            for (digest, files) in bucket_by_digest(fulls) {
                if files.len() > 1 {
                    outcome.buckets.push(DigestBucket {
                        size,
                        digest,
                        files,
                    });
                }
            }
        }

        log::debug!(
            "Size group {} bytes: {} full-digest bucket(s)",
            size,
            outcome.buckets.len()
        );
        outcome
    }

    /// Digest `files` in parallel. Failures become warnings; files skipped
    /// because of shutdown are dropped silently.
    fn digest_members(
        &self,
        files: Vec<FileRecord>,
        stage: Stage,
        outcome: &mut TieredOutcome,
    ) -> Vec<(FileRecord, Digest)> {
        let results: Vec<(FileRecord, Option<Result<Digest, HashError>>)> = files
            .into_par_iter()
            .map(|file| {
                if self.is_shutdown_requested() {
                    return (file, None);
                }
                let result = match stage {
                    Stage::FullHash => self.hasher.full_digest(&file.path),
                    _ => self.hasher.partial_digest(&file.path),
                };
                (file, Some(result))
            })
            .collect();

        let mut digested = Vec::with_capacity(results.len());
        for (file, result) in results {
            match result {
                Some(Ok(digest)) => {
                    log::trace!("{:?} computed: {}", stage, file.path.display());
                    digested.push((file, digest));
                }
                Some(Err(e)) => {
                    outcome.stats.failed += 1;
                    outcome
                        .warnings
                        .push(ScanWarning::new(&file.path, stage, e));
                }
                None => {}
            }
        }
        digested
    }
}

/// Bucket records by digest, keeping first-seen order of both buckets and
/// members.
fn bucket_by_digest(items: Vec<(FileRecord, Digest)>) -> Vec<(Digest, Vec<FileRecord>)> {
    let mut order: Vec<Digest> = Vec::new();
    let mut map: HashMap<Digest, Vec<FileRecord>> = HashMap::new();
    for (file, digest) in items {
        map.entry(digest)
            .or_insert_with(|| {
                order.push(digest);
                Vec::new()
            })
            .push(file);
    }
    order
        .into_iter()
        .filter_map(|d| map.remove(&d).map(|files| (d, files)))
        .collect()
}
