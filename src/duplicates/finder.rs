//! Detection pipeline orchestration.
//!
//! # Overview
//!
//! [`DuplicateFinder`] runs one detection pass over a stream of
//! [`FileRecord`]s:
//!
//! 1. **Size grouping**: every record is grouped by byte length
//!    (see [`crate::duplicates::groups`]). Image and audio/video records are
//!    also routed to the similarity matchers.
//! 2. **Tiered hashing**: partial then full digests per size group.
//! 3. **Byte verification**: full-digest collisions are compared byte for byte.
//! 4. **Similarity matching**: perceptual image matching and media matching
//!    run concurrently with steps 2 and 3.
//! 5. **Aggregation** into a [`DuplicateReport`].
//!
//! All parallel work runs in one `rayon` pool sized by
//! `worker_pool_size`, created for the run and dropped with it. Nothing is
//! cached between runs.
//!
//! # Example
//!
//! ```no_run
//! use dupehound::config::ScanConfig;
//! use dupehound::duplicates::DuplicateFinder;
//! use std::path::PathBuf;
//!
//! let finder = DuplicateFinder::new(ScanConfig::default()).unwrap();
//! let report = finder.scan_paths(&[PathBuf::from(".")]).unwrap();
//! for cluster in report.exact_clusters() {
//!     println!("{} copies, {} bytes reclaimable", cluster.len(), cluster.reclaimable_bytes);
//! }
//! ```

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use bytesize::ByteSize;

use super::clusters::{ExactCluster, MatchOutcome, ScanWarning};
use super::groups::group_by_size;
use super::media::MediaMatcher;
use super::report::{Aggregator, DuplicateReport, ScanStats};
use super::similar::PerceptualMatcher;
use super::tiered::{TierStats, TieredHasher};
use super::verify::ByteVerifier;
use crate::config::{ConfigError, ScanConfig};
use crate::scanner::{
    AcousticSource, FileKind, FileRecord, FpcalcSource, Hasher, ImageFingerprinter,
    MetadataReader, NoAcoustic, PerceptualHasher, TagReader, Walker,
};

/// Errors that stop a run before it produces a report.
#[derive(thiserror::Error, Debug)]
pub enum FinderError {
    /// The configuration failed validation.
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// The provided path does not exist.
    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),

    /// The provided path is not a directory.
    #[error("Not a directory: {0}")]
    NotADirectory(PathBuf),

    /// The worker pool could not be created.
    #[error("Failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

/// Output of the exact branch of the pipeline.
#[derive(Default)]
struct ExactOutcome {
    clusters: Vec<ExactCluster>,
    warnings: Vec<ScanWarning>,
    stats: TierStats,
}

/// Runs the full detection pipeline.
pub struct DuplicateFinder {
    config: ScanConfig,
    fingerprinter: Arc<dyn ImageFingerprinter>,
    metadata_reader: Arc<dyn MetadataReader>,
    acoustic_source: Arc<dyn AcousticSource>,
    shutdown_flag: Arc<AtomicBool>,
}

impl std::fmt::Debug for DuplicateFinder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DuplicateFinder")
            .field("config", &self.config)
            .field("shutdown_flag", &self.shutdown_flag)
            .finish_non_exhaustive()
    }
}

impl DuplicateFinder {
    /// Create a finder after validating `config`.
    ///
    /// Components default to what the configuration selects: the configured
    /// perceptual algorithm, `lofty` tag reading, and `fpcalc` only when
    /// `use_fpcalc` is set.
    ///
    /// # Returns
    ///
    /// A finder ready to [`scan`](Self::scan) with a shutdown flag of its
    /// own, not yet set.
    ///
    /// # Errors
    ///
    /// Returns [`FinderError::Config`] if validation fails.
    ///
    /// # Example
    ///
    /// ```
    /// use dupehound::config::ScanConfig;
    /// use dupehound::duplicates::{DuplicateFinder, FinderError};
    ///
    /// let config = ScanConfig {
    ///     worker_pool_size: 0,
    ///     ..ScanConfig::default()
    /// };
    /// assert!(matches!(DuplicateFinder::new(config), Err(FinderError::Config(_))));
    /// ```
    pub fn new(config: ScanConfig) -> Result<Self, FinderError> {
        config.validate()?;
        if !config.full_hash_algorithm.is_cryptographic() {
            log::warn!(
                "Full digest {} is not collision resistant; byte verification still confirms every match",
                config.full_hash_algorithm
            );
        }

        let acoustic_source: Arc<dyn AcousticSource> = if config.use_fpcalc {
            Arc::new(FpcalcSource::default())
        } else {
            Arc::new(NoAcoustic)
        };

        Ok(Self {
            fingerprinter: Arc::new(PerceptualHasher::new(config.perceptual_algorithm)),
            metadata_reader: Arc::new(TagReader),
            acoustic_source,
            shutdown_flag: Arc::new(AtomicBool::new(false)),
            config,
        })
    }

    /// Share a cancellation flag with the caller.
    ///
    /// Setting the flag stops the run at the next work unit; the report
    /// comes back with `interrupted` set. See
    /// [`ShutdownHandler::get_flag`](crate::signal::ShutdownHandler::get_flag).
    #[must_use]
    pub fn with_shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown_flag = flag;
        self
    }

    /// Replace the image fingerprinter.
    ///
    /// The configured `perceptual_threshold` must stay below the
    /// fingerprinter's [`bits`](ImageFingerprinter::bits); [`scan`](Self::scan)
    /// checks this before reading anything.
    #[must_use]
    pub fn with_fingerprinter(mut self, fingerprinter: Arc<dyn ImageFingerprinter>) -> Self {
        self.fingerprinter = fingerprinter;
        self
    }

    /// Replace the media metadata reader, [`TagReader`] by default.
    #[must_use]
    pub fn with_metadata_reader(mut self, reader: Arc<dyn MetadataReader>) -> Self {
        self.metadata_reader = reader;
        self
    }

    /// Replace the acoustic fingerprint source.
    ///
    /// Defaults to [`FpcalcSource`] when `use_fpcalc` is set, otherwise to
    /// [`NoAcoustic`].
    #[must_use]
    pub fn with_acoustic_source(mut self, source: Arc<dyn AcousticSource>) -> Self {
        self.acoustic_source = source;
        self
    }

    /// The validated configuration.
    ///
    /// # Returns
    ///
    /// The settings this finder runs with, after validation.
    #[must_use]
    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    fn is_shutdown_requested(&self) -> bool {
        self.shutdown_flag.load(Ordering::SeqCst)
    }

    /// Walk every root and scan the regular files found.
    ///
    /// Files reachable from more than one root are scanned once. Entries the
    /// walker cannot read are logged and skipped.
    ///
    /// # Returns
    ///
    /// The report for every file under `roots`.
    ///
    /// # Errors
    ///
    /// Returns [`FinderError::PathNotFound`] or [`FinderError::NotADirectory`]
    /// for a bad root, before anything is read, and any error of
    /// [`scan`](Self::scan).
    pub fn scan_paths(&self, roots: &[PathBuf]) -> Result<DuplicateReport, FinderError> {
        for root in roots {
            if !root.exists() {
                return Err(FinderError::PathNotFound(root.clone()));
            }
            if !root.is_dir() {
                return Err(FinderError::NotADirectory(root.clone()));
            }
        }

        let walkers: Vec<Walker> = roots
            .iter()
            .map(|root| Walker::new(root).with_shutdown_flag(Arc::clone(&self.shutdown_flag)))
            .collect();

        let mut seen = HashSet::new();
        let records = walkers
            .iter()
            .flat_map(Walker::walk)
            .filter_map(|entry| match entry {
                Ok(record) => Some(record),
                Err(e) => {
                    log::warn!("Skipping entry: {}", e);
                    None
                }
            })
            .filter(|record| seen.insert(record.path.clone()));

        self.scan(records)
    }

    /// Run the pipeline over `records`.
    ///
    /// Cancellation does not produce an error: the report is returned with
    /// whatever was completed and `interrupted` set.
    ///
    /// # Returns
    ///
    /// Clusters in canonical order, at most one warning per path, and the
    /// run's statistics.
    ///
    /// # Errors
    ///
    /// Returns [`FinderError::Config`] if `perceptual_threshold` does not fit
    /// the fingerprinter's width, and [`FinderError::ThreadPool`] if the
    /// worker pool cannot be built. Both happen before any file is read.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use dupehound::config::ScanConfig;
    /// use dupehound::duplicates::DuplicateFinder;
    /// use dupehound::scanner::Walker;
    /// use std::path::Path;
    ///
    /// let finder = DuplicateFinder::new(ScanConfig::default()).unwrap();
    /// let walker = Walker::new(Path::new("/srv/photos"));
    /// let report = finder.scan(walker.walk().filter_map(Result::ok)).unwrap();
    /// println!("{} cluster(s)", report.clusters.len());
    /// ```
    pub fn scan(
        &self,
        records: impl IntoIterator<Item = FileRecord>,
    ) -> Result<DuplicateReport, FinderError> {
        let bits = self.fingerprinter.bits();
        if self.config.perceptual_threshold >= bits {
            return Err(FinderError::Config(ConfigError::Invalid {
                field: "perceptual_threshold",
                message: format!("must be below the fingerprint width of {bits} bits"),
            }));
        }

        let start = Instant::now();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.worker_pool_size)
            .thread_name(|i| format!("dupehound-worker-{i}"))
            .build()?;

        let mut images = Vec::new();
        let mut media = Vec::new();
        let routed = records.into_iter().inspect(|record| match record.kind {
            FileKind::Image => images.push(record.clone()),
            FileKind::Audio | FileKind::Video => media.push(record.clone()),
            FileKind::Generic => {}
        });
        let (size_groups, grouping) = group_by_size(
            routed,
            self.config.min_file_size_bytes,
            self.config.max_file_size_bytes,
        );

        if !self.config.match_images {
            images.clear();
        }
        if !self.config.match_media {
            media.clear();
        }

        let (exact, (perceptual, media)) = pool.install(|| {
            rayon::join(
                || self.find_exact(size_groups),
                || {
                    rayon::join(
                        || self.find_similar_images(images),
                        || self.find_similar_media(media),
                    )
                },
            )
        });

        let stats = ScanStats {
            total_files: grouping.total_files,
            total_bytes: grouping.total_size,
            below_min_size: grouping.below_min_size,
            above_max_size: grouping.above_max_size,
            unique_sizes: grouping.unique_sizes,
            size_candidates: grouping.potential_duplicates,
            candidate_bytes: grouping.candidate_bytes,
            partial_hashed: exact.stats.partial_hashed,
            eliminated_by_partial: exact.stats.eliminated_by_partial,
            full_hashed: exact.stats.full_hashed,
            bytes_fully_hashed: exact.stats.bytes_fully_hashed,
            images_fingerprinted: perceptual.examined,
            media_examined: media.examined,
            duration: start.elapsed(),
            ..ScanStats::default()
        };

        let mut aggregator = Aggregator::new(self.config.keep_policy);
        aggregator.add_exact(exact.clusters);
        aggregator.add_similar(perceptual.clusters);
        aggregator.add_similar(media.clusters);
        aggregator.add_warnings(exact.warnings);
        aggregator.add_warnings(perceptual.warnings);
        aggregator.add_warnings(media.warnings);

        let interrupted = self.is_shutdown_requested();
        let report = aggregator.finish(stats, interrupted);

        if interrupted {
            log::warn!("Scan interrupted; the report covers completed work only");
        }
        log::info!(
            "Scan complete: {} exact cluster(s) ({} reclaimable), {} similarity cluster(s), {} warning(s) in {:.2?}",
            report.stats.exact_clusters,
            ByteSize::b(report.stats.reclaimable_bytes),
            report.stats.similarity_clusters,
            report.warnings.len(),
            report.stats.duration
        );
        Ok(report)
    }

    fn find_exact(&self, size_groups: HashMap<u64, Vec<FileRecord>>) -> ExactOutcome {
        if size_groups.is_empty() {
            return ExactOutcome::default();
        }

        let hasher = Hasher::new(
            self.config.partial_hash_algorithm,
            self.config.full_hash_algorithm,
        )
        .with_window(self.config.partial_hash_window_bytes)
        .with_shutdown_flag(Arc::clone(&self.shutdown_flag));

        let tiered = TieredHasher::new(Arc::new(hasher))
            .with_shutdown_flag(Arc::clone(&self.shutdown_flag))
            .digest_groups(size_groups);

        let verified = ByteVerifier::new()
            .with_shutdown_flag(Arc::clone(&self.shutdown_flag))
            .verify_all(tiered.buckets);

        let mut warnings = tiered.warnings;
        warnings.extend(verified.warnings);
        ExactOutcome {
            clusters: verified.clusters,
            warnings,
            stats: tiered.stats,
        }
    }

    fn find_similar_images(&self, images: Vec<FileRecord>) -> MatchOutcome {
        PerceptualMatcher::new(
            Arc::clone(&self.fingerprinter),
            self.config.perceptual_threshold,
        )
        .with_shutdown_flag(Arc::clone(&self.shutdown_flag))
        .find_similar(images)
    }

    fn find_similar_media(&self, media: Vec<FileRecord>) -> MatchOutcome {
        MediaMatcher::new(
            Arc::clone(&self.metadata_reader),
            Arc::clone(&self.acoustic_source),
            self.config.media_duration_tolerance_seconds,
            self.config.acoustic_match_threshold,
        )
        .with_shutdown_flag(Arc::clone(&self.shutdown_flag))
        .find_similar(media)
    }
}
