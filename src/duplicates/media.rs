//! Audio and video duplicate matching.
//!
//! Two predicates are evaluated over every pair of readable media records:
//!
//! - acoustic: both files have a fingerprint and their best-alignment bit
//!   error rate is at most the configured threshold.
//! - metadata: durations agree within the tolerance (when both are known),
//!   both files carry the same normalized title, and the artists agree when
//!   both are tagged. The album never takes part, so a track and its copy on
//!   a compilation still match.
//!
//! Acoustic clusters are formed first. Metadata edges between files already
//! joined acoustically are skipped, so a metadata cluster only reports
//! relationships the stronger evidence did not establish.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rayon::prelude::*;

use super::clusters::{
    Confidence, DetectionMethod, DistanceRange, MatchOutcome, ScanWarning, SimilarityCluster, Stage,
};
use super::union_find::{Component, Linker};
use crate::scanner::media::normalize_text;
use crate::scanner::{AcousticFingerprint, AcousticSource, FileRecord, MediaMetadata, MetadataReader};

/// Metadata with tags in comparison form.
#[derive(Debug, Clone, Default, PartialEq)]
struct TagKey {
    duration_secs: Option<f64>,
    title: Option<String>,
    artist: Option<String>,
}

impl From<&MediaMetadata> for TagKey {
    fn from(meta: &MediaMetadata) -> Self {
        Self {
            duration_secs: meta.duration.map(|d| d.as_secs_f64()),
            title: meta.title.as_deref().and_then(normalize_text),
            artist: meta.artist.as_deref().and_then(normalize_text),
        }
    }
}

/// Everything learned about one media file.
struct Examined {
    record: FileRecord,
    tags: TagKey,
    fingerprint: Option<AcousticFingerprint>,
}

/// Duration delta if `a` and `b` satisfy the metadata predicate.
fn metadata_match(a: &TagKey, b: &TagKey, tolerance_secs: f64) -> Option<f64> {
    let delta = match (a.duration_secs, b.duration_secs) {
        (Some(x), Some(y)) => {
            let delta = (x - y).abs();
            if delta > tolerance_secs {
                return None;
            }
            delta
        }
        _ => 0.0,
    };

    match (&a.title, &b.title) {
        (Some(x), Some(y)) if x == y => {}
        _ => return None,
    }
    if let (Some(x), Some(y)) = (&a.artist, &b.artist) {
        if x != y {
            return None;
        }
    }
    Some(delta)
}

/// Clusters audio and video files by tags and acoustic fingerprints.
pub struct MediaMatcher {
    reader: Arc<dyn MetadataReader>,
    acoustic: Arc<dyn AcousticSource>,
    duration_tolerance_secs: f64,
    acoustic_threshold: f64,
    shutdown_flag: Option<Arc<AtomicBool>>,
}

impl MediaMatcher {
    /// Create a matcher from its readers and thresholds.
    #[must_use]
    pub fn new(
        reader: Arc<dyn MetadataReader>,
        acoustic: Arc<dyn AcousticSource>,
        duration_tolerance_secs: f64,
        acoustic_threshold: f64,
    ) -> Self {
        Self {
            reader,
            acoustic,
            duration_tolerance_secs,
            acoustic_threshold,
            shutdown_flag: None,
        }
    }

    /// Skip remaining files once this flag is set.
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

    /// Read, fingerprint and cluster `records`.
    pub fn find_similar(&self, records: Vec<FileRecord>) -> MatchOutcome {
        let mut outcome = MatchOutcome::default();
        if records.len() < 2 {
            return outcome;
        }
        log::info!("Examining {} media file(s)", records.len());

        let examined_all: Vec<(Option<Examined>, Option<ScanWarning>)> = records
            .into_par_iter()
            .map(|record| self.examine(record))
            .collect();

        let mut examined = Vec::with_capacity(examined_all.len());
        for (entry, warning) in examined_all {
            outcome.warnings.extend(warning);
            examined.extend(entry);
        }
        outcome.examined = examined.len();

        let mut acoustic = Linker::new(examined.len());
        for i in 0..examined.len() {
            let Some(fa) = &examined[i].fingerprint else {
                continue;
            };
            for j in (i + 1)..examined.len() {
                let Some(fb) = &examined[j].fingerprint else {
                    continue;
                };
                if let Some(ber) = fa.bit_error_rate(fb) {
                    if ber <= self.acoustic_threshold {
                        acoustic.link(i, j, ber);
                    }
                }
            }
        }

        let mut metadata = Linker::new(examined.len());
        for i in 0..examined.len() {
            for j in (i + 1)..examined.len() {
                if acoustic.connected(i, j) {
                    continue;
                }
                if let Some(delta) =
                    metadata_match(&examined[i].tags, &examined[j].tags, self.duration_tolerance_secs)
                {
                    metadata.link(i, j, delta);
                }
            }
        }

        let build = |component: Component,
                     method: DetectionMethod,
                     confidence: Confidence| SimilarityCluster {
            method,
            confidence,
            files: component
                .members
                .iter()
                .map(|&i| examined[i].record.clone())
                .collect(),
            distance: DistanceRange {
                min: component.min_distance,
                max: component.max_distance,
            },
        };
        for component in acoustic.components() {
            outcome
                .clusters
                .push(build(component, DetectionMethod::Acoustic, Confidence::High));
        }
        for component in metadata.components() {
            outcome
                .clusters
                .push(build(component, DetectionMethod::Metadata, Confidence::Low));
        }

        log::info!(
            "Media matching: {} file(s) examined, {} cluster(s)",
            outcome.examined,
            outcome.clusters.len()
        );
        outcome
    }

    fn examine(&self, record: FileRecord) -> (Option<Examined>, Option<ScanWarning>) {
        if self.is_shutdown_requested() {
            return (None, None);
        }

        let meta = match self.reader.read(&record.path) {
            Ok(meta) => meta,
            Err(e) => return (None, Some(ScanWarning::new(&record.path, Stage::Media, e))),
        };

        let (fingerprint, warning) = match self.acoustic.fingerprint(&record.path) {
            Ok(fp) => (fp, None),
            Err(e) => (None, Some(ScanWarning::new(&record.path, Stage::Media, e))),
        };
        log::trace!("Examined {}", record.path.display());

        let entry = Examined {
            tags: TagKey::from(&meta),
            record,
            fingerprint,
        };
        (Some(entry), warning)
    }
}
