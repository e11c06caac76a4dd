//! Near-duplicate image clustering.
//!
//! # Overview
//!
//! Every image record is decoded and fingerprinted in parallel. Identical
//! fingerprints are merged directly; each distinct fingerprint is then
//! inserted once into a BK-tree and queried at the Hamming threshold, which
//! yields the same edge set as comparing every pair. Edges are merged with
//! union-find, so clustering is transitive: if A~B and B~C then A, B and C
//! share a cluster even when A and C are further apart than the threshold.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rayon::prelude::*;

use super::clusters::{
    Confidence, DetectionMethod, DistanceRange, MatchOutcome, ScanWarning, SimilarityCluster, Stage,
};
use super::union_find::{Component, Linker};
use crate::scanner::perceptual::{IndexedFingerprint, SimilarityIndex};
use crate::scanner::{FileRecord, ImageFingerprinter, PerceptualFingerprint};

/// Clusters images whose fingerprints lie within a Hamming threshold.
pub struct PerceptualMatcher {
    fingerprinter: Arc<dyn ImageFingerprinter>,
    threshold: u32,
    shutdown_flag: Option<Arc<AtomicBool>>,
}

impl PerceptualMatcher {
    /// Create a matcher using `fingerprinter` and Hamming `threshold`.
    #[must_use]
    pub fn new(fingerprinter: Arc<dyn ImageFingerprinter>, threshold: u32) -> Self {
        Self {
            fingerprinter,
            threshold,
            shutdown_flag: None,
        }
    }

    /// Skip remaining images once this flag is set.
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

    /// Fingerprint and cluster `images`.
    pub fn find_similar(&self, images: Vec<FileRecord>) -> MatchOutcome {
        let mut outcome = MatchOutcome::default();
        if images.len() < 2 {
            return outcome;
        }
        log::info!("Fingerprinting {} image(s)", images.len());

        let results: Vec<_> = images
            .into_par_iter()
            .map(|image| {
                if self.is_shutdown_requested() {
                    return (image, None);
                }
                let result = self.fingerprinter.fingerprint_file(&image.path);
                (image, Some(result))
            })
            .collect();

        let mut records = Vec::with_capacity(results.len());
        let mut fingerprints = Vec::with_capacity(results.len());
        for (image, result) in results {
            match result {
                Some(Ok(fp)) => {
                    log::trace!("Fingerprinted {}", image.path.display());
                    records.push(image);
                    fingerprints.push(fp);
                }
                Some(Err(e)) => {
                    outcome
                        .warnings
                        .push(ScanWarning::new(&image.path, Stage::Perceptual, e));
                }
                None => {}
            }
        }
        outcome.examined = records.len();

        for component in cluster_fingerprints(&fingerprints, self.threshold) {
            let confidence = confidence_for(component.max_distance, self.threshold);
            let files = component
                .members
                .iter()
                .map(|&i| records[i].clone())
                .collect();
            outcome.clusters.push(SimilarityCluster {
                method: DetectionMethod::Perceptual,
                confidence,
                files,
                distance: DistanceRange {
                    min: component.min_distance,
                    max: component.max_distance,
                },
            });
        }

        log::info!(
            "Perceptual matching: {} image(s) fingerprinted, {} cluster(s)",
            outcome.examined,
            outcome.clusters.len()
        );
        outcome
    }
}

/// High when every joining edge is within half the threshold.
fn confidence_for(max_distance: f64, threshold: u32) -> Confidence {
    if max_distance <= f64::from(threshold) / 2.0 {
        Confidence::High
    } else {
        Confidence::Medium
    }
}

/// Group fingerprints into connected components of the "distance ≤
/// `threshold`" graph. Indices refer to positions in `fingerprints`.
#[must_use]
pub fn cluster_fingerprints(fingerprints: &[PerceptualFingerprint], threshold: u32) -> Vec<Component> {
    let mut linker = Linker::new(fingerprints.len());
    let mut index = SimilarityIndex::new();
    let mut first_seen: HashMap<&[u8], usize> = HashMap::new();
    let mut distinct = Vec::new();

    for (i, fp) in fingerprints.iter().enumerate() {
        match first_seen.entry(fp.as_bytes()) {
            Entry::Occupied(seen) => linker.link(*seen.get(), i, 0.0),
            Entry::Vacant(slot) => {
                slot.insert(i);
                let entry = IndexedFingerprint {
                    index: i,
                    fingerprint: fp.clone(),
                };
                index.insert(entry.clone());
                distinct.push(entry);
            }
        }
    }

    for query in &distinct {
        for (distance, hit) in index.find(query, threshold) {
            if hit.index > query.index {
                linker.link(query.index, hit.index, f64::from(distance));
            }
        }
    }

    linker.components()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::PerceptualError;
    use image::DynamicImage;
    use std::path::{Path, PathBuf};
    use std::time::SystemTime;

    fn fp(bits: u64) -> PerceptualFingerprint {
        PerceptualFingerprint::from_bytes(&bits.to_be_bytes()).unwrap()
    }

    /// Fingerprinter keyed on file name, for tests that don't decode images.
    struct ByName(HashMap<PathBuf, u64>);

    impl ImageFingerprinter for ByName {
        fn fingerprint(&self, _image: &DynamicImage) -> PerceptualFingerprint {
            fp(0)
        }

        fn bits(&self) -> u32 {
            64
        }

        fn fingerprint_file(&self, path: &Path) -> Result<PerceptualFingerprint, PerceptualError> {
            match self.0.get(path) {
                Some(bits) => Ok(fp(*bits)),
                None => Err(PerceptualError::LoadError(
                    path.display().to_string(),
                    image::ImageError::IoError(std::io::Error::from(std::io::ErrorKind::NotFound)),
                )),
            }
        }
    }

    fn record(path: &str) -> FileRecord {
        FileRecord::new(PathBuf::from(path), 100, SystemTime::now())
    }

    #[test]
    fn test_chain_is_transitive() {
        // d(A,B) = 4, d(B,C) = 4, d(A,C) = 8 > 5
        let fps = vec![fp(0), fp(0b1111), fp(0b1111_1111)];
        assert!(fps[0].distance(&fps[2]) > 5);

        let components = cluster_fingerprints(&fps, 5);
        assert_eq!(components.len(), 1);
        assert_eq!(components[0].members, vec![0, 1, 2]);
        assert_eq!(components[0].min_distance, 4.0);
        assert_eq!(components[0].max_distance, 4.0);
    }

    #[test]
    fn test_identical_fingerprints_collapse() {
        let fps = vec![fp(42), fp(u64::MAX), fp(42), fp(42)];
        let components = cluster_fingerprints(&fps, 0);
        assert_eq!(components.len(), 1);
        assert_eq!(components[0].members, vec![0, 2, 3]);
        assert_eq!(components[0].max_distance, 0.0);
    }

    #[test]
    fn test_distant_fingerprints_stay_apart() {
        let fps = vec![fp(0), fp(u64::MAX), fp(0x00FF_00FF_00FF_00FF)];
        assert!(cluster_fingerprints(&fps, 5).is_empty());
    }

    #[test]
    fn test_confidence_for() {
        assert_eq!(confidence_for(0.0, 5), Confidence::High);
        assert_eq!(confidence_for(2.0, 5), Confidence::High);
        assert_eq!(confidence_for(3.0, 5), Confidence::Medium);
        assert_eq!(confidence_for(0.0, 0), Confidence::High);
    }

    #[test]
    fn test_find_similar_with_undecodable_image() {
        let mut table = HashMap::new();
        table.insert(PathBuf::from("/a.png"), 0u64);
        table.insert(PathBuf::from("/b.png"), 0b111u64);
        let matcher = PerceptualMatcher::new(Arc::new(ByName(table)), 5);

        let outcome =
            matcher.find_similar(vec![record("/a.png"), record("/broken.png"), record("/b.png")]);

        assert_eq!(outcome.examined, 2);
        assert_eq!(outcome.clusters.len(), 1);
        let cluster = &outcome.clusters[0];
        assert_eq!(cluster.method, DetectionMethod::Perceptual);
        assert_eq!(cluster.confidence, Confidence::Medium);
        assert_eq!(cluster.distance.max, 3.0);
        assert_eq!(outcome.warnings.len(), 1);
        assert_eq!(outcome.warnings[0].path, PathBuf::from("/broken.png"));
    }
}
