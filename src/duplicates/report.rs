//! Final report assembly.
//!
//! The [`Aggregator`] is the only writer of a [`DuplicateReport`]. It takes
//! exact and similarity clusters as independent dimensions (one file may
//! sit in an exact cluster and a perceptual one), chooses which member to
//! keep, computes reclaimable bytes and puts everything in canonical order:
//! members by path, clusters by method, then reclaimable bytes descending,
//! then first member path.

use std::cmp::Reverse;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::clusters::{
    Confidence, DetectionMethod, DistanceRange, ExactCluster, ScanWarning, SimilarityCluster,
};
use crate::scanner::{digest_to_hex, FileRecord};

/// Which member of a cluster is suggested for keeping.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum KeepPolicy {
    /// First member by path.
    #[default]
    First,
    /// Earliest modification time.
    Oldest,
    /// Latest modification time.
    Newest,
    /// Shortest path.
    ShortestPath,
}

impl KeepPolicy {
    /// Index of the member to keep. `files` must be non-empty and sorted by
    /// path; ties resolve to the earliest index.
    #[must_use]
    pub fn choose(self, files: &[FileRecord]) -> usize {
        let pick = match self {
            Self::First => None,
            Self::Oldest => files
                .iter()
                .enumerate()
                .min_by_key(|(i, f)| (f.modified, *i))
                .map(|(i, _)| i),
            Self::Newest => files
                .iter()
                .enumerate()
                .min_by_key(|(i, f)| (Reverse(f.modified), *i))
                .map(|(i, _)| i),
            Self::ShortestPath => files
                .iter()
                .enumerate()
                .min_by_key(|(i, f)| (f.path.as_os_str().len(), *i))
                .map(|(i, _)| i),
        };
        pick.unwrap_or(0)
    }
}

/// One entry of the report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Cluster {
    /// Detection method
    pub method: DetectionMethod,
    /// Confidence tag
    pub confidence: Confidence,
    /// Members ordered by path
    pub files: Vec<FileRecord>,
    /// Index into `files` of the member to keep
    pub keep: usize,
    /// Bytes freed by deleting every member except `keep`
    pub reclaimable_bytes: u64,
    /// Full digest as hex, exact clusters only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
    /// Distances of joining edges, similarity clusters only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance: Option<DistanceRange>,
}

impl Cluster {
    fn build(
        method: DetectionMethod,
        confidence: Confidence,
        mut files: Vec<FileRecord>,
        policy: KeepPolicy,
    ) -> Self {
        files.sort_by(|a, b| a.path.cmp(&b.path));
        let keep = policy.choose(&files);
        let total: u64 = files.iter().map(|f| f.size).sum();
        let reclaimable_bytes = total - files.get(keep).map_or(0, |f| f.size);
        Self {
            method,
            confidence,
            files,
            keep,
            reclaimable_bytes,
            digest: None,
            distance: None,
        }
    }

    /// The member suggested for keeping.
    #[must_use]
    pub fn kept(&self) -> &FileRecord {
        &self.files[self.keep]
    }

    /// Member paths in order.
    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.files.iter().map(|f| f.path.as_path())
    }

    /// Number of members.
    #[must_use]
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Always false for clusters produced by the pipeline.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Counters gathered across a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScanStats {
    /// Records received
    pub total_files: usize,
    /// Combined size of all records
    pub total_bytes: u64,
    /// Records skipped by the minimum size
    pub below_min_size: usize,
    /// Records skipped by the maximum size
    pub above_max_size: usize,
    /// Distinct sizes among eligible records
    pub unique_sizes: usize,
    /// Records sharing their size with another
    pub size_candidates: usize,
    /// Combined size of those records
    pub candidate_bytes: u64,
    /// Records given a partial digest
    pub partial_hashed: usize,
    /// Records ruled out by a unique partial digest
    pub eliminated_by_partial: usize,
    /// Records given a full digest
    pub full_hashed: usize,
    /// Bytes read for full digests
    pub bytes_fully_hashed: u64,
    /// Images successfully fingerprinted
    pub images_fingerprinted: usize,
    /// Media records successfully examined
    pub media_examined: usize,
    /// Exact clusters in the report
    pub exact_clusters: usize,
    /// Similarity clusters in the report
    pub similarity_clusters: usize,
    /// Bytes reclaimable from exact clusters
    pub reclaimable_bytes: u64,
    /// Wall time of the run
    pub duration: Duration,
}

/// Result of one detection run.
#[derive(Debug, Clone, Serialize)]
pub struct DuplicateReport {
    /// Clusters in canonical order
    pub clusters: Vec<Cluster>,
    /// At most one warning per path
    pub warnings: Vec<ScanWarning>,
    /// Counters
    pub stats: ScanStats,
    /// Whether the run was cancelled before finishing
    pub interrupted: bool,
}

impl DuplicateReport {
    /// Byte-verified clusters.
    pub fn exact_clusters(&self) -> impl Iterator<Item = &Cluster> {
        self.clusters
            .iter()
            .filter(|c| c.method == DetectionMethod::Exact)
    }

    /// Clusters of the given method.
    pub fn clusters_by(&self, method: DetectionMethod) -> impl Iterator<Item = &Cluster> {
        self.clusters.iter().filter(move |c| c.method == method)
    }

    /// Whether any cluster was found.
    #[must_use]
    pub fn has_duplicates(&self) -> bool {
        !self.clusters.is_empty()
    }

    /// Clusters that contain `path`.
    pub fn clusters_containing<'a>(&'a self, path: &'a Path) -> impl Iterator<Item = &'a Cluster> {
        self.clusters
            .iter()
            .filter(move |c| c.files.iter().any(|f| f.path == path))
    }
}

/// Collects stage output and produces the report.
#[derive(Debug, Default)]
pub struct Aggregator {
    keep_policy: KeepPolicy,
    clusters: Vec<Cluster>,
    warnings: Vec<ScanWarning>,
}

impl Aggregator {
    /// Create an aggregator applying `keep_policy`.
    #[must_use]
    pub fn new(keep_policy: KeepPolicy) -> Self {
        Self {
            keep_policy,
            ..Self::default()
        }
    }

    /// Add byte-verified clusters.
    pub fn add_exact(&mut self, clusters: Vec<ExactCluster>) {
        for exact in clusters {
            let mut cluster = Cluster::build(
                DetectionMethod::Exact,
                Confidence::Certain,
                exact.files,
                self.keep_policy,
            );
            cluster.digest = Some(digest_to_hex(&exact.digest));
            self.clusters.push(cluster);
        }
    }

    /// Add clusters from a similarity matcher.
    pub fn add_similar(&mut self, clusters: Vec<SimilarityCluster>) {
        for similar in clusters {
            let mut cluster = Cluster::build(
                similar.method,
                similar.confidence,
                similar.files,
                self.keep_policy,
            );
            cluster.distance = Some(similar.distance);
            self.clusters.push(cluster);
        }
    }

    /// Add per-file warnings.
    pub fn add_warnings(&mut self, warnings: impl IntoIterator<Item = ScanWarning>) {
        self.warnings.extend(warnings);
    }

    /// Order everything canonically and freeze the report.
    ///
    /// When a path carries warnings from several stages, only the one from
    /// the earliest stage is kept.
    #[must_use]
    pub fn finish(mut self, mut stats: ScanStats, interrupted: bool) -> DuplicateReport {
        self.clusters.sort_by(|a, b| {
            a.method
                .cmp(&b.method)
                .then_with(|| b.reclaimable_bytes.cmp(&a.reclaimable_bytes))
                .then_with(|| a.files[0].path.cmp(&b.files[0].path))
        });

        self.warnings
            .sort_by(|a, b| a.path.cmp(&b.path).then(a.stage.cmp(&b.stage)));
        self.warnings.dedup_by(|later, first| later.path == first.path);

        stats.exact_clusters = self
            .clusters
            .iter()
            .filter(|c| c.method == DetectionMethod::Exact)
            .count();
        stats.similarity_clusters = self.clusters.len() - stats.exact_clusters;
        stats.reclaimable_bytes = self
            .clusters
            .iter()
            .filter(|c| c.method == DetectionMethod::Exact)
            .map(|c| c.reclaimable_bytes)
            .sum();

        DuplicateReport {
            clusters: self.clusters,
            warnings: self.warnings,
            stats,
            interrupted,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::duplicates::clusters::Stage;
    use std::path::PathBuf;
    use std::time::SystemTime;

    fn file(path: &str, size: u64, age_secs: u64) -> FileRecord {
        FileRecord::new(
            PathBuf::from(path),
            size,
            SystemTime::UNIX_EPOCH + Duration::from_secs(1_000_000 - age_secs),
        )
    }

    #[test]
    fn test_keep_policy_choose() {
        let files = vec![
            file("/a/long/name.txt", 10, 5),
            file("/b.txt", 10, 50),
            file("/c/x.txt", 10, 1),
        ];
        assert_eq!(KeepPolicy::First.choose(&files), 0);
        assert_eq!(KeepPolicy::Oldest.choose(&files), 1);
        assert_eq!(KeepPolicy::Newest.choose(&files), 2);
        assert_eq!(KeepPolicy::ShortestPath.choose(&files), 1);
    }

    #[test]
    fn test_exact_cluster_ordering_and_reclaim() {
        let mut agg = Aggregator::new(KeepPolicy::First);
        agg.add_exact(vec![
            ExactCluster {
                size: 10,
                digest: [1; 32],
                files: vec![file("/z", 10, 0), file("/y", 10, 0)],
            },
            ExactCluster {
                size: 100,
                digest: [2; 32],
                files: vec![file("/q", 100, 0), file("/p", 100, 0), file("/r", 100, 0)],
            },
        ]);
        agg.add_similar(vec![SimilarityCluster {
            method: DetectionMethod::Perceptual,
            confidence: Confidence::High,
            files: vec![file("/img2.jpg", 500, 0), file("/img1.jpg", 700, 0)],
            distance: DistanceRange { min: 1.0, max: 1.0 },
        }]);

        let report = agg.finish(ScanStats::default(), false);

        assert_eq!(report.clusters.len(), 3);
        assert_eq!(report.clusters[0].reclaimable_bytes, 200);
        assert_eq!(report.clusters[0].files[0].path, PathBuf::from("/p"));
        assert_eq!(report.clusters[1].reclaimable_bytes, 10);
        assert_eq!(report.clusters[1].kept().path, PathBuf::from("/y"));
        assert_eq!(report.clusters[2].method, DetectionMethod::Perceptual);
        assert_eq!(report.clusters[2].kept().path, PathBuf::from("/img1.jpg"));
        assert_eq!(report.clusters[2].reclaimable_bytes, 500);
        assert_eq!(report.stats.exact_clusters, 2);
        assert_eq!(report.stats.similarity_clusters, 1);
        assert_eq!(report.stats.reclaimable_bytes, 210);
        assert!(report.clusters[0].digest.is_some());
        assert!(report.clusters[0].distance.is_none());
    }

    #[test]
    fn test_same_file_in_exact_and_similarity_clusters() {
        let mut agg = Aggregator::new(KeepPolicy::First);
        agg.add_exact(vec![ExactCluster {
            size: 5,
            digest: [0; 32],
            files: vec![file("/a.png", 5, 0), file("/b.png", 5, 0)],
        }]);
        agg.add_similar(vec![SimilarityCluster {
            method: DetectionMethod::Perceptual,
            confidence: Confidence::High,
            files: vec![file("/a.png", 5, 0), file("/c.png", 9, 0)],
            distance: DistanceRange { min: 2.0, max: 2.0 },
        }]);

        let report = agg.finish(ScanStats::default(), false);
        assert_eq!(report.clusters_containing(Path::new("/a.png")).count(), 2);
        assert_eq!(report.clusters_by(DetectionMethod::Perceptual).count(), 1);
    }

    #[test]
    fn test_warnings_deduplicated_by_path() {
        let mut agg = Aggregator::new(KeepPolicy::First);
        agg.add_warnings(vec![
            ScanWarning::new(Path::new("/b"), Stage::Perceptual, "decode"),
            ScanWarning::new(Path::new("/a"), Stage::Media, "tags"),
            ScanWarning::new(Path::new("/b"), Stage::PartialHash, "gone"),
        ]);

        let report = agg.finish(ScanStats::default(), true);
        assert!(report.interrupted);
        assert!(!report.has_duplicates());
        assert_eq!(report.warnings.len(), 2);
        assert_eq!(report.warnings[0].path, PathBuf::from("/a"));
        assert_eq!(report.warnings[1].stage, Stage::PartialHash);
    }

    #[test]
    fn test_report_serializes() {
        let mut agg = Aggregator::new(KeepPolicy::ShortestPath);
        agg.add_exact(vec![ExactCluster {
            size: 3,
            digest: [0xab; 32],
            files: vec![file("/x", 3, 0), file("/yy", 3, 0)],
        }]);
        let report = agg.finish(ScanStats::default(), false);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["clusters"][0]["method"], "exact");
        assert_eq!(json["clusters"][0]["confidence"], "certain");
        assert_eq!(json["clusters"][0]["keep"], 0);
        assert!(json["clusters"][0]["digest"]
            .as_str()
            .unwrap()
            .starts_with("abab"));
        assert!(json["clusters"][0].get("distance").is_none());
        assert_eq!(json["interrupted"], false);
    }
}
