//! Cluster and warning types shared by the pipeline stages.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::scanner::{Digest, FileRecord};

/// How a cluster was detected.
///
/// Variant order is the report's presentation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectionMethod {
    /// Size, full digest and byte comparison all agree.
    Exact,
    /// Acoustic fingerprints lie within the bit error threshold.
    Acoustic,
    /// Image fingerprints lie within the Hamming threshold.
    Perceptual,
    /// Duration and normalized tags agree.
    Metadata,
}

impl std::fmt::Display for DetectionMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Exact => write!(f, "exact"),
            Self::Acoustic => write!(f, "acoustic"),
            Self::Perceptual => write!(f, "perceptual"),
            Self::Metadata => write!(f, "metadata"),
        }
    }
}

/// How much a cluster can be trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    /// Byte-verified.
    Certain,
    /// Strong content evidence.
    High,
    /// Content evidence near the configured threshold.
    Medium,
    /// Tag evidence only.
    Low,
}

/// Smallest and largest distance among the edges that formed a cluster.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DistanceRange {
    /// Minimum observed distance
    pub min: f64,
    /// Maximum observed distance
    pub max: f64,
}

/// Files proven byte-identical.
#[derive(Debug, Clone, PartialEq)]
pub struct ExactCluster {
    /// Shared size in bytes
    pub size: u64,
    /// Shared full digest
    pub digest: Digest,
    /// Members, at least two
    pub files: Vec<FileRecord>,
}

/// Files judged probably-duplicate by a non-exact method.
#[derive(Debug, Clone, PartialEq)]
pub struct SimilarityCluster {
    /// Perceptual, acoustic or metadata
    pub method: DetectionMethod,
    /// Confidence tag
    pub confidence: Confidence,
    /// Members, at least two
    pub files: Vec<FileRecord>,
    /// Distances of the joining edges
    pub distance: DistanceRange,
}

/// Pipeline step that produced a warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    /// Reading the sampled windows
    PartialHash,
    /// Reading the whole file for the strong digest
    FullHash,
    /// Byte comparison
    Verify,
    /// Decoding an image
    Perceptual,
    /// Reading media tags or fingerprints
    Media,
}

/// A non-fatal per-file problem. The file was excluded from the step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanWarning {
    /// File concerned
    pub path: PathBuf,
    /// Step that failed
    pub stage: Stage,
    /// Human-readable cause
    pub message: String,
}

impl ScanWarning {
    /// Record a warning and log it.
    pub fn new(path: &Path, stage: Stage, message: impl std::fmt::Display) -> Self {
        let message = message.to_string();
        log::warn!("{}", message);
        Self {
            path: path.to_path_buf(),
            stage,
            message,
        }
    }
}

/// Output of a similarity matcher.
#[derive(Debug, Clone, Default)]
pub struct MatchOutcome {
    /// Clusters found
    pub clusters: Vec<SimilarityCluster>,
    /// Files skipped with a warning
    pub warnings: Vec<ScanWarning>,
    /// Records successfully examined
    pub examined: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_order_and_display() {
        assert!(DetectionMethod::Exact < DetectionMethod::Perceptual);
        assert!(DetectionMethod::Acoustic < DetectionMethod::Metadata);
        assert_eq!(DetectionMethod::Perceptual.to_string(), "perceptual");
    }

    #[test]
    fn test_warning_serializes_stage() {
        let warning = ScanWarning::new(Path::new("/x"), Stage::PartialHash, "gone");
        let json = serde_json::to_string(&warning).unwrap();
        assert!(json.contains("\"stage\":\"partial-hash\""));
        assert!(json.contains("\"message\":\"gone\""));
    }
}
