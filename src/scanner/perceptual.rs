//! Perceptual image fingerprints for similarity detection.
//!
//! This module provides the [`ImageFingerprinter`] capability and its
//! `image_hasher`-backed implementation [`PerceptualHasher`]. Fingerprints
//! remain stable under resizing and recompression, so copies that are not
//! byte-identical still land within a small Hamming distance of each other.

use bk_tree::{BKTree, Metric};
use image::DynamicImage;
use image_hasher::{HashAlg, HasherConfig, ImageHash};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Side length of the hash grid; fingerprints are `HASH_SIZE * HASH_SIZE` bits.
const HASH_SIZE: u32 = 8;

/// Width of every [`PerceptualHasher`] fingerprint, in bits.
pub const FINGERPRINT_BITS: u32 = HASH_SIZE * HASH_SIZE;

/// Supported perceptual hashing algorithms.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum PerceptualAlgorithm {
    /// aHash (Average Hash) - Mean-based, fast but less resilient.
    Ahash,
    /// dHash (Difference Hash) - Gradient-based, very fast and effective.
    #[default]
    Dhash,
    /// pHash (Perceptual Hash) - DCT-based, most resilient to transformations.
    Phash,
}

impl PerceptualAlgorithm {
    /// Suggested similarity threshold (Hamming distance) for this algorithm.
    #[must_use]
    pub fn default_threshold(&self) -> u32 {
        match self {
            Self::Ahash => 5,
            Self::Dhash => 5,
            Self::Phash => 10,
        }
    }
}

impl std::fmt::Display for PerceptualAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ahash => write!(f, "aHash"),
            Self::Dhash => write!(f, "dHash"),
            Self::Phash => write!(f, "pHash"),
        }
    }
}

/// Errors that can occur during perceptual hashing.
#[derive(Debug, Error)]
pub enum PerceptualError {
    /// Failed to open or decode the image.
    #[error("Failed to load image {0}: {1}")]
    LoadError(String, #[source] image::ImageError),
}

/// Fixed-width bit vector derived from image content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PerceptualFingerprint(ImageHash);

impl PerceptualFingerprint {
    /// Build a fingerprint from raw bytes (8 bits per byte).
    ///
    /// Returns `None` for an empty slice.
    #[must_use]
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.is_empty() {
            return None;
        }
        ImageHash::from_bytes(bytes).ok().map(Self)
    }

    /// Hamming distance to another fingerprint of the same width.
    #[must_use]
    pub fn distance(&self, other: &Self) -> u32 {
        self.0.dist(&other.0)
    }

    /// Raw fingerprint bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    /// Width of the fingerprint in bits.
    #[must_use]
    pub fn bits(&self) -> u32 {
        self.0.as_bytes().len() as u32 * 8
    }
}

/// Produces a fixed-width fingerprint from a decoded image.
///
/// Implementations must return fingerprints of identical width for every
/// input so that Hamming distances are comparable.
pub trait ImageFingerprinter: Send + Sync {
    /// Fingerprint a decoded image.
    fn fingerprint(&self, image: &DynamicImage) -> PerceptualFingerprint;

    /// Width of every fingerprint this implementation produces, in bits.
    fn bits(&self) -> u32;

    /// Decode the image at `path` and fingerprint it.
    ///
    /// # Errors
    ///
    /// Returns [`PerceptualError::LoadError`] if the file cannot be read or
    /// decoded.
    fn fingerprint_file(&self, path: &Path) -> Result<PerceptualFingerprint, PerceptualError> {
        let img = image::open(path)
            .map_err(|e| PerceptualError::LoadError(path.display().to_string(), e))?;
        Ok(self.fingerprint(&img))
    }
}

/// Computes perceptual hashes for images with `image_hasher`.
pub struct PerceptualHasher {
    hasher: image_hasher::Hasher,
    algorithm: PerceptualAlgorithm,
}

impl PerceptualHasher {
    /// Create a new `PerceptualHasher` with the given algorithm.
    #[must_use]
    pub fn new(algorithm: PerceptualAlgorithm) -> Self {
        let mut config = HasherConfig::new().hash_size(HASH_SIZE, HASH_SIZE);

        match algorithm {
            PerceptualAlgorithm::Phash => {
                config = config.hash_alg(HashAlg::Median).preproc_dct();
            }
            PerceptualAlgorithm::Dhash => {
                config = config.hash_alg(HashAlg::Gradient);
            }
            PerceptualAlgorithm::Ahash => {
                config = config.hash_alg(HashAlg::Mean);
            }
        }

        Self {
            hasher: config.to_hasher(),
            algorithm,
        }
    }

    /// Get the algorithm used by this hasher.
    #[must_use]
    pub fn algorithm(&self) -> PerceptualAlgorithm {
        self.algorithm
    }
}

impl Default for PerceptualHasher {
    fn default() -> Self {
        Self::new(PerceptualAlgorithm::default())
    }
}

impl ImageFingerprinter for PerceptualHasher {
    fn fingerprint(&self, image: &DynamicImage) -> PerceptualFingerprint {
        PerceptualFingerprint(self.hasher.hash_image(image))
    }

    fn bits(&self) -> u32 {
        FINGERPRINT_BITS
    }
}

/// A fingerprint tagged with the position of its owner in the input slice.
#[derive(Debug, Clone)]
pub struct IndexedFingerprint {
    /// Index into the caller's record list
    pub index: usize,
    /// The fingerprint itself
    pub fingerprint: PerceptualFingerprint,
}

/// Metric for comparing fingerprints using Hamming distance.
#[derive(Default, Clone, Copy, Debug)]
pub struct HammingMetric;

impl Metric<IndexedFingerprint> for HammingMetric {
    fn distance(&self, a: &IndexedFingerprint, b: &IndexedFingerprint) -> u32 {
        a.fingerprint.distance(&b.fingerprint)
    }

    fn threshold_distance(
        &self,
        a: &IndexedFingerprint,
        b: &IndexedFingerprint,
        threshold: u32,
    ) -> Option<u32> {
        let d = self.distance(a, b);
        if d <= threshold {
            Some(d)
        } else {
            None
        }
    }
}

/// A neighbour index over distinct fingerprints using a BK-tree.
///
/// The tree stores one entry per distinct fingerprint value; callers must
/// collapse identical fingerprints before inserting.
pub struct SimilarityIndex {
    tree: BKTree<IndexedFingerprint, HammingMetric>,
    count: usize,
}

impl SimilarityIndex {
    /// Create a new empty similarity index.
    #[must_use]
    pub fn new() -> Self {
        Self {
            tree: BKTree::new(HammingMetric),
            count: 0,
        }
    }

    /// Add a fingerprint to the index.
    pub fn insert(&mut self, entry: IndexedFingerprint) {
        self.tree.add(entry);
        self.count += 1;
    }

    /// Find all entries within the given Hamming distance.
    ///
    /// Returns a list of (distance, entry) pairs, including `query` itself if
    /// it was inserted.
    #[must_use]
    pub fn find(
        &self,
        query: &IndexedFingerprint,
        max_distance: u32,
    ) -> Vec<(u32, &IndexedFingerprint)> {
        self.tree.find(query, max_distance).collect()
    }

    /// Returns the number of items in the index.
    #[must_use]
    pub fn len(&self) -> usize {
        self.count
    }

    /// Returns true if the index is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

impl Default for SimilarityIndex {
    fn default() -> Self {
        Self::new()
    }
}
