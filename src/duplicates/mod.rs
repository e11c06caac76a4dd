//! Duplicate detection pipeline.
//!
//! Exact detection narrows candidates in three steps that each read more
//! content than the last: size grouping, tiered hashing, byte verification.
//! Similarity detection runs alongside it for images (perceptual
//! fingerprints) and audio/video (tags and acoustic fingerprints). The
//! aggregator combines both into one [`DuplicateReport`].

pub mod clusters;
pub mod finder;
pub mod groups;
pub mod media;
pub mod report;
pub mod similar;
pub mod tiered;
pub mod union_find;
pub mod verify;

pub use clusters::{
    Confidence, DetectionMethod, DistanceRange, ExactCluster, MatchOutcome, ScanWarning,
    SimilarityCluster, Stage,
};
pub use finder::{DuplicateFinder, FinderError};
pub use groups::{group_by_size, GroupingStats, SizeGroup};
pub use media::MediaMatcher;
pub use report::{Aggregator, Cluster, DuplicateReport, KeepPolicy, ScanStats};
pub use similar::{cluster_fingerprints, PerceptualMatcher};
pub use tiered::{DigestBucket, TierStats, TieredHasher, TieredOutcome};
pub use union_find::{Component, Linker, UnionFind};
pub use verify::{ByteVerifier, VerifyOutcome, VERIFY_CHUNK_SIZE};
