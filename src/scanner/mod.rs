//! Scanner module for file records, content hashing and media fingerprints.
//!
//! This module provides functionality for:
//! - The immutable [`FileRecord`] descriptor fed into the detection pipeline
//! - Directory walking using walkdir (the traversal collaborator)
//! - Partial and full content digests (xxHash64, BLAKE3, SHA-256)
//! - Perceptual image fingerprints
//! - Audio/video metadata and acoustic fingerprint extraction
//!
//! # Architecture
//!
//! The scanner is divided into submodules:
//! - [`walker`]: Directory traversal and file discovery
//! - [`hasher`]: Tiered digests over file content (streaming)
//! - [`perceptual`]: Fixed-width fingerprints of decoded images
//! - [`media`]: Tags, duration and acoustic fingerprints of audio/video
//!
//! # Example
//!
//! ```no_run
//! use dupehound::scanner::Walker;
//! use std::path::Path;
//!
//! let walker = Walker::new(Path::new("."));
//! for entry in walker.walk() {
//!     match entry {
//!         Ok(record) => println!("{}: {} bytes", record.path.display(), record.size),
//!         Err(e) => eprintln!("Warning: {}", e),
//!     }
//! }
//! ```

pub mod hasher;
pub mod media;
pub mod perceptual;
pub mod walker;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

// Re-export main types
pub use hasher::{digest_to_hex, Digest, DigestAlgorithm, Hasher, DEFAULT_PARTIAL_WINDOW};
pub use media::{
    AcousticFingerprint, AcousticSource, FpcalcSource, MediaError, MediaMetadata,
    MetadataReader, NoAcoustic, TagReader,
};
pub use perceptual::{
    ImageFingerprinter, PerceptualAlgorithm, PerceptualError, PerceptualFingerprint,
    PerceptualHasher, FINGERPRINT_BITS,
};
pub use walker::Walker;

const IMAGE_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "bmp", "tif", "tiff", "webp",
];
const AUDIO_EXTENSIONS: &[&str] = &[
    "mp3", "flac", "wav", "ogg", "oga", "opus", "m4a", "aac", "aiff", "aif", "wma", "ape",
];
const VIDEO_EXTENSIONS: &[&str] = &[
    "mp4", "m4v", "mkv", "mov", "avi", "wmv", "flv", "webm",
];

/// Coarse content category of a file, assigned by traversal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    /// Anything that is not recognised as media.
    #[default]
    Generic,
    /// Still image, eligible for perceptual matching.
    Image,
    /// Audio, eligible for metadata/acoustic matching.
    Audio,
    /// Video, eligible for metadata/acoustic matching.
    Video,
}

impl FileKind {
    /// Classify a path by its (case-insensitive) extension.
    #[must_use]
    pub fn from_path(path: &Path) -> Self {
        let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
            return Self::Generic;
        };
        let ext = ext.to_ascii_lowercase();
        if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
            Self::Image
        } else if AUDIO_EXTENSIONS.contains(&ext.as_str()) {
            Self::Audio
        } else if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
            Self::Video
        } else {
            Self::Generic
        }
    }

    /// Whether this kind goes to the media fingerprint matcher.
    #[must_use]
    pub fn is_av(self) -> bool {
        matches!(self, Self::Audio | Self::Video)
    }
}

/// Immutable descriptor of a discovered file.
///
/// Created by traversal and consumed read-only by every pipeline stage.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileRecord {
    /// Absolute path to the file
    pub path: PathBuf,
    /// File size in bytes
    pub size: u64,
    /// Last modification time, which may predate the Unix epoch
    #[serde(with = "epoch_time")]
    pub modified: SystemTime,
    /// Content category
    pub kind: FileKind,
}

impl FileRecord {
    /// Create a new record, tagging the kind from the path's extension.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the file
    /// * `size` - File size in bytes
    /// * `modified` - Last modification time
    #[must_use]
    pub fn new(path: PathBuf, size: u64, modified: SystemTime) -> Self {
        let kind = FileKind::from_path(&path);
        Self {
            path,
            size,
            modified,
            kind,
        }
    }

    /// Override the content category.
    #[must_use]
    pub fn with_kind(mut self, kind: FileKind) -> Self {
        self.kind = kind;
        self
    }
}

/// Serde representation of a [`SystemTime`] that also covers pre-1970 times.
///
/// Keeps serde's own `secs_since_epoch`/`nanos_since_epoch` shape but with
/// signed seconds: a time before the epoch has negative seconds and a
/// non-negative nanosecond part, so `-1.25s` is `{-2, 750_000_000}`.
mod epoch_time {
    use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
    use std::time::{Duration, SystemTime, UNIX_EPOCH};

    const NANOS_PER_SEC: u32 = 1_000_000_000;

    #[derive(Serialize, Deserialize)]
    struct EpochTime {
        secs_since_epoch: i64,
        nanos_since_epoch: u32,
    }

    pub fn serialize<S: Serializer>(time: &SystemTime, serializer: S) -> Result<S::Ok, S::Error> {
        let (secs, nanos) = match time.duration_since(UNIX_EPOCH) {
            Ok(after) => (
                i64::try_from(after.as_secs()).unwrap_or(i64::MAX),
                after.subsec_nanos(),
            ),
            Err(before) => {
                let before = before.duration();
                let secs = i64::try_from(before.as_secs()).unwrap_or(i64::MAX);
                match before.subsec_nanos() {
                    0 => (-secs, 0),
                    n => (-secs - 1, NANOS_PER_SEC - n),
                }
            }
        };
        EpochTime {
            secs_since_epoch: secs,
            nanos_since_epoch: nanos,
        }
        .serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<SystemTime, D::Error> {
        let raw = EpochTime::deserialize(deserializer)?;
        if raw.nanos_since_epoch >= NANOS_PER_SEC {
            return Err(de::Error::custom("nanos_since_epoch out of range"));
        }
        let whole = Duration::from_secs(raw.secs_since_epoch.unsigned_abs());
        let base = if raw.secs_since_epoch >= 0 {
            UNIX_EPOCH.checked_add(whole)
        } else {
            UNIX_EPOCH.checked_sub(whole)
        };
        base.and_then(|t| t.checked_add(Duration::from_nanos(u64::from(raw.nanos_since_epoch))))
            .ok_or_else(|| de::Error::custom("modification time out of range"))
    }
}

/// Errors that can occur during directory scanning.
#[derive(thiserror::Error, Debug)]
pub enum ScanError {
    /// Permission was denied when accessing a file or directory.
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),

    /// The specified path was not found.
    #[error("Path not found: {0}")]
    NotFound(PathBuf),

    /// An I/O error occurred while accessing a file.
    #[error("I/O error for {path}: {source}")]
    Io {
        /// Path where the error occurred
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },
}

/// Errors that can occur while reading file content for hashing or verification.
#[derive(thiserror::Error, Debug)]
pub enum HashError {
    /// The file disappeared after enumeration.
    #[error("File not found: {0}")]
    NotFound(PathBuf),

    /// Permission was denied when reading the file.
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),

    /// The read was abandoned because the scan was cancelled.
    #[error("Interrupted while reading: {0}")]
    Interrupted(PathBuf),

    /// An I/O error occurred while reading the file.
    #[error("I/O error for {path}: {source}")]
    Io {
        /// Path where the error occurred
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },
}

impl HashError {
    /// Classify an I/O error raised while reading `path`.
    #[must_use]
    pub fn from_io(path: &Path, source: std::io::Error) -> Self {
        match source.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(path.to_path_buf()),
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied(path.to_path_buf()),
            std::io::ErrorKind::Interrupted => Self::Interrupted(path.to_path_buf()),
            _ => Self::Io {
                path: path.to_path_buf(),
                source,
            },
        }
    }

    /// Path of the file that failed.
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Self::NotFound(p) | Self::PermissionDenied(p) | Self::Interrupted(p) => p,
            Self::Io { path, .. } => path,
        }
    }
}
