//! Audio/video metadata and acoustic fingerprint extraction.
//!
//! Two independent capabilities feed the media matcher:
//! - [`MetadataReader`]: duration, title, artist and album. The default
//!   [`TagReader`] reads container tags and stream properties with `lofty`.
//! - [`AcousticSource`]: an optional chromaprint-style fingerprint, a sequence
//!   of 32-bit sub-fingerprints. [`FpcalcSource`] shells out to `fpcalc -raw`;
//!   [`NoAcoustic`] disables fingerprinting.
//!
//! Every metadata field is optional. A missing field is not an error.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use lofty::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use unicode_normalization::UnicodeNormalization;

/// Shortest overlap (in sub-fingerprints) considered when aligning two
/// acoustic fingerprints.
const MIN_ALIGNED_ITEMS: usize = 8;

/// Largest shift (in sub-fingerprints) tried when aligning.
const MAX_ALIGN_OFFSET: usize = 32;

/// Errors raised while reading media content.
#[derive(Debug, Error)]
pub enum MediaError {
    /// The container could not be parsed.
    #[error("Failed to read media tags from {path}: {source}")]
    Unreadable {
        /// Offending file
        path: PathBuf,
        /// Underlying parser error
        #[source]
        source: lofty::error::LoftyError,
    },

    /// The acoustic fingerprinter failed on this file.
    #[error("Fingerprinting failed for {path}: {message}")]
    Fingerprint {
        /// Offending file
        path: PathBuf,
        /// What went wrong
        message: String,
    },
}

/// Structured metadata of an audio or video file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaMetadata {
    /// Playback duration, if the container reports one
    pub duration: Option<Duration>,
    /// Track title
    pub title: Option<String>,
    /// Track artist
    pub artist: Option<String>,
    /// Album name
    pub album: Option<String>,
}

impl MediaMetadata {
    /// Builder-style constructor used by readers and tests.
    #[must_use]
    pub fn new(duration_secs: Option<f64>, title: Option<&str>, artist: Option<&str>) -> Self {
        Self {
            duration: duration_secs.map(Duration::from_secs_f64),
            title: title.map(str::to_string),
            artist: artist.map(str::to_string),
            album: None,
        }
    }

    /// Set the album.
    #[must_use]
    pub fn with_album(mut self, album: &str) -> Self {
        self.album = Some(album.to_string());
        self
    }
}

/// Extracts [`MediaMetadata`] from a media file.
pub trait MetadataReader: Send + Sync {
    /// Read metadata for the file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`MediaError`] when the content cannot be parsed at all.
    fn read(&self, path: &Path) -> Result<MediaMetadata, MediaError>;
}

/// Reads tags and stream properties with `lofty`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TagReader;

impl MetadataReader for TagReader {
    fn read(&self, path: &Path) -> Result<MediaMetadata, MediaError> {
        let tagged = lofty::read_from_path(path).map_err(|source| MediaError::Unreadable {
            path: path.to_path_buf(),
            source,
        })?;

        let duration = Some(tagged.properties().duration()).filter(|d| !d.is_zero());
        let tag = tagged.primary_tag().or_else(|| tagged.first_tag());

        Ok(MediaMetadata {
            duration,
            title: tag.and_then(|t| t.title().map(|s| s.into_owned())),
            artist: tag.and_then(|t| t.artist().map(|s| s.into_owned())),
            album: tag.and_then(|t| t.album().map(|s| s.into_owned())),
        })
    }
}

/// Chromaprint-style acoustic fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcousticFingerprint(pub Vec<u32>);

impl AcousticFingerprint {
    /// Lowest bit error rate over all alignments of the two sequences.
    ///
    /// Returns `None` when no alignment overlaps enough items to compare.
    #[must_use]
    pub fn bit_error_rate(&self, other: &Self) -> Option<f64> {
        let (a, b) = (&self.0, &other.0);
        let min_overlap = MIN_ALIGNED_ITEMS.min(a.len()).min(b.len());
        if min_overlap == 0 {
            return None;
        }

        let mut best: Option<f64> = None;
        let max_shift = MAX_ALIGN_OFFSET.min(a.len().max(b.len()));
        for shift in 0..=max_shift {
            for (x, y) in [(a, b), (b, a)] {
                if shift >= x.len() {
                    continue;
                }
                let overlap = (x.len() - shift).min(y.len());
                if overlap < min_overlap {
                    continue;
                }
                let differing: u32 = x[shift..shift + overlap]
                    .iter()
                    .zip(&y[..overlap])
                    .map(|(p, q)| (p ^ q).count_ones())
                    .sum();
                let rate = f64::from(differing) / (overlap as f64 * 32.0);
                best = Some(best.map_or(rate, |cur| cur.min(rate)));
            }
        }
        best
    }
}

/// Produces an optional acoustic fingerprint for a media file.
pub trait AcousticSource: Send + Sync {
    /// Fingerprint the file at `path`. `Ok(None)` means "not available".
    ///
    /// # Errors
    ///
    /// Returns [`MediaError::Fingerprint`] when a fingerprinter exists but
    /// fails on this file.
    fn fingerprint(&self, path: &Path) -> Result<Option<AcousticFingerprint>, MediaError>;
}

/// Acoustic source that never produces a fingerprint.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoAcoustic;

impl AcousticSource for NoAcoustic {
    fn fingerprint(&self, _path: &Path) -> Result<Option<AcousticFingerprint>, MediaError> {
        Ok(None)
    }
}

/// Runs chromaprint's `fpcalc -raw` on each file.
#[derive(Debug, Clone)]
pub struct FpcalcSource {
    program: PathBuf,
    length_secs: u32,
}

impl Default for FpcalcSource {
    fn default() -> Self {
        Self {
            program: PathBuf::from("fpcalc"),
            length_secs: 120,
        }
    }
}

impl FpcalcSource {
    /// Use a specific `fpcalc` executable.
    #[must_use]
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }
}

impl AcousticSource for FpcalcSource {
    fn fingerprint(&self, path: &Path) -> Result<Option<AcousticFingerprint>, MediaError> {
        let output = match Command::new(&self.program)
            .arg("-raw")
            .arg("-length")
            .arg(self.length_secs.to_string())
            .arg(path)
            .output()
        {
            Ok(output) => output,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::trace!("fpcalc not installed, skipping {}", path.display());
                return Ok(None);
            }
            Err(e) => {
                return Err(MediaError::Fingerprint {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                })
            }
        };

        if !output.status.success() {
            return Err(MediaError::Fingerprint {
                path: path.to_path_buf(),
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(parse_fpcalc_output(&String::from_utf8_lossy(&output.stdout)))
    }
}

/// Parse the `FINGERPRINT=` line of `fpcalc -raw` output.
///
/// Older fpcalc releases print signed values; both forms are accepted.
#[must_use]
pub fn parse_fpcalc_output(output: &str) -> Option<AcousticFingerprint> {
    let raw = output
        .lines()
        .find_map(|line| line.trim().strip_prefix("FINGERPRINT="))?;
    let items: Option<Vec<u32>> = raw
        .split(',')
        .map(|v| v.trim().parse::<i64>().ok().map(|n| n as u32))
        .collect();
    items.filter(|v| !v.is_empty()).map(AcousticFingerprint)
}

/// Canonical form of a tag value for comparison: NFKC, lowercase, single
/// spaces. Blank values normalize to `None`.
#[must_use]
pub fn normalize_text(value: &str) -> Option<String> {
    let folded: String = value.nfkc().collect::<String>().to_lowercase();
    let collapsed = folded.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        None
    } else {
        Some(collapsed)
    }
}
