//! Scan configuration.
//!
//! Settings are layered with `figment`, later layers winning:
//!
//! 1. Built-in defaults ([`ScanConfig::default`])
//! 2. A TOML file (`--config FILE`, or the platform config directory)
//! 3. `DUPEHOUND_*` environment variables (e.g. `DUPEHOUND_PERCEPTUAL_THRESHOLD=8`)
//! 4. Command-line flags ([`ScanConfig::merge_scan_args`])
//!
//! [`ScanConfig::validate`] must pass before any file is read.
//!
//! # Example
//!
//! ```toml
//! full_hash_algorithm = "sha256"
//! perceptual_algorithm = "phash"
//! perceptual_threshold = 10
//! keep_policy = "oldest"
//! ```

use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cli::ScanArgs;
use crate::duplicates::KeepPolicy;
use crate::scanner::{
    DigestAlgorithm, PerceptualAlgorithm, DEFAULT_PARTIAL_WINDOW, FINGERPRINT_BITS,
};

/// Prefix of environment variables read as configuration.
pub const ENV_PREFIX: &str = "DUPEHOUND_";

/// Largest accepted partial digest window.
const MAX_PARTIAL_WINDOW: usize = 64 * 1024 * 1024;

/// Configuration problems. Always fatal, and always raised before scanning.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A setting holds a value outside its accepted range.
    #[error("Invalid value for '{field}': {message}")]
    Invalid {
        /// Offending setting
        field: &'static str,
        /// What is accepted instead
        message: String,
    },

    /// The configuration sources could not be parsed or merged.
    #[error("Failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),
}

/// Every tunable of a detection run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Bytes sampled from each end of a file for the partial digest
    pub partial_hash_window_bytes: usize,
    /// Algorithm of the partial digest
    pub partial_hash_algorithm: DigestAlgorithm,
    /// Algorithm of the full digest
    pub full_hash_algorithm: DigestAlgorithm,
    /// Perceptual fingerprint family for images
    pub perceptual_algorithm: PerceptualAlgorithm,
    /// Largest Hamming distance between similar images
    pub perceptual_threshold: u32,
    /// Largest duration difference between metadata matches, in seconds
    pub media_duration_tolerance_seconds: f64,
    /// Largest bit error rate between acoustic matches
    pub acoustic_match_threshold: f64,
    /// Whether to call chromaprint's `fpcalc` for acoustic fingerprints
    pub use_fpcalc: bool,
    /// Threads in the run's worker pool
    pub worker_pool_size: usize,
    /// Files smaller than this are ignored by exact detection
    pub min_file_size_bytes: u64,
    /// Files larger than this are ignored by exact detection (unbounded when unset)
    pub max_file_size_bytes: Option<u64>,
    /// Which cluster member to suggest keeping
    pub keep_policy: KeepPolicy,
    /// Whether to run perceptual image matching
    pub match_images: bool,
    /// Whether to run audio/video matching
    pub match_media: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            partial_hash_window_bytes: DEFAULT_PARTIAL_WINDOW,
            partial_hash_algorithm: DigestAlgorithm::Xxh64,
            full_hash_algorithm: DigestAlgorithm::Blake3,
            perceptual_algorithm: PerceptualAlgorithm::Dhash,
            perceptual_threshold: 5,
            media_duration_tolerance_seconds: 2.0,
            acoustic_match_threshold: 0.15,
            use_fpcalc: false,
            worker_pool_size: std::thread::available_parallelism().map_or(4, |n| n.get()),
            min_file_size_bytes: 1,
            max_file_size_bytes: None,
            keep_policy: KeepPolicy::First,
            match_images: true,
            match_media: true,
        }
    }
}

impl ScanConfig {
    /// Platform-specific default config file, e.g.
    /// `~/.config/dupehound/config.toml` on Linux.
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("org", "dupehound", "dupehound")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// The layered provider: defaults, then `path` if it exists, then
    /// environment.
    #[must_use]
    pub fn figment(path: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        if let Some(path) = path {
            figment = figment.merge(Toml::file(path));
        }
        figment.merge(Env::prefixed(ENV_PREFIX))
    }

    /// Load from an explicit file, or from the default location when
    /// `path` is `None`. A missing file contributes nothing.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Load`] if a source holds malformed values.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = path.map(Path::to_path_buf).or_else(Self::default_path);
        if let Some(p) = &path {
            log::debug!("Reading configuration from {}", p.display());
        }
        Self::figment(path.as_deref())
            .extract()
            .map_err(|e| ConfigError::Load(Box::new(e)))
    }

    /// Apply command-line overrides. Flags that were not given leave the
    /// current value untouched, except that `--perceptual` without
    /// `--threshold` also selects that algorithm's suggested threshold.
    pub fn merge_scan_args(&mut self, args: &ScanArgs) {
        if let Some(v) = args.min_size {
            self.min_file_size_bytes = v;
        }
        if let Some(v) = args.max_size {
            self.max_file_size_bytes = Some(v);
        }
        if let Some(v) = args.threads {
            self.worker_pool_size = v;
        }
        if let Some(v) = args.window {
            self.partial_hash_window_bytes = v;
        }
        if let Some(v) = args.partial_hash {
            self.partial_hash_algorithm = v;
        }
        if let Some(v) = args.full_hash {
            self.full_hash_algorithm = v;
        }
        if let Some(v) = args.perceptual {
            self.perceptual_algorithm = v;
            self.perceptual_threshold = v.default_threshold();
        }
        if let Some(v) = args.threshold {
            self.perceptual_threshold = v;
        }
        if let Some(v) = args.duration_tolerance {
            self.media_duration_tolerance_seconds = v;
        }
        if let Some(v) = args.keep {
            self.keep_policy = v;
        }
        if args.fpcalc {
            self.use_fpcalc = true;
        }
        if args.no_images {
            self.match_images = false;
        }
        if args.no_media {
            self.match_media = false;
        }
    }

    /// Check every setting against its accepted range.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError::Invalid`] found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.partial_hash_window_bytes == 0 || self.partial_hash_window_bytes > MAX_PARTIAL_WINDOW
        {
            return Err(invalid(
                "partial_hash_window_bytes",
                format!("must be between 1 and {MAX_PARTIAL_WINDOW}"),
            ));
        }
        if self
            .max_file_size_bytes
            .is_some_and(|max| max < self.min_file_size_bytes)
        {
            return Err(invalid(
                "max_file_size_bytes",
                format!("must not be below min_file_size_bytes ({})", self.min_file_size_bytes),
            ));
        }
        if self.perceptual_threshold >= FINGERPRINT_BITS {
            return Err(invalid(
                "perceptual_threshold",
                format!("must be below the fingerprint width of {FINGERPRINT_BITS} bits"),
            ));
        }
        let tolerance = self.media_duration_tolerance_seconds;
        if !tolerance.is_finite() || tolerance < 0.0 {
            return Err(invalid(
                "media_duration_tolerance_seconds",
                "must be a finite, non-negative number of seconds",
            ));
        }
        if !(0.0..=0.5).contains(&self.acoustic_match_threshold) {
            return Err(invalid(
                "acoustic_match_threshold",
                "must be a bit error rate between 0.0 and 0.5",
            ));
        }
        if self.worker_pool_size == 0 {
            return Err(invalid("worker_pool_size", "must be at least 1"));
        }
        Ok(())
    }
}

fn invalid(field: &'static str, message: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        message: message.into(),
    }
}
