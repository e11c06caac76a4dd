//! Command-line interface definitions for dupehound.
//!
//! # Example
//!
//! ```bash
//! # Scan two trees and print the report as JSON
//! dupehound scan ~/Pictures /mnt/backup/Pictures
//!
//! # Ignore files under 1 MiB, verify with SHA-256, keep the oldest copy
//! dupehound scan ~/Downloads --min-size 1MiB --full-hash sha256 --keep oldest
//!
//! # Print the effective configuration
//! dupehound config
//! ```

use bytesize::ByteSize;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::duplicates::KeepPolicy;
use crate::scanner::{DigestAlgorithm, PerceptualAlgorithm};

/// Duplicate and near-duplicate file finder.
///
/// Exact duplicates are confirmed by size, tiered hashing and byte comparison.
/// Images are matched by perceptual fingerprint, audio and video by tags and
/// optional acoustic fingerprint.
#[derive(Debug, Parser)]
#[command(name = "dupehound")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase verbosity level (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Configuration file (default: platform config directory)
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Print fatal errors as JSON on stderr
    #[arg(long, global = true)]
    pub json_errors: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Scan directories for duplicate files
    Scan(ScanArgs),
    /// Print the effective configuration and exit
    Config,
}

/// Arguments for the scan subcommand.
///
/// Every option overrides the configuration file and environment.
#[derive(Debug, Args, Default)]
pub struct ScanArgs {
    /// Directories to scan
    #[arg(value_name = "PATH", required = true, num_args = 1..)]
    pub paths: Vec<PathBuf>,

    /// Minimum file size for exact detection (e.g. 1KB, 4KiB, 1MB)
    #[arg(long, value_name = "SIZE", value_parser = parse_size)]
    pub min_size: Option<u64>,

    /// Maximum file size for exact detection (e.g. 10GiB)
    #[arg(long, value_name = "SIZE", value_parser = parse_size)]
    pub max_size: Option<u64>,

    /// Worker threads (default: available parallelism)
    #[arg(long, value_name = "N")]
    pub threads: Option<usize>,

    /// Bytes sampled from each end of a file for the partial digest
    #[arg(long, value_name = "BYTES")]
    pub window: Option<usize>,

    /// Partial digest algorithm
    #[arg(long, value_enum, value_name = "ALG")]
    pub partial_hash: Option<DigestAlgorithm>,

    /// Full digest algorithm
    #[arg(long, value_enum, value_name = "ALG")]
    pub full_hash: Option<DigestAlgorithm>,

    /// Perceptual hash family for images
    #[arg(long, value_enum, value_name = "ALG")]
    pub perceptual: Option<PerceptualAlgorithm>,

    /// Largest Hamming distance between similar images (default: suggested
    /// value for the perceptual algorithm)
    #[arg(long, value_name = "T")]
    pub threshold: Option<u32>,

    /// Largest duration difference between media metadata matches, in seconds
    #[arg(long, value_name = "SECS")]
    pub duration_tolerance: Option<f64>,

    /// Which member of each cluster to suggest keeping
    #[arg(long, value_enum, value_name = "POLICY")]
    pub keep: Option<KeepPolicy>,

    /// Skip perceptual image matching
    #[arg(long)]
    pub no_images: bool,

    /// Skip audio/video matching
    #[arg(long)]
    pub no_media: bool,

    /// Use chromaprint's fpcalc for acoustic fingerprints
    #[arg(long)]
    pub fpcalc: bool,
}

/// Parse a human-readable size string into bytes.
///
/// Decimal (`KB`, `MB`) and binary (`KiB`, `MiB`) suffixes are accepted,
/// case-insensitively. A bare number is a byte count.
///
/// ```
/// use dupehound::cli::parse_size;
///
/// assert_eq!(parse_size("1024").unwrap(), 1024);
/// assert_eq!(parse_size("1KiB").unwrap(), 1024);
/// assert_eq!(parse_size("1MB").unwrap(), 1_000_000);
/// ```
///
/// # Errors
///
/// Returns a message if the string is not a size.
pub fn parse_size(s: &str) -> Result<u64, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("Size cannot be empty".to_string());
    }
    s.parse::<ByteSize>()
        .map(|size| size.as_u64())
        .map_err(|e| format!("Invalid size '{s}': {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("1024").unwrap(), 1024);
        assert_eq!(parse_size("0").unwrap(), 0);
        assert_eq!(parse_size("1KiB").unwrap(), 1_024);
        assert_eq!(parse_size("1MB").unwrap(), 1_000_000);
        assert_eq!(parse_size("1MiB").unwrap(), 1_048_576);
        assert_eq!(parse_size("  2KB ").unwrap(), 2_000);
    }

    #[test]
    fn test_parse_size_errors() {
        assert!(parse_size("").is_err());
        assert!(parse_size("abc").is_err());
        assert!(parse_size("-1MB").is_err());
    }

    #[test]
    fn test_cli_parse_scan_basic() {
        let cli = Cli::try_parse_from(["dupehound", "scan", "/some/path"]).unwrap();
        assert_eq!(cli.verbose, 0);
        match cli.command {
            Commands::Scan(args) => {
                assert_eq!(args.paths, vec![PathBuf::from("/some/path")]);
                assert!(args.min_size.is_none());
                assert!(args.max_size.is_none());
                assert!(!args.no_media);
            }
            Commands::Config => panic!("Expected Scan command"),
        }
    }

    #[test]
    fn test_cli_parse_scan_with_options() {
        let cli = Cli::try_parse_from([
            "dupehound",
            "-vv",
            "--config",
            "/etc/dh.toml",
            "scan",
            "/a",
            "/b",
            "--min-size",
            "4KiB",
            "--max-size",
            "2GiB",
            "--threads",
            "3",
            "--full-hash",
            "sha256",
            "--perceptual",
            "phash",
            "--threshold",
            "8",
            "--keep",
            "shortest-path",
            "--no-media",
            "--fpcalc",
        ])
        .unwrap();

        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.config, Some(PathBuf::from("/etc/dh.toml")));
        match cli.command {
            Commands::Scan(args) => {
                assert_eq!(args.paths.len(), 2);
                assert_eq!(args.min_size, Some(4096));
                assert_eq!(args.max_size, Some(2 * 1024 * 1024 * 1024));
                assert_eq!(args.threads, Some(3));
                assert_eq!(args.full_hash, Some(DigestAlgorithm::Sha256));
                assert_eq!(args.perceptual, Some(PerceptualAlgorithm::Phash));
                assert_eq!(args.threshold, Some(8));
                assert_eq!(args.keep, Some(KeepPolicy::ShortestPath));
                assert!(args.no_media);
                assert!(args.fpcalc);
            }
            Commands::Config => panic!("Expected Scan command"),
        }
    }

    #[test]
    fn test_cli_quiet_conflicts_with_verbose() {
        let result = Cli::try_parse_from(["dupehound", "-v", "-q", "scan", "/path"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_missing_path() {
        let result = Cli::try_parse_from(["dupehound", "scan"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_config_subcommand() {
        let cli = Cli::try_parse_from(["dupehound", "--json-errors", "config"]).unwrap();
        assert!(cli.json_errors);
        assert!(matches!(cli.command, Commands::Config));
    }
}
