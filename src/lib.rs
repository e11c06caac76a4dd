//! dupehound - duplicate and near-duplicate file detection
//!
//! The core is the detection pipeline in [`duplicates`]: size grouping,
//! tiered hashing and byte verification for exact duplicates, plus
//! perceptual and media matching for near-duplicates. It consumes
//! [`scanner::FileRecord`]s and produces a [`duplicates::DuplicateReport`].
//! [`scanner::Walker`], [`config`] and [`cli`] make the crate usable from
//! the command line.

pub mod cli;
pub mod config;
pub mod duplicates;
pub mod error;
pub mod logging;
pub mod scanner;
pub mod signal;

use std::io::Write;

use anyhow::Context;

use crate::cli::{Cli, Commands};
use crate::config::ScanConfig;
use crate::duplicates::DuplicateFinder;
use crate::error::ExitCode;

/// Run the application, writing results to stdout.
///
/// # Errors
///
/// Returns an error for invalid configuration, bad scan roots, or a failure
/// to write the report.
pub fn run_app(cli: Cli) -> anyhow::Result<ExitCode> {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    run_with_output(cli, &mut out)
}

/// Run the application, writing results to `out`.
///
/// # Errors
///
/// See [`run_app`].
pub fn run_with_output(cli: Cli, out: &mut impl Write) -> anyhow::Result<ExitCode> {
    logging::init_logging(cli.verbose, cli.quiet);

    let mut config = ScanConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Config => {
            config.validate()?;
            serde_json::to_writer_pretty(&mut *out, &config)
                .context("Failed to write configuration")?;
            writeln!(out)?;
            Ok(ExitCode::Success)
        }
        Commands::Scan(args) => {
            config.merge_scan_args(&args);
            log::debug!("Effective configuration: {:?}", config);

            let handler = signal::install_handler();
            let finder = DuplicateFinder::new(config)?.with_shutdown_flag(handler.get_flag());
            let report = finder.scan_paths(&args.paths)?;

            // Serialize fully before writing so a failure leaves `out` untouched.
            let json = serde_json::to_string_pretty(&report).context("Failed to write report")?;
            writeln!(out, "{json}").context("Failed to write report")?;
            Ok(ExitCode::for_report(&report))
        }
    }
}
