//! Process exit codes and JSON-structured fatal errors.

use serde::Serialize;

use crate::config::ConfigError;
use crate::duplicates::{DuplicateReport, FinderError};

/// Exit codes of the `dupehound` binary.
///
/// - 0: completed, duplicates found
/// - 1: fatal error
/// - 2: completed, nothing found
/// - 3: completed, but some files produced warnings
/// - 130: interrupted by Ctrl+C
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExitCode {
    /// Duplicates were found.
    Success = 0,
    /// An error stopped the run.
    GeneralError = 1,
    /// No cluster of any kind was found.
    NoDuplicates = 2,
    /// The run finished but skipped files with warnings.
    CompletedWithWarnings = 3,
    /// The run was cancelled.
    Interrupted = 130,
}

impl ExitCode {
    /// Get the numeric exit code.
    #[must_use]
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Machine-readable code for structured output.
    #[must_use]
    pub fn code_prefix(self) -> &'static str {
        match self {
            Self::Success => "DH000",
            Self::GeneralError => "DH001",
            Self::NoDuplicates => "DH002",
            Self::CompletedWithWarnings => "DH003",
            Self::Interrupted => "DH130",
        }
    }

    /// Exit code describing a finished report.
    ///
    /// Interruption outranks warnings, which outrank the found/not-found
    /// distinction.
    #[must_use]
    pub fn for_report(report: &DuplicateReport) -> Self {
        if report.interrupted {
            Self::Interrupted
        } else if !report.warnings.is_empty() {
            Self::CompletedWithWarnings
        } else if report.has_duplicates() {
            Self::Success
        } else {
            Self::NoDuplicates
        }
    }
}

/// Structured error information for JSON output.
#[derive(Debug, Serialize)]
pub struct StructuredError {
    /// The error code (e.g., "DH001")
    pub code: String,
    /// The exit code number
    pub exit_code: i32,
    /// Human-readable error message, including causes
    pub message: String,
    /// Broad category of the failure
    pub kind: &'static str,
}

impl StructuredError {
    /// Describe a fatal error.
    #[must_use]
    pub fn new(err: &anyhow::Error, exit_code: ExitCode) -> Self {
        let kind = if err.downcast_ref::<ConfigError>().is_some() {
            "config"
        } else if let Some(finder) = err.downcast_ref::<FinderError>() {
            match finder {
                FinderError::Config(_) => "config",
                FinderError::PathNotFound(_) | FinderError::NotADirectory(_) => "input",
                FinderError::ThreadPool(_) => "runtime",
            }
        } else {
            "runtime"
        };

        Self {
            code: exit_code.code_prefix().to_string(),
            exit_code: exit_code.as_i32(),
            message: format!("{err:#}"),
            kind,
        }
    }
}
