//! Ctrl+C handling.
//!
//! A single `Arc<AtomicBool>` is shared by every pipeline stage. Ctrl+C sets
//! it; stages stop starting new work units and abandon in-flight reads, and
//! the report comes back marked `interrupted`.
//!
//! ```rust,no_run
//! use dupehound::signal::install_handler;
//!
//! let handler = install_handler();
//! let flag = handler.get_flag();
//! // pass `flag` to DuplicateFinder::with_shutdown_flag
//! ```

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

/// Shared cancellation flag.
///
/// Cloning shares the flag, so every clone observes the same request.
///
/// # Example
///
/// ```
/// use dupehound::signal::ShutdownHandler;
///
/// let handler = ShutdownHandler::new();
/// let worker_view = handler.clone();
///
/// handler.request_shutdown();
/// assert!(worker_view.is_shutdown_requested());
/// ```
#[derive(Debug, Clone, Default)]
pub struct ShutdownHandler {
    flag: Arc<AtomicBool>,
}

impl ShutdownHandler {
    /// Create a handler with no shutdown requested.
    ///
    /// # Returns
    ///
    /// A handler owning a fresh flag, not connected to Ctrl+C. Use
    /// [`install_handler`] for the process-wide one.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Check whether cancellation was requested.
    ///
    /// # Returns
    ///
    /// `true` if Ctrl+C was pressed or [`request_shutdown`](Self::request_shutdown)
    /// was called since the last [`reset`](Self::reset).
    #[must_use]
    pub fn is_shutdown_requested(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Request cancellation.
    ///
    /// Pipeline stages see the request at their next check: before each work
    /// unit and inside every chunked read.
    pub fn request_shutdown(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// The flag to hand to pipeline stages.
    ///
    /// # Returns
    ///
    /// An `Arc<AtomicBool>` sharing state with this handler.
    ///
    /// # Example
    ///
    /// ```
    /// use dupehound::config::ScanConfig;
    /// use dupehound::duplicates::DuplicateFinder;
    /// use dupehound::signal::ShutdownHandler;
    ///
    /// let handler = ShutdownHandler::new();
    /// let finder = DuplicateFinder::new(ScanConfig::default())
    ///     .unwrap()
    ///     .with_shutdown_flag(handler.get_flag());
    ///
    /// handler.request_shutdown();
    /// let report = finder.scan(Vec::new()).unwrap();
    /// assert!(report.interrupted);
    /// ```
    #[must_use]
    pub fn get_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.flag)
    }

    /// Clear a previous request.
    pub fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

static GLOBAL_HANDLER: OnceLock<ShutdownHandler> = OnceLock::new();

/// Install the process-wide Ctrl+C hook and return its handler.
///
/// `ctrlc` accepts one hook per process, so repeated calls (several
/// `run_app` invocations in one test binary) get the same handler back,
/// reset. If another library already owns the hook, the returned handler
/// only responds to [`ShutdownHandler::request_shutdown`].
///
/// # Returns
///
/// The process-wide handler with no shutdown requested.
#[must_use]
pub fn install_handler() -> ShutdownHandler {
    let handler = GLOBAL_HANDLER.get_or_init(|| {
        let handler = ShutdownHandler::new();
        let flag = handler.get_flag();
        let installed = ctrlc::set_handler(move || {
            flag.store(true, Ordering::SeqCst);
            let _ = writeln!(std::io::stderr(), "\nInterrupted. Finishing up...");
            log::info!("Shutdown signal received");
        });
        if let Err(e) = installed {
            log::debug!("Ctrl+C hook unavailable ({e}), cancellation is manual only");
        }
        handler
    });
    handler.reset();
    handler.clone()
}
