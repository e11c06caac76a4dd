//! Directory walker producing [`FileRecord`]s.
//!
//! # Overview
//!
//! The walker is the traversal collaborator of the detection pipeline. It
//! yields every regular file under one root exactly once, with its size,
//! modification time and [`FileKind`](super::FileKind) tag. Symbolic links are
//! never followed. Filtering policy beyond "regular files" is left to callers.
//!
//! # Example
//!
//! ```no_run
//! use dupehound::scanner::Walker;
//! use std::path::Path;
//!
//! let walker = Walker::new(Path::new("/home/user/Downloads"));
//! let records: Vec<_> = walker.walk().filter_map(Result::ok).collect();
//! println!("{} files", records.len());
//! ```

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use walkdir::WalkDir;

use super::{FileRecord, ScanError};

/// Directory walker for file discovery.
#[derive(Debug)]
pub struct Walker {
    /// Root path to walk
    root: PathBuf,
    /// Optional shutdown flag for graceful termination
    shutdown_flag: Option<Arc<AtomicBool>>,
}

impl Walker {
    /// Create a new walker for the given path.
    #[must_use]
    pub fn new(path: &Path) -> Self {
        Self {
            root: path.to_path_buf(),
            shutdown_flag: None,
        }
    }

    /// Stop yielding entries once this flag is set.
    #[must_use]
    pub fn with_shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown_flag = Some(flag);
        self
    }

    fn is_shutdown_requested(&self) -> bool {
        self.shutdown_flag
            .as_ref()
            .is_some_and(|f| f.load(Ordering::SeqCst))
    }

    /// Walk the tree lazily. Each regular file yields one record; unreadable
    /// entries yield a [`ScanError`] and traversal continues.
    pub fn walk(&self) -> impl Iterator<Item = Result<FileRecord, ScanError>> + '_ {
        let root = std::path::absolute(&self.root).unwrap_or_else(|_| self.root.clone());
        log::debug!("Walking {}", root.display());

        WalkDir::new(root)
            .follow_links(false)
            .into_iter()
            .take_while(move |_| !self.is_shutdown_requested())
            .filter_map(|entry| match entry {
                Ok(entry) => {
                    if !entry.file_type().is_file() {
                        return None;
                    }
                    let path = entry.path().to_path_buf();
                    match entry.metadata() {
                        Ok(metadata) => {
                            let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
                            Some(Ok(FileRecord::new(path, metadata.len(), modified)))
                        }
                        Err(e) => Some(Err(walk_error(path, e))),
                    }
                }
                Err(e) => {
                    let path = e.path().map(Path::to_path_buf).unwrap_or_default();
                    Some(Err(walk_error(path, e)))
                }
            })
    }
}

fn walk_error(path: PathBuf, err: walkdir::Error) -> ScanError {
    match err.io_error().map(std::io::Error::kind) {
        Some(std::io::ErrorKind::PermissionDenied) => ScanError::PermissionDenied(path),
        Some(std::io::ErrorKind::NotFound) => ScanError::NotFound(path),
        _ => ScanError::Io {
            path,
            source: err
                .into_io_error()
                .unwrap_or_else(|| std::io::Error::other("filesystem loop")),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::FileKind;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_walk_yields_regular_files() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("a.txt"), b"aaa").unwrap();
        fs::write(dir.path().join("sub/b.png"), b"bb").unwrap();

        let walker = Walker::new(dir.path());
        let mut records: Vec<FileRecord> = walker.walk().filter_map(Result::ok).collect();
        records.sort_by(|a, b| a.path.cmp(&b.path));

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].size, 3);
        assert_eq!(records[0].kind, FileKind::Generic);
        assert_eq!(records[1].kind, FileKind::Image);
        assert!(records.iter().all(|r| r.path.is_absolute()));
    }

    #[test]
    fn test_walk_missing_root() {
        let walker = Walker::new(Path::new("/no/such/root/dir"));
        let results: Vec<_> = walker.walk().collect();
        assert_eq!(results.len(), 1);
        assert!(matches!(results[0], Err(ScanError::NotFound(_))));
    }

    #[test]
    fn test_walk_respects_shutdown() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.txt"), b"a").unwrap();

        let flag = Arc::new(AtomicBool::new(true));
        let walker = Walker::new(dir.path()).with_shutdown_flag(flag);
        assert_eq!(walker.walk().count(), 0);
    }
}
