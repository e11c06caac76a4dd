//! Size grouping, the first reduction step of exact detection.
//!
//! # Overview
//!
//! Files of different byte length can never be identical, so the input is
//! partitioned by exact size and every size shared by a single file is
//! discarded before any content is read.
//!
//! # Example
//!
//! ```
//! use dupehound::scanner::FileRecord;
//! use dupehound::duplicates::group_by_size;
//! use std::path::PathBuf;
//! use std::time::SystemTime;
//!
//! let files = vec![
//!     FileRecord::new(PathBuf::from("/file1.txt"), 1024, SystemTime::now()),
//!     FileRecord::new(PathBuf::from("/file2.txt"), 1024, SystemTime::now()),
//!     FileRecord::new(PathBuf::from("/file3.txt"), 2048, SystemTime::now()),
//! ];
//!
//! let (groups, stats) = group_by_size(files, 1, None);
//!
//! assert_eq!(stats.total_files, 3);
//! assert_eq!(stats.potential_duplicates, 2);
//! assert_eq!(groups.len(), 1);
//! ```

use std::collections::HashMap;

use crate::scanner::FileRecord;

/// Files sharing one exact byte length.
#[derive(Debug, Clone, PartialEq)]
pub struct SizeGroup {
    /// File size in bytes (shared by all files in this group)
    pub size: u64,
    /// Files with this exact size
    pub files: Vec<FileRecord>,
}

impl SizeGroup {
    /// Create a size group with initial files.
    #[must_use]
    pub fn with_files(size: u64, files: Vec<FileRecord>) -> Self {
        debug_assert!(files.iter().all(|f| f.size == size));
        Self { size, files }
    }

    /// Number of files in this group.
    #[must_use]
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Check if this group is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Potential space savings (all copies minus one).
    #[must_use]
    pub fn potential_savings(&self) -> u64 {
        self.size * (self.files.len() as u64).saturating_sub(1)
    }
}

/// Statistics from the size grouping step.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupingStats {
    /// Total number of files processed
    pub total_files: usize,
    /// Total size of all files in bytes
    pub total_size: u64,
    /// Files skipped for being smaller than the minimum size
    pub below_min_size: usize,
    /// Files skipped for being larger than the maximum size
    pub above_max_size: usize,
    /// Number of distinct file sizes among the eligible files
    pub unique_sizes: usize,
    /// Number of files that could be duplicates (in groups of 2+)
    pub potential_duplicates: usize,
    /// Combined size of those files
    pub candidate_bytes: u64,
    /// Number of files eliminated as unique (singleton groups)
    pub eliminated_unique: usize,
    /// Number of size groups with 2+ files
    pub duplicate_groups: usize,
}

impl GroupingStats {
    /// Percentage of files eliminated by size grouping.
    #[must_use]
    pub fn elimination_rate(&self) -> f64 {
        if self.total_files == 0 {
            0.0
        } else {
            ((self.total_files - self.potential_duplicates) as f64 / self.total_files as f64)
                * 100.0
        }
    }
}

/// Group files by size and discard sizes held by a single file.
///
/// Files smaller than `min_size` bytes are counted and dropped. With the
/// default minimum of 1 this excludes empty files, which are all trivially
/// identical. Files larger than `max_size`, when given, are counted
/// separately and dropped; a file of exactly `max_size` bytes is kept.
pub fn group_by_size(
    files: impl IntoIterator<Item = FileRecord>,
    min_size: u64,
    max_size: Option<u64>,
) -> (HashMap<u64, Vec<FileRecord>>, GroupingStats) {
    let mut all_groups: HashMap<u64, Vec<FileRecord>> = HashMap::new();
    let mut stats = GroupingStats::default();

    for file in files {
        stats.total_files += 1;
        stats.total_size += file.size;

        if file.size < min_size {
            stats.below_min_size += 1;
            log::trace!("Below minimum size: {}", file.path.display());
            continue;
        }
        if max_size.is_some_and(|max| file.size > max) {
            stats.above_max_size += 1;
            log::trace!("Above maximum size: {}", file.path.display());
            continue;
        }

        all_groups.entry(file.size).or_default().push(file);
    }

    if stats.below_min_size > 0 {
        log::debug!(
            "Skipped {} file(s) smaller than {} bytes",
            stats.below_min_size,
            min_size
        );
    }
    if let Some(max) = max_size.filter(|_| stats.above_max_size > 0) {
        log::debug!(
            "Skipped {} file(s) larger than {} bytes",
            stats.above_max_size,
            max
        );
    }

    stats.unique_sizes = all_groups.len();

    let filtered_groups: HashMap<u64, Vec<FileRecord>> = all_groups
        .into_iter()
        .filter(|(size, files)| {
            if files.len() == 1 {
                stats.eliminated_unique += 1;
                false
            } else {
                stats.potential_duplicates += files.len();
                stats.candidate_bytes += size * files.len() as u64;
                stats.duplicate_groups += 1;
                log::debug!(
                    "Size group {} bytes: {} potential duplicates",
                    size,
                    files.len()
                );
                true
            }
        })
        .collect();

    log::info!(
        "Size grouping: {} files → {} candidates in {} groups ({:.1}% eliminated)",
        stats.total_files,
        stats.potential_duplicates,
        stats.duplicate_groups,
        stats.elimination_rate()
    );

    (filtered_groups, stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::SystemTime;

    fn make_file(path: &str, size: u64) -> FileRecord {
        FileRecord::new(PathBuf::from(path), size, SystemTime::now())
    }

    #[test]
    fn test_size_group_potential_savings() {
        let files = vec![
            make_file("/a.txt", 1024),
            make_file("/b.txt", 1024),
            make_file("/c.txt", 1024),
        ];
        let group = SizeGroup::with_files(1024, files);

        assert_eq!(group.len(), 3);
        assert_eq!(group.potential_savings(), 2048);
    }

    #[test]
    fn test_group_by_size_empty_input() {
        let (groups, stats) = group_by_size(Vec::new(), 1, None);
        assert!(groups.is_empty());
        assert_eq!(stats, GroupingStats::default());
        assert_eq!(stats.elimination_rate(), 0.0);
    }

    #[test]
    fn test_group_by_size_discards_singletons() {
        let files = vec![
            make_file("/a", 10),
            make_file("/b", 10),
            make_file("/c", 20),
            make_file("/d", 30),
            make_file("/e", 30),
            make_file("/f", 30),
        ];
        let (groups, stats) = group_by_size(files, 1, None);

        assert_eq!(groups.len(), 2);
        assert_eq!(groups[&10].len(), 2);
        assert_eq!(groups[&30].len(), 3);
        assert!(!groups.contains_key(&20));
        assert_eq!(stats.unique_sizes, 3);
        assert_eq!(stats.eliminated_unique, 1);
        assert_eq!(stats.potential_duplicates, 5);
        assert_eq!(stats.candidate_bytes, 110);
    }

    #[test]
    fn test_group_by_size_applies_minimum() {
        let files = vec![
            make_file("/empty1", 0),
            make_file("/empty2", 0),
            make_file("/small1", 5),
            make_file("/small2", 5),
            make_file("/big1", 500),
            make_file("/big2", 500),
        ];

        let (groups, stats) = group_by_size(files.clone(), 1, None);
        assert_eq!(groups.len(), 2);
        assert_eq!(stats.below_min_size, 2);

        let (groups, stats) = group_by_size(files.clone(), 100, None);
        assert_eq!(groups.len(), 1);
        assert_eq!(stats.below_min_size, 4);

        let (groups, _) = group_by_size(files, 0, None);
        assert_eq!(groups.len(), 3);
        assert!(groups.contains_key(&0));
    }

    #[test]
    fn test_group_by_size_applies_maximum() {
        let files = vec![
            make_file("/small1", 5),
            make_file("/small2", 5),
            make_file("/edge1", 100),
            make_file("/edge2", 100),
            make_file("/huge1", 101),
            make_file("/huge2", 101),
            make_file("/huge3", 5000),
        ];

        let (groups, stats) = group_by_size(files.clone(), 1, Some(100));
        assert_eq!(groups.len(), 2);
        assert!(groups.contains_key(&100));
        assert!(!groups.contains_key(&101));
        assert_eq!(stats.above_max_size, 3);
        assert_eq!(stats.below_min_size, 0);
        assert_eq!(stats.total_files, 7);

        let (groups, stats) = group_by_size(files.clone(), 10, Some(100));
        assert_eq!(groups.len(), 1);
        assert_eq!(stats.below_min_size, 2);
        assert_eq!(stats.above_max_size, 3);

        let (groups, stats) = group_by_size(files, 1, None);
        assert_eq!(groups.len(), 3);
        assert_eq!(stats.above_max_size, 0);
    }

    #[test]
    fn test_group_preserves_input_order() {
        let files = vec![
            make_file("/z", 7),
            make_file("/a", 7),
            make_file("/m", 7),
        ];
        let (groups, _) = group_by_size(files, 1, None);
        let paths: Vec<_> = groups[&7].iter().map(|f| f.path.clone()).collect();
        assert_eq!(
            paths,
            vec![PathBuf::from("/z"), PathBuf::from("/a"), PathBuf::from("/m")]
        );
    }
}
