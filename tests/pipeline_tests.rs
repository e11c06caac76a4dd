//! End-to-end tests for exact duplicate detection.
//!
//! These drive [`DuplicateFinder`] over real temporary files and check the
//! report it produces: cluster membership, warnings for files that vanish
//! mid-run, stable output across runs, and the size boundary.

use dupehound::config::ScanConfig;
use dupehound::duplicates::{DetectionMethod, DuplicateFinder, KeepPolicy, Stage};
use dupehound::scanner::{DigestAlgorithm, FileRecord};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tempfile::{tempdir, TempDir};

// =============================================================================
// Helper Functions
// =============================================================================

fn config() -> ScanConfig {
    ScanConfig {
        worker_pool_size: 2,
        match_images: false,
        match_media: false,
        ..ScanConfig::default()
    }
}

fn write(dir: &TempDir, name: &str, content: &[u8]) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, content).unwrap();
    path
}

fn record(path: &Path) -> FileRecord {
    let meta = fs::metadata(path).unwrap();
    FileRecord::new(path.to_path_buf(), meta.len(), meta.modified().unwrap())
}

fn scan(config: ScanConfig, paths: &[&Path]) -> dupehound::duplicates::DuplicateReport {
    let records: Vec<FileRecord> = paths.iter().map(|p| record(p)).collect();
    DuplicateFinder::new(config).unwrap().scan(records).unwrap()
}

fn membership(report: &dupehound::duplicates::DuplicateReport) -> Vec<Vec<PathBuf>> {
    report
        .clusters
        .iter()
        .map(|c| c.paths().map(Path::to_path_buf).collect())
        .collect()
}

// =============================================================================
// Exact Detection
// =============================================================================

#[test]
fn test_one_byte_difference_is_not_a_duplicate() {
    let dir = tempdir().unwrap();
    let content = vec![0x5Au8; 1024];
    let mut altered = content.clone();
    altered[700] = 0x5B;

    let a = write(&dir, "a.bin", &content);
    let b = write(&dir, "b.bin", &content);
    let c = write(&dir, "c.bin", &altered);

    let report = scan(config(), &[&a, &b, &c]);

    assert_eq!(report.exact_clusters().count(), 1);
    let cluster = report.exact_clusters().next().unwrap();
    assert_eq!(cluster.paths().collect::<Vec<_>>(), vec![a.as_path(), b.as_path()]);
    assert_eq!(cluster.reclaimable_bytes, 1024);
    assert!(cluster.digest.is_some());
    assert!(report.warnings.is_empty());
    assert_eq!(report.stats.size_candidates, 3);
}

#[test]
fn test_middle_difference_survives_partial_tier() {
    let dir = tempdir().unwrap();
    let mut first = vec![0u8; 4096];
    let mut second = first.clone();
    first[2048] = 1;
    second[2048] = 2;

    let a = write(&dir, "a.bin", &first);
    let b = write(&dir, "b.bin", &second);

    let config = ScanConfig {
        partial_hash_window_bytes: 64,
        ..config()
    };
    let report = scan(config, &[&a, &b]);

    assert!(report.clusters.is_empty());
    // Same head and tail, so both went on to the full digest.
    assert_eq!(report.stats.eliminated_by_partial, 0);
    assert_eq!(report.stats.full_hashed, 2);
}

#[test]
fn test_partial_tier_eliminates_different_heads() {
    let dir = tempdir().unwrap();
    let a = write(&dir, "a.bin", &[1u8; 10_000]);
    let b = write(&dir, "b.bin", &[2u8; 10_000]);

    let report = scan(config(), &[&a, &b]);

    assert!(report.clusters.is_empty());
    assert_eq!(report.stats.partial_hashed, 2);
    assert_eq!(report.stats.eliminated_by_partial, 2);
    assert_eq!(report.stats.full_hashed, 0);
}

#[test]
fn test_identical_files_always_cluster_for_every_algorithm() {
    let dir = tempdir().unwrap();
    let content: Vec<u8> = (0..50_000u32).map(|i| (i % 251) as u8).collect();
    let a = write(&dir, "a.bin", &content);
    let b = write(&dir, "b.bin", &content);
    let c = write(&dir, "c.bin", &content);

    for algorithm in [
        DigestAlgorithm::Xxh64,
        DigestAlgorithm::Blake3,
        DigestAlgorithm::Sha256,
    ] {
        let config = ScanConfig {
            full_hash_algorithm: algorithm,
            ..config()
        };
        let report = scan(config, &[&a, &b, &c]);
        assert_eq!(report.exact_clusters().count(), 1, "{algorithm:?}");
        assert_eq!(report.clusters[0].len(), 3, "{algorithm:?}");
    }
}

#[test]
fn test_different_sizes_never_share_a_cluster() {
    let dir = tempdir().unwrap();
    let a = write(&dir, "a.bin", b"abc");
    let b = write(&dir, "b.bin", b"abcabc");
    let c = write(&dir, "c.bin", b"abc");
    let d = write(&dir, "d.bin", b"abcabc");

    let report = scan(config(), &[&a, &b, &c, &d]);

    assert_eq!(report.exact_clusters().count(), 2);
    for cluster in report.exact_clusters() {
        let size = cluster.files[0].size;
        assert!(cluster.files.iter().all(|f| f.size == size));
    }
}

#[test]
fn test_min_size_excludes_small_files() {
    let dir = tempdir().unwrap();
    let a = write(&dir, "a.bin", b"tiny");
    let b = write(&dir, "b.bin", b"tiny");
    let e1 = write(&dir, "e1.bin", b"");
    let e2 = write(&dir, "e2.bin", b"");

    let config = ScanConfig {
        min_file_size_bytes: 5,
        ..config()
    };
    let report = scan(config, &[&a, &b, &e1, &e2]);

    assert!(report.clusters.is_empty());
    assert_eq!(report.stats.below_min_size, 4);
    assert_eq!(report.stats.total_files, 4);
}

#[test]
fn test_empty_files_are_ignored_by_default() {
    let dir = tempdir().unwrap();
    let a = write(&dir, "a.bin", b"");
    let b = write(&dir, "b.bin", b"");

    let report = scan(config(), &[&a, &b]);

    assert!(report.clusters.is_empty());
    assert_eq!(report.stats.below_min_size, 2);
}

// =============================================================================
// Failures and Warnings
// =============================================================================

#[test]
fn test_vanished_file_yields_one_warning() {
    let dir = tempdir().unwrap();
    let content = vec![7u8; 2048];
    let a = write(&dir, "a.bin", &content);
    let b = write(&dir, "b.bin", &content);
    let gone = write(&dir, "gone.bin", &content);

    let records = vec![record(&a), record(&b), record(&gone)];
    fs::remove_file(&gone).unwrap();

    let report = DuplicateFinder::new(config())
        .unwrap()
        .scan(records)
        .unwrap();

    assert_eq!(report.warnings.len(), 1);
    assert_eq!(report.warnings[0].path, gone);
    assert_eq!(report.warnings[0].stage, Stage::PartialHash);

    assert_eq!(report.exact_clusters().count(), 1);
    let cluster = report.exact_clusters().next().unwrap();
    assert_eq!(cluster.paths().collect::<Vec<_>>(), vec![a.as_path(), b.as_path()]);
    assert!(!report.interrupted);
}

#[cfg(unix)]
#[test]
fn test_unreadable_file_yields_one_warning() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempdir().unwrap();
    let content = vec![3u8; 4096];
    let a = write(&dir, "a.bin", &content);
    let b = write(&dir, "b.bin", &content);
    let locked = write(&dir, "locked.bin", &content);

    let records = vec![record(&a), record(&b), record(&locked)];
    fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();
    if fs::File::open(&locked).is_ok() {
        // Permission bits do not apply to root.
        return;
    }

    let report = DuplicateFinder::new(config())
        .unwrap()
        .scan(records)
        .unwrap();
    fs::set_permissions(&locked, fs::Permissions::from_mode(0o644)).unwrap();

    assert_eq!(report.warnings.len(), 1);
    assert_eq!(report.warnings[0].path, locked);
    assert!(report.warnings[0].message.contains("Permission denied"));

    assert_eq!(report.exact_clusters().count(), 1);
    let cluster = report.exact_clusters().next().unwrap();
    assert_eq!(cluster.paths().collect::<Vec<_>>(), vec![a.as_path(), b.as_path()]);
}

#[test]
fn test_vanished_pair_leaves_no_cluster() {
    let dir = tempdir().unwrap();
    let a = write(&dir, "a.bin", b"same bytes");
    let b = write(&dir, "b.bin", b"same bytes");

    let records = vec![record(&a), record(&b)];
    fs::remove_file(&a).unwrap();

    let report = DuplicateFinder::new(config())
        .unwrap()
        .scan(records)
        .unwrap();

    assert!(report.clusters.is_empty());
    assert_eq!(report.warnings.len(), 1);
    assert_eq!(report.warnings[0].path, a);
}

// =============================================================================
// Ordering and Determinism
// =============================================================================

#[test]
fn test_runs_are_idempotent() {
    let dir = tempdir().unwrap();
    let mut paths = Vec::new();
    for group in 0..4u8 {
        for copy in 0..3 {
            let content = vec![group; 512 + usize::from(group) * 100];
            paths.push(write(&dir, &format!("g{group}_{copy}.bin"), &content));
        }
    }
    let refs: Vec<&Path> = paths.iter().map(PathBuf::as_path).collect();

    let first = scan(config(), &refs);
    let mut reversed = refs.clone();
    reversed.reverse();
    let second = scan(config(), &reversed);

    assert_eq!(first.clusters.len(), 4);
    assert_eq!(membership(&first), membership(&second));
}

#[test]
fn test_clusters_ordered_by_reclaimable_bytes() {
    let dir = tempdir().unwrap();
    let s1 = write(&dir, "small1", &[1u8; 100]);
    let s2 = write(&dir, "small2", &[1u8; 100]);
    let l1 = write(&dir, "large1", &[2u8; 1000]);
    let l2 = write(&dir, "large2", &[2u8; 1000]);

    let report = scan(config(), &[&s1, &s2, &l1, &l2]);

    let reclaimable: Vec<u64> = report.clusters.iter().map(|c| c.reclaimable_bytes).collect();
    assert_eq!(reclaimable, vec![1000, 100]);
    assert_eq!(report.stats.reclaimable_bytes, 1100);
}

#[test]
fn test_keep_policy_newest() {
    let dir = tempdir().unwrap();
    let a = write(&dir, "a.bin", b"payload");
    let b = write(&dir, "b.bin", b"payload");

    let now = SystemTime::now();
    let records = vec![
        FileRecord::new(a.clone(), 7, now - Duration::from_secs(3600)),
        FileRecord::new(b.clone(), 7, now),
    ];
    let config = ScanConfig {
        keep_policy: KeepPolicy::Newest,
        ..config()
    };
    let report = DuplicateFinder::new(config).unwrap().scan(records).unwrap();

    let cluster = report.exact_clusters().next().unwrap();
    assert_eq!(cluster.kept().path, b);
}

// =============================================================================
// Directory Scans
// =============================================================================

#[test]
fn test_scan_paths_walks_nested_directories() {
    let dir = tempdir().unwrap();
    fs::create_dir_all(dir.path().join("x/y")).unwrap();
    fs::write(dir.path().join("top.txt"), b"nested duplicate").unwrap();
    fs::write(dir.path().join("x/y/deep.txt"), b"nested duplicate").unwrap();
    fs::write(dir.path().join("x/other.txt"), b"something different").unwrap();

    let report = DuplicateFinder::new(config())
        .unwrap()
        .scan_paths(&[dir.path().to_path_buf()])
        .unwrap();

    assert_eq!(report.stats.total_files, 3);
    assert_eq!(report.clusters_by(DetectionMethod::Exact).count(), 1);
    assert!(report
        .clusters_containing(&dir.path().join("x/y/deep.txt"))
        .next()
        .is_some());
}

#[test]
fn test_scan_paths_empty_directory() {
    let dir = tempdir().unwrap();
    let report = DuplicateFinder::new(config())
        .unwrap()
        .scan_paths(&[dir.path().to_path_buf()])
        .unwrap();

    assert!(!report.has_duplicates());
    assert_eq!(report.stats.total_files, 0);
}
