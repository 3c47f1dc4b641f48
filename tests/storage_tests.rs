// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for the capture filename convention

use digicam::storage;

#[test]
fn allocates_one_past_the_maximum() {
    let dir = tempfile::tempdir().unwrap();
    for name in ["capt0001.jpg", "capt0009.jpg", "capt0004.jpg"] {
        std::fs::write(dir.path().join(name), b"").unwrap();
    }

    assert_eq!(storage::next_filename(dir.path()), "capt0010.jpg");
}

#[test]
fn sequence_is_monotonic_across_allocations() {
    let dir = tempfile::tempdir().unwrap();

    let mut seen = std::collections::HashSet::new();
    for _ in 0..5 {
        let name = storage::next_filename(dir.path());
        assert!(seen.insert(name.clone()), "reused filename {}", name);
        std::fs::write(dir.path().join(&name), b"").unwrap();
    }

    assert!(seen.contains("capt0001.jpg"));
    assert!(seen.contains("capt0005.jpg"));
}

#[test]
fn numbers_survive_gaps_left_by_deletion() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("capt0005.jpg"), b"").unwrap();

    // Even with 1-4 missing, the next number goes up, never back down
    assert_eq!(storage::next_filename(dir.path()), "capt0006.jpg");
}

#[test]
fn foreign_files_do_not_confuse_the_allocator() {
    let dir = tempfile::tempdir().unwrap();
    for name in [
        "capt0002.jpg",
        "capture.jpg",
        "capt123.txt",
        "IMG_9999.jpg",
        "capt-old.jpg",
    ] {
        std::fs::write(dir.path().join(name), b"").unwrap();
    }

    assert_eq!(storage::next_filename(dir.path()), "capt0003.jpg");
}

#[test]
fn padding_is_four_digits() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("capt0099.jpg"), b"").unwrap();
    assert_eq!(storage::next_filename(dir.path()), "capt0100.jpg");
}
