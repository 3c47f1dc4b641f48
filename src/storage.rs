// SPDX-License-Identifier: GPL-3.0-only

//! Storage utilities for captured stills
//!
//! Captured photos live in the session's photo directory as `capt####.jpg`
//! with a monotonic 4-digit sequence. The sequence is derived from what is
//! on disk, so it survives restarts and never reuses a number.

use crate::constants::files;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Decoded thumbnail of the most recent capture, ready for display
#[derive(Debug, Clone)]
pub struct Thumbnail {
    pub path: PathBuf,
    pub rgba: Arc<Vec<u8>>,
    pub width: u32,
    pub height: u32,
}

/// Extract the numeric sequence from a `capt####.jpg` filename.
///
/// Returns `None` for anything that does not match the pattern; such files
/// are ignored by the allocator, never an error.
fn capture_sequence(filename: &str) -> Option<u32> {
    let stem = filename
        .strip_prefix(files::CAPTURE_PREFIX)?
        .strip_suffix(&format!(".{}", files::CAPTURE_EXT))?;
    if stem.is_empty() {
        return None;
    }
    stem.parse().ok()
}

/// Allocate the next capture filename in `dir`.
///
/// Scans existing `capt####.jpg` files, takes `max + 1`, zero-padded to
/// 4 digits. Non-matching filenames in the directory are skipped.
pub fn next_filename(dir: &Path) -> String {
    let mut max_seq = 0u32;

    if let Ok(entries) = std::fs::read_dir(dir) {
        for entry in entries.flatten() {
            let name = entry.file_name();
            if let Some(seq) = capture_sequence(&name.to_string_lossy()) {
                max_seq = max_seq.max(seq);
            }
        }
    }

    format!(
        "{}{:0width$}.{}",
        files::CAPTURE_PREFIX,
        max_seq + 1,
        files::CAPTURE_EXT,
        width = files::CAPTURE_SEQ_DIGITS
    )
}

/// Find the most recently modified capture in `dir`
pub fn latest_photo(dir: &Path) -> Option<PathBuf> {
    let mut newest: Option<(std::time::SystemTime, PathBuf)> = None;

    for entry in std::fs::read_dir(dir).ok()?.flatten() {
        let name = entry.file_name();
        if capture_sequence(&name.to_string_lossy()).is_none() {
            continue;
        }
        let Ok(modified) = entry.metadata().and_then(|m| m.modified()) else {
            continue;
        };
        match &newest {
            Some((t, _)) if *t >= modified => {}
            _ => newest = Some((modified, entry.path())),
        }
    }

    newest.map(|(_, path)| path)
}

/// Load the latest capture as an RGBA thumbnail for the presentation layer.
///
/// Decoding happens on a blocking worker; returns `None` when there is no
/// capture yet or the file cannot be decoded.
pub async fn load_latest_thumbnail(dir: PathBuf) -> Option<Thumbnail> {
    let path = tokio::task::spawn_blocking(move || latest_photo(&dir))
        .await
        .ok()??;

    debug!(path = ?path, "Loading latest capture thumbnail");

    let bytes = tokio::fs::read(&path).await.ok()?;
    let decode_path = path.clone();
    tokio::task::spawn_blocking(move || {
        let img = image::load_from_memory(&bytes).ok()?;
        let rgba = img.to_rgba8();
        let (width, height) = rgba.dimensions();
        Some(Thumbnail {
            path: decode_path,
            rgba: Arc::new(rgba.into_raw()),
            width,
            height,
        })
    })
    .await
    .ok()?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_parses_only_matching_names() {
        assert_eq!(capture_sequence("capt0001.jpg"), Some(1));
        assert_eq!(capture_sequence("capt0042.jpg"), Some(42));
        assert_eq!(capture_sequence("capt12345.jpg"), Some(12345));
        assert_eq!(capture_sequence("capt.jpg"), None);
        assert_eq!(capture_sequence("captabcd.jpg"), None);
        assert_eq!(capture_sequence("photo0001.jpg"), None);
        assert_eq!(capture_sequence("capt0001.png"), None);
    }

    #[test]
    fn first_filename_in_empty_dir() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(next_filename(dir.path()), "capt0001.jpg");
    }

    #[test]
    fn allocates_max_plus_one() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["capt0001.jpg", "capt0007.jpg", "capt0003.jpg"] {
            std::fs::write(dir.path().join(name), b"").unwrap();
        }
        assert_eq!(next_filename(dir.path()), "capt0008.jpg");
    }

    #[test]
    fn ignores_non_matching_files() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["capt0002.jpg", "notes.txt", "captXYZ.jpg", "capt0005.png"] {
            std::fs::write(dir.path().join(name), b"").unwrap();
        }
        assert_eq!(next_filename(dir.path()), "capt0003.jpg");
    }

    #[test]
    fn never_returns_existing_name() {
        let dir = tempfile::tempdir().unwrap();
        for i in 1..=20u32 {
            std::fs::write(dir.path().join(format!("capt{:04}.jpg", i)), b"").unwrap();
        }
        let next = next_filename(dir.path());
        assert!(!dir.path().join(&next).exists());
        assert_eq!(next, "capt0021.jpg");
    }

    #[test]
    fn latest_photo_skips_non_captures() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("capt0001.jpg"), b"a").unwrap();
        std::fs::write(dir.path().join("zzzz.jpg"), b"b").unwrap();
        let latest = latest_photo(dir.path()).unwrap();
        assert_eq!(latest.file_name().unwrap(), "capt0001.jpg");
    }
}
