// crates/netharvest-engine/src/persist.rs
// ============================================================================
// Module: Netharvest Capture Persistence
// Description: Atomic capture-file writes under the collection root.
// Purpose: Guarantee a reader never observes a truncated capture.
// Dependencies: std
// ============================================================================

//! ## Overview
//! Captures are written to a sibling temporary path in the target directory
//! and renamed into place, so the final path either does not exist or holds
//! the complete transcript. Temporary names embed the process id and a
//! process-wide counter; concurrent workers never collide because the pool
//! assigns unique final paths per device.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use netharvest_core::DeviceError;

// ============================================================================
// SECTION: Atomic Write
// ============================================================================

/// Process-wide counter distinguishing temporary files.
static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Atomically writes capture bytes, returning the byte count.
///
/// # Errors
///
/// Returns [`DeviceError::Persistence`] when the directory cannot be
/// created, the temp file cannot be written/synced, or the rename fails.
pub fn write_capture(path: &Path, bytes: &[u8]) -> Result<u64, DeviceError> {
    let parent = path
        .parent()
        .ok_or_else(|| DeviceError::Persistence(format!("{} has no parent", path.display())))?;
    fs::create_dir_all(parent)
        .map_err(|err| DeviceError::Persistence(format!("create {}: {err}", parent.display())))?;

    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| DeviceError::Persistence(format!("{} has no file name", path.display())))?;
    let sequence = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    let temp_path =
        parent.join(format!(".{file_name}.tmp-{}-{sequence}", std::process::id()));

    let result = (|| -> std::io::Result<()> {
        let mut file = File::create(&temp_path)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        Ok(())
    })();
    if let Err(err) = result {
        let _ = fs::remove_file(&temp_path);
        return Err(DeviceError::Persistence(format!(
            "write {}: {err}",
            temp_path.display()
        )));
    }

    if let Err(err) = fs::rename(&temp_path, path) {
        let _ = fs::remove_file(&temp_path);
        return Err(DeviceError::Persistence(format!(
            "rename into {}: {err}",
            path.display()
        )));
    }
    Ok(bytes.len() as u64)
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_creates_directories_and_content() {
        let dir = tempfile::TempDir::new().expect("tempdir");
        let path = dir.path().join("arp").join("edge-01.txt");
        let written = write_capture(&path, b"transcript body").expect("write");
        assert_eq!(written, 15);
        assert_eq!(fs::read(&path).expect("read"), b"transcript body");
    }

    #[test]
    fn no_temp_files_remain_after_write() {
        let dir = tempfile::TempDir::new().expect("tempdir");
        let path = dir.path().join("edge-01.txt");
        write_capture(&path, b"body").expect("write");
        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .expect("read dir")
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().contains(".tmp-"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn rewrite_replaces_whole_content() {
        let dir = tempfile::TempDir::new().expect("tempdir");
        let path = dir.path().join("edge-01.txt");
        write_capture(&path, b"first, longer content").expect("write");
        write_capture(&path, b"second").expect("write");
        assert_eq!(fs::read(&path).expect("read"), b"second");
    }

    #[test]
    fn stored_size_matches_file_length() {
        let dir = tempfile::TempDir::new().expect("tempdir");
        let path = dir.path().join("edge-01.txt");
        let body = "x".repeat(4_096);
        let written = write_capture(&path, body.as_bytes()).expect("write");
        let metadata = fs::metadata(&path).expect("metadata");
        assert_eq!(written, metadata.len());
    }
}
