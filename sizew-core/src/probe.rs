//! Stateless filesystem probes.
//!
//! Every probe absorbs enumeration errors: an unreadable directory or a file
//! that vanishes mid-walk contributes zero bytes and never aborts a scan.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// The directory's own last-write time, or `None` on any error.
pub fn dir_lwt(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).ok()?.modified().ok()
}

/// Sum of the lengths of regular files directly in `path` (no recursion).
///
/// Symlinks and other non-regular entries contribute zero. A directory that
/// cannot be enumerated at all contributes zero.
pub fn own_files_size(path: &Path) -> u64 {
    let entries = match fs::read_dir(path) {
        Ok(rd) => rd,
        Err(e) => {
            log::debug!("cannot enumerate {}: {}", path.display(), e);
            return 0;
        }
    };

    let mut sum = 0u64;
    for entry in entries.flatten() {
        // DirEntry::file_type does not traverse symlinks, so a symlink to a
        // file is not counted as a regular file here.
        let Ok(file_type) = entry.file_type() else {
            continue;
        };
        if !file_type.is_file() {
            continue;
        }
        if let Ok(meta) = entry.metadata() {
            sum = sum.saturating_add(meta.len());
        }
    }
    sum
}

/// Absolute paths of the immediate subdirectories of `path`.
///
/// Reparse points (symlinks, junctions, mount points) are omitted to prevent
/// cycles and double-counting. Enumeration errors yield an empty list.
pub fn child_dirs(path: &Path) -> Vec<PathBuf> {
    let entries = match fs::read_dir(path) {
        Ok(rd) => rd,
        Err(e) => {
            log::debug!("cannot enumerate {}: {}", path.display(), e);
            return Vec::new();
        }
    };

    let mut dirs = Vec::new();
    for entry in entries.flatten() {
        let Ok(file_type) = entry.file_type() else {
            continue;
        };
        // is_dir() is false for symlinks-to-directories since file_type does
        // not follow the link; that is exactly the reparse-point exclusion.
        if file_type.is_dir() {
            dirs.push(entry.path());
        }
    }
    dirs
}
