//! Filesystem operations module.
//!
//! This module provides low-level operations for:
//! - Enumerating the directories of a source tree in walk order
//! - Checking that a destination is safe to prepare
//! - Creating directories and write-once files

use crate::error::{EngineError, Result};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Enumerate every directory of the tree rooted at `root`, `root` first.
///
/// Pre-order walk with siblings sorted by name, so the order is stable
/// between runs. Symbolic links to directories are not descended into.
///
/// # Errors
/// Returns EngineError if any part of the tree cannot be enumerated.
pub fn walk_directories(root: &Path) -> Result<Vec<PathBuf>> {
    let mut dirs = Vec::new();
    for entry in WalkDir::new(root).follow_links(false).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(root).to_path_buf();
            EngineError::EnumerationFailed {
                path,
                source: e
                    .into_io_error()
                    .unwrap_or_else(|| io::Error::new(io::ErrorKind::Other, "filesystem loop")),
            }
        })?;
        if entry.file_type().is_dir() {
            dirs.push(entry.into_path());
        }
    }
    Ok(dirs)
}

/// Make `path` absolute without resolving symbolic links.
pub fn absolute(path: &Path) -> Result<PathBuf> {
    std::path::absolute(path).map_err(|e| EngineError::InvalidPath {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

/// Check that `source` is an existing directory.
pub fn require_directory(source: &Path) -> Result<()> {
    match fs::metadata(source) {
        Ok(metadata) if metadata.is_dir() => Ok(()),
        Ok(_) => Err(EngineError::NotADirectory {
            path: source.to_path_buf(),
        }),
        Err(_) => Err(EngineError::SourceMissing {
            path: source.to_path_buf(),
        }),
    }
}

/// Check that `destination` is absent or an empty directory.
///
/// # Errors
/// `DestinationExists` if anything is already there.
pub fn require_fresh_destination(destination: &Path) -> Result<()> {
    match fs::symlink_metadata(destination) {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Ok(metadata) if metadata.is_dir() => {
            let mut entries = fs::read_dir(destination).map_err(|e| EngineError::EnumerationFailed {
                path: destination.to_path_buf(),
                source: e,
            })?;
            if entries.next().is_none() {
                Ok(())
            } else {
                Err(EngineError::DestinationExists {
                    path: destination.to_path_buf(),
                })
            }
        }
        _ => Err(EngineError::DestinationExists {
            path: destination.to_path_buf(),
        }),
    }
}

/// Create `path` and any missing parents.
pub fn create_dir_all(path: &Path) -> Result<()> {
    fs::create_dir_all(path).map_err(|e| EngineError::DirectoryCreateFailed {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Create a single directory; an existing directory is accepted.
///
/// Returns true if the directory was created by this call.
pub fn create_dir(path: &Path) -> Result<bool> {
    match fs::create_dir(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists && path.is_dir() => Ok(false),
        Err(e) => Err(EngineError::DirectoryCreateFailed {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

/// Write `contents` to a file that must not exist yet.
///
/// Staging files are written once and never modified, so an existing file
/// is reported as `io::ErrorKind::AlreadyExists` instead of being replaced.
pub fn write_new_file(path: &Path, contents: &[u8]) -> io::Result<()> {
    let mut file = fs::OpenOptions::new().write(true).create_new(true).open(path)?;
    file.write_all(contents)?;
    file.sync_all()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_walk_directories_preorder_sorted() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("src");
        fs::create_dir_all(src.join("b").join("inner")).expect("Failed to create dirs");
        fs::create_dir_all(src.join("a")).expect("Failed to create dirs");
        fs::write(src.join("file.txt"), b"data").expect("Failed to write file");

        let dirs = walk_directories(&src).expect("Failed to walk");
        assert_eq!(
            dirs,
            vec![
                src.clone(),
                src.join("a"),
                src.join("b"),
                src.join("b").join("inner"),
            ]
        );
    }

    #[test]
    fn test_walk_nonexistent_source() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let result = walk_directories(&temp_dir.path().join("nonexistent"));
        assert!(matches!(result, Err(EngineError::EnumerationFailed { .. })));
    }

    #[test]
    fn test_require_fresh_destination() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let absent = temp_dir.path().join("absent");
        assert!(require_fresh_destination(&absent).is_ok());

        let empty = temp_dir.path().join("empty");
        fs::create_dir(&empty).expect("Failed to create dir");
        assert!(require_fresh_destination(&empty).is_ok());

        fs::write(empty.join("leftover"), b"x").expect("Failed to write file");
        assert!(matches!(
            require_fresh_destination(&empty),
            Err(EngineError::DestinationExists { .. })
        ));
    }

    #[test]
    fn test_require_directory() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let file = temp_dir.path().join("file.txt");
        fs::write(&file, b"x").expect("Failed to write file");

        assert!(require_directory(temp_dir.path()).is_ok());
        assert!(matches!(require_directory(&file), Err(EngineError::NotADirectory { .. })));
        assert!(matches!(
            require_directory(&temp_dir.path().join("missing")),
            Err(EngineError::SourceMissing { .. })
        ));
    }

    #[test]
    fn test_create_dir_accepts_existing_directory() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = temp_dir.path().join("made");
        assert!(create_dir(&path).expect("Failed to create"));
        assert!(!create_dir(&path).expect("Existing directory should be accepted"));
    }

    #[test]
    fn test_create_dir_rejects_file_in_the_way() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = temp_dir.path().join("occupied");
        fs::write(&path, b"x").expect("Failed to write file");
        assert!(matches!(
            create_dir(&path),
            Err(EngineError::DirectoryCreateFailed { .. })
        ));
    }

    #[test]
    fn test_write_new_file_refuses_overwrite() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = temp_dir.path().join("once.txt");
        write_new_file(&path, b"first").expect("Failed to write");
        let err = write_new_file(&path, b"second").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);
        assert_eq!(fs::read_to_string(&path).expect("Failed to read"), "first");
    }
}
