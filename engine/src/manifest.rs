//! Per-directory manifests.
//!
//! A manifest describes one directory non-recursively:
//!
//! ```text
//! PATH\t/src/a
//! ARCHIVE_TIME\t2024-05-01 10:00:00.000000
//! DIRECTORY\tb
//! FILE\tx.txt\t/src/a/x.txt
//! ```
//!
//! Directory lines always precede file lines and each group is sorted by
//! name. Backup job scripts select the `FILE` names with awk, so the tab
//! separated shape is part of the contract.

use crate::error::{EngineError, Result};
use crate::fs_ops;
use chrono::{NaiveDateTime, SubsecRound, Utc};
use std::fs;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};

const PATH_TAG: &str = "PATH";
const TIME_TAG: &str = "ARCHIVE_TIME";
const DIRECTORY_TAG: &str = "DIRECTORY";
const FILE_TAG: &str = "FILE";
const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// One immediate child of a described directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entry {
    Directory { name: String },
    File { name: String, path: PathBuf },
}

impl Entry {
    pub fn name(&self) -> &str {
        match self {
            Entry::Directory { name } | Entry::File { name, .. } => name,
        }
    }

    pub fn is_dir(&self) -> bool {
        matches!(self, Entry::Directory { .. })
    }
}

/// Description of one directory at capture time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    pub source_path: PathBuf,
    pub captured_at: NaiveDateTime,
    pub children: Vec<Entry>,
}

fn child_name(dir: &Path, raw: std::ffi::OsString) -> Result<String> {
    let name = raw.into_string().map_err(|raw| EngineError::InvalidPath {
        path: dir.join(raw),
        reason: "file name is not valid UTF-8".to_string(),
    })?;
    if name.contains(['\t', '\n', '\r']) {
        return Err(EngineError::InvalidPath {
            path: dir.join(&name),
            reason: "file name contains a tab or line break".to_string(),
        });
    }
    Ok(name)
}

fn field_safe(path: &Path) -> Result<&str> {
    match path.to_str() {
        Some(s) if !s.contains(['\t', '\n', '\r']) => Ok(s),
        _ => Err(EngineError::InvalidPath {
            path: path.to_path_buf(),
            reason: "path cannot be written to a manifest".to_string(),
        }),
    }
}

/// Describe the immediate children of `dir`.
///
/// Anything `fs::metadata` reports as a directory (following symbolic links)
/// is listed as a directory, everything else as a file.
///
/// # Errors
/// `NotADirectory` if `dir` is not a directory, `EnumerationFailed` if it
/// cannot be listed, `InvalidPath` for names the manifest format cannot hold.
pub fn describe(dir: &Path) -> Result<Manifest> {
    if !dir.is_dir() {
        return Err(EngineError::NotADirectory {
            path: dir.to_path_buf(),
        });
    }
    field_safe(dir)?;

    let entries = fs::read_dir(dir).map_err(|e| EngineError::EnumerationFailed {
        path: dir.to_path_buf(),
        source: e,
    })?;

    let mut dirs = Vec::new();
    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| EngineError::EnumerationFailed {
            path: dir.to_path_buf(),
            source: e,
        })?;
        let name = child_name(dir, entry.file_name())?;
        let path = entry.path();
        if fs::metadata(&path).map(|m| m.is_dir()).unwrap_or(false) {
            dirs.push(name);
        } else {
            files.push((name, path));
        }
    }
    dirs.sort();
    files.sort_by(|a, b| a.0.cmp(&b.0));

    let mut children: Vec<Entry> = dirs.into_iter().map(|name| Entry::Directory { name }).collect();
    children.extend(files.into_iter().map(|(name, path)| Entry::File { name, path }));

    Ok(Manifest {
        source_path: dir.to_path_buf(),
        captured_at: Utc::now().naive_utc().trunc_subsecs(6),
        children,
    })
}

impl Manifest {
    pub fn directories(&self) -> impl Iterator<Item = &str> {
        self.children.iter().filter(|e| e.is_dir()).map(Entry::name)
    }

    /// Absolute source paths of the file entries, in manifest order.
    pub fn file_paths(&self) -> impl Iterator<Item = &Path> {
        self.children.iter().filter_map(|e| match e {
            Entry::File { path, .. } => Some(path.as_path()),
            Entry::Directory { .. } => None,
        })
    }

    pub fn to_text(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("{}\t{}\n", PATH_TAG, self.source_path.display()));
        out.push_str(&format!("{}\t{}\n", TIME_TAG, self.captured_at.format(TIME_FORMAT)));
        for child in &self.children {
            match child {
                Entry::Directory { name } => out.push_str(&format!("{}\t{}\n", DIRECTORY_TAG, name)),
                Entry::File { name, path } => {
                    out.push_str(&format!("{}\t{}\t{}\n", FILE_TAG, name, path.display()))
                }
            }
        }
        out
    }

    /// Parse manifest text. `origin` only names the file in errors.
    pub fn parse(text: &str, origin: &Path) -> Result<Manifest> {
        let mut source_path = None;
        let mut captured_at = None;
        let mut children = Vec::new();

        for line in text.lines() {
            let mut fields = line.splitn(3, '\t');
            match (fields.next(), fields.next(), fields.next()) {
                (Some(PATH_TAG), Some(path), _) if source_path.is_none() => {
                    source_path = Some(PathBuf::from(path));
                }
                (Some(TIME_TAG), Some(time), _) => {
                    let parsed = NaiveDateTime::parse_from_str(time.trim(), TIME_FORMAT).map_err(|e| {
                        EngineError::CorruptManifest {
                            path: origin.to_path_buf(),
                            reason: format!("bad {} '{}': {}", TIME_TAG, time, e),
                        }
                    })?;
                    captured_at = Some(parsed);
                }
                (Some(DIRECTORY_TAG), Some(name), None) => {
                    children.push(Entry::Directory {
                        name: name.to_string(),
                    });
                }
                (Some(FILE_TAG), Some(name), Some(path)) => {
                    children.push(Entry::File {
                        name: name.to_string(),
                        path: PathBuf::from(path),
                    });
                }
                _ => {}
            }
        }

        let source_path = source_path.ok_or_else(|| EngineError::MissingPathHeader {
            path: origin.to_path_buf(),
        })?;
        let captured_at = captured_at.ok_or_else(|| EngineError::CorruptManifest {
            path: origin.to_path_buf(),
            reason: format!("{} line missing", TIME_TAG),
        })?;

        Ok(Manifest {
            source_path,
            captured_at,
            children,
        })
    }

    /// Write the manifest to `path`, which must not exist yet.
    pub fn write(&self, path: &Path) -> Result<()> {
        fs_ops::write_new_file(path, self.to_text().as_bytes()).map_err(|e| EngineError::WriteError {
            path: path.to_path_buf(),
            source: e,
        })
    }

    pub fn load(path: &Path) -> Result<Manifest> {
        let text = fs::read_to_string(path).map_err(|e| EngineError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;
        Manifest::parse(&text, path)
    }
}

/// Read only the `PATH` header of the manifest at `path`.
pub fn read_source_path(path: &Path) -> Result<PathBuf> {
    let read_err = |e: io::Error| EngineError::ReadError {
        path: path.to_path_buf(),
        source: e,
    };
    let file = fs::File::open(path).map_err(read_err)?;
    for line in BufReader::new(file).lines() {
        let line = line.map_err(read_err)?;
        if let Some((PATH_TAG, value)) = line.split_once('\t') {
            return Ok(PathBuf::from(value));
        }
    }
    Err(EngineError::MissingPathHeader {
        path: path.to_path_buf(),
    })
}
