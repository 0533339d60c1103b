//! Flat labels for directories.
//!
//! Every directory of a backup run is identified by a label derived from its
//! absolute path. The label names the manifest, the archive and the job for
//! that directory, and is the key the catalog refers to.
//!
//! The mapping is not collision free: `/a/b` and `/a__b` both encode to
//! `a__b`. Staging files are written once, so two colliding directories
//! make preparation fail rather than silently share files.

use std::fmt;
use std::path::Path;

pub const MANIFEST_EXTENSION: &str = "loc";
pub const ARCHIVE_EXTENSION: &str = "tar.gz";
pub const JOB_EXTENSION: &str = "sh";

/// Encode a directory path into a label usable as a file name.
///
/// Leading `/` and `.` characters are stripped, each run of `/` becomes
/// `__`, and any run of three or more underscores is collapsed to two.
pub fn encode(path: &str) -> String {
    let trimmed = path.trim_start_matches(['/', '.']);

    let mut separated = String::with_capacity(trimmed.len() + 8);
    let mut in_separator = false;
    for c in trimmed.chars() {
        if c == '/' {
            if !in_separator {
                separated.push_str("__");
            }
            in_separator = true;
        } else {
            separated.push(c);
            in_separator = false;
        }
    }

    let mut label = String::with_capacity(separated.len());
    let mut underscores = 0;
    for c in separated.chars() {
        if c == '_' {
            underscores += 1;
            if underscores > 2 {
                continue;
            }
        } else {
            underscores = 0;
        }
        label.push(c);
    }
    label
}

/// Identity shared by a manifest, its archive and its job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ManifestId(String);

impl ManifestId {
    /// Label for the directory at `path`.
    pub fn for_directory(path: &Path) -> Self {
        ManifestId(encode(&path.to_string_lossy()))
    }

    /// Wrap an already encoded label.
    pub fn from_label(label: impl Into<String>) -> Self {
        ManifestId(label.into())
    }

    /// Recover the id from a `<label>.loc` file name.
    pub fn from_manifest_file_name(file_name: &str) -> Option<Self> {
        file_name
            .strip_suffix(MANIFEST_EXTENSION)
            .and_then(|rest| rest.strip_suffix('.'))
            .map(|label| ManifestId(label.to_string()))
    }

    /// Recover the id from a `<label>.sh` job file name.
    pub fn from_job_file_name(file_name: &str) -> Option<Self> {
        file_name
            .strip_suffix(JOB_EXTENSION)
            .and_then(|rest| rest.strip_suffix('.'))
            .map(|label| ManifestId(label.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn manifest_file_name(&self) -> String {
        format!("{}.{}", self.0, MANIFEST_EXTENSION)
    }

    pub fn archive_file_name(&self) -> String {
        format!("{}.{}", self.0, ARCHIVE_EXTENSION)
    }

    pub fn job_file_name(&self) -> String {
        format!("{}.{}", self.0, JOB_EXTENSION)
    }
}

impl fmt::Display for ManifestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
