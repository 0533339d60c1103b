//! Where things live inside a staging directory.
//!
//! ```text
//! <root>/catalog.txt            catalog (+ catalog.txt.<ext> sidecar)
//! <root>/files/<label>.loc      manifests, archives and their sidecars
//! <root>/.backup_jobs/pending/  job scripts waiting to run or to be verified
//! <root>/.backup_jobs/done/     verified job scripts
//! ```
//!
//! A restore destination only uses the `.backup_jobs` part; the restored
//! tree itself is created next to it.

use crate::label::ManifestId;
use std::path::{Path, PathBuf};

pub const CATALOG_FILE_NAME: &str = "catalog.txt";
pub const FILES_DIR_NAME: &str = "files";
pub const JOBS_DIR_NAME: &str = ".backup_jobs";
pub const PENDING_DIR_NAME: &str = "pending";
pub const DONE_DIR_NAME: &str = "done";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagingLayout {
    root: PathBuf,
}

impl StagingLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        StagingLayout { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn catalog_path(&self) -> PathBuf {
        self.root.join(CATALOG_FILE_NAME)
    }

    pub fn files_dir(&self) -> PathBuf {
        self.root.join(FILES_DIR_NAME)
    }

    pub fn jobs_dir(&self) -> PathBuf {
        self.root.join(JOBS_DIR_NAME)
    }

    pub fn pending_dir(&self) -> PathBuf {
        self.jobs_dir().join(PENDING_DIR_NAME)
    }

    pub fn done_dir(&self) -> PathBuf {
        self.jobs_dir().join(DONE_DIR_NAME)
    }

    pub fn manifest_path(&self, id: &ManifestId) -> PathBuf {
        self.files_dir().join(id.manifest_file_name())
    }

    pub fn archive_path(&self, id: &ManifestId) -> PathBuf {
        self.files_dir().join(id.archive_file_name())
    }

    /// The two artifacts whose sidecars must verify before a backup job is done.
    pub fn backup_evidence(&self, id: &ManifestId) -> [PathBuf; 2] {
        [self.manifest_path(id), self.archive_path(id)]
    }
}
