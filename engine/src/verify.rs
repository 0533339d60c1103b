//! Full verification passes over a finished backup or restore.
//!
//! Unlike reconcile, which stops looking at a job once it is done, these
//! passes re-check every artifact and collect every failure.

use crate::catalog::Catalog;
use crate::checksums::{check_sidecar, ChecksumAlgorithm, SidecarStatus};
use crate::error::Result;
use crate::layout::StagingLayout;
use crate::manifest::Manifest;
use crate::remap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationFailure {
    /// An artifact whose sidecar did not verify
    Sidecar { path: PathBuf, status: SidecarStatus },
    /// A restored entry that is not on disk
    Missing { path: PathBuf },
}

impl fmt::Display for VerificationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VerificationFailure::Sidecar { path, status } => write!(f, "{}: {}", path.display(), status),
            VerificationFailure::Missing { path } => write!(f, "{}: missing", path.display()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VerificationReport {
    /// Number of artifacts or entries examined
    pub checked: usize,
    pub failures: Vec<VerificationFailure>,
}

impl VerificationReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    fn check_artifact(&mut self, artifact: &Path, algorithm: ChecksumAlgorithm) {
        self.checked += 1;
        let status = check_sidecar(artifact, algorithm);
        if !status.is_verified() {
            tracing::warn!(artifact = %artifact.display(), %status, "checksum verification failed");
            self.failures.push(VerificationFailure::Sidecar {
                path: artifact.to_path_buf(),
                status,
            });
        }
    }
}

/// Verify the catalog, every manifest and every archive of a backup.
///
/// `algorithm` is used as given; callers holding a catalog pick it with
/// [`Catalog::resolve_checksum`].
///
/// # Errors
/// Only if the catalog itself cannot be read or parsed.
pub fn verify_backup(layout: &StagingLayout, algorithm: ChecksumAlgorithm) -> Result<VerificationReport> {
    let mut report = VerificationReport::default();
    let catalog_path = layout.catalog_path();
    report.check_artifact(&catalog_path, algorithm);

    let catalog = Catalog::load(&catalog_path)?;
    for id in catalog.manifest_refs() {
        report.check_artifact(&layout.manifest_path(id), algorithm);
        report.check_artifact(&layout.archive_path(id), algorithm);
    }

    tracing::info!(
        checked = report.checked,
        failed = report.failures.len(),
        "backup verification finished"
    );
    Ok(report)
}

/// Check that every entry recorded in the backup exists under `destination`.
///
/// # Errors
/// If the catalog or a manifest cannot be read, or a manifest lies outside
/// the recorded root.
pub fn verify_restore(backup: &StagingLayout, destination: &Path) -> Result<VerificationReport> {
    let catalog = Catalog::load(&backup.catalog_path())?;
    let mut report = VerificationReport::default();

    for id in catalog.manifest_refs() {
        let manifest = Manifest::load(&backup.manifest_path(id))?;
        let target = remap::remap(&manifest.source_path, catalog.source_root(), destination)?;
        for entry in &manifest.children {
            let path = target.join(entry.name());
            report.checked += 1;
            let present = if entry.is_dir() {
                path.is_dir()
            } else {
                fs::symlink_metadata(&path).is_ok()
            };
            if !present {
                report.failures.push(VerificationFailure::Missing { path });
            }
        }
    }

    tracing::info!(
        checked = report.checked,
        missing = report.failures.len(),
        "restore verification finished"
    );
    Ok(report)
}
