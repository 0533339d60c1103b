//! Reconciling the pending set against what is actually on disk.
//!
//! A job is complete when its direction's evidence exists: both sidecars
//! verify for a backup, every recorded entry is present under the
//! destination for a restore. Reconcile promotes complete jobs and leaves
//! the rest pending, so it can be run any number of times, by any number of
//! workers, after jobs have run anywhere.

use crate::catalog::Catalog;
use crate::checksums::{verify_sidecar, ChecksumAlgorithm};
use crate::error::Result;
use crate::label::ManifestId;
use crate::layout::StagingLayout;
use crate::manifest::Manifest;
use crate::model::Direction;
use crate::progress::ProgressCallback;
use crate::queue::{JobQueue, Promotion};
use crate::remap;
use std::fs;
use std::path::{Path, PathBuf};

/// How a job is judged complete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionCheck {
    /// The manifest and archive sidecars both verify
    Backup { algorithm: ChecksumAlgorithm },
    /// Every entry of the manifest exists under the destination
    Restore { destination_root: PathBuf },
}

impl CompletionCheck {
    pub fn direction(&self) -> Direction {
        match self {
            CompletionCheck::Backup { .. } => Direction::Backup,
            CompletionCheck::Restore { .. } => Direction::Restore,
        }
    }
}

/// What reconcile did with one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    AlreadyDone,
    Promoted,
    /// Evidence is missing; `missing` names the first absent artifact
    Incomplete { missing: PathBuf },
    /// The job file disappeared, most likely promoted by another worker
    Vanished,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub promoted: usize,
    pub remaining: usize,
    pub already_done: usize,
    pub vanished: usize,
}

impl ReconcileReport {
    pub fn total(&self) -> usize {
        self.promoted + self.remaining + self.already_done + self.vanished
    }

    /// True when nothing is left pending.
    pub fn is_complete(&self) -> bool {
        self.remaining == 0
    }

    fn record(&mut self, outcome: &JobOutcome) {
        match outcome {
            JobOutcome::AlreadyDone => self.already_done += 1,
            JobOutcome::Promoted => self.promoted += 1,
            JobOutcome::Incomplete { .. } => self.remaining += 1,
            JobOutcome::Vanished => self.vanished += 1,
        }
    }
}

fn backup_gap(layout: &StagingLayout, id: &ManifestId, algorithm: ChecksumAlgorithm) -> Option<PathBuf> {
    layout
        .backup_evidence(id)
        .into_iter()
        .find(|artifact| !verify_sidecar(artifact, algorithm))
}

fn restore_gap(
    manifest_path: &Path,
    recorded_root: &Path,
    destination_root: &Path,
) -> Result<Option<PathBuf>> {
    let manifest = Manifest::load(manifest_path)?;
    let target = remap::remap(&manifest.source_path, recorded_root, destination_root)?;
    Ok(manifest
        .children
        .iter()
        .map(|entry| target.join(entry.name()))
        .find(|path| fs::symlink_metadata(path).is_err()))
}

/// Evaluate the completion predicate of one job.
///
/// Returns the first missing piece of evidence, or None if the job is
/// complete.
pub fn missing_evidence(
    catalog: &Catalog,
    backup: &StagingLayout,
    id: &ManifestId,
    check: &CompletionCheck,
) -> Result<Option<PathBuf>> {
    match check {
        CompletionCheck::Backup { algorithm } => Ok(backup_gap(backup, id, *algorithm)),
        CompletionCheck::Restore { destination_root } => restore_gap(
            &backup.manifest_path(id),
            catalog.source_root(),
            destination_root,
        ),
    }
}

/// Promote every job of the catalog whose completion predicate holds.
///
/// `backup` is the staging area the catalog lives in; `queue` is the queue
/// being reconciled (the backup's own for a backup, the destination's for a
/// restore).
///
/// # Errors
/// Incomplete jobs are never an error. An unreadable or malformed manifest,
/// a manifest outside the recorded root, or a failed rename aborts the pass.
pub fn reconcile(
    catalog: &Catalog,
    backup: &StagingLayout,
    queue: &JobQueue,
    check: &CompletionCheck,
    progress: Option<&dyn ProgressCallback>,
) -> Result<ReconcileReport> {
    let direction = check.direction();
    let refs = catalog.manifest_refs();
    if let Some(cb) = progress {
        cb.on_reconcile_started(direction, refs.len());
    }

    let mut report = ReconcileReport::default();
    for id in refs {
        let outcome = if queue.is_done(id) {
            JobOutcome::AlreadyDone
        } else if let Some(missing) = missing_evidence(catalog, backup, id, check)? {
            tracing::debug!(job = %id, missing = %missing.display(), "job incomplete");
            JobOutcome::Incomplete { missing }
        } else {
            match queue.promote(id)? {
                Promotion::Promoted => JobOutcome::Promoted,
                Promotion::AlreadyDone => JobOutcome::AlreadyDone,
                Promotion::Vanished => JobOutcome::Vanished,
            }
        };

        report.record(&outcome);
        if let Some(cb) = progress {
            cb.on_job_checked(id, &outcome);
        }
    }

    tracing::info!(
        %direction,
        total = report.total(),
        promoted = report.promoted,
        remaining = report.remaining,
        already_done = report.already_done,
        "reconcile finished"
    );
    if let Some(cb) = progress {
        cb.on_reconcile_completed(&report);
    }
    Ok(report)
}
