//! Job generation.
//!
//! A job is one bash script per manifest. Backup scripts archive the files
//! of one directory and checksum the archive; restore scripts extract one
//! archive into its remapped destination. The scripts are the only thing
//! workers execute; archiving, extraction and hashing inside them are done
//! by `tar`, `awk` and the checksum tool of the chosen algorithm.

use crate::checksums::ChecksumAlgorithm;
use crate::error::{EngineError, Result};
use crate::label::ManifestId;
use crate::layout::StagingLayout;
use crate::manifest::Manifest;
use crate::model::{Direction, JobState};
use crate::queue::JobQueue;
use crate::remap;
use std::path::{Path, PathBuf};

/// One deferred unit of archive creation or extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub kind: Direction,

    /// Identity shared with the manifest
    pub id: ManifestId,

    pub manifest_path: PathBuf,

    /// Archive this job produces (backup) or consumes (restore)
    pub archive_path: PathBuf,

    /// Directory the script changes into: the source directory for a
    /// backup, the remapped destination directory for a restore
    pub working_dir: PathBuf,

    /// Absolute source paths archived by a backup job; empty for restores
    pub inputs: Vec<PathBuf>,

    /// Algorithm of the archive sidecar a backup job writes
    pub algorithm: ChecksumAlgorithm,

    pub state: JobState,
}

/// Quote `s` for a POSIX shell.
fn sh_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "'\\''"))
}

fn script_path(path: &Path) -> Result<String> {
    path.to_str().map(sh_quote).ok_or_else(|| EngineError::InvalidPath {
        path: path.to_path_buf(),
        reason: "path is not valid UTF-8".to_string(),
    })
}

fn file_name(path: &Path) -> Result<String> {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .ok_or_else(|| EngineError::InvalidPath {
            path: path.to_path_buf(),
            reason: "path has no UTF-8 file name".to_string(),
        })
}

impl Job {
    /// Render the executable script for this job.
    pub fn script(&self) -> Result<String> {
        let mut lines = vec![
            "#!/bin/bash".to_string(),
            "set -euo pipefail".to_string(),
            format!("cd {}", script_path(&self.working_dir)?),
        ];

        match self.kind {
            Direction::Backup => {
                // Members are stored relative to the directory so extraction
                // into a remapped destination recreates them in place.
                lines.push(format!(
                    "awk 'BEGIN {{FS=\"\\t\"}}; $1 == \"FILE\" && NF == 3 {{print $2}}' {} \
                     | tar -czv --verbatim-files-from --files-from=- -f {}",
                    script_path(&self.manifest_path)?,
                    script_path(&self.archive_path)?
                ));
                let files_dir = self.archive_path.parent().unwrap_or_else(|| Path::new("."));
                let archive_name = file_name(&self.archive_path)?;
                lines.push(format!("cd {}", script_path(files_dir)?));
                lines.push(format!(
                    "{} {} > {}",
                    self.algorithm.tool(),
                    sh_quote(&archive_name),
                    sh_quote(&format!("{}.{}", archive_name, self.algorithm.sidecar_extension()))
                ));
            }
            Direction::Restore => {
                lines.push(format!("tar -xvf {} -C .", script_path(&self.archive_path)?));
            }
        }

        let mut script = lines.join("\n");
        script.push('\n');
        Ok(script)
    }
}

/// Create the backup job for `manifest` and place it in the pending set.
///
/// # Errors
/// `JobAlreadyExists` if a job with the manifest's identity is pending or done.
pub fn generate_backup_job(
    queue: &JobQueue,
    layout: &StagingLayout,
    manifest: &Manifest,
    algorithm: ChecksumAlgorithm,
) -> Result<Job> {
    let id = ManifestId::for_directory(&manifest.source_path);
    let job = Job {
        kind: Direction::Backup,
        manifest_path: layout.manifest_path(&id),
        archive_path: layout.archive_path(&id),
        working_dir: manifest.source_path.clone(),
        inputs: manifest.file_paths().map(Path::to_path_buf).collect(),
        algorithm,
        state: JobState::Pending,
        id,
    };
    queue.enqueue(&job)?;
    tracing::debug!(job = %job.id, files = job.inputs.len(), "queued backup job");
    Ok(job)
}

/// Create the restore job for `manifest` and place it in the pending set.
///
/// `backup` is the staging area holding the archives; the job extracts into
/// the manifest's directory remapped from `recorded_root` to
/// `destination_root`.
///
/// # Errors
/// `PathNotUnderRoot` if the manifest does not belong under `recorded_root`,
/// `JobAlreadyExists` if a job with the same identity is pending or done.
pub fn generate_restore_job(
    queue: &JobQueue,
    backup: &StagingLayout,
    manifest: &Manifest,
    recorded_root: &Path,
    destination_root: &Path,
) -> Result<Job> {
    let id = ManifestId::for_directory(&manifest.source_path);
    let working_dir = remap::remap(&manifest.source_path, recorded_root, destination_root)?;
    let job = Job {
        kind: Direction::Restore,
        manifest_path: backup.manifest_path(&id),
        archive_path: backup.archive_path(&id),
        working_dir,
        inputs: Vec::new(),
        algorithm: ChecksumAlgorithm::default(),
        state: JobState::Pending,
        id,
    };
    queue.enqueue(&job)?;
    tracing::debug!(job = %job.id, into = %job.working_dir.display(), "queued restore job");
    Ok(job)
}
