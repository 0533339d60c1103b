//! Preparing a backup or restore run.
//!
//! Preparation checks its inputs before it writes anything, then lays out
//! the staging area and fills the pending set with one job per directory.
//! A failure part way through leaves what was written for inspection; a
//! second preparation into the same destination is refused.

use crate::catalog::Catalog;
use crate::checksums::{check_sidecar, generate_sidecar, ChecksumAlgorithm};
use crate::config::Settings;
use crate::error::{EngineError, Result};
use crate::fs_ops;
use crate::job::{generate_backup_job, generate_restore_job, Job};
use crate::label::ManifestId;
use crate::layout::StagingLayout;
use crate::manifest::{self, Manifest};
use crate::queue::JobQueue;
use crate::remap;
use std::fs;
use std::path::{Path, PathBuf};

/// Everything a prepared run consists of.
#[derive(Debug)]
pub struct PreparedRun {
    /// Staging area holding the catalog, manifests and archives
    pub backup: StagingLayout,
    /// Queue the jobs were written to
    pub queue: JobQueue,
    pub catalog: Catalog,
    pub jobs: Vec<Job>,
    /// Restore only: directories created before any job ran
    pub directories_created: usize,
    /// Restore only: the destination root
    pub destination: Option<PathBuf>,
}

/// Stage a backup of `source` into `destination`.
///
/// # Errors
/// `SourceMissing`/`NotADirectory` for a bad source, `DestinationExists` if
/// the destination has content, `DestinationInsideSource` if the staging
/// area would be part of the captured tree. All of these are detected before
/// anything is written.
pub fn prepare_backup(source: &Path, destination: &Path, settings: &Settings) -> Result<PreparedRun> {
    let source = fs_ops::absolute(source)?;
    let destination = fs_ops::absolute(destination)?;
    fs_ops::require_directory(&source)?;
    if destination.starts_with(&source) {
        return Err(EngineError::DestinationInsideSource {
            path: destination,
            root: source,
        });
    }
    fs_ops::require_fresh_destination(&destination)?;

    let directories = fs_ops::walk_directories(&source)?;
    tracing::info!(
        source = %source.display(),
        destination = %destination.display(),
        directories = directories.len(),
        "preparing backup"
    );

    let layout = StagingLayout::new(&destination);
    fs_ops::create_dir_all(&layout.files_dir())?;
    let queue = JobQueue::create(&layout)?;

    let ids = directories.iter().map(|dir| ManifestId::for_directory(dir)).collect();
    let catalog = Catalog::create(&layout.catalog_path(), &source, ids, settings.checksum)?;

    let mut jobs = Vec::with_capacity(directories.len());
    for dir in &directories {
        let manifest = manifest::describe(dir)?;
        let id = ManifestId::for_directory(dir);
        let manifest_path = layout.manifest_path(&id);
        manifest.write(&manifest_path)?;
        generate_sidecar(&manifest_path, settings.checksum)?;
        jobs.push(generate_backup_job(&queue, &layout, &manifest, settings.checksum)?);
        tracing::debug!(directory = %dir.display(), entries = manifest.children.len(), "described directory");
    }

    Ok(PreparedRun {
        backup: layout,
        queue,
        catalog,
        jobs,
        directories_created: 0,
        destination: None,
    })
}

/// Copy `binary` into the staging root and write its checksum sidecar.
///
/// Workers that mount the staging area can then run the same build that
/// prepared it.
///
/// # Errors
/// `InvalidPath` if `binary` has no file name, `DestinationExists` if the
/// staging root already holds a file of that name, `ReadError` if the binary
/// cannot be copied.
pub fn include_binary(layout: &StagingLayout, binary: &Path, algorithm: ChecksumAlgorithm) -> Result<PathBuf> {
    let file_name = binary.file_name().ok_or_else(|| EngineError::InvalidPath {
        path: binary.to_path_buf(),
        reason: "binary path has no file name".to_string(),
    })?;
    let target = layout.root().join(file_name);
    if fs::symlink_metadata(&target).is_ok() {
        return Err(EngineError::DestinationExists { path: target });
    }

    fs::copy(binary, &target).map_err(|e| EngineError::ReadError {
        path: binary.to_path_buf(),
        source: e,
    })?;
    generate_sidecar(&target, algorithm)?;
    tracing::info!(binary = %target.display(), "binary copied into staging area");
    Ok(target)
}

/// Stage a restore of the backup at `backup_root` into `destination`.
///
/// The destination receives the full directory skeleton immediately and a
/// `.backup_jobs/` queue with one extraction job per manifest. The backup
/// itself is only read.
///
/// # Errors
/// `SourceMissing`/`NotADirectory` for a bad backup directory,
/// `DestinationExists` if the destination has content, `CorruptCatalog` or
/// `MissingPathHeader` for a damaged backup, `DirectoryCreateFailed` if the
/// skeleton cannot be created.
pub fn prepare_restore(backup_root: &Path, destination: &Path, settings: &Settings) -> Result<PreparedRun> {
    let backup_root = fs_ops::absolute(backup_root)?;
    let destination = fs_ops::absolute(destination)?;
    fs_ops::require_directory(&backup_root)?;
    fs_ops::require_fresh_destination(&destination)?;

    let backup = StagingLayout::new(&backup_root);
    let catalog_path = backup.catalog_path();
    let catalog = Catalog::load(&catalog_path)?;
    let algorithm = catalog.checksum().unwrap_or(settings.checksum);
    let status = check_sidecar(&catalog_path, algorithm);
    if !status.is_verified() {
        tracing::warn!(catalog = %catalog_path.display(), %status, "catalog checksum did not verify");
    }

    let files_dir = backup.files_dir();
    let tree = remap::build_tree(&catalog, &files_dir)?;
    tracing::info!(
        backup = %backup_root.display(),
        destination = %destination.display(),
        manifests = catalog.manifest_refs().len(),
        directories = tree.len(),
        "preparing restore"
    );

    let destination_layout = StagingLayout::new(&destination);
    fs_ops::create_dir_all(&destination)?;
    let queue = JobQueue::create(&destination_layout)?;
    let directories_created = remap::materialize(&tree, &destination)?;

    let mut jobs = Vec::new();
    for entry in catalog.list_manifests(&files_dir)? {
        let manifest = Manifest::load(&entry.manifest_path)?;
        jobs.push(generate_restore_job(
            &queue,
            &backup,
            &manifest,
            catalog.source_root(),
            &destination,
        )?);
    }

    Ok(PreparedRun {
        backup,
        queue,
        catalog,
        jobs,
        directories_created,
        destination: Some(destination),
    })
}
