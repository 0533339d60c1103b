//! # distbackup Engine - Distributed Backup Staging Library
//!
//! A headless engine that splits a directory tree into one unit of work per
//! directory so that backup or restore can run on any number of machines
//! sharing a staging area, with no coordinator while the work runs.
//!
//! ## Overview
//!
//! The engine prepares and tracks work; it never archives bytes itself.
//! It features:
//! - One manifest per directory, listed by a catalog
//! - One shell job per manifest, run by `tar` and a digest tool
//! - A pending/done job queue on plain files, promoted by atomic rename
//! - Checksum sidecars (md5, sha256, blake3) as proof of completion
//! - Path remapping and skeleton creation for restores into a new root
//! - Progress reporting via callbacks (decoupled from UI technology)
//!
//! ## Basic Usage
//!
//! ```no_run
//! use distbackup_engine::{prepare_backup, reconcile, CompletionCheck, Settings};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let settings = Settings::default();
//!
//! // Describe the tree and queue one job per directory
//! let run = prepare_backup("/data".as_ref(), "/mnt/shared/backup".as_ref(), &settings)?;
//! println!("{} jobs pending", run.jobs.len());
//!
//! // ... workers run the scripts in /mnt/shared/backup/.backup_jobs/pending ...
//!
//! // Promote every job whose sidecars verify
//! let check = CompletionCheck::Backup { algorithm: settings.checksum };
//! let report = reconcile(&run.catalog, &run.backup, &run.queue, &check, None)?;
//! println!("{} done, {} remaining", report.promoted, report.remaining);
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - **label**: Directory path to flat label encoding
//! - **checksums**: Digest computation and sidecar files
//! - **manifest**: Per-directory manifests
//! - **catalog**: The list of manifests of one backup
//! - **remap**: Path remapping and restore directory skeletons
//! - **job**: Backup and restore job scripts
//! - **queue**: Pending/done job queue
//! - **tracker**: Reconciling jobs against their evidence
//! - **prepare**: Backup and restore preparation
//! - **verify**: Full verification passes
//! - **runner**: Local execution of pending jobs
//! - **progress**: Progress callback trait
//! - **layout**, **config**, **fs_ops**, **model**, **error**: Supporting types

pub mod catalog;
pub mod checksums;
pub mod config;
pub mod error;
pub mod fs_ops;
pub mod job;
pub mod label;
pub mod layout;
pub mod manifest;
pub mod model;
pub mod prepare;
pub mod progress;
pub mod queue;
pub mod remap;
pub mod runner;
pub mod tracker;
pub mod verify;

// Re-export main types and functions
pub use catalog::{Catalog, ManifestRef};
pub use checksums::{
    check_sidecar, compute_file_checksum, generate_sidecar, verify_sidecar, ChecksumAlgorithm, ChecksumValue,
    Sidecar, SidecarStatus,
};
pub use config::Settings;
pub use error::{EngineError, Result};
pub use job::{generate_backup_job, generate_restore_job, Job};
pub use label::{encode, ManifestId};
pub use layout::StagingLayout;
pub use manifest::{describe, Entry, Manifest};
pub use model::{Direction, JobState};
pub use prepare::{include_binary, prepare_backup, prepare_restore, PreparedRun};
pub use progress::ProgressCallback;
pub use queue::{JobQueue, Promotion};
pub use remap::{build_tree, materialize, remap, DirTree};
pub use runner::{run_pending, JobRunner, RunSummary, ShellRunner};
pub use tracker::{reconcile, CompletionCheck, JobOutcome, ReconcileReport};
pub use verify::{verify_backup, verify_restore, VerificationFailure, VerificationReport};
