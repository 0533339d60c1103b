//! Error types for the staging engine.
//!
//! `EngineError` covers everything that stops an operation: bad source or
//! destination state, structurally broken catalog/manifest files, and
//! preparation failures. A checksum mismatch or a missing restored file is
//! NOT an error; those are reported through `SidecarStatus` and
//! `VerificationReport` so that callers can accumulate them.

use crate::checksums::ChecksumAlgorithm;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that abort an engine operation.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Source directory (tree to back up, or backup to restore from) is missing
    #[error("Source directory not found: {}", path.display())]
    SourceMissing { path: PathBuf },

    /// A path that must be a directory is something else
    #[error("Not a directory: {}", path.display())]
    NotADirectory { path: PathBuf },

    /// Destination already holds content; preparation must start from scratch
    #[error("Destination already exists and is not empty: {}", path.display())]
    DestinationExists { path: PathBuf },

    /// Destination would be captured by its own backup
    #[error("Destination {} lies inside source {}", path.display(), root.display())]
    DestinationInsideSource { path: PathBuf, root: PathBuf },

    /// Requested sidecar algorithm differs from the one the backup was prepared with
    #[error("Backup {} uses {recorded} checksums, not {requested}", path.display())]
    ChecksumConflict {
        path: PathBuf,
        recorded: ChecksumAlgorithm,
        requested: ChecksumAlgorithm,
    },

    /// Settings file could not be read or parsed
    #[error("Invalid settings in {}: {message}", path.display())]
    InvalidSettings { path: PathBuf, message: String },

    /// Catalog framing is broken (start/end marker or SOURCE declaration missing)
    #[error("Corrupt catalog {}: {reason}", path.display())]
    CorruptCatalog { path: PathBuf, reason: String },

    /// Manifest has no PATH header line
    #[error("PATH not found in {}", path.display())]
    MissingPathHeader { path: PathBuf },

    /// Manifest is present but otherwise malformed
    #[error("Corrupt manifest {}: {reason}", path.display())]
    CorruptManifest { path: PathBuf, reason: String },

    /// Path is not located under the recorded root it should be remapped from
    #[error("Path {} is not under root {}", path.display(), root.display())]
    PathNotUnderRoot { path: PathBuf, root: PathBuf },

    /// Failed to create a directory
    #[error("Failed to create directory: {}", path.display())]
    DirectoryCreateFailed { path: PathBuf, source: io::Error },

    /// A job with this identity is already pending or done
    #[error("Job already exists: {}", path.display())]
    JobAlreadyExists { path: PathBuf },

    /// Moving a job from pending to done failed for a reason other than a lost race
    #[error("Failed to promote job: {}", path.display())]
    PromotionFailed { path: PathBuf, source: io::Error },

    /// The job runner could not start a job script
    #[error("Failed to launch job: {}", path.display())]
    JobLaunchFailed { path: PathBuf, source: io::Error },

    /// Failed to read a file
    #[error("Failed to read file: {}", path.display())]
    ReadError { path: PathBuf, source: io::Error },

    /// Failed to write a file
    #[error("Failed to write file: {}", path.display())]
    WriteError { path: PathBuf, source: io::Error },

    /// Failed to enumerate a directory
    #[error("Failed to enumerate directory: {}", path.display())]
    EnumerationFailed { path: PathBuf, source: io::Error },

    /// Path cannot be represented in the line-oriented staging files
    #[error("Invalid path: {} ({reason})", path.display())]
    InvalidPath { path: PathBuf, reason: String },
}

impl EngineError {
    /// True for errors caused by the caller's source/destination/settings choice.
    ///
    /// These are detected before anything is written.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            Self::SourceMissing { .. }
                | Self::NotADirectory { .. }
                | Self::DestinationExists { .. }
                | Self::DestinationInsideSource { .. }
                | Self::ChecksumConflict { .. }
                | Self::InvalidSettings { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
