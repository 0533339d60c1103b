//! The pending/done work queue.
//!
//! Jobs are files in two sibling directories of shared storage. A job is
//! enqueued by creating its script in `pending/` and completed by renaming
//! it into `done/`. The rename is the only synchronization between workers:
//! when two workers promote the same job, one rename succeeds and the other
//! finds the source gone, which is reported as a lost race and not an error.

use crate::error::{EngineError, Result};
use crate::fs_ops;
use crate::job::Job;
use crate::label::ManifestId;
use crate::layout::StagingLayout;
use crate::model::JobState;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Result of trying to move a job from pending to done.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Promotion {
    /// This call moved the job
    Promoted,
    /// The job was already done, possibly promoted by another worker
    AlreadyDone,
    /// Neither a pending nor a done job exists for this identity
    Vanished,
}

#[derive(Debug, Clone)]
pub struct JobQueue {
    pending_dir: PathBuf,
    done_dir: PathBuf,
}

impl JobQueue {
    /// Open the queue of an existing staging directory.
    pub fn open(layout: &StagingLayout) -> Self {
        JobQueue {
            pending_dir: layout.pending_dir(),
            done_dir: layout.done_dir(),
        }
    }

    /// Create the queue directories of a staging directory.
    pub fn create(layout: &StagingLayout) -> Result<Self> {
        let queue = JobQueue::open(layout);
        fs_ops::create_dir_all(&queue.pending_dir)?;
        fs_ops::create_dir_all(&queue.done_dir)?;
        Ok(queue)
    }

    pub fn pending_dir(&self) -> &Path {
        &self.pending_dir
    }

    pub fn done_dir(&self) -> &Path {
        &self.done_dir
    }

    pub fn pending_path(&self, id: &ManifestId) -> PathBuf {
        self.pending_dir.join(id.job_file_name())
    }

    pub fn done_path(&self, id: &ManifestId) -> PathBuf {
        self.done_dir.join(id.job_file_name())
    }

    /// Write `job` into the pending set.
    ///
    /// # Errors
    /// `JobAlreadyExists` if the identity is already pending or done.
    pub fn enqueue(&self, job: &Job) -> Result<PathBuf> {
        let done = self.done_path(&job.id);
        if done.exists() {
            return Err(EngineError::JobAlreadyExists { path: done });
        }

        let path = self.pending_path(&job.id);
        let script = job.script()?;
        match fs_ops::write_new_file(&path, script.as_bytes()) {
            Ok(()) => Ok(path),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                Err(EngineError::JobAlreadyExists { path })
            }
            Err(e) => Err(EngineError::WriteError { path, source: e }),
        }
    }

    /// Current state of the job, or None if no such job exists.
    pub fn state(&self, id: &ManifestId) -> Option<JobState> {
        if self.done_path(id).exists() {
            Some(JobState::Done)
        } else if self.pending_path(id).exists() {
            Some(JobState::Pending)
        } else {
            None
        }
    }

    pub fn is_done(&self, id: &ManifestId) -> bool {
        self.done_path(id).exists()
    }

    /// Atomically move a job from pending to done.
    ///
    /// # Errors
    /// `PromotionFailed` only for filesystem failures other than the source
    /// having disappeared.
    pub fn promote(&self, id: &ManifestId) -> Result<Promotion> {
        let done = self.done_path(id);
        if done.exists() {
            return Ok(Promotion::AlreadyDone);
        }

        let pending = self.pending_path(id);
        match fs::rename(&pending, &done) {
            Ok(()) => Ok(Promotion::Promoted),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                if done.exists() {
                    Ok(Promotion::AlreadyDone)
                } else {
                    Ok(Promotion::Vanished)
                }
            }
            Err(e) => Err(EngineError::PromotionFailed {
                path: pending,
                source: e,
            }),
        }
    }

    /// Identities of every pending job, sorted.
    pub fn pending(&self) -> Result<Vec<ManifestId>> {
        let entries = fs::read_dir(&self.pending_dir).map_err(|e| EngineError::EnumerationFailed {
            path: self.pending_dir.clone(),
            source: e,
        })?;

        let mut ids = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| EngineError::EnumerationFailed {
                path: self.pending_dir.clone(),
                source: e,
            })?;
            if let Some(id) = entry.file_name().to_str().and_then(ManifestId::from_job_file_name) {
                ids.push(id);
            }
        }
        ids.sort();
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksums::ChecksumAlgorithm;
    use crate::model::Direction;

    fn job(label: &str) -> Job {
        Job {
            kind: Direction::Restore,
            id: ManifestId::from_label(label),
            manifest_path: PathBuf::from(format!("/backup/files/{}.loc", label)),
            archive_path: PathBuf::from(format!("/backup/files/{}.tar.gz", label)),
            working_dir: PathBuf::from("/dst"),
            inputs: Vec::new(),
            algorithm: ChecksumAlgorithm::Md5,
            state: JobState::Pending,
        }
    }

    fn new_queue(temp_dir: &tempfile::TempDir) -> JobQueue {
        JobQueue::create(&StagingLayout::new(temp_dir.path())).expect("Failed to create queue")
    }

    #[test]
    fn test_enqueue_and_promote() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let queue = new_queue(&temp_dir);
        let job = job("src");

        queue.enqueue(&job).expect("Failed to enqueue");
        assert_eq!(queue.state(&job.id), Some(JobState::Pending));
        assert_eq!(queue.pending().expect("Failed to list"), vec![job.id.clone()]);

        assert_eq!(queue.promote(&job.id).expect("Failed to promote"), Promotion::Promoted);
        assert_eq!(queue.state(&job.id), Some(JobState::Done));
        assert!(queue.pending().expect("Failed to list").is_empty());
    }

    #[test]
    fn test_promote_twice_is_benign() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let queue = new_queue(&temp_dir);
        let job = job("src");
        queue.enqueue(&job).expect("Failed to enqueue");

        queue.promote(&job.id).expect("Failed to promote");
        assert_eq!(queue.promote(&job.id).expect("Second promote"), Promotion::AlreadyDone);
    }

    #[test]
    fn test_promote_unknown_job_vanished() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let queue = new_queue(&temp_dir);
        assert_eq!(
            queue.promote(&ManifestId::from_label("ghost")).expect("Promote should not fail"),
            Promotion::Vanished
        );
        assert_eq!(queue.state(&ManifestId::from_label("ghost")), None);
    }

    #[test]
    fn test_racing_workers_promote_once() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let queue = new_queue(&temp_dir);
        let job = job("src__shared");
        queue.enqueue(&job).expect("Failed to enqueue");

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let queue = queue.clone();
                let id = job.id.clone();
                std::thread::spawn(move || queue.promote(&id).expect("Promote should not fail"))
            })
            .collect();
        let results: Vec<Promotion> = handles
            .into_iter()
            .map(|h| h.join().expect("Worker panicked"))
            .collect();

        assert_eq!(results.iter().filter(|r| **r == Promotion::Promoted).count(), 1);
        assert!(results.iter().all(|r| *r != Promotion::Vanished));
        assert!(queue.is_done(&job.id));
    }

    #[test]
    fn test_enqueue_refuses_done_job() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let queue = new_queue(&temp_dir);
        let job = job("src");
        queue.enqueue(&job).expect("Failed to enqueue");
        queue.promote(&job.id).expect("Failed to promote");

        assert!(matches!(queue.enqueue(&job), Err(EngineError::JobAlreadyExists { .. })));
        assert_eq!(queue.state(&job.id), Some(JobState::Done));
    }

    #[test]
    fn test_pending_ignores_foreign_files() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let queue = new_queue(&temp_dir);
        fs::write(queue.pending_dir().join("README"), b"notes").expect("Failed to write file");
        queue.enqueue(&job("b")).expect("Failed to enqueue");
        queue.enqueue(&job("a")).expect("Failed to enqueue");

        assert_eq!(
            queue.pending().expect("Failed to list"),
            vec![ManifestId::from_label("a"), ManifestId::from_label("b")]
        );
    }
}
