//! Running pending job scripts on this machine.
//!
//! Running never promotes a job. Scripts leave their evidence behind and a
//! later reconcile decides what is done, exactly as for jobs run elsewhere.

use crate::error::{EngineError, Result};
use crate::label::ManifestId;
use crate::progress::ProgressCallback;
use crate::queue::JobQueue;
use std::path::Path;
use std::process::{Command, Stdio};

/// Executes one job script.
pub trait JobRunner {
    /// Run the script at `script`, returning whether it exited successfully.
    ///
    /// # Errors
    /// `JobLaunchFailed` if the script could not be started at all.
    fn run(&self, script: &Path) -> Result<bool>;
}

/// Runs scripts through a shell interpreter.
#[derive(Debug, Clone)]
pub struct ShellRunner {
    pub shell: String,
    /// Show the script's stdout (the archiver's file listing)
    pub verbose: bool,
}

impl ShellRunner {
    pub fn new(shell: impl Into<String>, verbose: bool) -> Self {
        ShellRunner {
            shell: shell.into(),
            verbose,
        }
    }
}

impl JobRunner for ShellRunner {
    fn run(&self, script: &Path) -> Result<bool> {
        let mut cmd = Command::new(&self.shell);
        cmd.arg(script).stdin(Stdio::null());
        if !self.verbose {
            cmd.stdout(Stdio::null());
        }
        let status = cmd.status().map_err(|e| EngineError::JobLaunchFailed {
            path: script.to_path_buf(),
            source: e,
        })?;
        Ok(status.success())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub succeeded: Vec<ManifestId>,
    pub failed: Vec<ManifestId>,
}

impl RunSummary {
    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }
}

/// Run every currently pending job once, in label order.
///
/// A script that exits non-zero is recorded and the pass continues.
///
/// # Errors
/// If the pending set cannot be listed or a script cannot be launched.
pub fn run_pending(
    queue: &JobQueue,
    runner: &dyn JobRunner,
    progress: Option<&dyn ProgressCallback>,
) -> Result<RunSummary> {
    let mut summary = RunSummary::default();
    for id in queue.pending()? {
        let script = queue.pending_path(&id);
        if !script.exists() {
            // Promoted by another worker since the listing.
            continue;
        }
        if let Some(cb) = progress {
            cb.on_job_started(&id);
        }

        let success = runner.run(&script)?;
        if success {
            tracing::debug!(job = %id, "job script finished");
        } else {
            tracing::warn!(job = %id, script = %script.display(), "job script failed");
        }

        if let Some(cb) = progress {
            cb.on_job_finished(&id, success);
        }
        if success {
            summary.succeeded.push(id);
        } else {
            summary.failed.push(id);
        }
    }

    tracing::info!(
        succeeded = summary.succeeded.len(),
        failed = summary.failed.len(),
        "run finished"
    );
    Ok(summary)
}
