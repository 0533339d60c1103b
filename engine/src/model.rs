//! Shared enums for the job lifecycle.
//!
//! - Direction: whether a run backs a tree up or restores it
//! - JobState: the two queue states a job can be in

use std::fmt;

/// Direction of a staging run. Also the kind of every job in that run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Archive each source directory into the staging area
    Backup,
    /// Extract each archive into a destination tree
    Restore,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Backup => write!(f, "backup"),
            Direction::Restore => write!(f, "restore"),
        }
    }
}

/// The state of a single job.
///
/// There is no failure state: a job whose execution failed stays `Pending`
/// until it is re-run and verified. `Done` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    /// Waiting to be executed or verified
    Pending,
    /// Verified and moved to the done set
    Done,
}
