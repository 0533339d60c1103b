//! Progress reporting trait.
//!
//! This module defines the ProgressCallback trait, which decouples the
//! staging engine from whatever front end is watching it. The CLI prints
//! one line per event; tests record events in memory.

use crate::label::ManifestId;
use crate::model::Direction;
use crate::tracker::{JobOutcome, ReconcileReport};

/// Trait for receiving progress updates during reconcile and run passes.
///
/// All methods are called synchronously, in job order, from the thread
/// driving the pass. Every method has an empty default so implementors
/// only override what they display.
pub trait ProgressCallback: Send {
    /// Called before the first job of a reconcile pass is checked.
    fn on_reconcile_started(&self, _direction: Direction, _total: usize) {}

    /// Called once per catalog entry with what reconcile decided for it.
    fn on_job_checked(&self, _id: &ManifestId, _outcome: &JobOutcome) {}

    /// Called after the last job of a reconcile pass.
    fn on_reconcile_completed(&self, _report: &ReconcileReport) {}

    /// Called before a pending job script is executed.
    fn on_job_started(&self, _id: &ManifestId) {}

    /// Called after a job script exits.
    fn on_job_finished(&self, _id: &ManifestId, _success: bool) {}
}
