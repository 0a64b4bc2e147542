// src/dag/scheduler_step.rs

//! Step-by-step result type for the scheduler.

use crate::types::TaskKey;

/// Structured result of reporting one task completion to the scheduler.
///
/// This is useful for tests that want to manually step the DAG and make
/// assertions about what changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchedulerStep {
    /// Tasks whose dependencies all succeeded as a result of this step.
    pub newly_ready: Vec<TaskKey>,
    /// Tasks that will never run because something upstream failed.
    pub newly_blocked: Vec<TaskKey>,
}
