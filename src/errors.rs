// src/errors.rs

//! Crate-wide error type.
//!
//! Task, target and cloud code works with `anyhow`; the engine wraps those
//! errors together with the offending task key into [`ConvergeError`].

use thiserror::Error;

use crate::types::{TargetKind, TaskKey};

#[derive(Error, Debug)]
pub enum ConvergeError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Duplicate task key: {0}")]
    DuplicateTask(TaskKey),

    #[error("Task not found: {0}")]
    TaskNotFound(TaskKey),

    #[error("Task '{task}' depends on unknown task '{dependency}'")]
    UnknownDependency { task: TaskKey, dependency: TaskKey },

    #[error(
        "Task '{task}' references '{dependency}' as {expected}, but it is registered as {actual}"
    )]
    DependencyKindMismatch {
        task: TaskKey,
        dependency: TaskKey,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("No {target} renderer for task(s): {}", tasks.join(", "))]
    MissingRenderer {
        target: TargetKind,
        tasks: Vec<TaskKey>,
    },

    #[error("Task '{task}': field '{field}' cannot be changed")]
    CannotChangeField { task: TaskKey, field: &'static str },

    #[error("Task '{task}': invalid change to '{field}': {reason}")]
    InvalidChange {
        task: TaskKey,
        field: &'static str,
        reason: String,
    },

    #[error("Cycle detected in DAG involving tasks: {}", members.join(", "))]
    DagCycle {
        /// Tasks that sit on a cycle.
        members: Vec<TaskKey>,
        /// Every task that could not be ordered (cycle members plus anything
        /// depending on them).
        unresolved: Vec<TaskKey>,
    },

    #[error("Discovery failed for task '{task}': {error:#}")]
    Discovery { task: TaskKey, error: anyhow::Error },

    #[error("Apply failed for task '{task}': {error:#}")]
    Apply { task: TaskKey, error: anyhow::Error },

    #[error("Validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),

    #[error("Run cancelled; tasks not executed: {}", pending.join(", "))]
    Cancelled { pending: Vec<TaskKey> },

    #[error("{} tasks failed: {}", .0.len(), join_errors(.0))]
    Failed(Vec<ConvergeError>),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ConvergeError {
    /// Key of the task this error is about, if it is about a single task.
    pub fn task(&self) -> Option<&str> {
        match self {
            ConvergeError::UnknownDependency { task, .. }
            | ConvergeError::DependencyKindMismatch { task, .. }
            | ConvergeError::CannotChangeField { task, .. }
            | ConvergeError::InvalidChange { task, .. }
            | ConvergeError::Discovery { task, .. }
            | ConvergeError::Apply { task, .. } => Some(task),
            ConvergeError::DuplicateTask(task) | ConvergeError::TaskNotFound(task) => Some(task),
            _ => None,
        }
    }
}

fn join_errors(errors: &[ConvergeError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, ConvergeError>;
