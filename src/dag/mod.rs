// src/dag/mod.rs

//! Dependency graph construction, ordering and scheduling.
//!
//! - [`walk`] finds the task references nested in a task's fields.
//! - [`deps`] turns a [`TaskMap`](crate::task::TaskMap) into a dependency map.
//! - [`graph`] holds the adjacency view of that map.
//! - [`sort`] computes the deterministic execution order and reports cycles.
//! - [`scheduler`] is the per-run state machine used for concurrent runs.
//! - [`scheduler_step`] defines the result type for scheduler steps.

pub mod deps;
pub mod graph;
pub mod scheduler;
pub mod scheduler_step;
pub mod sort;
pub mod walk;

pub use deps::find_task_dependencies;
pub use graph::{DagGraph, DependencyMap};
pub use scheduler::{NodeState, Scheduler};
pub use scheduler_step::SchedulerStep;
pub use sort::{topological_order, ExecutionOrder};
pub use walk::{DependencyRef, Walk, Walker};
