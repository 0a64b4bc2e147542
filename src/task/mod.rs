// src/task/mod.rs

//! The task contract.
//!
//! A task is one piece of declaratively managed infrastructure. The engine
//! only ever talks to tasks through the [`Task`] trait:
//!
//! - [`Task::find`] discovers the actual state on the live target.
//! - [`Task::diff`] declares which fields are comparable; the engine turns
//!   that into a [`Changes`] delta.
//! - [`Task::check_changes`] rejects illegal deltas (immutable fields).
//! - [`Task::run`] fills in computed defaults and then hands over to the
//!   generic [`default_delta_run`] driver.
//! - [`Task::renderers`] maps each back-end to the function that applies a
//!   delta against it.
//!
//! Tasks reference each other through typed [`TaskRef`] handles; holding one
//! in a field is what makes the referenced task a dependency.

pub mod cell;
pub mod changes;
pub mod map;
pub mod resource;

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use thiserror::Error;

use crate::dag::Walk;
use crate::engine::Context;
use crate::errors::{ConvergeError, Result};
use crate::target::{ApiTarget, TerraformTarget};
use crate::types::{RunOutcome, TargetKind, TaskKey};

pub use cell::TaskCell;
pub use changes::{Changes, Differ};
pub use map::{TaskMap, TaskRef};
pub use resource::{BytesResource, FileResource, Resource, ResourceHolder, StringResource};

pub use crate::engine::driver::default_delta_run;

/// Boxed, sendable future used at every async trait seam.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Contract every managed resource type implements.
///
/// `Walk` is a supertrait: every task must describe how to find the task
/// references nested in its fields. `Default` is used as the empty "actual"
/// state when a resource is being created.
pub trait Task: Walk + Clone + Default + fmt::Debug + Send + Sync + 'static {
    /// Kind name used in logs, keys and error messages (e.g. `"SSHKey"`).
    const KIND: &'static str;

    /// Natural identity of the resource (usually its cloud-side name).
    ///
    /// Distinct from the graph key; used by `find` to correlate a discovered
    /// resource with this declaration.
    fn identity(&self) -> Option<&str> {
        None
    }

    /// Explicit dependency declaration.
    ///
    /// Returning `Some` replaces structural discovery entirely for this task.
    fn explicit_dependencies(&self, _tasks: &TaskMap) -> Option<Vec<TaskKey>> {
        None
    }

    /// Query the live target for the current state of this resource.
    ///
    /// `Ok(None)` means the resource does not exist; errors are reserved for
    /// unexpected failures.
    fn find<'a>(&'a self, ctx: &'a Context) -> BoxFuture<'a, anyhow::Result<Option<Self>>>;

    /// Copy computed outputs (cloud IDs, fingerprints) from a discovered
    /// resource into the expected state.
    fn adopt(&mut self, _actual: &Self) {}

    /// Declare the comparable fields of this task.
    fn diff(actual: &Self, expected: &Self, differ: &mut Differ);

    /// Validate that a delta is legal for this resource.
    fn check_changes(
        _actual: Option<&Self>,
        _expected: &Self,
        _changes: &Changes,
    ) -> std::result::Result<(), ChangeError> {
        Ok(())
    }

    /// Entry point used by the executor.
    ///
    /// Implementations that need computed defaults fill them into `cell`
    /// first and then delegate to [`default_delta_run`].
    fn run<'a>(cell: &'a TaskCell<Self>, ctx: &'a Context) -> BoxFuture<'a, Result<RunOutcome>> {
        Box::pin(default_delta_run(cell, ctx))
    }

    /// Per-back-end render functions.
    fn renderers() -> Renderers<Self>;
}

/// Arguments handed to a render function.
pub struct Apply<'a, T> {
    /// The full task universe, for resolving [`TaskRef`]s.
    pub tasks: &'a TaskMap,
    /// Discovered state, `None` when the resource is being created.
    pub actual: Option<&'a T>,
    /// Expected state; render functions write computed outputs back here.
    pub expected: &'a mut T,
    /// Fields that differ between `actual` and `expected`.
    pub changes: &'a Changes,
}

pub type ApiRenderFn<T> =
    for<'a> fn(&'a ApiTarget, Apply<'a, T>) -> BoxFuture<'a, anyhow::Result<()>>;

pub type TerraformRenderFn<T> = for<'a> fn(&'a TerraformTarget, Apply<'a, T>) -> anyhow::Result<()>;

/// Mapping from back-end kind to the task's render function.
pub struct Renderers<T> {
    api: Option<ApiRenderFn<T>>,
    terraform: Option<TerraformRenderFn<T>>,
}

impl<T> Renderers<T> {
    pub fn new() -> Self {
        Self {
            api: None,
            terraform: None,
        }
    }

    pub fn api(mut self, render: ApiRenderFn<T>) -> Self {
        self.api = Some(render);
        self
    }

    pub fn terraform(mut self, render: TerraformRenderFn<T>) -> Self {
        self.terraform = Some(render);
        self
    }

    pub fn supports(&self, kind: TargetKind) -> bool {
        match kind {
            TargetKind::Api => self.api.is_some(),
            TargetKind::Terraform => self.terraform.is_some(),
        }
    }

    pub(crate) fn api_fn(&self) -> Option<ApiRenderFn<T>> {
        self.api
    }

    pub(crate) fn terraform_fn(&self) -> Option<TerraformRenderFn<T>> {
        self.terraform
    }
}

impl<T> Default for Renderers<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Why a proposed delta is not allowed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChangeError {
    #[error("field '{field}' cannot be changed")]
    CannotChange { field: &'static str },

    #[error("invalid change to '{field}': {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl ChangeError {
    pub fn cannot_change(field: &'static str) -> Self {
        ChangeError::CannotChange { field }
    }

    /// Attach the offending task key.
    pub fn for_task(self, task: &str) -> ConvergeError {
        match self {
            ChangeError::CannotChange { field } => ConvergeError::CannotChangeField {
                task: task.to_string(),
                field,
            },
            ChangeError::Invalid { field, reason } => ConvergeError::InvalidChange {
                task: task.to_string(),
                field,
                reason,
            },
        }
    }
}

/// Reject a delta that touches any of `fields` once the resource exists.
pub fn reject_immutable<T>(
    actual: Option<&T>,
    changes: &Changes,
    fields: &[&'static str],
) -> std::result::Result<(), ChangeError> {
    if actual.is_none() {
        return Ok(());
    }
    match fields.iter().find(|f| changes.contains(f)) {
        Some(field) => Err(ChangeError::cannot_change(field)),
        None => Ok(()),
    }
}

/// Build the conventional `"<Kind>/<name>"` key for a task.
pub fn task_key<T: Task>(name: &str) -> TaskKey {
    format!("{}/{}", T::KIND, name)
}
