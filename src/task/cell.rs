// src/task/cell.rs

use std::any::Any;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use tracing::debug;

use super::{BoxFuture, Task, TaskMap};
use crate::dag::{DependencyRef, Walker};
use crate::engine::Context;
use crate::errors::Result;
use crate::types::{RunOutcome, TargetKind, TaskKey, TaskState};

/// A registered task: its key, its expected state and its lifecycle state.
///
/// The expected state is mutated in place while the task runs (computed
/// defaults, IDs assigned by the cloud) so that later tasks resolving a
/// [`TaskRef`](super::TaskRef) see those outputs.
pub struct TaskCell<T: Task> {
    key: TaskKey,
    expected: RwLock<T>,
    state: Mutex<TaskState>,
}

impl<T: Task> TaskCell<T> {
    pub(crate) fn new(key: TaskKey, task: T) -> Self {
        Self {
            key,
            expected: RwLock::new(task),
            state: Mutex::new(TaskState::Declared),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Snapshot of the expected state.
    pub fn expected(&self) -> T {
        self.expected
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Mutate the expected state in place.
    pub fn update<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let mut guard = self
            .expected
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }

    pub(crate) fn store(&self, value: T) {
        *self
            .expected
            .write()
            .unwrap_or_else(PoisonError::into_inner) = value;
    }

    pub fn state(&self) -> TaskState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn set_state(&self, state: TaskState) {
        let mut guard = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        debug!(task = %self.key, from = ?*guard, to = ?state, "task state transition");
        *guard = state;
    }
}

impl<T: Task> fmt::Debug for TaskCell<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskCell")
            .field("key", &self.key)
            .field("kind", &T::KIND)
            .field("state", &self.state())
            .finish()
    }
}

/// Object-safe view of a [`TaskCell`], used by the engine to hold tasks of
/// different kinds in one map.
pub(crate) trait AnyTask: Send + Sync + fmt::Debug {
    fn key(&self) -> &str;
    fn kind(&self) -> &'static str;
    fn state(&self) -> TaskState;
    fn structural_dependencies(&self) -> Vec<DependencyRef>;
    fn explicit_dependencies(&self, tasks: &TaskMap) -> Option<Vec<TaskKey>>;
    fn supports(&self, target: TargetKind) -> bool;
    fn run<'a>(&'a self, ctx: &'a Context) -> BoxFuture<'a, Result<RunOutcome>>;
    fn mark_failed(&self);
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<T: Task> AnyTask for TaskCell<T> {
    fn key(&self) -> &str {
        &self.key
    }

    fn kind(&self) -> &'static str {
        T::KIND
    }

    fn state(&self) -> TaskState {
        TaskCell::state(self)
    }

    fn structural_dependencies(&self) -> Vec<DependencyRef> {
        let mut walker = Walker::new();
        self.expected
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .walk(&mut walker);
        walker.into_dependencies()
    }

    fn explicit_dependencies(&self, tasks: &TaskMap) -> Option<Vec<TaskKey>> {
        self.expected
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .explicit_dependencies(tasks)
    }

    fn supports(&self, target: TargetKind) -> bool {
        T::renderers().supports(target)
    }

    fn run<'a>(&'a self, ctx: &'a Context) -> BoxFuture<'a, Result<RunOutcome>> {
        Box::pin(async move {
            let result = T::run(self, ctx).await;
            if result.is_err() {
                self.set_state(TaskState::Failed);
            }
            result
        })
    }

    fn mark_failed(&self) {
        self.set_state(TaskState::Failed);
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}
