// src/task/map.rs

use std::collections::BTreeMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use super::cell::AnyTask;
use super::{Task, TaskCell};
use crate::dag::{Walk, Walker};
use crate::errors::{ConvergeError, Result};
use crate::types::{TaskKey, TaskState};

/// Typed reference from one task to another.
///
/// Holding a `TaskRef` in a task field is what makes the referenced task a
/// dependency: dependency discovery records its key and expected kind.
pub struct TaskRef<T> {
    key: TaskKey,
    _kind: PhantomData<fn() -> T>,
}

impl<T: Task> TaskRef<T> {
    pub fn new(key: impl Into<TaskKey>) -> Self {
        Self {
            key: key.into(),
            _kind: PhantomData,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn kind(&self) -> &'static str {
        T::KIND
    }
}

impl<T> Clone for TaskRef<T> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            _kind: PhantomData,
        }
    }
}

impl<T> PartialEq for TaskRef<T> {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl<T> Eq for TaskRef<T> {}

impl<T: Task> fmt::Debug for TaskRef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TaskRef<{}>({})", T::KIND, self.key)
    }
}

impl<T: Task> Walk for TaskRef<T> {
    fn walk(&self, walker: &mut Walker) {
        walker.depend_on(&self.key, T::KIND);
    }
}

/// The task universe for one run, keyed by task key.
#[derive(Debug, Default)]
pub struct TaskMap {
    tasks: BTreeMap<TaskKey, Arc<dyn AnyTask>>,
}

impl TaskMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a task and return a typed reference to it.
    pub fn insert<T: Task>(&mut self, key: impl Into<TaskKey>, task: T) -> Result<TaskRef<T>> {
        let key = key.into();
        if self.tasks.contains_key(&key) {
            return Err(ConvergeError::DuplicateTask(key));
        }
        self.tasks
            .insert(key.clone(), Arc::new(TaskCell::new(key.clone(), task)));
        Ok(TaskRef::new(key))
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.tasks.contains_key(key)
    }

    /// Keys in lexicographic order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.tasks.keys().map(String::as_str)
    }

    /// Resolve a typed reference.
    pub fn get<T: Task>(&self, task: &TaskRef<T>) -> Result<Arc<TaskCell<T>>> {
        self.get_by_key(task.key())
    }

    pub fn get_by_key<T: Task>(&self, key: &str) -> Result<Arc<TaskCell<T>>> {
        let entry = self
            .tasks
            .get(key)
            .ok_or_else(|| ConvergeError::TaskNotFound(key.to_string()))?;
        let kind = entry.kind();
        entry.clone().into_any().downcast::<TaskCell<T>>().map_err(|_| {
            ConvergeError::ConfigError(format!(
                "task '{key}' is a {kind}, not a {}",
                T::KIND
            ))
        })
    }

    /// Kind name of the task registered under `key`.
    pub fn kind_of(&self, key: &str) -> Option<&'static str> {
        self.tasks.get(key).map(|t| t.kind())
    }

    pub fn state_of(&self, key: &str) -> Option<TaskState> {
        self.tasks.get(key).map(|t| t.state())
    }

    /// Lifecycle state of every task.
    pub fn states(&self) -> BTreeMap<TaskKey, TaskState> {
        self.tasks
            .iter()
            .map(|(k, t)| (k.clone(), t.state()))
            .collect()
    }

    pub(crate) fn entry(&self, key: &str) -> Option<&Arc<dyn AnyTask>> {
        self.tasks.get(key)
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (&TaskKey, &Arc<dyn AnyTask>)> {
        self.tasks.iter()
    }
}
