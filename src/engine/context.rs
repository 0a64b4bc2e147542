// src/engine/context.rs

use anyhow::anyhow;

use crate::cloud::Cloud;
use crate::target::Target;
use crate::task::TaskMap;

/// Everything a task can see while it runs: the task universe and the active
/// target.
#[derive(Debug)]
pub struct Context {
    tasks: TaskMap,
    target: Target,
}

impl Context {
    pub fn new(tasks: TaskMap, target: Target) -> Self {
        Self { tasks, target }
    }

    pub fn tasks(&self) -> &TaskMap {
        &self.tasks
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    /// The cloud behind the active target, for discovery.
    pub fn cloud(&self) -> anyhow::Result<&dyn Cloud> {
        self.target
            .cloud()
            .ok_or_else(|| anyhow!("the {} target has no cloud to query", self.target.kind()))
    }
}
