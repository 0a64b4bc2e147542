// src/dag/scheduler.rs

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, warn};

use crate::dag::graph::{DagGraph, DependencyMap};
use crate::dag::scheduler_step::SchedulerStep;
use crate::errors::Result;
use crate::types::TaskKey;

/// Per-task scheduling state for one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    /// Waiting on at least one dependency.
    Waiting,
    /// All dependencies succeeded; not yet dispatched.
    Ready,
    /// Dispatched to a worker.
    Running,
    Succeeded,
    Failed,
    /// Will not run because a dependency failed.
    Blocked,
}

#[derive(Debug, Clone)]
struct NodeInfo {
    /// Number of dependencies that have not succeeded yet.
    remaining: usize,
    state: NodeState,
}

/// Pure state machine behind the concurrent executor.
///
/// It is responsible for:
/// - deciding when a task is ready (every dependency succeeded)
/// - handing out ready tasks in lexicographic order, up to a limit
/// - blocking every transitive dependent of a failed task
/// - stopping dispatch once halted, while in-flight tasks drain
///
/// It performs no I/O, so tests can step it by hand.
#[derive(Debug)]
pub struct Scheduler {
    graph: DagGraph,
    nodes: BTreeMap<TaskKey, NodeInfo>,
    ready: BTreeSet<TaskKey>,
    running: usize,
    halted: bool,
}

impl Scheduler {
    pub fn new(edges: &DependencyMap) -> Result<Self> {
        let graph = DagGraph::from_dependencies(edges)?;
        let mut nodes = BTreeMap::new();
        let mut ready = BTreeSet::new();

        for task in graph.tasks() {
            let remaining = graph.dependencies_of(task).len();
            let state = if remaining == 0 {
                ready.insert(task.to_string());
                NodeState::Ready
            } else {
                NodeState::Waiting
            };
            nodes.insert(task.to_string(), NodeInfo { remaining, state });
        }

        Ok(Self {
            graph,
            nodes,
            ready,
            running: 0,
            halted: false,
        })
    }

    /// Take up to `limit` ready tasks and mark them running.
    pub fn next_ready(&mut self, limit: usize) -> Vec<TaskKey> {
        if self.halted {
            return Vec::new();
        }
        let picked: Vec<TaskKey> = self.ready.iter().take(limit).cloned().collect();
        for task in &picked {
            self.ready.remove(task);
            if let Some(info) = self.nodes.get_mut(task) {
                info.state = NodeState::Running;
            }
            self.running += 1;
            debug!(task = %task, "dependencies satisfied; dispatching");
        }
        picked
    }

    /// Report that a dispatched task finished.
    pub fn complete(&mut self, task: &str, success: bool) -> SchedulerStep {
        let mut step = SchedulerStep::default();
        match self.nodes.get_mut(task) {
            Some(info) if info.state == NodeState::Running => {
                info.state = if success {
                    NodeState::Succeeded
                } else {
                    NodeState::Failed
                };
                self.running -= 1;
            }
            Some(info) => {
                warn!(task = %task, state = ?info.state, "completion for task that is not running; ignoring");
                return step;
            }
            None => {
                warn!(task = %task, "completion for unknown task; ignoring");
                return step;
            }
        }

        if success {
            for dependent in self.graph.dependents_of(task) {
                if let Some(info) = self.nodes.get_mut(dependent) {
                    info.remaining = info.remaining.saturating_sub(1);
                    if info.remaining == 0 && info.state == NodeState::Waiting {
                        info.state = NodeState::Ready;
                        self.ready.insert(dependent.clone());
                        step.newly_ready.push(dependent.clone());
                    }
                }
            }
        } else {
            step.newly_blocked = self.block_dependents(task);
        }
        step
    }

    /// Stop handing out new tasks.
    pub fn halt(&mut self) {
        if !self.halted {
            debug!(running = self.running, "scheduler halted");
        }
        self.halted = true;
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    pub fn running(&self) -> usize {
        self.running
    }

    /// Nothing is running and nothing more will be dispatched.
    pub fn is_finished(&self) -> bool {
        self.running == 0 && (self.halted || self.ready.is_empty())
    }

    /// Tasks that were never dispatched (waiting, ready or blocked), sorted.
    pub fn pending(&self) -> Vec<TaskKey> {
        self.nodes
            .iter()
            .filter(|(_, info)| {
                matches!(
                    info.state,
                    NodeState::Waiting | NodeState::Ready | NodeState::Blocked
                )
            })
            .map(|(task, _)| task.clone())
            .collect()
    }

    pub fn state_of(&self, task: &str) -> Option<NodeState> {
        self.nodes.get(task).map(|info| info.state)
    }

    /// Whether every dependency of `task` succeeded. `None` for unknown
    /// tasks.
    pub fn deps_satisfied(&self, task: &str) -> Option<bool> {
        self.nodes.get(task).map(|info| info.remaining == 0)
    }

    fn block_dependents(&mut self, failed: &str) -> Vec<TaskKey> {
        let mut stack: Vec<TaskKey> = self.graph.dependents_of(failed).to_vec();
        let mut blocked = Vec::new();

        while let Some(task) = stack.pop() {
            if let Some(info) = self.nodes.get_mut(&task) {
                if matches!(info.state, NodeState::Waiting | NodeState::Ready) {
                    info.state = NodeState::Blocked;
                    self.ready.remove(&task);
                    debug!(task = %task, upstream = %failed, "blocked by failed dependency");
                    stack.extend(self.graph.dependents_of(&task).iter().cloned());
                    blocked.push(task);
                }
            }
        }

        blocked.sort();
        blocked
    }
}
