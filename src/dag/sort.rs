// src/dag/sort.rs

use std::collections::BTreeMap;

use petgraph::algo::tarjan_scc;
use petgraph::graphmap::DiGraphMap;
use tracing::{debug, warn};

use crate::dag::graph::{DagGraph, DependencyMap};
use crate::errors::{ConvergeError, Result};
use crate::types::TaskKey;

/// Deterministic execution order, grouped into waves.
///
/// Every task in wave `n` depends only on tasks in waves `< n`. Within a wave
/// keys are sorted lexicographically; flattening the waves gives the
/// sequential execution order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionOrder {
    waves: Vec<Vec<TaskKey>>,
}

impl ExecutionOrder {
    pub fn waves(&self) -> &[Vec<TaskKey>] {
        &self.waves
    }

    pub fn iter(&self) -> impl Iterator<Item = &TaskKey> {
        self.waves.iter().flatten()
    }

    pub fn to_vec(&self) -> Vec<TaskKey> {
        self.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.waves.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.waves.is_empty()
    }

    /// Position of `task` in the flattened order.
    pub fn position(&self, task: &str) -> Option<usize> {
        self.iter().position(|k| k == task)
    }
}

/// Order tasks so that every task comes after all of its dependencies.
///
/// Uses Kahn's algorithm one wave at a time. If some tasks can never become
/// ready the graph has a cycle; the error names the tasks on the cycle (found
/// with Tarjan's SCC algorithm over the unresolved subgraph) and lists every
/// unresolved task.
pub fn topological_order(edges: &DependencyMap) -> Result<ExecutionOrder> {
    let graph = DagGraph::from_dependencies(edges)?;

    let mut remaining: BTreeMap<&str, usize> = graph
        .tasks()
        .map(|task| (task, graph.dependencies_of(task).len()))
        .collect();

    let mut ready: Vec<&str> = remaining
        .iter()
        .filter(|(_, count)| **count == 0)
        .map(|(task, _)| *task)
        .collect();

    let mut waves: Vec<Vec<TaskKey>> = Vec::new();
    while !ready.is_empty() {
        ready.sort_unstable();
        for task in &ready {
            remaining.remove(task);
        }

        let mut next = Vec::new();
        for task in &ready {
            for dependent in graph.dependents_of(task) {
                if let Some(count) = remaining.get_mut(dependent.as_str()) {
                    *count -= 1;
                    if *count == 0 {
                        next.push(dependent.as_str());
                    }
                }
            }
        }

        debug!(wave = waves.len(), tasks = ?ready, "ordered wave");
        waves.push(ready.iter().map(|task| task.to_string()).collect());
        ready = next;
    }

    if !remaining.is_empty() {
        let unresolved: Vec<&str> = remaining.keys().copied().collect();
        return Err(cycle_error(&graph, &unresolved));
    }

    Ok(ExecutionOrder { waves })
}

fn cycle_error(graph: &DagGraph, unresolved: &[&str]) -> ConvergeError {
    let mut subgraph: DiGraphMap<&str, ()> = DiGraphMap::new();
    for &task in unresolved {
        subgraph.add_node(task);
    }
    for &task in unresolved {
        for dep in graph.dependencies_of(task) {
            if subgraph.contains_node(dep.as_str()) {
                subgraph.add_edge(task, dep.as_str(), ());
            }
        }
    }

    let mut members: Vec<TaskKey> = tarjan_scc(&subgraph)
        .into_iter()
        .filter(|component| {
            component.len() > 1
                || component
                    .first()
                    .is_some_and(|&task| subgraph.contains_edge(task, task))
        })
        .flatten()
        .map(str::to_string)
        .collect();
    members.sort();

    let unresolved: Vec<TaskKey> = unresolved.iter().map(|t| t.to_string()).collect();
    if members.is_empty() {
        members = unresolved.clone();
    }

    warn!(members = ?members, "dependency cycle detected");
    ConvergeError::DagCycle {
        members,
        unresolved,
    }
}
