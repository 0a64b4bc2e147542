// src/dag/graph.rs

use std::collections::{BTreeMap, BTreeSet};

use crate::errors::{ConvergeError, Result};
use crate::types::TaskKey;

/// Task key to the keys of the tasks it depends on.
pub type DependencyMap = BTreeMap<TaskKey, Vec<TaskKey>>;

/// Internal node structure: stores immediate deps and dependents.
#[derive(Debug, Clone, Default)]
struct DagNode {
    /// Direct dependencies: tasks that must be applied before this one.
    deps: Vec<TaskKey>,
    /// Direct dependents: tasks that depend on this one.
    dependents: Vec<TaskKey>,
}

/// In-memory adjacency view of a dependency map.
///
/// Both edge lists are deduplicated and sorted, so in-degree counts are exact
/// and iteration is deterministic. Cycles are allowed here; ordering is the
/// job of [`topological_order`](super::topological_order).
#[derive(Debug, Clone, Default)]
pub struct DagGraph {
    nodes: BTreeMap<TaskKey, DagNode>,
}

impl DagGraph {
    /// Build a graph from a dependency map.
    ///
    /// Every dependency must itself be a key of the map.
    pub fn from_dependencies(edges: &DependencyMap) -> Result<Self> {
        let mut nodes: BTreeMap<TaskKey, DagNode> = BTreeMap::new();

        for (task, deps) in edges {
            let mut unique = BTreeSet::new();
            for dep in deps {
                if !edges.contains_key(dep) {
                    return Err(ConvergeError::UnknownDependency {
                        task: task.clone(),
                        dependency: dep.clone(),
                    });
                }
                unique.insert(dep.clone());
            }
            nodes.entry(task.clone()).or_default().deps = unique.into_iter().collect();
        }

        let pairs: Vec<(TaskKey, TaskKey)> = nodes
            .iter()
            .flat_map(|(task, node)| node.deps.iter().map(move |dep| (dep.clone(), task.clone())))
            .collect();
        for (dep, task) in pairs {
            if let Some(node) = nodes.get_mut(&dep) {
                node.dependents.push(task);
            }
        }
        for node in nodes.values_mut() {
            node.dependents.sort();
        }

        Ok(Self { nodes })
    }

    /// All task keys, sorted.
    pub fn tasks(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(|s| s.as_str())
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, task: &str) -> bool {
        self.nodes.contains_key(task)
    }

    /// Immediate dependencies of a task.
    pub fn dependencies_of(&self, task: &str) -> &[TaskKey] {
        self.nodes
            .get(task)
            .map(|n| n.deps.as_slice())
            .unwrap_or(&[])
    }

    /// Immediate dependents of a task.
    pub fn dependents_of(&self, task: &str) -> &[TaskKey] {
        self.nodes
            .get(task)
            .map(|n| n.dependents.as_slice())
            .unwrap_or(&[])
    }
}
