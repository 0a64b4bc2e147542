// src/dag/deps.rs

use std::collections::BTreeSet;

use tracing::debug;

use crate::dag::graph::DependencyMap;
use crate::errors::{ConvergeError, Result};
use crate::task::TaskMap;
use crate::types::TaskKey;

/// Compute the direct dependencies of every task.
///
/// A task that declares explicit dependencies uses exactly those; every other
/// task contributes the task references found by walking its fields. Each
/// referenced key must be registered, and for structural references it must
/// be registered with the kind the reference expects. Self-references and
/// duplicates are kept as a single entry; a self-reference surfaces later as
/// a cycle.
pub fn find_task_dependencies(tasks: &TaskMap) -> Result<DependencyMap> {
    let mut edges = DependencyMap::new();

    for (key, task) in tasks.iter() {
        let deps: BTreeSet<TaskKey> = match task.explicit_dependencies(tasks) {
            Some(explicit) => {
                for dep in &explicit {
                    if !tasks.contains_key(dep) {
                        return Err(ConvergeError::UnknownDependency {
                            task: key.clone(),
                            dependency: dep.clone(),
                        });
                    }
                }
                debug!(task = %key, count = explicit.len(), "using explicit dependencies");
                explicit.into_iter().collect()
            }
            None => {
                let mut found = BTreeSet::new();
                for dep in task.structural_dependencies() {
                    let actual = tasks.kind_of(&dep.key).ok_or_else(|| {
                        ConvergeError::UnknownDependency {
                            task: key.clone(),
                            dependency: dep.key.clone(),
                        }
                    })?;
                    if actual != dep.kind {
                        return Err(ConvergeError::DependencyKindMismatch {
                            task: key.clone(),
                            dependency: dep.key,
                            expected: dep.kind,
                            actual,
                        });
                    }
                    found.insert(dep.key);
                }
                found
            }
        };

        debug!(task = %key, deps = ?deps, "discovered dependencies");
        edges.insert(key.clone(), deps.into_iter().collect());
    }

    Ok(edges)
}
