use std::collections::{BTreeSet, HashSet};

use converge::dag::{topological_order, DependencyMap, Scheduler};
use converge::errors::ConvergeError;
use proptest::prelude::*;

// Acyclic by construction: task N may only depend on tasks 0..N-1.
fn dag_strategy(max_tasks: usize) -> impl Strategy<Value = DependencyMap> {
    (1..=max_tasks).prop_flat_map(|num_tasks| {
        proptest::collection::vec(
            proptest::collection::vec(any::<usize>(), 0..num_tasks),
            num_tasks,
        )
        .prop_map(move |raw_deps| {
            raw_deps
                .into_iter()
                .enumerate()
                .map(|(i, potential)| {
                    let deps: BTreeSet<String> = if i == 0 {
                        BTreeSet::new()
                    } else {
                        potential
                            .into_iter()
                            .map(|d| format!("task_{:02}", d % i))
                            .collect()
                    };
                    (format!("task_{i:02}"), deps.into_iter().collect())
                })
                .collect()
        })
    })
}

proptest! {
    #[test]
    fn order_respects_every_dependency(edges in dag_strategy(12)) {
        let order = topological_order(&edges).unwrap();
        let flat = order.to_vec();

        prop_assert_eq!(flat.len(), edges.len());
        for (task, deps) in &edges {
            let at = order.position(task).unwrap();
            for dep in deps {
                prop_assert!(order.position(dep).unwrap() < at, "{} ran before {}", task, dep);
            }
        }
    }

    #[test]
    fn order_is_deterministic(edges in dag_strategy(12)) {
        let first = topological_order(&edges).unwrap();
        let second = topological_order(&edges).unwrap();
        prop_assert_eq!(first, second);
    }

    #[test]
    fn back_edge_creates_reported_cycle(edges in dag_strategy(10), pick in any::<prop::sample::Index>()) {
        // Find a task with a dependency and make the dependency point back.
        let with_deps: Vec<(&String, &Vec<String>)> =
            edges.iter().filter(|(_, deps)| !deps.is_empty()).collect();
        prop_assume!(!with_deps.is_empty());
        let (task, deps) = with_deps[pick.index(with_deps.len())];
        let dep = deps[0].clone();

        let mut cyclic = edges.clone();
        cyclic.get_mut(&dep).unwrap().push(task.clone());

        match topological_order(&cyclic) {
            Err(ConvergeError::DagCycle { members, unresolved }) => {
                prop_assert!(members.contains(task));
                prop_assert!(members.contains(&dep));
                prop_assert!(members.iter().all(|m| unresolved.contains(m)));
            }
            other => prop_assert!(false, "expected cycle, got {:?}", other),
        }
    }

    #[test]
    fn scheduler_completes_in_dependency_order(edges in dag_strategy(12), limit in 1usize..4) {
        let mut scheduler = Scheduler::new(&edges).unwrap();
        let mut done: HashSet<String> = HashSet::new();
        let mut in_flight: Vec<String> = Vec::new();

        loop {
            let free = limit.saturating_sub(scheduler.running());
            for task in scheduler.next_ready(free) {
                for dep in &edges[&task] {
                    prop_assert!(done.contains(dep));
                }
                in_flight.push(task);
            }
            prop_assert!(scheduler.running() <= limit);
            if in_flight.is_empty() {
                break;
            }
            let task = in_flight.remove(0);
            scheduler.complete(&task, true);
            done.insert(task);
        }

        prop_assert!(scheduler.is_finished());
        prop_assert_eq!(done.len(), edges.len());
    }
}
