use converge::dag::{topological_order, DependencyMap};
use converge::errors::ConvergeError;

fn deps(entries: &[(&str, &[&str])]) -> DependencyMap {
    entries.iter()
        .map(|(task, deps)| {
            (
                task.to_string(),
                deps.iter().map(|d| d.to_string()).collect(),
            )
        })
        .collect()
}

#[test]
fn chain_runs_dependencies_first() {
    let edges = deps(&[("A", &["B"]), ("B", &["C"]), ("C", &[])]);

    let order = topological_order(&edges).unwrap();

    assert_eq!(order.to_vec(), vec!["C", "B", "A"]);
    assert_eq!(order.waves().len(), 3);
}

#[test]
fn independent_tasks_share_a_wave_in_lexicographic_order() {
    let edges = deps(&[
        ("vpc", &[]),
        ("subnet-b", &["vpc"]),
        ("subnet-a", &["vpc"]),
        ("key", &[]),
        ("instance", &["subnet-a", "key"]),
    ]);

    let order = topological_order(&edges).unwrap();

    assert_eq!(
        order.waves(),
        &[
            vec!["key".to_string(), "vpc".to_string()],
            vec!["subnet-a".to_string(), "subnet-b".to_string()],
            vec!["instance".to_string()],
        ]
    );
    assert!(order.position("vpc") < order.position("subnet-a"));
}

#[test]
fn repeated_ordering_is_identical() {
    let edges = deps(&[
        ("d", &["a", "b"]),
        ("c", &["a"]),
        ("b", &[]),
        ("a", &[]),
        ("e", &["d", "c"]),
    ]);

    let first = topological_order(&edges).unwrap();
    for _ in 0..10 {
        assert_eq!(topological_order(&edges).unwrap(), first);
    }
}

#[test]
fn two_task_cycle_names_both_members() {
    let edges = deps(&[("A", &["B"]), ("B", &["A"])]);

    match topological_order(&edges) {
        Err(ConvergeError::DagCycle {
            members,
            unresolved,
        }) => {
            assert_eq!(members, vec!["A", "B"]);
            assert_eq!(unresolved, vec!["A", "B"]);
        }
        other => panic!("Expected DagCycle, got: {:?}", other),
    }
}

#[test]
fn cycle_members_exclude_tasks_merely_blocked_by_it() {
    let edges = deps(&[
        ("root", &[]),
        ("x", &["y", "root"]),
        ("y", &["x"]),
        ("downstream", &["x"]),
    ]);

    match topological_order(&edges) {
        Err(ConvergeError::DagCycle {
            members,
            unresolved,
        }) => {
            assert_eq!(members, vec!["x", "y"]);
            assert_eq!(unresolved, vec!["downstream", "x", "y"]);
        }
        other => panic!("Expected DagCycle, got: {:?}", other),
    }
}

#[test]
fn self_dependency_is_a_cycle() {
    let edges = deps(&[("A", &["A"]), ("B", &[])]);

    match topological_order(&edges) {
        Err(ConvergeError::DagCycle { members, .. }) => assert_eq!(members, vec!["A"]),
        other => panic!("Expected DagCycle, got: {:?}", other),
    }
}

#[test]
fn unknown_dependency_is_rejected() {
    let edges = deps(&[("A", &["missing"])]);

    match topological_order(&edges) {
        Err(ConvergeError::UnknownDependency { task, dependency }) => {
            assert_eq!(task, "A");
            assert_eq!(dependency, "missing");
        }
        other => panic!("Expected UnknownDependency, got: {:?}", other),
    }
}

#[test]
fn empty_graph_has_empty_order() {
    let order = topological_order(&DependencyMap::new()).unwrap();
    assert!(order.is_empty());
    assert_eq!(order.len(), 0);
}
