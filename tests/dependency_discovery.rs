mod common;

use converge::dag::find_task_dependencies;
use converge::errors::ConvergeError;
use converge::task::{task_key, ResourceHolder, TaskMap, TaskRef};
use converge::tasks::{Instance, SshKey, Subnet, Vpc};

use crate::common::fixtures::TEST_PUBLIC_KEY;
use crate::common::probe::{probe_key, ProbeTask, ProbeWorld};

fn cluster_tasks() -> TaskMap {
    let mut tasks = TaskMap::new();
    let vpc = tasks
        .insert(task_key::<Vpc>("k8s"), Vpc::new("k8s", "172.20.0.0/16"))
        .unwrap();
    let subnet = tasks
        .insert(
            task_key::<Subnet>("us-east-1a.k8s"),
            Subnet {
                name: Some("us-east-1a.k8s".into()),
                vpc: Some(vpc),
                cidr: Some("172.20.32.0/19".into()),
                availability_zone: Some("us-east-1a".into()),
                ..Default::default()
            },
        )
        .unwrap();
    let key = tasks
        .insert(
            task_key::<SshKey>("kubernetes.k8s"),
            SshKey::new(
                "kubernetes.k8s",
                ResourceHolder::from_string("public_key", TEST_PUBLIC_KEY),
            ),
        )
        .unwrap();
    tasks
        .insert(
            task_key::<Instance>("master-0.k8s"),
            Instance {
                name: Some("master-0.k8s".into()),
                subnet: Some(subnet),
                ssh_key: Some(key),
                image_id: Some("ami-12345678".into()),
                instance_type: Some("m3.medium".into()),
                ..Default::default()
            },
        )
        .unwrap();
    tasks
}

#[test]
fn instance_depends_on_its_key_and_subnet() {
    let deps = find_task_dependencies(&cluster_tasks()).unwrap();

    assert_eq!(
        deps["Instance/master-0.k8s"],
        vec!["SSHKey/kubernetes.k8s", "Subnet/us-east-1a.k8s"]
    );
    assert_eq!(deps["Subnet/us-east-1a.k8s"], vec!["VPC/k8s"]);
    assert!(deps["VPC/k8s"].is_empty());
    assert!(deps["SSHKey/kubernetes.k8s"].is_empty());
}

#[test]
fn explicit_dependencies_replace_structural_ones() {
    let world = ProbeWorld::new();
    let mut tasks = TaskMap::new();
    tasks.insert(probe_key("a"), ProbeTask::new("a", &world)).unwrap();
    tasks.insert(probe_key("b"), ProbeTask::new("b", &world)).unwrap();
    tasks
        .insert(
            probe_key("c"),
            ProbeTask::new("c", &world).after("a").explicit(&["Probe/b"]),
        )
        .unwrap();

    let deps = find_task_dependencies(&tasks).unwrap();

    assert_eq!(deps["Probe/c"], vec!["Probe/b"]);
}

#[test]
fn repeated_references_are_recorded_once() {
    let world = ProbeWorld::new();
    let mut tasks = TaskMap::new();
    tasks.insert(probe_key("a"), ProbeTask::new("a", &world)).unwrap();
    tasks
        .insert(
            probe_key("b"),
            ProbeTask::new("b", &world).after("a").after("a"),
        )
        .unwrap();

    let deps = find_task_dependencies(&tasks).unwrap();

    assert_eq!(deps["Probe/b"], vec!["Probe/a"]);
}

#[test]
fn reference_to_unregistered_task_is_rejected() {
    let world = ProbeWorld::new();
    let mut tasks = TaskMap::new();
    tasks
        .insert(probe_key("a"), ProbeTask::new("a", &world).after("ghost"))
        .unwrap();

    match find_task_dependencies(&tasks) {
        Err(ConvergeError::UnknownDependency { task, dependency }) => {
            assert_eq!(task, "Probe/a");
            assert_eq!(dependency, "Probe/ghost");
        }
        other => panic!("Expected UnknownDependency, got: {:?}", other),
    }
}

#[test]
fn explicit_reference_to_unregistered_task_is_rejected() {
    let world = ProbeWorld::new();
    let mut tasks = TaskMap::new();
    tasks
        .insert(probe_key("a"), ProbeTask::new("a", &world).explicit(&["VPC/none"]))
        .unwrap();

    assert!(matches!(
        find_task_dependencies(&tasks),
        Err(ConvergeError::UnknownDependency { .. })
    ));
}

#[test]
fn reference_to_task_of_another_kind_is_rejected() {
    let mut tasks = TaskMap::new();
    tasks
        .insert(task_key::<Vpc>("k8s"), Vpc::new("k8s", "10.0.0.0/16"))
        .unwrap();
    tasks
        .insert(
            task_key::<Subnet>("a.k8s"),
            Subnet {
                name: Some("a.k8s".into()),
                vpc: Some(TaskRef::new("VPC/k8s")),
                ..Default::default()
            },
        )
        .unwrap();
    tasks
        .insert(
            task_key::<Instance>("i"),
            Instance {
                name: Some("i".into()),
                subnet: Some(TaskRef::new("VPC/k8s")),
                ..Default::default()
            },
        )
        .unwrap();

    match find_task_dependencies(&tasks) {
        Err(ConvergeError::DependencyKindMismatch {
            task,
            dependency,
            expected,
            actual,
        }) => {
            assert_eq!(task, "Instance/i");
            assert_eq!(dependency, "VPC/k8s");
            assert_eq!(expected, "Subnet");
            assert_eq!(actual, "VPC");
        }
        other => panic!("Expected DependencyKindMismatch, got: {:?}", other),
    }
}

#[test]
fn duplicate_task_key_is_rejected() {
    let mut tasks = TaskMap::new();
    tasks
        .insert(task_key::<Vpc>("k8s"), Vpc::new("k8s", "10.0.0.0/16"))
        .unwrap();

    let result = tasks.insert(task_key::<Vpc>("k8s"), Vpc::new("k8s", "10.1.0.0/16"));

    assert!(matches!(result, Err(ConvergeError::DuplicateTask(key)) if key == "VPC/k8s"));
}
