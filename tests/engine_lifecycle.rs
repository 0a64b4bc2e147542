mod common;

use converge::engine::Engine;
use converge::errors::ConvergeError;
use converge::task::TaskMap;
use converge::types::{RunOutcome, TargetKind, TaskState};

use crate::common::probe::{probe_key, probe_map, ApiOnlyTask, ProbeTask, ProbeWorld};
use crate::common::{api_target, init_tracing, terraform_target, with_timeout, TestResult};

fn chain(world: &std::sync::Arc<ProbeWorld>) -> TaskMap {
    probe_map(world, &[("app", &["db"]), ("db", &["net"]), ("net", &[])])
}

#[tokio::test]
async fn creates_every_task_in_dependency_order() -> TestResult {
    init_tracing();
    let world = ProbeWorld::new();
    let (target, _cloud) = api_target();
    let engine = Engine::new(chain(&world), target);

    let summary = with_timeout(engine.run()).await?;

    assert_eq!(world.renders(), vec!["net", "db", "app"]);
    assert_eq!(summary.completed, vec!["Probe/net", "Probe/db", "Probe/app"]);
    assert_eq!(summary.created(), 3);
    assert!(!summary.is_converged());
    for key in ["Probe/net", "Probe/db", "Probe/app"] {
        assert_eq!(engine.tasks().state_of(key), Some(TaskState::Applied));
    }
    assert_eq!(world.live("app").unwrap().value.as_deref(), Some("v1"));
    Ok(())
}

#[tokio::test]
async fn second_run_against_converged_world_renders_nothing() -> TestResult {
    init_tracing();
    let world = ProbeWorld::new();

    let (target, _cloud) = api_target();
    Engine::new(chain(&world), target).run().await?;
    world.clear_log();

    let (target, _cloud) = api_target();
    let engine = Engine::new(chain(&world), target);
    let summary = engine.run().await?;

    assert!(world.renders().is_empty());
    assert_eq!(world.finds().len(), 3);
    assert_eq!(summary.unchanged(), 3);
    assert!(summary.is_converged());
    assert_eq!(engine.tasks().state_of("Probe/db"), Some(TaskState::Diffed));
    Ok(())
}

#[tokio::test]
async fn changed_mutable_field_is_updated_once() -> TestResult {
    let world = ProbeWorld::new();
    world.seed("a", "old", None);
    let mut tasks = TaskMap::new();
    tasks.insert(probe_key("a"), ProbeTask::new("a", &world).value("new"))?;

    let (target, _cloud) = api_target();
    let summary = Engine::new(tasks, target).run().await?;

    assert_eq!(summary.outcome("Probe/a"), Some(RunOutcome::Updated));
    assert_eq!(world.render_count("a"), 1);
    assert_eq!(world.live("a").unwrap().value.as_deref(), Some("new"));
    Ok(())
}

#[tokio::test]
async fn unset_expected_field_is_not_compared() -> TestResult {
    let world = ProbeWorld::new();
    world.seed("a", "v1", Some("anything"));
    let mut tasks = TaskMap::new();
    tasks.insert(probe_key("a"), ProbeTask::new("a", &world))?;

    let (target, _cloud) = api_target();
    let summary = Engine::new(tasks, target).run().await?;

    assert_eq!(summary.outcome("Probe/a"), Some(RunOutcome::Unchanged));
    assert!(world.renders().is_empty());
    Ok(())
}

#[tokio::test]
async fn change_to_immutable_field_is_rejected_before_render() {
    let world = ProbeWorld::new();
    world.seed("a", "v1", Some("x"));
    let mut tasks = TaskMap::new();
    tasks
        .insert(probe_key("a"), ProbeTask::new("a", &world).fixed("y"))
        .unwrap();

    let (target, _cloud) = api_target();
    let engine = Engine::new(tasks, target);
    let result = engine.run().await;

    match result {
        Err(ConvergeError::CannotChangeField { task, field }) => {
            assert_eq!(task, "Probe/a");
            assert_eq!(field, "fixed");
        }
        other => panic!("Expected CannotChangeField, got: {:?}", other),
    }
    assert!(world.renders().is_empty());
    assert_eq!(engine.tasks().state_of("Probe/a"), Some(TaskState::Failed));
}

#[tokio::test]
async fn cycle_is_reported_and_nothing_executes() {
    let world = ProbeWorld::new();
    let tasks = probe_map(&world, &[("a", &["b"]), ("b", &["a"]), ("c", &[])]);

    let (target, _cloud) = api_target();
    let result = Engine::new(tasks, target).run().await;

    match result {
        Err(ConvergeError::DagCycle { members, .. }) => {
            assert_eq!(members, vec!["Probe/a", "Probe/b"]);
        }
        other => panic!("Expected DagCycle, got: {:?}", other),
    }
    assert!(world.finds().is_empty());
    assert!(world.renders().is_empty());
}

#[tokio::test]
async fn failure_stops_the_run_and_keeps_earlier_applies() {
    init_tracing();
    let world = ProbeWorld::new();
    world.fail_render("db");

    let (target, _cloud) = api_target();
    let engine = Engine::new(chain(&world), target);
    let result = engine.run().await;

    match result {
        Err(ConvergeError::Apply { task, error }) => {
            assert_eq!(task, "Probe/db");
            assert!(error.to_string().contains("injected render failure"));
        }
        other => panic!("Expected Apply error, got: {:?}", other),
    }
    assert!(world.live("net").is_some());
    assert!(world.live("app").is_none());
    assert_eq!(world.renders(), vec!["net", "db"]);

    let tasks = engine.tasks();
    assert_eq!(tasks.state_of("Probe/net"), Some(TaskState::Applied));
    assert_eq!(tasks.state_of("Probe/db"), Some(TaskState::Failed));
    assert_eq!(tasks.state_of("Probe/app"), Some(TaskState::Declared));
}

#[tokio::test]
async fn discovery_failure_names_the_task() {
    let world = ProbeWorld::new();
    world.fail_find("net");

    let (target, _cloud) = api_target();
    let result = Engine::new(chain(&world), target).run().await;

    match result {
        Err(err @ ConvergeError::Discovery { .. }) => assert_eq!(err.task(), Some("Probe/net")),
        other => panic!("Expected Discovery error, got: {:?}", other),
    }
    assert!(world.renders().is_empty());
}

#[tokio::test]
async fn missing_renderer_fails_before_any_task_runs() {
    let world = ProbeWorld::new();
    let mut tasks = probe_map(&world, &[("a", &[])]);
    tasks.insert("ApiOnly/x", ApiOnlyTask::new("x")).unwrap();

    let engine = Engine::new(tasks, terraform_target());
    assert!(engine.plan().is_err());

    match engine.run().await {
        Err(ConvergeError::MissingRenderer { target, tasks }) => {
            assert_eq!(target, TargetKind::Terraform);
            assert_eq!(tasks, vec!["ApiOnly/x"]);
        }
        other => panic!("Expected MissingRenderer, got: {:?}", other),
    }
    assert!(world.renders().is_empty());
}

#[tokio::test]
async fn terraform_target_renders_without_discovery() -> TestResult {
    let world = ProbeWorld::new();
    world.seed("net", "v1", None);

    let engine = Engine::new(chain(&world), terraform_target());
    let summary = engine.run().await?;

    assert!(world.finds().is_empty());
    assert_eq!(summary.created(), 3);
    let terraform = engine.target().as_terraform().unwrap();
    assert_eq!(
        terraform.resource("probe", "db").unwrap()["value"],
        serde_json::json!("v1")
    );
    assert_eq!(terraform.resource_names().len(), 3);
    Ok(())
}

#[tokio::test]
async fn plan_reports_dependencies_and_order() -> TestResult {
    let world = ProbeWorld::new();
    let (target, _cloud) = api_target();
    let engine = Engine::new(chain(&world), target);

    let plan = engine.plan()?;

    assert_eq!(plan.dependencies["Probe/app"], vec!["Probe/db"]);
    assert_eq!(
        plan.order.to_vec(),
        vec!["Probe/net", "Probe/db", "Probe/app"]
    );
    assert!(world.renders().is_empty());
    Ok(())
}
