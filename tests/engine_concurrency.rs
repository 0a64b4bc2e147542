mod common;

use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use converge::engine::{CancellationToken, Engine, EngineOptions};
use converge::errors::ConvergeError;
use converge::types::TaskState;
use tracing::Dispatch;

use crate::common::probe::{probe_map, ProbeWorld};
use crate::common::{api_target, init_tracing, with_timeout, TestResult};

fn options(max_concurrency: usize) -> EngineOptions {
    EngineOptions {
        max_concurrency,
        ..EngineOptions::default()
    }
}

#[tokio::test]
async fn independent_tasks_render_in_parallel() -> TestResult {
    init_tracing();
    let world = ProbeWorld::new();
    world.set_render_delay(Duration::from_millis(50));
    let tasks = probe_map(
        &world,
        &[
            ("a", &[]),
            ("b", &[]),
            ("c", &[]),
            ("d", &[]),
            ("joined", &["a", "b", "c", "d"]),
        ],
    );

    let (target, _cloud) = api_target();
    let engine = Engine::new(tasks, target).with_options(options(4));
    let summary = with_timeout(engine.run()).await?;

    assert_eq!(summary.created(), 5);
    assert!(world.max_in_flight() >= 2);
    assert!(world.max_in_flight() <= 4);
    assert_eq!(world.renders().last().map(String::as_str), Some("joined"));
    assert_eq!(summary.completed.last().map(String::as_str), Some("Probe/joined"));
    Ok(())
}

#[tokio::test]
async fn concurrency_limit_is_respected() -> TestResult {
    let world = ProbeWorld::new();
    world.set_render_delay(Duration::from_millis(20));
    let tasks = probe_map(
        &world,
        &[
            ("a", &[]),
            ("b", &[]),
            ("c", &[]),
            ("d", &[]),
            ("e", &[]),
            ("f", &[]),
        ],
    );

    let (target, _cloud) = api_target();
    let summary = with_timeout(
        Engine::new(tasks, target).with_options(options(2)).run(),
    )
    .await?;

    assert_eq!(summary.created(), 6);
    assert!(world.max_in_flight() <= 2);
    Ok(())
}

#[tokio::test]
async fn failure_blocks_dependents_but_not_siblings() {
    let world = ProbeWorld::new();
    world.fail_render("b");
    let tasks = probe_map(&world, &[("a", &[]), ("b", &[]), ("c", &["b"])]);

    let (target, _cloud) = api_target();
    let result = with_timeout(Engine::new(tasks, target).with_options(options(3)).run()).await;

    match result {
        Err(ConvergeError::Apply { task, .. }) => assert_eq!(task, "Probe/b"),
        other => panic!("Expected Apply error, got: {:?}", other),
    }
    assert!(world.live("a").is_some());
    assert_eq!(world.render_count("c"), 0);
}

#[tokio::test]
async fn several_failures_are_aggregated() {
    let world = ProbeWorld::new();
    world.set_render_delay(Duration::from_millis(20));
    world.fail_render("a");
    world.fail_render("b");
    let tasks = probe_map(&world, &[("a", &[]), ("b", &[])]);

    let (target, _cloud) = api_target();
    let result = with_timeout(Engine::new(tasks, target).with_options(options(2)).run()).await;

    match result {
        Err(ConvergeError::Failed(errors)) => {
            let mut failed: Vec<&str> = errors.iter().filter_map(|e| e.task()).collect();
            failed.sort();
            assert_eq!(failed, vec!["Probe/a", "Probe/b"]);
        }
        other => panic!("Expected Failed, got: {:?}", other),
    }
}

#[tokio::test]
async fn panicking_render_fails_a_concurrent_run() {
    let world = ProbeWorld::new();
    world.panic_render("a");
    world.panic_render("b");
    let tasks = probe_map(&world, &[("a", &[]), ("b", &[]), ("c", &["a"])]);

    let (target, _cloud) = api_target();
    let engine = Engine::new(tasks, target).with_options(options(4));
    let result = with_timeout(engine.run()).await;

    let errors = match result {
        Err(ConvergeError::Failed(errors)) => errors,
        Err(err @ ConvergeError::Apply { .. }) => vec![err],
        other => panic!("Expected a failed run, got: {:?}", other),
    };
    let mut failed: Vec<&str> = errors.iter().filter_map(|e| e.task()).collect();
    failed.sort();
    assert!(failed.contains(&"Probe/a") || failed.contains(&"Probe/b"));
    assert!(errors.iter().all(|e| e.to_string().contains("task panicked")));
    assert_eq!(world.render_count("c"), 0);
    for key in failed {
        assert_eq!(engine.tasks().state_of(key), Some(TaskState::Failed));
    }
}

#[tokio::test]
async fn panicking_render_fails_a_sequential_run() {
    let world = ProbeWorld::new();
    world.panic_render("net");
    let tasks = probe_map(&world, &[("app", &["net"]), ("net", &[])]);

    let (target, _cloud) = api_target();
    let engine = Engine::new(tasks, target);
    let result = with_timeout(engine.run()).await;

    match result {
        Err(ConvergeError::Apply { task, error }) => {
            assert_eq!(task, "Probe/net");
            assert!(error.to_string().contains("injected render panic for net"));
        }
        other => panic!("Expected Apply error, got: {:?}", other),
    }
    assert_eq!(engine.tasks().state_of("Probe/net"), Some(TaskState::Failed));
    assert!(world.renders().is_empty());
}

#[tokio::test]
async fn cancelling_sequential_run_reports_tasks_never_run() {
    let world = ProbeWorld::new();
    let tasks = probe_map(&world, &[("app", &["db"]), ("db", &["net"]), ("net", &[])]);
    let cancel = CancellationToken::new();
    world.cancel_after("net", cancel.clone());

    let (target, _cloud) = api_target();
    let engine = Engine::new(tasks, target).with_options(EngineOptions {
        cancel,
        ..EngineOptions::default()
    });
    let result = with_timeout(engine.run()).await;

    match result {
        Err(ConvergeError::Cancelled { pending }) => {
            assert_eq!(pending, vec!["Probe/db", "Probe/app"]);
        }
        other => panic!("Expected Cancelled, got: {:?}", other),
    }
    assert!(world.live("net").is_some());
    assert_eq!(world.renders(), vec!["net"]);
}

#[tokio::test]
async fn cancelling_concurrent_run_stops_dispatch() {
    let world = ProbeWorld::new();
    let tasks = probe_map(&world, &[("app", &["db"]), ("db", &["net"]), ("net", &[])]);
    let cancel = CancellationToken::new();
    world.cancel_after("net", cancel.clone());

    let (target, _cloud) = api_target();
    let engine = Engine::new(tasks, target).with_options(EngineOptions {
        max_concurrency: 2,
        cancel,
        ..EngineOptions::default()
    });
    let result = with_timeout(engine.run()).await;

    match result {
        Err(ConvergeError::Cancelled { pending }) => {
            assert_eq!(pending, vec!["Probe/app", "Probe/db"]);
        }
        other => panic!("Expected Cancelled, got: {:?}", other),
    }
    assert_eq!(world.renders(), vec!["net"]);
}

#[tokio::test]
async fn deadline_interrupts_a_slow_task() {
    let world = ProbeWorld::new();
    world.set_render_delay(Duration::from_secs(30));
    let tasks = probe_map(&world, &[("slow", &[])]);

    let (target, _cloud) = api_target();
    let engine = Engine::new(tasks, target).with_options(EngineOptions {
        deadline: Some(Duration::from_millis(100)),
        ..EngineOptions::default()
    });
    let result = with_timeout(engine.run()).await;

    match result {
        Err(ConvergeError::Cancelled { pending }) => assert_eq!(pending, vec!["Probe/slow"]),
        other => panic!("Expected Cancelled, got: {:?}", other),
    }
    assert!(world.live("slow").is_none());
    assert_eq!(world.max_in_flight(), 1);
}

#[derive(Clone, Default)]
struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl io::Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn run_logs_to_the_supplied_dispatcher() -> TestResult {
    let buf = SharedBuf::default();
    let writer = buf.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_ansi(false)
        .with_writer(move || writer.clone())
        .finish();

    let world = ProbeWorld::new();
    let tasks = probe_map(&world, &[("a", &[]), ("b", &[])]);
    let (target, _cloud) = api_target();
    let engine = Engine::new(tasks, target).with_options(EngineOptions {
        max_concurrency: 2,
        dispatch: Some(Dispatch::new(subscriber)),
        ..EngineOptions::default()
    });
    with_timeout(engine.run()).await?;

    let output = String::from_utf8(buf.0.lock().unwrap().clone())?;
    assert!(output.contains("converge_run"));
    assert!(output.contains("applying changes"));
    assert!(output.contains("Probe/a"));
    assert!(output.contains("Probe/b"));
    assert!(output.contains("run complete"));
    Ok(())
}
