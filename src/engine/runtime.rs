// src/engine/runtime.rs

//! Async shells around the execution order.
//!
//! [`run_sequential`] walks the flattened order one task at a time.
//! [`run_concurrent`] drives the pure [`Scheduler`]: it spawns ready tasks on
//! tokio and feeds their completions back over an mpsc channel.
//!
//! Both drivers run each task on its own tokio task, so a panicking task is
//! reported as a failure in either mode.

use std::any::Any;
use std::sync::Arc;

use anyhow::anyhow;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::instrument::WithSubscriber;
use tracing::{debug, error, info, warn, Instrument};

use crate::dag::{DependencyMap, ExecutionOrder, Scheduler};
use crate::engine::{Context, RunSummary};
use crate::errors::{ConvergeError, Result};
use crate::types::{RunOutcome, TaskKey};

/// Completion event sent from a spawned task back to the coordinator.
#[derive(Debug)]
struct TaskCompleted {
    task: TaskKey,
    result: Result<RunOutcome>,
}

async fn run_task(ctx: &Context, key: &str, cancel: &CancellationToken) -> Result<RunOutcome> {
    let task = ctx
        .tasks()
        .entry(key)
        .ok_or_else(|| ConvergeError::TaskNotFound(key.to_string()))?;
    debug!(task = %key, kind = task.kind(), "running task");

    tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            warn!(task = %key, "task interrupted by cancellation");
            Err(ConvergeError::Cancelled { pending: vec![key.to_string()] })
        }
        result = task.run(ctx) => result,
    }
}

pub(crate) async fn run_sequential(
    ctx: Arc<Context>,
    order: &ExecutionOrder,
    cancel: &CancellationToken,
) -> Result<RunSummary> {
    let keys = order.to_vec();
    let mut summary = RunSummary::default();

    for (index, key) in keys.iter().enumerate() {
        if cancel.is_cancelled() {
            return Err(cancelled(&keys[index..]));
        }
        match run_isolated(ctx.clone(), key.clone(), cancel.clone()).await {
            Ok(outcome) => summary.record(key, outcome),
            Err(ConvergeError::Cancelled { .. }) => return Err(cancelled(&keys[index..])),
            Err(err) => {
                error!(task = %key, error = %err, "task failed; stopping run");
                return Err(err);
            }
        }
    }

    Ok(summary)
}

pub(crate) async fn run_concurrent(
    ctx: Arc<Context>,
    dependencies: &DependencyMap,
    max_concurrency: usize,
    cancel: &CancellationToken,
) -> Result<RunSummary> {
    let mut scheduler = Scheduler::new(dependencies)?;
    let (tx, mut rx) = mpsc::channel::<TaskCompleted>(max_concurrency.max(1));
    let mut summary = RunSummary::default();
    let mut failures: Vec<ConvergeError> = Vec::new();
    let mut interrupted: Vec<TaskKey> = Vec::new();
    let mut cancelled_run = false;

    info!(max_concurrency, "starting concurrent run");

    loop {
        if !scheduler.is_halted() && cancel.is_cancelled() {
            scheduler.halt();
            cancelled_run = true;
        }

        let free = max_concurrency.saturating_sub(scheduler.running());
        for key in scheduler.next_ready(free) {
            spawn_task(ctx.clone(), key, cancel.clone(), tx.clone());
        }

        if scheduler.running() == 0 {
            break;
        }

        tokio::select! {
            Some(done) = rx.recv() => {
                let success = done.result.is_ok();
                let step = scheduler.complete(&done.task, success);
                match done.result {
                    Ok(outcome) => summary.record(&done.task, outcome),
                    Err(ConvergeError::Cancelled { .. }) => interrupted.push(done.task),
                    Err(err) => {
                        error!(task = %done.task, error = %err, "task failed; halting dispatch");
                        failures.push(err);
                        scheduler.halt();
                    }
                }
                if !step.newly_blocked.is_empty() {
                    debug!(blocked = ?step.newly_blocked, "dependents blocked by failure");
                }
            }
            _ = cancel.cancelled(), if !scheduler.is_halted() => {
                scheduler.halt();
                cancelled_run = true;
            }
        }
    }

    match failures.len() {
        0 => {}
        1 => return Err(failures.remove(0)),
        _ => return Err(ConvergeError::Failed(failures)),
    }

    if cancelled_run || !interrupted.is_empty() {
        let mut pending = interrupted;
        pending.extend(scheduler.pending());
        pending.sort();
        return Err(ConvergeError::Cancelled { pending });
    }

    Ok(summary)
}

fn spawn_task(
    ctx: Arc<Context>,
    key: TaskKey,
    cancel: CancellationToken,
    tx: mpsc::Sender<TaskCompleted>,
) {
    tokio::spawn(
        async move {
            let result = run_isolated(ctx, key.clone(), cancel).await;
            if tx.send(TaskCompleted { task: key, result }).await.is_err() {
                warn!("run coordinator went away before task completion was reported");
            }
        }
        .in_current_span()
        .with_current_subscriber(),
    );
}

/// Run one task on its own tokio task so a panic in `find` or a renderer
/// surfaces as a failed completion instead of tearing down the caller.
async fn run_isolated(
    ctx: Arc<Context>,
    key: TaskKey,
    cancel: CancellationToken,
) -> Result<RunOutcome> {
    let handle = tokio::spawn(
        {
            let ctx = ctx.clone();
            let key = key.clone();
            async move { run_task(&ctx, &key, &cancel).await }
        }
        .in_current_span()
        .with_current_subscriber(),
    );

    match handle.await {
        Ok(result) => result,
        Err(join_err) => {
            if let Some(task) = ctx.tasks().entry(&key) {
                task.mark_failed();
            }
            let reason = if join_err.is_panic() {
                panic_message(join_err.into_panic())
            } else {
                join_err.to_string()
            };
            error!(task = %key, %reason, "task panicked");
            Err(ConvergeError::Apply {
                task: key,
                error: anyhow!("task panicked: {reason}"),
            })
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    match payload.downcast::<String>() {
        Ok(msg) => *msg,
        Err(payload) => match payload.downcast::<&'static str>() {
            Ok(msg) => (*msg).to_string(),
            Err(_) => "non-string panic payload".to_string(),
        },
    }
}

fn cancelled(remaining: &[TaskKey]) -> ConvergeError {
    warn!(pending = remaining.len(), "run cancelled");
    ConvergeError::Cancelled {
        pending: remaining.to_vec(),
    }
}
