// src/engine/mod.rs

//! Orchestration engine.
//!
//! This module ties together:
//! - the pre-flight plan: renderer coverage, dependency discovery, ordering
//! - the per-task driver ([`driver::default_delta_run`])
//! - the sequential and concurrent runtimes
//! - cancellation, deadlines and the caller's logging dispatcher
//!
//! The pure scheduling state machine lives in [`crate::dag::scheduler`]; the
//! async/IO shell is implemented in [`runtime`].

pub mod context;
pub mod driver;
pub mod runtime;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::instrument::WithSubscriber;
use tracing::{info, info_span, warn, Dispatch, Instrument};

use crate::dag::{find_task_dependencies, topological_order, DependencyMap, ExecutionOrder};
use crate::errors::{ConvergeError, Result};
use crate::target::Target;
use crate::task::TaskMap;
use crate::types::{RunOutcome, TaskKey};

pub use context::Context;
pub use tokio_util::sync::CancellationToken;

/// Knobs for a single run.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Maximum number of tasks in flight. `1` runs the flattened order
    /// sequentially.
    pub max_concurrency: usize,
    /// Cancelling this token stops dispatch; in-flight tasks are interrupted.
    pub cancel: CancellationToken,
    /// Cancel the run after this long.
    pub deadline: Option<Duration>,
    /// Dispatcher the run logs to instead of the global default.
    pub dispatch: Option<Dispatch>,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            max_concurrency: 1,
            cancel: CancellationToken::new(),
            deadline: None,
            dispatch: None,
        }
    }
}

/// Result of the pre-flight phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    pub dependencies: DependencyMap,
    pub order: ExecutionOrder,
}

/// What a completed run did, per task.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Tasks in completion order.
    pub completed: Vec<TaskKey>,
    pub outcomes: BTreeMap<TaskKey, RunOutcome>,
}

impl RunSummary {
    pub(crate) fn record(&mut self, task: &str, outcome: RunOutcome) {
        self.completed.push(task.to_string());
        self.outcomes.insert(task.to_string(), outcome);
    }

    pub fn outcome(&self, task: &str) -> Option<RunOutcome> {
        self.outcomes.get(task).copied()
    }

    fn count(&self, wanted: RunOutcome) -> usize {
        self.outcomes.values().filter(|o| **o == wanted).count()
    }

    pub fn created(&self) -> usize {
        self.count(RunOutcome::Created)
    }

    pub fn updated(&self) -> usize {
        self.count(RunOutcome::Updated)
    }

    pub fn unchanged(&self) -> usize {
        self.count(RunOutcome::Unchanged)
    }

    /// Whether the run changed nothing.
    pub fn is_converged(&self) -> bool {
        self.created() == 0 && self.updated() == 0
    }
}

/// Aborts the deadline timer when the run ends first.
struct AbortOnDrop(JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Converges a task set against one target.
#[derive(Debug)]
pub struct Engine {
    ctx: Arc<Context>,
    options: EngineOptions,
}

impl Engine {
    pub fn new(tasks: TaskMap, target: impl Into<Target>) -> Self {
        Self {
            ctx: Arc::new(Context::new(tasks, target.into())),
            options: EngineOptions::default(),
        }
    }

    pub fn with_options(mut self, options: EngineOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    pub fn tasks(&self) -> &TaskMap {
        self.ctx.tasks()
    }

    pub fn target(&self) -> &Target {
        self.ctx.target()
    }

    /// Everything that happens before the first task executes: every task
    /// must have a renderer for the active target, every reference must
    /// resolve, and the graph must be acyclic.
    pub fn plan(&self) -> Result<Plan> {
        self.check_renderers()?;
        let dependencies = find_task_dependencies(self.ctx.tasks())?;
        let order = topological_order(&dependencies)?;
        Ok(Plan {
            dependencies,
            order,
        })
    }

    /// Plan, then converge every task in dependency order.
    pub async fn run(&self) -> Result<RunSummary> {
        let run = async {
            let span = info_span!(
                "converge_run",
                target = %self.ctx.target().kind(),
                tasks = self.ctx.tasks().len()
            );
            self.run_inner().instrument(span).await
        };
        match &self.options.dispatch {
            Some(dispatch) => run.with_subscriber(dispatch.clone()).await,
            None => run.await,
        }
    }

    async fn run_inner(&self) -> Result<RunSummary> {
        let plan = self.plan()?;
        info!(
            tasks = plan.order.len(),
            waves = plan.order.waves().len(),
            "execution order computed"
        );

        let cancel = self.options.cancel.child_token();
        let _deadline = self.options.deadline.map(|deadline| {
            let cancel = cancel.clone();
            AbortOnDrop(tokio::spawn(
                async move {
                    tokio::time::sleep(deadline).await;
                    warn!(?deadline, "run deadline elapsed; cancelling");
                    cancel.cancel();
                }
                .in_current_span()
                .with_current_subscriber(),
            ))
        });

        let summary = if self.options.max_concurrency <= 1 {
            runtime::run_sequential(self.ctx.clone(), &plan.order, &cancel).await?
        } else {
            runtime::run_concurrent(
                self.ctx.clone(),
                &plan.dependencies,
                self.options.max_concurrency,
                &cancel,
            )
            .await?
        };

        info!(
            created = summary.created(),
            updated = summary.updated(),
            unchanged = summary.unchanged(),
            "run complete"
        );
        Ok(summary)
    }

    fn check_renderers(&self) -> Result<()> {
        let kind = self.ctx.target().kind();
        let missing: Vec<TaskKey> = self
            .ctx
            .tasks()
            .iter()
            .filter(|(_, task)| !task.supports(kind))
            .map(|(key, _)| key.clone())
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(ConvergeError::MissingRenderer {
                target: kind,
                tasks: missing,
            })
        }
    }
}
