// src/engine/driver.rs

//! The generic find → diff → apply driver shared by every task type.

use tracing::{debug, info};

use crate::engine::Context;
use crate::errors::{ConvergeError, Result};
use crate::target::Target;
use crate::task::{Apply, Changes, Task, TaskCell};
use crate::types::{RunOutcome, TaskState};

/// Converge one task.
///
/// 1. Discover actual state (skipped for targets that do not discover).
/// 2. Adopt computed outputs from the discovered resource.
/// 3. Diff; an existing resource with an empty delta is left alone.
/// 4. Validate the delta, render it against the active target and store the
///    outputs the renderer wrote back.
pub async fn default_delta_run<T: Task>(cell: &TaskCell<T>, ctx: &Context) -> Result<RunOutcome> {
    let key = cell.key();
    let mut expected = cell.expected();

    let actual = if ctx.target().discovers() {
        expected
            .find(ctx)
            .await
            .map_err(|error| ConvergeError::Discovery {
                task: key.to_string(),
                error,
            })?
    } else {
        None
    };
    if let Some(actual) = &actual {
        expected.adopt(actual);
        cell.store(expected.clone());
    }
    cell.set_state(TaskState::Found);

    let changes = Changes::compute(actual.as_ref(), &expected);
    cell.set_state(TaskState::Diffed);

    if actual.is_some() && changes.is_empty() {
        debug!(task = %key, kind = T::KIND, "no changes");
        return Ok(RunOutcome::Unchanged);
    }

    T::check_changes(actual.as_ref(), &expected, &changes).map_err(|e| e.for_task(key))?;

    let outcome = if actual.is_some() {
        RunOutcome::Updated
    } else {
        RunOutcome::Created
    };
    info!(
        task = %key,
        kind = T::KIND,
        target = %ctx.target().kind(),
        changes = %changes,
        ?outcome,
        "applying changes"
    );

    render(ctx, key, actual.as_ref(), &mut expected, &changes).await?;

    cell.store(expected);
    cell.set_state(TaskState::Applied);
    Ok(outcome)
}

async fn render<T: Task>(
    ctx: &Context,
    key: &str,
    actual: Option<&T>,
    expected: &mut T,
    changes: &Changes,
) -> Result<()> {
    let renderers = T::renderers();
    let op = Apply {
        tasks: ctx.tasks(),
        actual,
        expected,
        changes,
    };
    let missing = || ConvergeError::MissingRenderer {
        target: ctx.target().kind(),
        tasks: vec![key.to_string()],
    };

    let result = match ctx.target() {
        Target::Api(target) => {
            let render = renderers.api_fn().ok_or_else(missing)?;
            render(target, op).await
        }
        Target::Terraform(target) => {
            let render = renderers.terraform_fn().ok_or_else(missing)?;
            render(target, op)
        }
    };

    result.map_err(|error| ConvergeError::Apply {
        task: key.to_string(),
        error,
    })
}
