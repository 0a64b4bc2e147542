// src/types.rs

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

/// Canonical task key type used throughout the engine.
///
/// Keys are unique within a run. By convention they look like
/// `"<Kind>/<name>"`, e.g. `"SSHKey/kubernetes.example.com"`.
pub type TaskKey = String;

/// Which execution back-end is active for a run.
///
/// - `Api`: issue live discover/mutate calls against a cloud.
/// - `Terraform`: accumulate resource blocks into a Terraform JSON file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    Api,
    Terraform,
}

impl Default for TargetKind {
    fn default() -> Self {
        TargetKind::Api
    }
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetKind::Api => f.write_str("api"),
            TargetKind::Terraform => f.write_str("terraform"),
        }
    }
}

impl FromStr for TargetKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "api" => Ok(TargetKind::Api),
            "terraform" => Ok(TargetKind::Terraform),
            other => Err(format!(
                "invalid target: {other} (expected \"api\" or \"terraform\")"
            )),
        }
    }
}

/// Lifecycle state of a single task within a run.
///
/// `Declared` on construction, `Found` once actual state was queried,
/// `Diffed` once expected/actual were compared, then `Applied` after a
/// successful render or `Failed` on any unrecoverable error. A converged task
/// (empty delta) stays `Diffed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Declared,
    Found,
    Diffed,
    Applied,
    Failed,
}

impl TaskState {
    /// Whether the task reached a state from which it will not move again
    /// during this run.
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Applied | TaskState::Failed)
    }
}

/// What a successful task run did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The resource did not exist and was rendered from scratch.
    Created,
    /// The resource existed and a non-empty delta was rendered.
    Updated,
    /// Actual state already matched expected state; nothing was rendered.
    Unchanged,
}
