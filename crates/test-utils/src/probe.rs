//! Instrumented task types for engine tests.
//!
//! A [`ProbeTask`] converges a record in a shared [`ProbeWorld`] and logs
//! every find and render there, so tests can assert on exactly what the
//! engine did.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use anyhow::{anyhow, bail};
use converge::dag::{Walk, Walker};
use converge::engine::Context;
use converge::impl_walk;
use converge::target::{ApiTarget, TerraformTarget};
use converge::task::{
    reject_immutable, task_key, Apply, BoxFuture, ChangeError, Changes, Differ, Renderers, Task,
    TaskMap, TaskRef,
};
use converge::types::TaskKey;
use serde_json::json;
use tokio_util::sync::CancellationToken;

/// What a probe looks like once rendered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveProbe {
    pub value: Option<String>,
    pub fixed: Option<String>,
}

#[derive(Debug, Default)]
struct WorldState {
    live: BTreeMap<String, LiveProbe>,
    renders: Vec<String>,
    finds: Vec<String>,
    fail_render: BTreeSet<String>,
    fail_find: BTreeSet<String>,
    panic_render: BTreeSet<String>,
    cancel_after: Vec<(String, CancellationToken)>,
    render_delay: Option<Duration>,
    in_flight: usize,
    max_in_flight: usize,
}

/// Shared fake back-end for probe tasks.
#[derive(Debug, Default)]
pub struct ProbeWorld {
    state: Mutex<WorldState>,
}

impl ProbeWorld {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Pretend a probe already exists.
    pub fn seed(&self, name: &str, value: &str, fixed: Option<&str>) {
        self.lock().live.insert(
            name.to_string(),
            LiveProbe {
                value: Some(value.to_string()),
                fixed: fixed.map(str::to_string),
            },
        );
    }

    pub fn live(&self, name: &str) -> Option<LiveProbe> {
        self.lock().live.get(name).cloned()
    }

    /// Names of every render call, in call order.
    pub fn renders(&self) -> Vec<String> {
        self.lock().renders.clone()
    }

    pub fn render_count(&self, name: &str) -> usize {
        self.lock().renders.iter().filter(|r| *r == name).count()
    }

    pub fn finds(&self) -> Vec<String> {
        self.lock().finds.clone()
    }

    pub fn clear_log(&self) {
        let mut state = self.lock();
        state.renders.clear();
        state.finds.clear();
    }

    pub fn fail_render(&self, name: &str) {
        self.lock().fail_render.insert(name.to_string());
    }

    pub fn fail_find(&self, name: &str) {
        self.lock().fail_find.insert(name.to_string());
    }

    /// Rendering `name` panics instead of returning an error.
    pub fn panic_render(&self, name: &str) {
        self.lock().panic_render.insert(name.to_string());
    }

    fn panics_on_render(&self, name: &str) -> bool {
        self.lock().panic_render.contains(name)
    }

    /// Every render sleeps this long before completing.
    pub fn set_render_delay(&self, delay: Duration) {
        self.lock().render_delay = Some(delay);
    }

    /// Cancel `token` once `name` has rendered.
    pub fn cancel_after(&self, name: &str, token: CancellationToken) {
        self.lock().cancel_after.push((name.to_string(), token));
    }

    /// Highest number of renders that were in progress at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.lock().max_in_flight
    }

    fn record_find(&self, name: &str) -> anyhow::Result<Option<LiveProbe>> {
        let mut state = self.lock();
        state.finds.push(name.to_string());
        if state.fail_find.contains(name) {
            bail!("injected find failure for {name}");
        }
        Ok(state.live.get(name).cloned())
    }

    fn record_render(&self, name: &str) -> anyhow::Result<()> {
        let mut state = self.lock();
        state.renders.push(name.to_string());
        if state.fail_render.contains(name) {
            bail!("injected render failure for {name}");
        }
        Ok(())
    }

    fn enter(self: &Arc<Self>, name: &str) -> anyhow::Result<InFlight> {
        self.record_render(name)?;
        let mut state = self.lock();
        state.in_flight += 1;
        state.max_in_flight = state.max_in_flight.max(state.in_flight);
        Ok(InFlight(self.clone()))
    }

    fn render_delay(&self) -> Option<Duration> {
        self.lock().render_delay
    }

    fn complete(&self, name: &str, live: LiveProbe) {
        let mut state = self.lock();
        state.live.insert(name.to_string(), live);
        for (_, token) in state.cancel_after.iter().filter(|(n, _)| n == name) {
            token.cancel();
        }
    }

    fn lock(&self) -> MutexGuard<'_, WorldState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Walk for ProbeWorld {
    fn walk(&self, _walker: &mut Walker) {}
}

/// Counts a render as in flight until dropped, including when the render
/// future is dropped by cancellation.
struct InFlight(Arc<ProbeWorld>);

impl Drop for InFlight {
    fn drop(&mut self) {
        let mut state = self.0.lock();
        state.in_flight = state.in_flight.saturating_sub(1);
    }
}

/// Task whose `value` is mutable and whose `fixed` is not.
#[derive(Debug, Clone, Default)]
pub struct ProbeTask {
    pub name: Option<String>,
    pub value: Option<String>,
    pub fixed: Option<String>,
    pub after: Vec<TaskRef<ProbeTask>>,
    pub explicit: Option<Vec<TaskKey>>,
    pub world: Option<Arc<ProbeWorld>>,
}

impl_walk!(ProbeTask {
    name,
    value,
    fixed,
    after,
    explicit,
    world
});

pub fn probe_key(name: &str) -> TaskKey {
    task_key::<ProbeTask>(name)
}

pub fn probe_ref(name: &str) -> TaskRef<ProbeTask> {
    TaskRef::new(probe_key(name))
}

impl ProbeTask {
    pub fn new(name: &str, world: &Arc<ProbeWorld>) -> Self {
        Self {
            name: Some(name.to_string()),
            value: Some("v1".to_string()),
            world: Some(world.clone()),
            ..Default::default()
        }
    }

    /// A probe with no world; only usable where nothing is discovered or
    /// rendered through the API.
    pub fn detached(name: &str) -> Self {
        Self {
            name: Some(name.to_string()),
            value: Some("v1".to_string()),
            ..Default::default()
        }
    }

    pub fn value(mut self, value: &str) -> Self {
        self.value = Some(value.to_string());
        self
    }

    pub fn fixed(mut self, fixed: &str) -> Self {
        self.fixed = Some(fixed.to_string());
        self
    }

    /// Structural dependency on another probe by name.
    pub fn after(mut self, name: &str) -> Self {
        self.after.push(probe_ref(name));
        self
    }

    /// Explicit dependency keys, replacing structural discovery.
    pub fn explicit(mut self, keys: &[&str]) -> Self {
        self.explicit = Some(keys.iter().map(|k| k.to_string()).collect());
        self
    }

    fn name(&self) -> anyhow::Result<&str> {
        self.name.as_deref().ok_or_else(|| anyhow!("probe has no name"))
    }

    fn world(&self) -> anyhow::Result<&Arc<ProbeWorld>> {
        self.world
            .as_ref()
            .ok_or_else(|| anyhow!("probe {:?} has no world", self.name))
    }

    fn render_api<'a>(
        _target: &'a ApiTarget,
        op: Apply<'a, Self>,
    ) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            let expected = op.expected;
            let world = expected.world()?.clone();
            let name = expected.name()?.to_string();

            if world.panics_on_render(&name) {
                panic!("injected render panic for {name}");
            }
            let _in_flight = world.enter(&name)?;
            if let Some(delay) = world.render_delay() {
                tokio::time::sleep(delay).await;
            }
            world.complete(
                &name,
                LiveProbe {
                    value: expected.value.clone(),
                    fixed: expected.fixed.clone(),
                },
            );
            Ok(())
        })
    }

    fn render_terraform(target: &TerraformTarget, op: Apply<'_, Self>) -> anyhow::Result<()> {
        let expected = op.expected;
        let name = expected.name()?;
        if let Some(world) = &expected.world {
            world.record_render(name)?;
        }
        target.render_resource(
            "probe",
            name,
            &json!({ "value": expected.value, "fixed": expected.fixed }),
        )
    }
}

impl Task for ProbeTask {
    const KIND: &'static str = "Probe";

    fn identity(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn explicit_dependencies(&self, _tasks: &TaskMap) -> Option<Vec<TaskKey>> {
        self.explicit.clone()
    }

    fn find<'a>(&'a self, _ctx: &'a Context) -> BoxFuture<'a, anyhow::Result<Option<Self>>> {
        Box::pin(async move {
            let name = self.name()?;
            let found = self.world()?.record_find(name)?;
            Ok(found.map(|live| ProbeTask {
                name: Some(name.to_string()),
                value: live.value,
                fixed: live.fixed,
                ..Default::default()
            }))
        })
    }

    fn diff(actual: &Self, expected: &Self, differ: &mut Differ) {
        differ
            .field("value", &actual.value, &expected.value)
            .field("fixed", &actual.fixed, &expected.fixed);
    }

    fn check_changes(
        actual: Option<&Self>,
        _expected: &Self,
        changes: &Changes,
    ) -> Result<(), ChangeError> {
        reject_immutable(actual, changes, &["fixed"])
    }

    fn renderers() -> Renderers<Self> {
        Renderers::new()
            .api(Self::render_api)
            .terraform(Self::render_terraform)
    }
}

/// Task with an API renderer only.
#[derive(Debug, Clone, Default)]
pub struct ApiOnlyTask {
    pub name: Option<String>,
}

impl_walk!(ApiOnlyTask { name });

impl ApiOnlyTask {
    pub fn new(name: &str) -> Self {
        Self {
            name: Some(name.to_string()),
        }
    }

    fn render_api<'a>(
        _target: &'a ApiTarget,
        _op: Apply<'a, Self>,
    ) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async { Ok(()) })
    }
}

impl Task for ApiOnlyTask {
    const KIND: &'static str = "ApiOnly";

    fn find<'a>(&'a self, _ctx: &'a Context) -> BoxFuture<'a, anyhow::Result<Option<Self>>> {
        Box::pin(async { Ok(None) })
    }

    fn diff(actual: &Self, expected: &Self, differ: &mut Differ) {
        differ.field("name", &actual.name, &expected.name);
    }

    fn renderers() -> Renderers<Self> {
        Renderers::new().api(Self::render_api)
    }
}

/// Build a map of probes from `(name, structural dependencies)` pairs.
pub fn probe_map(world: &Arc<ProbeWorld>, entries: &[(&str, &[&str])]) -> TaskMap {
    let mut tasks = TaskMap::new();
    for (name, deps) in entries {
        let mut task = ProbeTask::new(name, world);
        for dep in deps.iter() {
            task = task.after(dep);
        }
        tasks
            .insert(probe_key(name), task)
            .expect("probe names are unique");
    }
    tasks
}
