// src/lib.rs

pub mod cli;
pub mod cloud;
pub mod cluster;
pub mod config;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod fs;
pub mod logging;
pub mod target;
pub mod task;
pub mod tasks;
pub mod types;
pub mod validation;

use std::sync::Arc;

use anyhow::{anyhow, Result};
use tracing::{debug, info, warn};

use crate::cli::CliArgs;
use crate::cloud::MemoryCloud;
use crate::config::{build_tasks, config_base_dir, load_from_path, ConfigFile};
use crate::engine::{Engine, EngineOptions, Plan, RunSummary};
use crate::fs::{FileSystem, RealFileSystem};
use crate::target::{ApiTarget, Target, TerraformTarget};
use crate::types::TargetKind;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading and validation (with CLI overrides)
/// - task set construction
/// - target selection
/// - the engine, with Ctrl-C wired to its cancellation token
/// - writing the Terraform output
pub async fn run(args: CliArgs) -> Result<()> {
    let mut raw = load_from_path(&args.config)?;
    if let Some(target) = args.target {
        raw.config.target = target;
    }
    if let Some(jobs) = args.jobs {
        raw.config.concurrency = jobs;
    }
    if args.lenient {
        raw.config.strict = false;
    }

    let cfg = if args.skip_validation {
        warn!("cluster validation skipped");
        ConfigFile::new_unchecked(raw)
    } else {
        ConfigFile::try_from(raw)?
    };

    let fs: Arc<dyn FileSystem> = Arc::new(RealFileSystem);
    let tasks = build_tasks(&cfg, fs.clone(), &config_base_dir(&args.config))?;

    let target = match cfg.config.target {
        TargetKind::Api => {
            warn!(
                region = %cfg.config.region,
                "api target runs against a simulated in-memory cloud; nothing persists after exit"
            );
            Target::Api(ApiTarget::new(Arc::new(MemoryCloud::new(cfg.config.region.clone()))))
        }
        TargetKind::Terraform => {
            info!(out = %args.out.display(), "rendering terraform configuration");
            Target::Terraform(TerraformTarget::new(cfg.config.region.clone()))
        }
    };

    let options = EngineOptions {
        max_concurrency: cfg.config.concurrency,
        ..EngineOptions::default()
    };
    let engine = Engine::new(tasks, target).with_options(options);

    if args.dry_run {
        let plan = engine.plan()?;
        print_dry_run(&cfg, &plan);
        return Ok(());
    }

    // Ctrl-C → cancel the run; tasks already applied stay applied.
    {
        let cancel = engine.options().cancel.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                eprintln!("failed to listen for Ctrl+C: {e}");
                return;
            }
            cancel.cancel();
        });
    }

    let summary = engine.run().await?;

    if let Some(terraform) = engine.target().as_terraform() {
        let written = terraform
            .finish(fs.as_ref(), &args.out)
            .map_err(|e| anyhow!("writing terraform output to {:?}: {e:#}", args.out))?;
        for path in &written {
            println!("wrote {}", path.display());
        }
    }

    print_summary(&summary);
    Ok(())
}

/// Print the task dependencies and the order they would run in.
fn print_dry_run(cfg: &ConfigFile, plan: &Plan) {
    println!("converge dry-run");
    println!("  cluster = {}", cfg.cluster.name);
    println!("  target = {}", cfg.config.target);
    println!("  region = {}", cfg.config.region);
    println!("  concurrency = {}", cfg.config.concurrency);
    println!();

    println!("tasks ({}):", plan.dependencies.len());
    for (task, deps) in &plan.dependencies {
        println!("  - {task}");
        if !deps.is_empty() {
            println!("      after: {deps:?}");
        }
    }
    println!();

    println!("order:");
    for (index, wave) in plan.order.waves().iter().enumerate() {
        println!("  {index}: {}", wave.join(", "));
    }

    debug!("dry-run complete (nothing applied)");
}

fn print_summary(summary: &RunSummary) {
    for key in &summary.completed {
        if let Some(outcome) = summary.outcome(key) {
            println!("{key}: {outcome:?}");
        }
    }
    println!(
        "{} created, {} updated, {} unchanged",
        summary.created(),
        summary.updated(),
        summary.unchanged()
    );
}
