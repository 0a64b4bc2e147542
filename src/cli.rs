// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::types::TargetKind;

/// Command-line arguments for `converge`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "converge",
    version,
    about = "Converge cluster infrastructure against a cloud API or a Terraform file.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the cluster config file (TOML).
    #[arg(long, value_name = "PATH", default_value = "cluster.toml")]
    pub config: PathBuf,

    /// Override `[config].target`.
    ///
    /// `api` converges against a simulated in-memory cloud that is discarded
    /// at exit, so every run starts from an empty account.
    #[arg(long, value_name = "TARGET")]
    pub target: Option<TargetKind>,

    /// Directory the Terraform target writes into.
    #[arg(long, value_name = "DIR", default_value = "out")]
    pub out: PathBuf,

    /// Override `[config].concurrency`.
    #[arg(long, short = 'j', value_name = "N")]
    pub jobs: Option<usize>,

    /// Skip the zone-membership checks during validation.
    #[arg(long)]
    pub lenient: bool,

    /// Do not validate the cluster at all.
    #[arg(long)]
    pub skip_validation: bool,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `CONVERGE_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Build tasks, print dependencies and execution order, apply nothing.
    #[arg(long)]
    pub dry_run: bool,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
