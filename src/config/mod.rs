// src/config/mod.rs

//! Configuration loading and validation for converge.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file from disk (`loader.rs`).
//! - Validate it, including cluster deep validation (`validate.rs`).
//! - Build the task set from it (`build.rs`).

pub mod build;
pub mod loader;
pub mod model;
pub mod validate;

pub use build::build_tasks;
pub use loader::{config_base_dir, default_config_path, load_and_validate, load_from_path};
pub use model::{ConfigFile, ConfigSection, RawConfigFile, SshKeySection};
pub use validate::validate_config;
