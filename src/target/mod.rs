// src/target/mod.rs

//! Execution back-ends.
//!
//! The active target decides how a task's delta is realized: the API target
//! discovers live state and mutates it through a [`Cloud`]; the Terraform
//! target never discovers and accumulates resource blocks into a
//! configuration that is written out after the run.

pub mod api;
pub mod terraform;

use crate::cloud::Cloud;
use crate::types::TargetKind;

pub use api::ApiTarget;
pub use terraform::{sanitize_tf_name, Literal, TerraformTarget};

#[derive(Debug)]
pub enum Target {
    Api(ApiTarget),
    Terraform(TerraformTarget),
}

impl Target {
    pub fn kind(&self) -> TargetKind {
        match self {
            Target::Api(_) => TargetKind::Api,
            Target::Terraform(_) => TargetKind::Terraform,
        }
    }

    /// Whether tasks should query actual state before rendering.
    pub fn discovers(&self) -> bool {
        match self {
            Target::Api(_) => true,
            Target::Terraform(_) => false,
        }
    }

    pub fn cloud(&self) -> Option<&dyn Cloud> {
        match self {
            Target::Api(api) => Some(api.cloud()),
            Target::Terraform(_) => None,
        }
    }

    pub fn as_terraform(&self) -> Option<&TerraformTarget> {
        match self {
            Target::Terraform(tf) => Some(tf),
            Target::Api(_) => None,
        }
    }
}

impl From<ApiTarget> for Target {
    fn from(target: ApiTarget) -> Self {
        Target::Api(target)
    }
}

impl From<TerraformTarget> for Target {
    fn from(target: TerraformTarget) -> Self {
        Target::Terraform(target)
    }
}
