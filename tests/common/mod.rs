#![allow(dead_code, unused_imports)]

pub use converge_test_utils::builders;
pub use converge_test_utils::fixtures;
pub use converge_test_utils::probe;
pub use converge_test_utils::{init_tracing, with_timeout};

use std::sync::Arc;

use converge::cloud::MemoryCloud;
use converge::target::{ApiTarget, Target, TerraformTarget};

pub type TestResult = Result<(), Box<dyn std::error::Error>>;

/// An API target over a fresh in-memory cloud, plus a handle to that cloud.
pub fn api_target() -> (Target, Arc<MemoryCloud>) {
    let cloud = Arc::new(MemoryCloud::new("us-east-1"));
    (Target::Api(ApiTarget::new(cloud.clone())), cloud)
}

pub fn terraform_target() -> Target {
    Target::Terraform(TerraformTarget::new("us-east-1"))
}
