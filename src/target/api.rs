// src/target/api.rs

use std::sync::Arc;

use crate::cloud::Cloud;

/// Live back-end: renderers call the cloud directly.
#[derive(Debug, Clone)]
pub struct ApiTarget {
    cloud: Arc<dyn Cloud>,
}

impl ApiTarget {
    pub fn new(cloud: Arc<dyn Cloud>) -> Self {
        Self { cloud }
    }

    pub fn cloud(&self) -> &dyn Cloud {
        self.cloud.as_ref()
    }
}
