// src/target/terraform.rs

//! Terraform JSON back-end.
//!
//! Render functions register one JSON block per resource; cross-resource
//! references are expressed as interpolation [`Literal`]s so Terraform
//! resolves them at plan time. Opaque payloads are written next to the
//! configuration and loaded with `file()`.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use anyhow::{bail, Context as _};
use serde::{Serialize, Serializer};
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::fs::FileSystem;
use crate::task::ResourceHolder;

pub const MAIN_FILE: &str = "main.tf.json";
pub const DATA_DIR: &str = "data";

/// A Terraform interpolation expression such as `${aws_vpc.main.id}`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Literal(String);

impl Literal {
    /// Reference an attribute of another resource block.
    pub fn property(resource_type: &str, name: &str, prop: &str) -> Self {
        Literal(format!("${{{resource_type}.{name}.{prop}}}"))
    }

    /// Load a file relative to the module directory.
    pub fn file(relative_path: &str) -> Self {
        Literal(format!("${{file(\"${{path.module}}/{relative_path}\")}}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for Literal {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

/// Turn an arbitrary resource name into a valid Terraform block name.
pub fn sanitize_tf_name(name: &str) -> String {
    let mut out: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '-'
            }
        })
        .collect();
    if !out.starts_with(|c: char| c.is_ascii_alphabetic() || c == '_') {
        out.insert(0, '_');
    }
    out
}

#[derive(Debug, Default)]
struct TerraformState {
    resources: BTreeMap<String, BTreeMap<String, Value>>,
    files: BTreeMap<String, Vec<u8>>,
}

/// File-rendering back-end producing `main.tf.json`.
#[derive(Debug)]
pub struct TerraformTarget {
    region: String,
    state: Mutex<TerraformState>,
}

impl TerraformTarget {
    pub fn new(region: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            state: Mutex::new(TerraformState::default()),
        }
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    /// Register `resource.<resource_type>.<name>`.
    ///
    /// Registering the same block twice is an error.
    pub fn render_resource<S: Serialize>(
        &self,
        resource_type: &str,
        name: &str,
        body: &S,
    ) -> anyhow::Result<()> {
        let value = serde_json::to_value(body)
            .with_context(|| format!("serializing {resource_type}.{name}"))?;
        let mut state = self.lock();
        let blocks = state.resources.entry(resource_type.to_string()).or_default();
        if blocks.contains_key(name) {
            bail!("duplicate terraform resource {resource_type}.{name}");
        }
        debug!(resource_type, name, "rendered terraform resource");
        blocks.insert(name.to_string(), value);
        Ok(())
    }

    /// Stage a payload as `data/<type>_<name>_<key>` and return the
    /// expression that loads it.
    pub fn add_file(
        &self,
        resource_type: &str,
        name: &str,
        key: &str,
        holder: &ResourceHolder,
    ) -> anyhow::Result<Literal> {
        let bytes = holder.as_bytes()?;
        let relative = format!("{DATA_DIR}/{resource_type}_{name}_{key}");
        self.lock().files.insert(relative.clone(), bytes.to_vec());
        Ok(Literal::file(&relative))
    }

    /// A rendered block, for inspection.
    pub fn resource(&self, resource_type: &str, name: &str) -> Option<Value> {
        self.lock()
            .resources
            .get(resource_type)
            .and_then(|blocks| blocks.get(name))
            .cloned()
    }

    /// `(type, name)` of every rendered block, sorted.
    pub fn resource_names(&self) -> Vec<(String, String)> {
        self.lock()
            .resources
            .iter()
            .flat_map(|(ty, blocks)| blocks.keys().map(move |name| (ty.clone(), name.clone())))
            .collect()
    }

    /// Staged data files, keyed by path relative to the output directory.
    pub fn files(&self) -> BTreeMap<String, Vec<u8>> {
        self.lock().files.clone()
    }

    /// The complete configuration document.
    pub fn to_json(&self) -> anyhow::Result<String> {
        let state = self.lock();
        let doc = json!({
            "provider": { "aws": { "region": self.region } },
            "resource": state.resources,
        });
        serde_json::to_string_pretty(&doc).context("serializing terraform configuration")
    }

    /// Write `main.tf.json` and every staged data file under `out_dir`.
    pub fn finish(&self, fs: &dyn FileSystem, out_dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
        let mut written = Vec::new();

        let main = out_dir.join(MAIN_FILE);
        fs.write(&main, self.to_json()?.as_bytes())?;
        written.push(main);

        for (relative, bytes) in self.files() {
            let path = out_dir.join(&relative);
            fs.write(&path, &bytes)?;
            written.push(path);
        }

        info!(dir = ?out_dir, files = written.len(), "wrote terraform configuration");
        Ok(written)
    }

    fn lock(&self) -> MutexGuard<'_, TerraformState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
