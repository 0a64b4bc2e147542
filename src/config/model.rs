// src/config/model.rs

use std::path::PathBuf;

use serde::Deserialize;

use crate::cluster::{Cluster, InstanceGroup};
use crate::types::TargetKind;

/// Configuration exactly as read from a TOML file.
///
/// ```toml
/// [config]
/// target = "terraform"
/// region = "us-east-1"
///
/// [cluster]
/// name = "k8s.example.com"
/// [[cluster.zones]]
/// name = "us-east-1a"
/// cidr = "172.20.32.0/19"
///
/// [ssh_key]
/// public_key_file = "id_rsa.pub"
///
/// [[instance_groups]]
/// name = "nodes"
/// role = "node"
/// zones = ["us-east-1a"]
/// image = "ami-12345678"
/// machine_type = "t2.medium"
/// ```
///
/// Turn it into a [`ConfigFile`] with `ConfigFile::try_from`, which runs
/// validation.
#[derive(Debug, Clone, Deserialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub config: ConfigSection,

    pub cluster: Cluster,

    #[serde(default)]
    pub ssh_key: Option<SshKeySection>,

    #[serde(default)]
    pub instance_groups: Vec<InstanceGroup>,
}

/// Validated configuration.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub config: ConfigSection,
    pub cluster: Cluster,
    pub ssh_key: Option<SshKeySection>,
    pub instance_groups: Vec<InstanceGroup>,
}

impl ConfigFile {
    /// Build without validating. Used after validation succeeded, or when the
    /// caller explicitly skips it.
    pub fn new_unchecked(raw: RawConfigFile) -> Self {
        Self {
            config: raw.config,
            cluster: raw.cluster,
            ssh_key: raw.ssh_key,
            instance_groups: raw.instance_groups,
        }
    }
}

/// `[config]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigSection {
    #[serde(default)]
    pub target: TargetKind,

    #[serde(default = "default_region")]
    pub region: String,

    /// Whether instance group and etcd zones must be declared cluster zones.
    #[serde(default = "default_strict")]
    pub strict: bool,

    /// Maximum number of tasks converged at once.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_strict() -> bool {
    true
}

fn default_concurrency() -> usize {
    1
}

impl Default for ConfigSection {
    fn default() -> Self {
        Self {
            target: TargetKind::default(),
            region: default_region(),
            strict: default_strict(),
            concurrency: default_concurrency(),
        }
    }
}

/// `[ssh_key]` section. Exactly one of `public_key` and `public_key_file`
/// must be set.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SshKeySection {
    /// Key pair name; defaults to `kubernetes.<cluster name>`.
    #[serde(default)]
    pub name: Option<String>,

    /// Inline OpenSSH public key.
    #[serde(default)]
    pub public_key: Option<String>,

    /// Path to an OpenSSH public key, relative to the config file.
    #[serde(default)]
    pub public_key_file: Option<PathBuf>,
}
