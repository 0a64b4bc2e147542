// src/cluster.rs

//! Cluster description: the input the task set is built from.

use std::fmt;

use serde::Deserialize;

pub const DEFAULT_NETWORK_CIDR: &str = "172.20.0.0/16";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Cluster {
    pub name: String,
    #[serde(default)]
    pub network_cidr: Option<String>,
    #[serde(default)]
    pub zones: Vec<ClusterZone>,
    #[serde(default)]
    pub etcd_clusters: Vec<EtcdCluster>,
}

impl Cluster {
    pub fn network_cidr(&self) -> &str {
        self.network_cidr.as_deref().unwrap_or(DEFAULT_NETWORK_CIDR)
    }

    pub fn zone(&self, name: &str) -> Option<&ClusterZone> {
        self.zones.iter().find(|z| z.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ClusterZone {
    pub name: String,
    #[serde(default)]
    pub cidr: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EtcdCluster {
    pub name: String,
    #[serde(default)]
    pub members: Vec<EtcdMember>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EtcdMember {
    pub name: String,
    pub zone: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceGroupRole {
    Master,
    Node,
}

impl fmt::Display for InstanceGroupRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstanceGroupRole::Master => f.write_str("master"),
            InstanceGroupRole::Node => f.write_str("node"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct InstanceGroup {
    pub name: String,
    pub role: InstanceGroupRole,
    #[serde(default)]
    pub zones: Vec<String>,
    pub image: String,
    pub machine_type: String,
    #[serde(default = "default_size")]
    pub min_size: u32,
    #[serde(default = "default_size")]
    pub max_size: u32,
}

fn default_size() -> u32 {
    1
}
