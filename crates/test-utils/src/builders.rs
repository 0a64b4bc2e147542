#![allow(dead_code)]

use converge::cluster::{
    Cluster, ClusterZone, EtcdCluster, EtcdMember, InstanceGroup, InstanceGroupRole,
};
use converge::config::{ConfigFile, ConfigSection, RawConfigFile, SshKeySection};
use converge::types::TargetKind;

use crate::fixtures::TEST_PUBLIC_KEY;

/// Builder for `Cluster`.
///
/// `ClusterBuilder::new(name)` starts empty; `ClusterBuilder::default_cluster()`
/// has one zone, `us-east-1a`, and a single-member `main` etcd cluster there.
pub struct ClusterBuilder {
    cluster: Cluster,
}

impl ClusterBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            cluster: Cluster {
                name: name.to_string(),
                network_cidr: None,
                zones: vec![],
                etcd_clusters: vec![],
            },
        }
    }

    pub fn default_cluster() -> Self {
        Self::new("testcluster.test.com")
            .zone("us-east-1a", "172.20.32.0/19")
            .etcd("main", &["us-east-1a"])
    }

    pub fn network_cidr(mut self, cidr: &str) -> Self {
        self.cluster.network_cidr = Some(cidr.to_string());
        self
    }

    pub fn zone(mut self, name: &str, cidr: &str) -> Self {
        self.cluster.zones.push(ClusterZone {
            name: name.to_string(),
            cidr: Some(cidr.to_string()),
        });
        self
    }

    pub fn zone_without_cidr(mut self, name: &str) -> Self {
        self.cluster.zones.push(ClusterZone {
            name: name.to_string(),
            cidr: None,
        });
        self
    }

    /// Replace any etcd cluster called `name` with one member per zone.
    pub fn etcd(mut self, name: &str, member_zones: &[&str]) -> Self {
        self.cluster.etcd_clusters.retain(|e| e.name != name);
        self.cluster.etcd_clusters.push(EtcdCluster {
            name: name.to_string(),
            members: member_zones
                .iter()
                .map(|zone| EtcdMember {
                    name: zone.rsplit('-').next().unwrap_or(zone).to_string(),
                    zone: zone.to_string(),
                })
                .collect(),
        });
        self
    }

    pub fn build(self) -> Cluster {
        self.cluster
    }
}

/// Builder for `InstanceGroup`.
pub struct InstanceGroupBuilder {
    group: InstanceGroup,
}

impl InstanceGroupBuilder {
    pub fn new(name: &str, role: InstanceGroupRole) -> Self {
        Self {
            group: InstanceGroup {
                name: name.to_string(),
                role,
                zones: vec![],
                image: "ami-12345678".to_string(),
                machine_type: "t2.medium".to_string(),
                min_size: 1,
                max_size: 1,
            },
        }
    }

    pub fn master(zone: &str) -> Self {
        Self::new(&format!("master-{zone}"), InstanceGroupRole::Master).zone(zone)
    }

    pub fn node(zone: &str) -> Self {
        Self::new("nodes", InstanceGroupRole::Node).zone(zone)
    }

    pub fn zone(mut self, zone: &str) -> Self {
        self.group.zones.push(zone.to_string());
        self
    }

    pub fn size(mut self, min: u32, max: u32) -> Self {
        self.group.min_size = min;
        self.group.max_size = max;
        self
    }

    pub fn machine_type(mut self, machine_type: &str) -> Self {
        self.group.machine_type = machine_type.to_string();
        self
    }

    pub fn build(self) -> InstanceGroup {
        self.group
    }
}

/// Builder for `ConfigFile` to simplify test setup.
///
/// Starts from the default cluster with an inline test key and no instance
/// groups.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile {
                config: ConfigSection::default(),
                cluster: ClusterBuilder::default_cluster().build(),
                ssh_key: Some(SshKeySection {
                    name: None,
                    public_key: Some(TEST_PUBLIC_KEY.to_string()),
                    public_key_file: None,
                }),
                instance_groups: vec![],
            },
        }
    }

    pub fn cluster(mut self, cluster: Cluster) -> Self {
        self.config.cluster = cluster;
        self
    }

    pub fn group(mut self, group: InstanceGroup) -> Self {
        self.config.instance_groups.push(group);
        self
    }

    pub fn target(mut self, target: TargetKind) -> Self {
        self.config.config.target = target;
        self
    }

    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.config.config.concurrency = concurrency;
        self
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.config.config.strict = strict;
        self
    }

    pub fn ssh_key(mut self, section: Option<SshKeySection>) -> Self {
        self.config.ssh_key = section;
        self
    }

    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}
