// src/config/build.rs

//! Turn a cluster description into the task set the engine converges.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info};

use crate::cluster::InstanceGroup;
use crate::config::model::ConfigFile;
use crate::errors::{ConvergeError, Result};
use crate::fs::FileSystem;
use crate::task::{task_key, FileResource, ResourceHolder, StringResource, TaskMap, TaskRef};
use crate::tasks::{Instance, SshKey, Subnet, Vpc};

pub const CLUSTER_TAG: &str = "KubernetesCluster";
pub const ROLE_TAG: &str = "k8s.io/role";
pub const GROUP_TAG: &str = "k8s.io/instance-group";

/// Build one `Vpc`, one `Subnet` per cluster zone, the `SshKey`, and
/// `min_size` `Instance`s per instance group spread round-robin over the
/// group's zones.
///
/// A `public_key_file` is resolved against `base_dir` and read through `fs`
/// only when the key body is actually needed.
pub fn build_tasks(cfg: &ConfigFile, fs: Arc<dyn FileSystem>, base_dir: &Path) -> Result<TaskMap> {
    let cluster = &cfg.cluster;
    let mut tasks = TaskMap::new();

    let cluster_tags = BTreeMap::from([(CLUSTER_TAG.to_string(), cluster.name.clone())]);

    let mut vpc = Vpc::new(cluster.name.clone(), cluster.network_cidr());
    vpc.enable_dns_hostnames = Some(true);
    vpc.tags = cluster_tags.clone();
    let vpc_ref = tasks.insert(task_key::<Vpc>(&cluster.name), vpc)?;

    let mut subnets: BTreeMap<&str, TaskRef<Subnet>> = BTreeMap::new();
    for zone in &cluster.zones {
        let cidr = zone.cidr.clone().ok_or_else(|| {
            ConvergeError::ConfigError(format!("zone {:?} has no cidr", zone.name))
        })?;
        let name = format!("{}.{}", zone.name, cluster.name);
        let subnet = Subnet {
            name: Some(name.clone()),
            vpc: Some(vpc_ref.clone()),
            cidr: Some(cidr),
            availability_zone: Some(zone.name.clone()),
            tags: cluster_tags.clone(),
            ..Default::default()
        };
        let subnet_ref = tasks.insert(task_key::<Subnet>(&name), subnet)?;
        subnets.insert(zone.name.as_str(), subnet_ref);
    }

    let key_ref = match &cfg.ssh_key {
        Some(section) => {
            let name = section
                .name
                .clone()
                .unwrap_or_else(|| format!("kubernetes.{}", cluster.name));
            let holder = match (&section.public_key, &section.public_key_file) {
                (Some(inline), _) => ResourceHolder::new("public_key", StringResource(inline.clone())),
                (None, Some(file)) => ResourceHolder::new(
                    file.display().to_string(),
                    FileResource::new(fs.clone(), base_dir.join(file)),
                ),
                (None, None) => {
                    return Err(ConvergeError::ConfigError(
                        "[ssh_key] must set `public_key` or `public_key_file`".to_string(),
                    ));
                }
            };
            Some(tasks.insert(task_key::<SshKey>(&name), SshKey::new(name, holder))?)
        }
        None => None,
    };

    for group in &cfg.instance_groups {
        let zones = group_zones(group, cfg);
        if zones.is_empty() {
            return Err(ConvergeError::ConfigError(format!(
                "instance group {:?} has no zones",
                group.name
            )));
        }
        for index in 0..group.min_size as usize {
            let zone = zones[index % zones.len()];
            let subnet = subnets.get(zone).cloned().ok_or_else(|| {
                ConvergeError::ConfigError(format!(
                    "instance group {:?} uses zone {:?}, which has no subnet",
                    group.name, zone
                ))
            })?;
            let name = format!("{}-{}.{}", group.name, index, cluster.name);

            let mut tags = cluster_tags.clone();
            tags.insert(ROLE_TAG.to_string(), group.role.to_string());
            tags.insert(GROUP_TAG.to_string(), group.name.clone());

            let instance = Instance {
                name: Some(name.clone()),
                subnet: Some(subnet),
                ssh_key: key_ref.clone(),
                image_id: Some(group.image.clone()),
                instance_type: Some(group.machine_type.clone()),
                user_data: Some(ResourceHolder::new(
                    "user_data",
                    StringResource(bootstrap_script(cfg, group, zone)),
                )),
                tags,
                ..Default::default()
            };
            debug!(instance = %name, %zone, group = %group.name, "instance declared");
            tasks.insert(task_key::<Instance>(&name), instance)?;
        }
    }

    info!(cluster = %cluster.name, tasks = tasks.len(), "task set built");
    Ok(tasks)
}

/// The group's zones, or every cluster zone when it names none.
fn group_zones<'a>(group: &'a InstanceGroup, cfg: &'a ConfigFile) -> Vec<&'a str> {
    if group.zones.is_empty() {
        cfg.cluster.zones.iter().map(|z| z.name.as_str()).collect()
    } else {
        group.zones.iter().map(String::as_str).collect()
    }
}

fn bootstrap_script(cfg: &ConfigFile, group: &InstanceGroup, zone: &str) -> String {
    format!(
        "#!/bin/bash\nset -o errexit\nset -o nounset\nset -o pipefail\n\n\
         export CLUSTER_NAME={cluster}\n\
         export INSTANCE_GROUP={group}\n\
         export INSTANCE_ROLE={role}\n\
         export ZONE={zone}\n\
         export REGION={region}\n",
        cluster = cfg.cluster.name,
        group = group.name,
        role = group.role,
        zone = zone,
        region = cfg.config.region,
    )
}
