// src/validation.rs

//! Deep validation of a cluster description.
//!
//! Every violation is collected and reported together.

use std::collections::BTreeSet;

use tracing::debug;

use crate::cluster::{Cluster, InstanceGroup, InstanceGroupRole};
use crate::errors::{ConvergeError, Result};

pub const NO_MASTER_GROUP: &str = "must configure at least one Master InstanceGroup";
pub const NO_NODE_GROUP: &str = "must configure at least one Node InstanceGroup";
pub const ETCD_QUORUM: &str = "There should be an odd number of master-zones, for etcd's quorum.  Hint: Use --zones and --master-zones to declare node zones and master zones separately.";

/// Check a cluster and its instance groups for consistency.
///
/// With `strict` set, every zone an instance group or etcd member uses must
/// be one of the cluster's zones.
pub fn deep_validate(cluster: &Cluster, groups: &[InstanceGroup], strict: bool) -> Result<()> {
    let mut violations = Vec::new();

    if !groups.iter().any(|g| g.role == InstanceGroupRole::Master) {
        violations.push(NO_MASTER_GROUP.to_string());
    }
    if !groups.iter().any(|g| g.role == InstanceGroupRole::Node) {
        violations.push(NO_NODE_GROUP.to_string());
    }

    let mut zones = BTreeSet::new();
    for zone in &cluster.zones {
        if !zones.insert(zone.name.as_str()) {
            violations.push(format!("Zones contained a duplicate value: {}", zone.name));
        }
    }

    for group in groups {
        if group.min_size > group.max_size {
            violations.push(format!(
                "InstanceGroup {:?} has min_size {} greater than max_size {}",
                group.name, group.min_size, group.max_size
            ));
        }
        if strict {
            for zone in &group.zones {
                if !zones.contains(zone.as_str()) {
                    violations.push(format!(
                        "InstanceGroup {:?} is configured in {:?}, but this is not configured as a Zone in the cluster",
                        group.name, zone
                    ));
                }
            }
        }
    }

    for etcd in &cluster.etcd_clusters {
        if etcd.members.is_empty() {
            violations.push(format!(
                "etcd cluster {:?} must have at least one member",
                etcd.name
            ));
        } else if etcd.members.len() % 2 == 0 {
            violations.push(ETCD_QUORUM.to_string());
        }
        if strict {
            for member in &etcd.members {
                if !zones.contains(member.zone.as_str()) {
                    violations.push(format!(
                        "etcd member {:?} of cluster {:?} is in {:?}, but this is not configured as a Zone in the cluster",
                        member.name, etcd.name, member.zone
                    ));
                }
            }
        }
    }

    if violations.is_empty() {
        debug!(cluster = %cluster.name, groups = groups.len(), strict, "cluster validated");
        Ok(())
    } else {
        Err(ConvergeError::Validation(violations))
    }
}
