// src/cloud/memory.rs

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use anyhow::{anyhow, bail, Context as _, Result};
use tracing::debug;

use super::{
    single, Cloud, InstanceInfo, KeyPairInfo, Lookup, RunInstanceRequest, SubnetInfo, VpcInfo,
    NAME_TAG,
};
use crate::task::BoxFuture;
use crate::tasks::fingerprint::compute_aws_fingerprint;

#[derive(Debug, Default)]
struct MemoryState {
    key_pairs: BTreeMap<String, KeyPairInfo>,
    vpcs: BTreeMap<String, VpcInfo>,
    subnets: BTreeMap<String, SubnetInfo>,
    instances: BTreeMap<String, InstanceInfo>,
    user_data: BTreeMap<String, Vec<u8>>,
    next_id: u64,
    mutations: Vec<String>,
    failing: BTreeSet<String>,
}

impl MemoryState {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}-{:08x}", self.next_id)
    }

    fn check(&self, operation: &str) -> Result<()> {
        if self.failing.contains(operation) {
            bail!("injected failure in {operation}");
        }
        Ok(())
    }

    fn record(&mut self, mutation: String) {
        debug!(%mutation, "memory cloud mutation");
        self.mutations.push(mutation);
    }
}

/// In-process cloud used by the CLI's `api` target and by tests.
///
/// Every mutating call is appended to a log, and any operation can be made
/// to fail on demand.
#[derive(Debug)]
pub struct MemoryCloud {
    region: String,
    state: Mutex<MemoryState>,
}

impl MemoryCloud {
    pub fn new(region: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            state: Mutex::new(MemoryState::default()),
        }
    }

    /// Mutating calls so far, e.g. `"create_vpc vpc-00000001"`.
    pub fn mutations(&self) -> Vec<String> {
        self.lock().mutations.clone()
    }

    pub fn clear_mutations(&self) {
        self.lock().mutations.clear();
    }

    /// Make every later call to `operation` (a trait method name) fail.
    pub fn fail_on(&self, operation: &str) {
        self.lock().failing.insert(operation.to_string());
    }

    pub fn clear_failures(&self) {
        self.lock().failing.clear();
    }

    /// Seed an existing key pair.
    pub fn insert_key_pair(&self, name: &str, fingerprint: &str) {
        self.lock().key_pairs.insert(
            name.to_string(),
            KeyPairInfo {
                name: name.to_string(),
                fingerprint: fingerprint.to_string(),
            },
        );
    }

    /// Seed an existing VPC and return its id.
    pub fn insert_vpc(&self, name: &str, cidr: &str) -> String {
        let mut state = self.lock();
        let id = state.next_id("vpc");
        state.vpcs.insert(
            id.clone(),
            VpcInfo {
                id: id.clone(),
                cidr: cidr.to_string(),
                enable_dns_hostnames: false,
                tags: BTreeMap::from([(NAME_TAG.to_string(), name.to_string())]),
            },
        );
        id
    }

    pub fn key_pairs(&self) -> Vec<KeyPairInfo> {
        self.lock().key_pairs.values().cloned().collect()
    }

    pub fn vpcs(&self) -> Vec<VpcInfo> {
        self.lock().vpcs.values().cloned().collect()
    }

    pub fn subnets(&self) -> Vec<SubnetInfo> {
        self.lock().subnets.values().cloned().collect()
    }

    pub fn instances(&self) -> Vec<InstanceInfo> {
        self.lock().instances.values().cloned().collect()
    }

    /// User data an instance was launched with.
    pub fn user_data(&self, instance_id: &str) -> Option<Vec<u8>> {
        self.lock().user_data.get(instance_id).cloned()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn named(tags: &BTreeMap<String, String>, name: &str) -> bool {
    tags.get(NAME_TAG).is_some_and(|n| n == name)
}

impl Cloud for MemoryCloud {
    fn region(&self) -> &str {
        &self.region
    }

    fn describe_key_pair<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<Lookup<KeyPairInfo>>> {
        Box::pin(async move {
            let state = self.lock();
            state.check("describe_key_pair")?;
            Ok(match state.key_pairs.get(name) {
                Some(key) => Lookup::Found(key.clone()),
                None => Lookup::NotFound,
            })
        })
    }

    fn import_key_pair<'a>(
        &'a self,
        name: &'a str,
        public_key: &'a [u8],
    ) -> BoxFuture<'a, Result<KeyPairInfo>> {
        Box::pin(async move {
            let mut state = self.lock();
            state.check("import_key_pair")?;
            if state.key_pairs.contains_key(name) {
                bail!("key pair {name:?} already exists");
            }
            let text = std::str::from_utf8(public_key).context("public key is not UTF-8")?;
            let info = KeyPairInfo {
                name: name.to_string(),
                fingerprint: compute_aws_fingerprint(text)?,
            };
            state.key_pairs.insert(name.to_string(), info.clone());
            state.record(format!("import_key_pair {name}"));
            Ok(info)
        })
    }

    fn find_vpc<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<Lookup<VpcInfo>>> {
        Box::pin(async move {
            let state = self.lock();
            state.check("find_vpc")?;
            let matches = state
                .vpcs
                .values()
                .filter(|v| named(&v.tags, name))
                .cloned()
                .collect();
            single("VPC", name, matches)
        })
    }

    fn create_vpc<'a>(&'a self, cidr: &'a str) -> BoxFuture<'a, Result<VpcInfo>> {
        Box::pin(async move {
            let mut state = self.lock();
            state.check("create_vpc")?;
            let id = state.next_id("vpc");
            let info = VpcInfo {
                id: id.clone(),
                cidr: cidr.to_string(),
                enable_dns_hostnames: false,
                tags: BTreeMap::new(),
            };
            state.vpcs.insert(id.clone(), info.clone());
            state.record(format!("create_vpc {id}"));
            Ok(info)
        })
    }

    fn set_vpc_dns_hostnames<'a>(&'a self, vpc_id: &'a str, enabled: bool) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let mut state = self.lock();
            state.check("set_vpc_dns_hostnames")?;
            let vpc = state
                .vpcs
                .get_mut(vpc_id)
                .ok_or_else(|| anyhow!("VPC {vpc_id} not found"))?;
            vpc.enable_dns_hostnames = enabled;
            state.record(format!("set_vpc_dns_hostnames {vpc_id} {enabled}"));
            Ok(())
        })
    }

    fn find_subnet<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<Lookup<SubnetInfo>>> {
        Box::pin(async move {
            let state = self.lock();
            state.check("find_subnet")?;
            let matches = state
                .subnets
                .values()
                .filter(|s| named(&s.tags, name))
                .cloned()
                .collect();
            single("subnet", name, matches)
        })
    }

    fn create_subnet<'a>(
        &'a self,
        vpc_id: &'a str,
        cidr: &'a str,
        availability_zone: &'a str,
    ) -> BoxFuture<'a, Result<SubnetInfo>> {
        Box::pin(async move {
            let mut state = self.lock();
            state.check("create_subnet")?;
            if !state.vpcs.contains_key(vpc_id) {
                bail!("VPC {vpc_id} not found");
            }
            let id = state.next_id("subnet");
            let info = SubnetInfo {
                id: id.clone(),
                vpc_id: vpc_id.to_string(),
                cidr: cidr.to_string(),
                availability_zone: availability_zone.to_string(),
                tags: BTreeMap::new(),
            };
            state.subnets.insert(id.clone(), info.clone());
            state.record(format!("create_subnet {id}"));
            Ok(info)
        })
    }

    fn find_instance<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<Lookup<InstanceInfo>>> {
        Box::pin(async move {
            let state = self.lock();
            state.check("find_instance")?;
            let matches = state
                .instances
                .values()
                .filter(|i| named(&i.tags, name))
                .cloned()
                .collect();
            single("instance", name, matches)
        })
    }

    fn run_instance<'a>(&'a self, request: &'a RunInstanceRequest) -> BoxFuture<'a, Result<InstanceInfo>> {
        Box::pin(async move {
            let mut state = self.lock();
            state.check("run_instance")?;
            if let Some(subnet_id) = &request.subnet_id {
                if !state.subnets.contains_key(subnet_id) {
                    bail!("subnet {subnet_id} not found");
                }
            }
            if let Some(key_name) = &request.key_name {
                if !state.key_pairs.contains_key(key_name) {
                    bail!("key pair {key_name:?} not found");
                }
            }
            let id = state.next_id("i");
            let info = InstanceInfo {
                id: id.clone(),
                image_id: request.image_id.clone(),
                instance_type: request.instance_type.clone(),
                subnet_id: request.subnet_id.clone(),
                key_name: request.key_name.clone(),
                tags: BTreeMap::new(),
            };
            state.instances.insert(id.clone(), info.clone());
            if let Some(user_data) = &request.user_data {
                state.user_data.insert(id.clone(), user_data.clone());
            }
            state.record(format!("run_instance {id}"));
            Ok(info)
        })
    }

    fn create_tags<'a>(
        &'a self,
        resource_id: &'a str,
        tags: &'a BTreeMap<String, String>,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let mut state = self.lock();
            state.check("create_tags")?;
            let MemoryState {
                vpcs,
                subnets,
                instances,
                ..
            } = &mut *state;
            let target = vpcs
                .get_mut(resource_id)
                .map(|v| &mut v.tags)
                .or_else(|| subnets.get_mut(resource_id).map(|s| &mut s.tags))
                .or_else(|| instances.get_mut(resource_id).map(|i| &mut i.tags))
                .ok_or_else(|| anyhow!("resource {resource_id} not found"))?;
            target.extend(tags.iter().map(|(k, v)| (k.clone(), v.clone())));
            state.record(format!("create_tags {resource_id}"));
            Ok(())
        })
    }
}
