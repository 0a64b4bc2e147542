// src/cloud/mod.rs

//! Cloud collaborator contract.
//!
//! Every discover operation answers [`Lookup::Found`], [`Lookup::NotFound`]
//! or an error. A lookup by name that matches more than one resource is an
//! error, never an arbitrary pick.

pub mod memory;

use std::collections::BTreeMap;
use std::fmt;

use anyhow::Result;

use crate::task::BoxFuture;

pub use memory::MemoryCloud;

/// Tag carrying a resource's name.
pub const NAME_TAG: &str = "Name";

/// Outcome of a discover call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup<T> {
    Found(T),
    NotFound,
}

impl<T> Lookup<T> {
    pub fn into_option(self) -> Option<T> {
        match self {
            Lookup::Found(value) => Some(value),
            Lookup::NotFound => None,
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, Lookup::Found(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPairInfo {
    pub name: String,
    pub fingerprint: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VpcInfo {
    pub id: String,
    pub cidr: String,
    pub enable_dns_hostnames: bool,
    pub tags: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubnetInfo {
    pub id: String,
    pub vpc_id: String,
    pub cidr: String,
    pub availability_zone: String,
    pub tags: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceInfo {
    pub id: String,
    pub image_id: String,
    pub instance_type: String,
    pub subnet_id: Option<String>,
    pub key_name: Option<String>,
    pub tags: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunInstanceRequest {
    pub image_id: String,
    pub instance_type: String,
    pub subnet_id: Option<String>,
    pub key_name: Option<String>,
    pub user_data: Option<Vec<u8>>,
}

/// Discover and mutate operations for the resource kinds this crate manages.
pub trait Cloud: Send + Sync + fmt::Debug {
    fn region(&self) -> &str;

    fn describe_key_pair<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<Lookup<KeyPairInfo>>>;

    /// Import a public key; the cloud computes and returns its fingerprint.
    fn import_key_pair<'a>(
        &'a self,
        name: &'a str,
        public_key: &'a [u8],
    ) -> BoxFuture<'a, Result<KeyPairInfo>>;

    fn find_vpc<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<Lookup<VpcInfo>>>;

    fn create_vpc<'a>(&'a self, cidr: &'a str) -> BoxFuture<'a, Result<VpcInfo>>;

    fn set_vpc_dns_hostnames<'a>(&'a self, vpc_id: &'a str, enabled: bool) -> BoxFuture<'a, Result<()>>;

    fn find_subnet<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<Lookup<SubnetInfo>>>;

    fn create_subnet<'a>(
        &'a self,
        vpc_id: &'a str,
        cidr: &'a str,
        availability_zone: &'a str,
    ) -> BoxFuture<'a, Result<SubnetInfo>>;

    fn find_instance<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<Lookup<InstanceInfo>>>;

    fn run_instance<'a>(&'a self, request: &'a RunInstanceRequest) -> BoxFuture<'a, Result<InstanceInfo>>;

    /// Add or overwrite tags on any resource.
    fn create_tags<'a>(
        &'a self,
        resource_id: &'a str,
        tags: &'a BTreeMap<String, String>,
    ) -> BoxFuture<'a, Result<()>>;
}

/// Pick the single element of `matches`, or fail if there is more than one.
pub(crate) fn single<T>(kind: &str, name: &str, mut matches: Vec<T>) -> Result<Lookup<T>> {
    match matches.len() {
        0 => Ok(Lookup::NotFound),
        1 => Ok(matches.pop().map_or(Lookup::NotFound, Lookup::Found)),
        n => anyhow::bail!("found {n} {kind}s with {NAME_TAG}={name}"),
    }
}
