// src/tasks/subnet.rs

use std::collections::BTreeMap;

use anyhow::{anyhow, Context as _};
use serde::Serialize;
use tracing::debug;

use crate::cloud::{Lookup, NAME_TAG};
use crate::engine::Context;
use crate::impl_walk;
use crate::target::{sanitize_tf_name, ApiTarget, Literal, TerraformTarget};
use crate::task::{
    reject_immutable, Apply, BoxFuture, ChangeError, Changes, Differ, Renderers, Task, TaskMap,
    TaskRef,
};
use crate::tasks::vpc::Vpc;

const TF_TYPE: &str = "aws_subnet";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Subnet {
    pub name: Option<String>,
    pub id: Option<String>,
    pub vpc: Option<TaskRef<Vpc>>,
    pub cidr: Option<String>,
    pub availability_zone: Option<String>,
    pub tags: BTreeMap<String, String>,
}

impl_walk!(Subnet {
    name,
    id,
    vpc,
    cidr,
    availability_zone,
    tags
});

/// Cloud id of the referenced VPC, once it is known.
fn resolve_vpc_id(tasks: &TaskMap, vpc: &TaskRef<Vpc>) -> anyhow::Result<Option<String>> {
    Ok(tasks.get(vpc)?.expected().id)
}

impl Subnet {
    fn name(&self) -> anyhow::Result<&str> {
        self.name
            .as_deref()
            .ok_or_else(|| anyhow!("{} has no name", Self::KIND))
    }

    pub fn terraform_name(&self) -> anyhow::Result<String> {
        Ok(sanitize_tf_name(self.name()?))
    }

    pub fn terraform_link(&self) -> anyhow::Result<Literal> {
        Ok(Literal::property(TF_TYPE, &self.terraform_name()?, "id"))
    }

    fn cloud_tags(&self) -> anyhow::Result<BTreeMap<String, String>> {
        let mut tags = self.tags.clone();
        tags.insert(NAME_TAG.to_string(), self.name()?.to_string());
        Ok(tags)
    }

    fn render_api<'a>(target: &'a ApiTarget, op: Apply<'a, Self>) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            let cloud = target.cloud();
            let e = op.expected;

            let id = match op.actual {
                Some(actual) => actual
                    .id
                    .clone()
                    .ok_or_else(|| anyhow!("discovered subnet has no id"))?,
                None => {
                    let vpc = e
                        .vpc
                        .as_ref()
                        .ok_or_else(|| anyhow!("subnet {:?} has no VPC", e.name))?;
                    let vpc_id = resolve_vpc_id(op.tasks, vpc)?
                        .ok_or_else(|| anyhow!("VPC {} has no id yet", vpc.key()))?;
                    let cidr = e
                        .cidr
                        .as_deref()
                        .ok_or_else(|| anyhow!("subnet {:?} needs a CIDR", e.name))?;
                    let zone = e
                        .availability_zone
                        .as_deref()
                        .ok_or_else(|| anyhow!("subnet {:?} needs an availability zone", e.name))?;
                    debug!(name = ?e.name, %vpc_id, %cidr, %zone, "creating subnet");
                    cloud
                        .create_subnet(&vpc_id, cidr, zone)
                        .await
                        .context("error creating subnet")?
                        .id
                }
            };
            e.id = Some(id.clone());

            if op.changes.contains("tags") || op.changes.contains("name") {
                cloud
                    .create_tags(&id, &e.cloud_tags()?)
                    .await
                    .context("error tagging subnet")?;
            }
            Ok(())
        })
    }

    fn render_terraform(target: &TerraformTarget, op: Apply<'_, Self>) -> anyhow::Result<()> {
        #[derive(Serialize)]
        struct TfSubnet {
            vpc_id: Literal,
            cidr_block: Option<String>,
            availability_zone: Option<String>,
            tags: BTreeMap<String, String>,
        }

        let e = &op.expected;
        let vpc = e
            .vpc
            .as_ref()
            .ok_or_else(|| anyhow!("subnet {:?} has no VPC", e.name))?;
        let vpc_id = op.tasks.get(vpc)?.expected().terraform_link()?;
        target.render_resource(
            TF_TYPE,
            &e.terraform_name()?,
            &TfSubnet {
                vpc_id,
                cidr_block: e.cidr.clone(),
                availability_zone: e.availability_zone.clone(),
                tags: e.cloud_tags()?,
            },
        )
    }
}

impl Task for Subnet {
    const KIND: &'static str = "Subnet";

    fn identity(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn find<'a>(&'a self, ctx: &'a Context) -> BoxFuture<'a, anyhow::Result<Option<Self>>> {
        Box::pin(async move {
            let name = self.name()?;
            let subnet = match ctx
                .cloud()?
                .find_subnet(name)
                .await
                .context("error listing subnets")?
            {
                Lookup::Found(subnet) => subnet,
                Lookup::NotFound => return Ok(None),
            };

            // Report the VPC reference only if it points at the same VPC.
            let vpc = match &self.vpc {
                Some(vpc) if resolve_vpc_id(ctx.tasks(), vpc)?.as_deref() == Some(subnet.vpc_id.as_str()) => {
                    Some(vpc.clone())
                }
                _ => None,
            };

            let mut tags = subnet.tags;
            let found_name = tags.remove(NAME_TAG);
            Ok(Some(Subnet {
                name: found_name,
                id: Some(subnet.id),
                vpc,
                cidr: Some(subnet.cidr),
                availability_zone: Some(subnet.availability_zone),
                tags,
            }))
        })
    }

    fn adopt(&mut self, actual: &Self) {
        if self.id.is_none() {
            self.id = actual.id.clone();
        }
    }

    fn diff(actual: &Self, expected: &Self, differ: &mut Differ) {
        differ
            .field("name", &actual.name, &expected.name)
            .field("id", &actual.id, &expected.id)
            .field("vpc", &actual.vpc, &expected.vpc)
            .field("cidr", &actual.cidr, &expected.cidr)
            .field(
                "availability_zone",
                &actual.availability_zone,
                &expected.availability_zone,
            )
            .value("tags", &actual.tags, &expected.tags);
    }

    fn check_changes(
        actual: Option<&Self>,
        _expected: &Self,
        changes: &Changes,
    ) -> std::result::Result<(), ChangeError> {
        reject_immutable(actual, changes, &["id", "vpc", "cidr", "availability_zone"])
    }

    fn renderers() -> Renderers<Self> {
        Renderers::new()
            .api(Self::render_api)
            .terraform(Self::render_terraform)
    }
}
