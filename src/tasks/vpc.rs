// src/tasks/vpc.rs

use std::collections::BTreeMap;

use anyhow::{anyhow, Context as _};
use serde::Serialize;
use tracing::debug;

use crate::cloud::{Lookup, NAME_TAG};
use crate::engine::Context;
use crate::impl_walk;
use crate::target::{sanitize_tf_name, ApiTarget, Literal, TerraformTarget};
use crate::task::{
    reject_immutable, Apply, BoxFuture, ChangeError, Changes, Differ, Renderers, Task,
};

const TF_TYPE: &str = "aws_vpc";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Vpc {
    pub name: Option<String>,
    /// Assigned by the cloud.
    pub id: Option<String>,
    pub cidr: Option<String>,
    pub enable_dns_hostnames: Option<bool>,
    pub tags: BTreeMap<String, String>,
}

impl_walk!(Vpc {
    name,
    id,
    cidr,
    enable_dns_hostnames,
    tags
});

impl Vpc {
    pub fn new(name: impl Into<String>, cidr: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            cidr: Some(cidr.into()),
            ..Default::default()
        }
    }

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

    /// User tags plus the name tag.
    pub(crate) fn cloud_tags(&self) -> anyhow::Result<BTreeMap<String, String>> {
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
                    .ok_or_else(|| anyhow!("discovered VPC has no id"))?,
                None => {
                    let cidr = e
                        .cidr
                        .as_deref()
                        .ok_or_else(|| anyhow!("VPC {:?} needs a CIDR to be created", e.name))?;
                    debug!(name = ?e.name, %cidr, "creating VPC");
                    let created = cloud.create_vpc(cidr).await.context("error creating VPC")?;
                    created.id
                }
            };
            e.id = Some(id.clone());

            if op.changes.contains("enable_dns_hostnames") {
                let enabled = e.enable_dns_hostnames.unwrap_or(false);
                cloud
                    .set_vpc_dns_hostnames(&id, enabled)
                    .await
                    .context("error modifying VPC attribute")?;
            }
            if op.changes.contains("tags") || op.changes.contains("name") {
                cloud
                    .create_tags(&id, &e.cloud_tags()?)
                    .await
                    .context("error tagging VPC")?;
            }
            Ok(())
        })
    }

    fn render_terraform(target: &TerraformTarget, op: Apply<'_, Self>) -> anyhow::Result<()> {
        #[derive(Serialize)]
        struct TfVpc {
            cidr_block: Option<String>,
            #[serde(skip_serializing_if = "Option::is_none")]
            enable_dns_hostnames: Option<bool>,
            tags: BTreeMap<String, String>,
        }

        let e = &op.expected;
        target.render_resource(
            TF_TYPE,
            &e.terraform_name()?,
            &TfVpc {
                cidr_block: e.cidr.clone(),
                enable_dns_hostnames: e.enable_dns_hostnames,
                tags: e.cloud_tags()?,
            },
        )
    }
}

impl Task for Vpc {
    const KIND: &'static str = "VPC";

    fn identity(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn find<'a>(&'a self, ctx: &'a Context) -> BoxFuture<'a, anyhow::Result<Option<Self>>> {
        Box::pin(async move {
            let name = self.name()?;
            let vpc = match ctx.cloud()?.find_vpc(name).await.context("error listing VPCs")? {
                Lookup::Found(vpc) => vpc,
                Lookup::NotFound => return Ok(None),
            };
            let mut tags = vpc.tags;
            let found_name = tags.remove(NAME_TAG);
            Ok(Some(Vpc {
                name: found_name,
                id: Some(vpc.id),
                cidr: Some(vpc.cidr),
                enable_dns_hostnames: Some(vpc.enable_dns_hostnames),
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
            .field("cidr", &actual.cidr, &expected.cidr)
            .field(
                "enable_dns_hostnames",
                &actual.enable_dns_hostnames,
                &expected.enable_dns_hostnames,
            )
            .value("tags", &actual.tags, &expected.tags);
    }

    fn check_changes(
        actual: Option<&Self>,
        _expected: &Self,
        changes: &Changes,
    ) -> std::result::Result<(), ChangeError> {
        reject_immutable(actual, changes, &["id", "cidr"])
    }

    fn renderers() -> Renderers<Self> {
        Renderers::new()
            .api(Self::render_api)
            .terraform(Self::render_terraform)
    }
}
