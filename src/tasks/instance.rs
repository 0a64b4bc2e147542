// src/tasks/instance.rs

use std::collections::BTreeMap;

use anyhow::{anyhow, Context as _};
use serde::Serialize;
use tracing::debug;

use crate::cloud::{Lookup, RunInstanceRequest, NAME_TAG};
use crate::engine::Context;
use crate::errors::{ConvergeError, Result};
use crate::impl_walk;
use crate::target::{sanitize_tf_name, ApiTarget, Literal, TerraformTarget};
use crate::task::{
    default_delta_run, reject_immutable, Apply, BoxFuture, ChangeError, Changes, Differ,
    Renderers, ResourceHolder, Task, TaskCell, TaskMap, TaskRef,
};
use crate::tasks::sshkey::SshKey;
use crate::tasks::subnet::Subnet;
use crate::types::RunOutcome;

const TF_TYPE: &str = "aws_instance";

/// Tag recording the fingerprint of the user data an instance was launched
/// with; user data itself cannot be read back.
pub const USER_DATA_TAG: &str = "converge/user-data-fingerprint";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Instance {
    pub name: Option<String>,
    pub id: Option<String>,
    pub subnet: Option<TaskRef<Subnet>>,
    pub ssh_key: Option<TaskRef<SshKey>>,
    pub image_id: Option<String>,
    pub instance_type: Option<String>,
    pub user_data: Option<ResourceHolder>,
    pub user_data_fingerprint: Option<String>,
    pub tags: BTreeMap<String, String>,
}

impl_walk!(Instance {
    name,
    id,
    subnet,
    ssh_key,
    image_id,
    instance_type,
    user_data,
    user_data_fingerprint,
    tags
});

fn resolve_subnet_id(tasks: &TaskMap, subnet: &TaskRef<Subnet>) -> anyhow::Result<Option<String>> {
    Ok(tasks.get(subnet)?.expected().id)
}

fn resolve_key_name(tasks: &TaskMap, key: &TaskRef<SshKey>) -> anyhow::Result<Option<String>> {
    Ok(tasks.get(key)?.expected().name)
}

impl Instance {
    fn name(&self) -> anyhow::Result<&str> {
        self.name
            .as_deref()
            .ok_or_else(|| anyhow!("{} has no name", Self::KIND))
    }

    pub fn terraform_name(&self) -> anyhow::Result<String> {
        Ok(sanitize_tf_name(self.name()?))
    }

    fn compute_user_data_fingerprint(&mut self) -> anyhow::Result<()> {
        if self.user_data_fingerprint.is_none() {
            if let Some(user_data) = &self.user_data {
                self.user_data_fingerprint = Some(user_data.fingerprint()?);
            }
        }
        Ok(())
    }

    fn cloud_tags(&self) -> anyhow::Result<BTreeMap<String, String>> {
        let mut tags = self.tags.clone();
        tags.insert(NAME_TAG.to_string(), self.name()?.to_string());
        if let Some(fingerprint) = &self.user_data_fingerprint {
            tags.insert(USER_DATA_TAG.to_string(), fingerprint.clone());
        }
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
                    .ok_or_else(|| anyhow!("discovered instance has no id"))?,
                None => {
                    let subnet_id = match &e.subnet {
                        Some(subnet) => Some(
                            resolve_subnet_id(op.tasks, subnet)?
                                .ok_or_else(|| anyhow!("subnet {} has no id yet", subnet.key()))?,
                        ),
                        None => None,
                    };
                    let key_name = match &e.ssh_key {
                        Some(key) => resolve_key_name(op.tasks, key)?,
                        None => None,
                    };
                    let user_data = match &e.user_data {
                        Some(holder) => Some(holder.as_bytes()?.to_vec()),
                        None => None,
                    };
                    let request = RunInstanceRequest {
                        image_id: e
                            .image_id
                            .clone()
                            .ok_or_else(|| anyhow!("instance {:?} needs an image", e.name))?,
                        instance_type: e
                            .instance_type
                            .clone()
                            .ok_or_else(|| anyhow!("instance {:?} needs an instance type", e.name))?,
                        subnet_id,
                        key_name,
                        user_data,
                    };
                    debug!(name = ?e.name, image = %request.image_id, "launching instance");
                    cloud
                        .run_instance(&request)
                        .await
                        .context("error launching instance")?
                        .id
                }
            };
            e.id = Some(id.clone());

            if op.actual.is_none() || op.changes.contains("tags") || op.changes.contains("name") {
                cloud
                    .create_tags(&id, &e.cloud_tags()?)
                    .await
                    .context("error tagging instance")?;
            }
            Ok(())
        })
    }

    fn render_terraform(target: &TerraformTarget, op: Apply<'_, Self>) -> anyhow::Result<()> {
        #[derive(Serialize)]
        struct TfInstance {
            ami: Option<String>,
            instance_type: Option<String>,
            #[serde(skip_serializing_if = "Option::is_none")]
            subnet_id: Option<Literal>,
            #[serde(skip_serializing_if = "Option::is_none")]
            key_name: Option<Literal>,
            #[serde(skip_serializing_if = "Option::is_none")]
            user_data: Option<Literal>,
            tags: BTreeMap<String, String>,
        }

        let e = &op.expected;
        let tf_name = e.terraform_name()?;
        let subnet_id = match &e.subnet {
            Some(subnet) => Some(op.tasks.get(subnet)?.expected().terraform_link()?),
            None => None,
        };
        let key_name = match &e.ssh_key {
            Some(key) => Some(op.tasks.get(key)?.expected().terraform_link()?),
            None => None,
        };
        let user_data = match &e.user_data {
            Some(holder) => Some(target.add_file(TF_TYPE, &tf_name, "user_data", holder)?),
            None => None,
        };
        target.render_resource(
            TF_TYPE,
            &tf_name,
            &TfInstance {
                ami: e.image_id.clone(),
                instance_type: e.instance_type.clone(),
                subnet_id,
                key_name,
                user_data,
                tags: e.cloud_tags()?,
            },
        )
    }
}

impl Task for Instance {
    const KIND: &'static str = "Instance";

    fn identity(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn find<'a>(&'a self, ctx: &'a Context) -> BoxFuture<'a, anyhow::Result<Option<Self>>> {
        Box::pin(async move {
            let name = self.name()?;
            let instance = match ctx
                .cloud()?
                .find_instance(name)
                .await
                .context("error listing instances")?
            {
                Lookup::Found(instance) => instance,
                Lookup::NotFound => return Ok(None),
            };

            let subnet = match &self.subnet {
                Some(subnet)
                    if instance.subnet_id.is_some()
                        && resolve_subnet_id(ctx.tasks(), subnet)? == instance.subnet_id =>
                {
                    Some(subnet.clone())
                }
                _ => None,
            };
            let ssh_key = match &self.ssh_key {
                Some(key)
                    if instance.key_name.is_some()
                        && resolve_key_name(ctx.tasks(), key)? == instance.key_name =>
                {
                    Some(key.clone())
                }
                _ => None,
            };

            let mut tags = instance.tags;
            let found_name = tags.remove(NAME_TAG);
            let user_data_fingerprint = tags.remove(USER_DATA_TAG);
            let user_data = if user_data_fingerprint.is_some()
                && user_data_fingerprint == self.user_data_fingerprint
            {
                self.user_data.clone()
            } else {
                None
            };

            Ok(Some(Instance {
                name: found_name,
                id: Some(instance.id),
                subnet,
                ssh_key,
                image_id: Some(instance.image_id),
                instance_type: Some(instance.instance_type),
                user_data,
                user_data_fingerprint,
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
            .field("subnet", &actual.subnet, &expected.subnet)
            .field("ssh_key", &actual.ssh_key, &expected.ssh_key)
            .field("image_id", &actual.image_id, &expected.image_id)
            .field("instance_type", &actual.instance_type, &expected.instance_type)
            .field("user_data", &actual.user_data, &expected.user_data)
            .field(
                "user_data_fingerprint",
                &actual.user_data_fingerprint,
                &expected.user_data_fingerprint,
            )
            .value("tags", &actual.tags, &expected.tags);
    }

    fn check_changes(
        actual: Option<&Self>,
        _expected: &Self,
        changes: &Changes,
    ) -> std::result::Result<(), ChangeError> {
        reject_immutable(
            actual,
            changes,
            &[
                "id",
                "subnet",
                "ssh_key",
                "image_id",
                "instance_type",
                "user_data",
                "user_data_fingerprint",
            ],
        )
    }

    fn run<'a>(cell: &'a TaskCell<Self>, ctx: &'a Context) -> BoxFuture<'a, Result<RunOutcome>> {
        Box::pin(async move {
            cell.update(Instance::compute_user_data_fingerprint)
                .map_err(|error| ConvergeError::Apply {
                    task: cell.key().to_string(),
                    error,
                })?;
            default_delta_run(cell, ctx).await
        })
    }

    fn renderers() -> Renderers<Self> {
        Renderers::new()
            .api(Self::render_api)
            .terraform(Self::render_terraform)
    }
}
