// src/tasks/sshkey.rs

use anyhow::{anyhow, Context as _};
use serde::Serialize;
use tracing::debug;

use crate::cloud::Lookup;
use crate::engine::Context;
use crate::errors::{ConvergeError, Result};
use crate::impl_walk;
use crate::target::{sanitize_tf_name, ApiTarget, Literal, TerraformTarget};
use crate::task::{
    default_delta_run, reject_immutable, Apply, BoxFuture, ChangeError, Changes, Differ,
    Renderers, ResourceHolder, Task, TaskCell,
};
use crate::tasks::fingerprint::compute_aws_fingerprint;
use crate::types::RunOutcome;

const TF_TYPE: &str = "aws_key_pair";

/// An SSH key pair registered with the cloud.
///
/// The key name is immutable. The fingerprint is derived from the public key
/// when not given, and a matching discovered fingerprint stands in for the
/// key body, so an existing key is never re-read or re-imported.
#[derive(Debug, Clone, Default)]
pub struct SshKey {
    pub name: Option<String>,
    pub public_key: Option<ResourceHolder>,
    pub key_fingerprint: Option<String>,
}

impl_walk!(SshKey {
    name,
    public_key,
    key_fingerprint
});

impl SshKey {
    pub fn new(name: impl Into<String>, public_key: ResourceHolder) -> Self {
        Self {
            name: Some(name.into()),
            public_key: Some(public_key),
            key_fingerprint: None,
        }
    }

    fn name(&self) -> anyhow::Result<&str> {
        self.name
            .as_deref()
            .ok_or_else(|| anyhow!("{} has no name", Self::KIND))
    }

    /// Terraform block name; colons are not allowed there.
    pub fn terraform_name(&self) -> anyhow::Result<String> {
        Ok(sanitize_tf_name(&self.name()?.replace(':', "")))
    }

    /// Reference to the key pair's id in the Terraform output.
    pub fn terraform_link(&self) -> anyhow::Result<Literal> {
        Ok(Literal::property(TF_TYPE, &self.terraform_name()?, "id"))
    }

    fn compute_fingerprint(&mut self) -> anyhow::Result<()> {
        if self.key_fingerprint.is_some() {
            return Ok(());
        }
        if let Some(public_key) = &self.public_key {
            let text = public_key.as_string()?;
            let fingerprint = compute_aws_fingerprint(&text)
                .with_context(|| format!("error computing fingerprint for SSH key {:?}", self.name))?;
            debug!(name = ?self.name, %fingerprint, "computed SSH key fingerprint");
            self.key_fingerprint = Some(fingerprint);
        }
        Ok(())
    }

    fn render_api<'a>(target: &'a ApiTarget, op: Apply<'a, Self>) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            if op.actual.is_some() {
                debug!(name = ?op.expected.name, "SSH key exists; nothing to update");
                return Ok(());
            }
            let name = op.expected.name()?.to_string();
            let public_key = op
                .expected
                .public_key
                .as_ref()
                .ok_or_else(|| anyhow!("SSH key {name:?} does not exist and no public key was given"))?
                .as_bytes()?;
            debug!(%name, "importing SSH key");
            let imported = target
                .cloud()
                .import_key_pair(&name, &public_key)
                .await
                .context("error importing SSH key")?;
            op.expected.key_fingerprint = Some(imported.fingerprint);
            Ok(())
        })
    }

    fn render_terraform(target: &TerraformTarget, op: Apply<'_, Self>) -> anyhow::Result<()> {
        #[derive(Serialize)]
        struct KeyPair {
            key_name: String,
            public_key: Literal,
        }

        let tf_name = op.expected.terraform_name()?;
        let holder = op
            .expected
            .public_key
            .as_ref()
            .ok_or_else(|| anyhow!("terraform needs the public key for {tf_name}"))?;
        let public_key = target.add_file(TF_TYPE, &tf_name, "public_key", holder)?;
        target.render_resource(
            TF_TYPE,
            &tf_name,
            &KeyPair {
                key_name: op.expected.name()?.to_string(),
                public_key,
            },
        )
    }
}

impl Task for SshKey {
    const KIND: &'static str = "SSHKey";

    fn identity(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn find<'a>(&'a self, ctx: &'a Context) -> BoxFuture<'a, anyhow::Result<Option<Self>>> {
        Box::pin(async move {
            let name = self.name()?;
            let key = match ctx
                .cloud()?
                .describe_key_pair(name)
                .await
                .context("error listing SSH keys")?
            {
                Lookup::Found(key) => key,
                Lookup::NotFound => return Ok(None),
            };

            let mut actual = SshKey {
                name: Some(key.name),
                public_key: None,
                key_fingerprint: Some(key.fingerprint),
            };
            if actual.key_fingerprint == self.key_fingerprint {
                debug!(%name, "SSH key fingerprints match; assuming public keys match");
                actual.public_key = self.public_key.clone();
            } else {
                debug!(
                    %name,
                    expected = ?self.key_fingerprint,
                    actual = ?actual.key_fingerprint,
                    "computed SSH key fingerprint mismatch"
                );
            }
            Ok(Some(actual))
        })
    }

    fn adopt(&mut self, actual: &Self) {
        if self.public_key.is_none() && self.key_fingerprint.is_none() {
            self.key_fingerprint = actual.key_fingerprint.clone();
        }
    }

    fn diff(actual: &Self, expected: &Self, differ: &mut Differ) {
        differ
            .field("name", &actual.name, &expected.name)
            .field("public_key", &actual.public_key, &expected.public_key)
            .field("key_fingerprint", &actual.key_fingerprint, &expected.key_fingerprint);
    }

    fn check_changes(
        actual: Option<&Self>,
        _expected: &Self,
        changes: &Changes,
    ) -> std::result::Result<(), ChangeError> {
        reject_immutable(actual, changes, &["name"])?;
        if actual.is_some() && changes.contains("key_fingerprint") {
            return Err(ChangeError::Invalid {
                field: "key_fingerprint",
                reason: "a key pair with this name exists with a different public key".to_string(),
            });
        }
        Ok(())
    }

    fn run<'a>(cell: &'a TaskCell<Self>, ctx: &'a Context) -> BoxFuture<'a, Result<RunOutcome>> {
        Box::pin(async move {
            cell.update(SshKey::compute_fingerprint)
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
