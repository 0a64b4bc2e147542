mod common;

use std::fs;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use converge::cli::CliArgs;
use converge::cluster::InstanceGroupRole;
use converge::config::{build_tasks, load_and_validate, load_from_path, ConfigFile};
use converge::errors::ConvergeError;
use converge::fs::mock::MockFileSystem;
use converge::fs::RealFileSystem;
use converge::task::TaskRef;
use converge::tasks::{Instance, Subnet};
use converge::types::TargetKind;
use tempfile::{NamedTempFile, TempDir};

use crate::common::builders::{ClusterBuilder, ConfigFileBuilder, InstanceGroupBuilder};
use crate::common::fixtures::TEST_PUBLIC_KEY;
use crate::common::TestResult;

const CLUSTER_TOML: &str = r#"
[config]
target = "terraform"
region = "eu-west-1"
concurrency = 2

[cluster]
name = "k8s.example.com"

[[cluster.zones]]
name = "eu-west-1a"
cidr = "172.20.32.0/19"

[[cluster.zones]]
name = "eu-west-1b"
cidr = "172.20.64.0/19"

[[cluster.etcd_clusters]]
name = "main"
members = [{ name = "a", zone = "eu-west-1a" }]

[ssh_key]
public_key_file = "id_rsa.pub"

[[instance_groups]]
name = "master-eu-west-1a"
role = "master"
zones = ["eu-west-1a"]
image = "ami-12345678"
machine_type = "m3.medium"

[[instance_groups]]
name = "nodes"
role = "node"
zones = ["eu-west-1a", "eu-west-1b"]
image = "ami-12345678"
machine_type = "t2.medium"
min_size = 3
max_size = 5
"#;

fn write_project(toml: &str) -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("cluster.toml"), toml).unwrap();
    fs::write(dir.path().join("id_rsa.pub"), TEST_PUBLIC_KEY).unwrap();
    dir
}

fn write_config(toml: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "{toml}").unwrap();
    file
}

#[test]
fn full_config_is_parsed() -> TestResult {
    let dir = write_project(CLUSTER_TOML);

    let cfg = load_and_validate(dir.path().join("cluster.toml"))?;

    assert_eq!(cfg.config.target, TargetKind::Terraform);
    assert_eq!(cfg.config.region, "eu-west-1");
    assert_eq!(cfg.config.concurrency, 2);
    assert!(cfg.config.strict);
    assert_eq!(cfg.cluster.zones.len(), 2);
    assert_eq!(cfg.cluster.network_cidr(), "172.20.0.0/16");
    assert_eq!(cfg.instance_groups[0].role, InstanceGroupRole::Master);
    assert_eq!(cfg.instance_groups[0].min_size, 1);
    assert_eq!(cfg.instance_groups[1].max_size, 5);
    Ok(())
}

#[test]
fn defaults_apply_to_missing_config_section() -> TestResult {
    let file = write_config(
        r#"
[cluster]
name = "minimal"

[ssh_key]
public_key = "ssh-rsa AAAA"
"#,
    );

    let raw = load_from_path(file.path())?;

    assert_eq!(raw.config.target, TargetKind::Api);
    assert_eq!(raw.config.region, "us-east-1");
    assert_eq!(raw.config.concurrency, 1);
    assert!(raw.instance_groups.is_empty());
    Ok(())
}

#[test]
fn invalid_target_is_a_toml_error() {
    let file = write_config(
        r#"
[config]
target = "cloudformation"

[cluster]
name = "x"
"#,
    );

    assert!(matches!(
        load_from_path(file.path()),
        Err(ConvergeError::TomlError(_))
    ));
}

#[test]
fn missing_file_is_an_io_error() {
    assert!(matches!(
        load_from_path("/definitely/not/here.toml"),
        Err(ConvergeError::IoError(_))
    ));
}

#[test]
fn zero_concurrency_is_rejected() {
    let raw = ConfigFileBuilder::new()
        .group(InstanceGroupBuilder::master("us-east-1a").build())
        .group(InstanceGroupBuilder::node("us-east-1a").build())
        .concurrency(0)
        .raw();

    match ConfigFile::try_from(raw) {
        Err(ConvergeError::ConfigError(msg)) => assert!(msg.contains("concurrency")),
        other => panic!("Expected ConfigError, got: {:?}", other),
    }
}

#[test]
fn ssh_key_source_is_required() {
    let raw = ConfigFileBuilder::new()
        .group(InstanceGroupBuilder::master("us-east-1a").build())
        .group(InstanceGroupBuilder::node("us-east-1a").build())
        .ssh_key(None)
        .raw();

    assert!(matches!(
        ConfigFile::try_from(raw),
        Err(ConvergeError::ConfigError(_))
    ));
}

#[test]
fn cluster_violations_fail_loading() {
    let dir = write_project(&CLUSTER_TOML.replace("role = \"node\"", "role = \"master\""));

    match load_and_validate(dir.path().join("cluster.toml")) {
        Err(ConvergeError::Validation(violations)) => {
            assert_eq!(violations, vec!["must configure at least one Node InstanceGroup"]);
        }
        other => panic!("Expected Validation error, got: {:?}", other),
    }
}

#[test]
fn tasks_are_built_per_zone_and_group() -> TestResult {
    let dir = write_project(CLUSTER_TOML);
    let cfg = load_and_validate(dir.path().join("cluster.toml"))?;

    let tasks = build_tasks(&cfg, Arc::new(RealFileSystem), dir.path())?;

    let keys: Vec<&str> = tasks.keys().collect();
    assert_eq!(
        keys,
        vec![
            "Instance/master-eu-west-1a-0.k8s.example.com",
            "Instance/nodes-0.k8s.example.com",
            "Instance/nodes-1.k8s.example.com",
            "Instance/nodes-2.k8s.example.com",
            "SSHKey/kubernetes.k8s.example.com",
            "Subnet/eu-west-1a.k8s.example.com",
            "Subnet/eu-west-1b.k8s.example.com",
            "VPC/k8s.example.com",
        ]
    );

    let node = tasks
        .get_by_key::<Instance>("Instance/nodes-1.k8s.example.com")?
        .expected();
    assert_eq!(
        node.subnet,
        Some(TaskRef::<Subnet>::new("Subnet/eu-west-1b.k8s.example.com"))
    );
    assert_eq!(node.instance_type.as_deref(), Some("t2.medium"));
    let user_data = node.user_data.unwrap().as_string()?;
    assert!(user_data.contains("export ZONE=eu-west-1b"));
    assert!(user_data.contains("export INSTANCE_ROLE=node"));
    Ok(())
}

#[test]
fn key_file_is_not_read_while_building() -> TestResult {
    let cfg = ConfigFileBuilder::new()
        .ssh_key(Some(converge::config::SshKeySection {
            name: Some("admin".into()),
            public_key: None,
            public_key_file: Some("keys/admin.pub".into()),
        }))
        .group(InstanceGroupBuilder::master("us-east-1a").build())
        .group(InstanceGroupBuilder::node("us-east-1a").build())
        .build();
    let fs = MockFileSystem::new();

    let tasks = build_tasks(&cfg, Arc::new(fs.clone()), Path::new("/project"))?;

    assert!(tasks.contains_key("SSHKey/admin"));
    assert_eq!(fs.read_count(Path::new("/project/keys/admin.pub")), 0);
    Ok(())
}

#[test]
fn zone_without_cidr_cannot_be_built() {
    let cfg = ConfigFileBuilder::new()
        .cluster(
            ClusterBuilder::new("c")
                .zone_without_cidr("us-east-1a")
                .etcd("main", &["us-east-1a"])
                .build(),
        )
        .group(InstanceGroupBuilder::master("us-east-1a").build())
        .group(InstanceGroupBuilder::node("us-east-1a").build())
        .build();

    match build_tasks(&cfg, Arc::new(MockFileSystem::new()), Path::new(".")) {
        Err(ConvergeError::ConfigError(msg)) => assert!(msg.contains("us-east-1a")),
        other => panic!("Expected ConfigError, got: {:?}", other.map(|t| t.len())),
    }
}

fn cli_args(config: &Path, out: &Path, target: TargetKind) -> CliArgs {
    CliArgs {
        config: config.to_path_buf(),
        target: Some(target),
        out: out.to_path_buf(),
        jobs: None,
        lenient: false,
        skip_validation: false,
        log_level: None,
        dry_run: false,
    }
}

#[tokio::test]
async fn run_writes_terraform_output() -> TestResult {
    let dir = write_project(CLUSTER_TOML);
    let out = dir.path().join("out");

    converge::run(cli_args(
        &dir.path().join("cluster.toml"),
        &out,
        TargetKind::Terraform,
    ))
    .await?;

    let main: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(out.join("main.tf.json"))?)?;
    assert_eq!(main["provider"]["aws"]["region"], "eu-west-1");
    assert_eq!(main["resource"]["aws_instance"].as_object().unwrap().len(), 4);
    assert!(out
        .join("data/aws_key_pair_kubernetes-k8s-example-com_public_key")
        .is_file());
    Ok(())
}

#[tokio::test]
async fn run_converges_against_api_target() -> TestResult {
    let dir = write_project(CLUSTER_TOML);
    let out = dir.path().join("out");

    converge::run(cli_args(&dir.path().join("cluster.toml"), &out, TargetKind::Api)).await?;

    assert!(!out.exists());
    Ok(())
}

#[tokio::test]
async fn dry_run_applies_nothing() -> TestResult {
    let dir = write_project(CLUSTER_TOML);
    let out = dir.path().join("out");
    let mut args = cli_args(&dir.path().join("cluster.toml"), &out, TargetKind::Terraform);
    args.dry_run = true;

    converge::run(args).await?;

    assert!(!out.exists());
    Ok(())
}

#[tokio::test]
async fn skip_validation_lets_an_invalid_cluster_through() -> TestResult {
    let dir = write_project(&CLUSTER_TOML.replace("role = \"node\"", "role = \"master\""));
    let out = dir.path().join("out");
    let mut args = cli_args(&dir.path().join("cluster.toml"), &out, TargetKind::Terraform);

    assert!(converge::run(args.clone()).await.is_err());

    args.skip_validation = true;
    converge::run(args).await?;
    assert!(out.join("main.tf.json").is_file());
    Ok(())
}
