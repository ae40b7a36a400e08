//! Integration tests for the dcmigrate CLI
//!
//! These tests run the built binary against file-backed sandbox environments.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Get the path to the dcmigrate binary
fn dcmigrate_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // Remove test executable name
    path.pop(); // Remove deps directory

    path.push("dcmigrate");

    if cfg!(windows) {
        path.set_extension("exe");
    }

    path
}

/// Run dcmigrate in `dir` and return output
fn run_dcmigrate(dir: &Path, args: &[&str]) -> std::process::Output {
    Command::new(dcmigrate_binary())
        .current_dir(dir)
        .env_remove("RUST_LOG")
        .env_remove("DCMIGRATE_CONFIG")
        .args(args)
        .output()
        .expect("Failed to execute dcmigrate")
}

const SOURCE_STATE: &str = r#"{
  "affinity_groups": [
    { "name": "ag1", "location": "West US" }
  ],
  "storage_accounts": [
    { "name": "sa1", "affinity_group": "ag1", "account_type": "Standard_LRS" }
  ],
  "cloud_services": [
    {
      "service": { "service_name": "svc1", "affinity_group": "ag1" },
      "deployments": [
        {
          "slot": "Production",
          "details": {
            "name": "svc1-deployment",
            "roles": [
              {
                "role_name": "vm1",
                "role_type": "PersistentVMRole",
                "role_size": "Small",
                "os_disk": {
                  "disk_name": "vm1-os",
                  "media_link": "https://sa1.blob.core.windows.net/vhds/vm1-os.vhd"
                }
              }
            ],
            "role_instances": [
              { "role_name": "vm1", "instance_status": "ReadyRole" }
            ]
          }
        }
      ]
    }
  ],
  "containers": ["sa1/vhds"],
  "blobs": {
    "sa1/vhds/vm1-os.vhd": { "properties": { "total_bytes": 1024 } }
  }
}"#;

fn write_config(dir: &Path, extra: &str) -> PathBuf {
    fs::write(dir.join("source.json"), SOURCE_STATE).unwrap();
    let config = format!(
        r#"subscription: contoso
source:
  location: West US
  sandbox: {source}
destination:
  location: North Europe
  sandbox: {destination}
metadata_folder: {metadata}
retry:
  retry_count: 2
  min_backoff: 0
  max_backoff: 0
  delta_backoff: 0
copy_poll_interval: 0
rollback_cooldown: 0
{extra}
"#,
        source = dir.join("source.json").display(),
        destination = dir.join("destination.json").display(),
        metadata = dir.join("metadata").display(),
        extra = extra,
    );
    let path = dir.join("dcmigrate.yaml");
    fs::write(&path, config).unwrap();
    path
}

fn files_ending_with(dir: &Path, suffix: &str) -> Vec<PathBuf> {
    fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .filter(|path| path.to_string_lossy().ends_with(suffix))
        .collect()
}

#[test]
fn test_dcmigrate_version() {
    let dir = tempfile::tempdir().unwrap();
    let output = run_dcmigrate(dir.path(), &["--version"]);

    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("dcmigrate"));
}

#[test]
fn test_dcmigrate_help() {
    let dir = tempfile::tempdir().unwrap();
    let output = run_dcmigrate(dir.path(), &["--help"]);

    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Usage:"));
    assert!(stdout.contains("Commands:"));
    for command in ["export", "import", "migrate", "rollback", "mapping"] {
        assert!(stdout.contains(command), "missing {}", command);
    }
}

#[test]
fn test_dcmigrate_import_help() {
    let dir = tempfile::tempdir().unwrap();
    let output = run_dcmigrate(dir.path(), &["import", "--help"]);

    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("--resume"));
    assert!(stdout.contains("--rollback-on-failure"));
}

#[test]
fn test_missing_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let output = run_dcmigrate(dir.path(), &["export"]);

    assert!(!output.status.success());

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Failed to read config file"));
}

#[test]
fn test_invalid_prefix_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), "");
    let output = run_dcmigrate(
        dir.path(),
        &["--config", config.to_str().unwrap(), "--prefix", "d-c", "export"],
    );

    assert!(!output.status.success());

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Invalid configuration"));
    assert!(!dir.path().join("metadata").exists());
}

#[test]
fn test_resume_without_metadata_file_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), "");
    let output = run_dcmigrate(
        dir.path(),
        &["--config", config.to_str().unwrap(), "import", "--resume"],
    );

    assert!(!output.status.success());

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("import_metadata_file"));
}

#[test]
fn test_migrate_and_roll_back_sandbox() {
    let dir = tempfile::tempdir().unwrap();
    write_config(dir.path(), "generate_mapping: true");

    // dcmigrate.yaml in the working directory is picked up without --config
    let output = run_dcmigrate(dir.path(), &["migrate"]);
    assert!(
        output.status.success(),
        "migrate failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let destination = fs::read_to_string(dir.path().join("destination.json")).unwrap();
    assert!(destination.contains("dcag1"));
    assert!(destination.contains("dcsa1/vhds/vm1-os.vhd"));
    assert!(destination.contains("dcsvc1"));

    let source = fs::read_to_string(dir.path().join("source.json")).unwrap();
    assert!(source.contains("StoppedVM"));

    let metadata = dir.path().join("metadata");
    assert_eq!(files_ending_with(&metadata, ".mapping.yaml").len(), 1);
    let progress = files_ending_with(&metadata, "_ImportStatus.json");
    assert_eq!(progress.len(), 1);

    let output = run_dcmigrate(dir.path(), &["rollback", progress[0].to_str().unwrap()]);
    assert!(
        output.status.success(),
        "rollback failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let destination = fs::read_to_string(dir.path().join("destination.json")).unwrap();
    assert!(!destination.contains("dcsvc1"));
    assert!(!destination.contains("dcag1"));
}
