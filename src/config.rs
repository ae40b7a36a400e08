//! Migration configuration file
//!
//! ```yaml
//! subscription: contoso
//! source:
//!   subscription_id: 00000000-0000-0000-0000-000000000001
//!   location: West US
//!   sandbox: ./source.json
//! destination:
//!   subscription_id: 00000000-0000-0000-0000-000000000002
//!   location: North Europe
//!   sandbox: ./destination.json
//! metadata_folder: ./metadata
//! destination_prefix: dc
//! rollback_on_failure: true
//! retry:
//!   retry_count: 5
//!   min_backoff: 3
//! name_limits:
//!   StorageAccount: 20
//! ```
//!
//! Durations are whole seconds.

use anyhow::{Context as AnyhowContext, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::migration::{MigrationError, MigrationOptions, NameLimits, RetryPolicy};
use crate::traits::FileSystem;

/// Configuration file looked up in the working directory
pub const CONFIG_FILE_NAME: &str = "dcmigrate.yaml";

/// `./dcmigrate.yaml`, else `{config dir}/dcmigrate/config.yaml` when present
pub fn default_config_path(fs: &dyn FileSystem) -> PathBuf {
    let local = PathBuf::from(CONFIG_FILE_NAME);
    if fs.exists(&local) {
        return local;
    }
    dirs::config_dir()
        .map(|dir| dir.join("dcmigrate").join("config.yaml"))
        .filter(|path| fs.exists(path))
        .unwrap_or(local)
}

/// One side of the migration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentConfig {
    #[serde(default)]
    pub subscription_id: String,

    #[serde(default)]
    pub location: String,

    /// State document of the simulated environment
    #[serde(default)]
    pub sandbox: Option<PathBuf>,
}

/// Retry settings, durations in seconds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,

    #[serde(default = "default_min_backoff")]
    pub min_backoff: u64,

    #[serde(default = "default_max_backoff")]
    pub max_backoff: u64,

    #[serde(default = "default_delta_backoff")]
    pub delta_backoff: u64,

    #[serde(default)]
    pub operation_timeout: Option<u64>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            retry_count: default_retry_count(),
            min_backoff: default_min_backoff(),
            max_backoff: default_max_backoff(),
            delta_backoff: default_delta_backoff(),
            operation_timeout: None,
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            retry_count: self.retry_count,
            min_backoff: Duration::from_secs(self.min_backoff),
            max_backoff: Duration::from_secs(self.max_backoff),
            delta_backoff: Duration::from_secs(self.delta_backoff),
            operation_timeout: self.operation_timeout.map(Duration::from_secs),
        }
    }
}

/// Every parameter of an export, import, migrate or rollback run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationConfig {
    /// Name recorded in exported snapshots
    #[serde(default)]
    pub subscription: String,

    #[serde(default)]
    pub source: EnvironmentConfig,

    #[serde(default)]
    pub destination: EnvironmentConfig,

    #[serde(default = "default_metadata_folder")]
    pub metadata_folder: PathBuf,

    /// Snapshot to import, or the progress document when resuming
    #[serde(default)]
    pub import_metadata_file: Option<PathBuf>,

    #[serde(default)]
    pub mapping_file: Option<PathBuf>,

    #[serde(default = "default_prefix")]
    pub destination_prefix: String,

    #[serde(default)]
    pub resume_import: bool,

    #[serde(default)]
    pub rollback_on_failure: bool,

    #[serde(default)]
    pub generate_mapping: bool,

    #[serde(default)]
    pub quiet: bool,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default = "default_copy_poll_interval")]
    pub copy_poll_interval: u64,

    #[serde(default = "default_rollback_cooldown")]
    pub rollback_cooldown: u64,

    #[serde(default = "default_max_parallelism")]
    pub max_parallelism: usize,

    /// Per resource type overrides of the destination name length limits
    #[serde(default = "NameLimits::unlimited")]
    pub name_limits: NameLimits,
}

fn default_retry_count() -> u32 {
    5
}

fn default_min_backoff() -> u64 {
    3
}

fn default_max_backoff() -> u64 {
    90
}

fn default_delta_backoff() -> u64 {
    90
}

fn default_metadata_folder() -> PathBuf {
    PathBuf::from(".")
}

fn default_prefix() -> String {
    "dc".to_string()
}

fn default_copy_poll_interval() -> u64 {
    30
}

fn default_rollback_cooldown() -> u64 {
    60
}

fn default_max_parallelism() -> usize {
    8
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            subscription: String::new(),
            source: EnvironmentConfig::default(),
            destination: EnvironmentConfig::default(),
            metadata_folder: default_metadata_folder(),
            import_metadata_file: None,
            mapping_file: None,
            destination_prefix: default_prefix(),
            resume_import: false,
            rollback_on_failure: false,
            generate_mapping: false,
            quiet: false,
            retry: RetryConfig::default(),
            copy_poll_interval: default_copy_poll_interval(),
            rollback_cooldown: default_rollback_cooldown(),
            max_parallelism: default_max_parallelism(),
            name_limits: NameLimits::unlimited(),
        }
    }
}

/// Command-line values that take precedence over the file
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigOverrides {
    pub source_location: Option<String>,
    pub destination_location: Option<String>,
    pub metadata_folder: Option<PathBuf>,
    pub destination_prefix: Option<String>,
    pub mapping_file: Option<PathBuf>,
    pub import_metadata_file: Option<PathBuf>,
    pub resume_import: bool,
    pub rollback_on_failure: bool,
    pub generate_mapping: bool,
    pub quiet: bool,
}

impl MigrationConfig {
    /// Load a configuration file
    pub fn load(fs: &dyn FileSystem, path: &Path) -> Result<Self> {
        let contents = fs
            .read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let mut config: MigrationConfig = serde_yaml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;
        config.destination_prefix = config.destination_prefix.to_lowercase();
        Ok(config)
    }

    /// Apply command-line overrides; flags can only switch behavior on
    pub fn apply(&mut self, overrides: &ConfigOverrides) {
        if let Some(location) = &overrides.source_location {
            self.source.location = location.clone();
        }
        if let Some(location) = &overrides.destination_location {
            self.destination.location = location.clone();
        }
        if let Some(folder) = &overrides.metadata_folder {
            self.metadata_folder = folder.clone();
        }
        if let Some(prefix) = &overrides.destination_prefix {
            self.destination_prefix = prefix.to_lowercase();
        }
        if let Some(mapping) = &overrides.mapping_file {
            self.mapping_file = Some(mapping.clone());
        }
        if let Some(file) = &overrides.import_metadata_file {
            self.import_metadata_file = Some(file.clone());
        }
        self.resume_import |= overrides.resume_import;
        self.rollback_on_failure |= overrides.rollback_on_failure;
        self.generate_mapping |= overrides.generate_mapping;
        self.quiet |= overrides.quiet;
    }

    /// Check parameter combinations; every problem is reported at once
    pub fn validate(&self) -> std::result::Result<(), MigrationError> {
        let mut errors = Vec::new();

        if self.resume_import && self.import_metadata_file.is_none() {
            errors.push("resume_import requires import_metadata_file".to_string());
        }
        if self.destination_prefix.is_empty()
            || !self.destination_prefix.chars().all(|c| c.is_ascii_alphanumeric())
        {
            errors.push(format!(
                "destination_prefix '{}' must be non-empty and alphanumeric",
                self.destination_prefix
            ));
        }
        if self.retry.retry_count < 1 {
            errors.push("retry.retry_count must be at least 1".to_string());
        }
        if self.retry.min_backoff > self.retry.max_backoff {
            errors.push(format!(
                "retry.min_backoff ({}s) exceeds retry.max_backoff ({}s)",
                self.retry.min_backoff, self.retry.max_backoff
            ));
        }
        if self.max_parallelism == 0 {
            errors.push("max_parallelism must be at least 1".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(MigrationError::Validation(errors))
        }
    }

    /// Locations both environments need for export and import
    pub fn require_locations(&self) -> std::result::Result<(), MigrationError> {
        let mut errors = Vec::new();
        if self.source.location.is_empty() {
            errors.push("source.location is required".to_string());
        }
        if self.destination.location.is_empty() {
            errors.push("destination.location is required".to_string());
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(MigrationError::Validation(errors))
        }
    }

    pub fn options(&self) -> MigrationOptions {
        let subscription_name = if self.subscription.is_empty() {
            self.source.subscription_id.clone()
        } else {
            self.subscription.clone()
        };

        MigrationOptions {
            subscription_name,
            source_location: self.source.location.clone(),
            destination_location: self.destination.location.clone(),
            metadata_folder: self.metadata_folder.clone(),
            destination_prefix: self.destination_prefix.clone(),
            name_limits: NameLimits::default().merged(&self.name_limits),
            mapping_file: self.mapping_file.clone(),
            resume_import: self.resume_import,
            rollback_on_failure: self.rollback_on_failure,
            generate_mapping: self.generate_mapping,
            retry: self.retry.policy(),
            copy_poll_interval: Duration::from_secs(self.copy_poll_interval),
            rollback_cooldown: Duration::from_secs(self.rollback_cooldown),
            max_parallelism: self.max_parallelism,
            quiet: self.quiet,
        }
    }
}
