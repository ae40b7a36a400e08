use anyhow::{Context as AnyhowContext, Result};
use std::path::Path;
use std::sync::Arc;

use crate::cloud::{CloudProvider, SandboxProvider, SandboxState};
use crate::config::{ConfigOverrides, EnvironmentConfig, MigrationConfig};
use crate::context::Context;
use crate::migration::{CancellationFlag, MigrationManager};

/// Load the configuration file, apply command-line overrides and validate
pub fn load_config(ctx: &Context, path: &Path, overrides: &ConfigOverrides) -> Result<MigrationConfig> {
    let mut config = MigrationConfig::load(&*ctx.fs, path)?;
    config.apply(overrides);
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

/// Connect to one side of the migration
pub fn open(ctx: &Context, name: &str, environment: &EnvironmentConfig) -> Result<Arc<dyn CloudProvider>> {
    let path = environment.sandbox.as_ref().with_context(|| {
        format!(
            "No sandbox state file configured for the {} environment ({}.sandbox)",
            name, name
        )
    })?;
    let provider = SandboxProvider::open(name, ctx.fs.clone(), path)
        .with_context(|| format!("Failed to open the {} environment", name))?;
    Ok(Arc::new(provider))
}

/// Stand-in for a side the command never contacts
fn detached(name: &str) -> Arc<dyn CloudProvider> {
    Arc::new(SandboxProvider::new(name, SandboxState::default()))
}

/// Which environments a command talks to
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Sides {
    Both,
    DestinationOnly,
    Neither,
}

pub fn manager(
    ctx: &Context,
    config: &MigrationConfig,
    sides: Sides,
    cancel: &CancellationFlag,
) -> Result<MigrationManager> {
    let (source, destination) = match sides {
        Sides::Both => (
            open(ctx, "source", &config.source)?,
            open(ctx, "destination", &config.destination)?,
        ),
        Sides::DestinationOnly => (detached("source"), open(ctx, "destination", &config.destination)?),
        Sides::Neither => (detached("source"), detached("destination")),
    };

    Ok(MigrationManager::new(
        source,
        destination,
        ctx.fs.clone(),
        ctx.output.clone(),
        config.options(),
    )
    .with_cancellation(cancel.clone()))
}

/// Print the environments of a run
pub fn describe(ctx: &Context, config: &MigrationConfig) {
    ctx.output.key_value("Subscription", &config.options().subscription_name);
    ctx.output.key_value("Source", &config.source.location);
    ctx.output.key_value("Destination", &config.destination.location);
    ctx.output.key_value("Prefix", &config.destination_prefix);
}

#[cfg(test)]
pub mod fixtures {
    use std::path::{Path, PathBuf};
    use std::sync::Arc;

    use crate::config::{EnvironmentConfig, MigrationConfig, RetryConfig};
    use crate::context::Context;
    use crate::test_helpers::sample;
    use crate::traits::{FileSystem, MockFileSystem, MockOutput};

    pub const SOURCE_STATE: &str = "/state/source.json";
    pub const DESTINATION_STATE: &str = "/state/destination.json";

    pub struct Fixture {
        pub fs: Arc<MockFileSystem>,
        pub output: Arc<MockOutput>,
        pub ctx: Context,
    }

    /// Context whose file system holds the sample source environment
    pub fn fixture() -> Fixture {
        let fs = Arc::new(MockFileSystem::new());
        let output = Arc::new(MockOutput::new());
        let state = sample().source().snapshot();
        fs.write(Path::new(SOURCE_STATE), &serde_json::to_string_pretty(&state).unwrap())
            .unwrap();
        let ctx = Context::test_with(fs.clone(), output.clone());
        Fixture { fs, output, ctx }
    }

    pub fn config() -> MigrationConfig {
        MigrationConfig {
            subscription: "contoso".to_string(),
            source: EnvironmentConfig {
                subscription_id: "sub-1".to_string(),
                location: "West US".to_string(),
                sandbox: Some(PathBuf::from(SOURCE_STATE)),
            },
            destination: EnvironmentConfig {
                subscription_id: "sub-2".to_string(),
                location: "North Europe".to_string(),
                sandbox: Some(PathBuf::from(DESTINATION_STATE)),
            },
            metadata_folder: PathBuf::from("/meta"),
            retry: RetryConfig {
                retry_count: 2,
                min_backoff: 1,
                max_backoff: 1,
                delta_backoff: 1,
                operation_timeout: None,
            },
            copy_poll_interval: 1,
            rollback_cooldown: 1,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;
    use crate::traits::FileSystem;

    #[test]
    fn test_load_config_applies_overrides_and_validates() {
        let f = fixture();
        f.fs.write(Path::new("/migration.yaml"), "destination_prefix: dc\n")
            .unwrap();

        let config = load_config(
            &f.ctx,
            Path::new("/migration.yaml"),
            &ConfigOverrides {
                destination_prefix: Some("EU".to_string()),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(config.destination_prefix, "eu");

        let err = load_config(
            &f.ctx,
            Path::new("/migration.yaml"),
            &ConfigOverrides {
                destination_prefix: Some("e-u".to_string()),
                ..Default::default()
            },
        )
        .unwrap_err();
        assert!(err.to_string().contains("Invalid configuration"));
    }

    #[test]
    fn test_missing_sandbox_is_reported() {
        let f = fixture();
        let mut config = config();
        config.destination.sandbox = None;

        let err = manager(&f.ctx, &config, Sides::Both, &CancellationFlag::new())
            .err()
            .unwrap();
        assert!(err.to_string().contains("destination.sandbox"));

        assert!(manager(&f.ctx, &config, Sides::Neither, &CancellationFlag::new()).is_ok());
    }
}
