use anyhow::{Context as AnyhowContext, Result};
use std::path::PathBuf;

use super::environment::{self, Sides};
use crate::config::MigrationConfig;
use crate::context::Context;
use crate::migration::CancellationFlag;

pub struct ExportCommand;

impl ExportCommand {
    /// Export the source location into a snapshot document
    pub async fn execute(ctx: &Context, config: &MigrationConfig, cancel: &CancellationFlag) -> Result<PathBuf> {
        ctx.output.section("Export Data Center");
        ctx.output.key_value("Subscription", &config.options().subscription_name);
        ctx.output.key_value("Location", &config.source.location);

        if config.source.location.is_empty() {
            anyhow::bail!("source.location is required for an export");
        }

        let manager = environment::manager(ctx, config, Sides::Both, cancel)?;
        let snapshot = manager.export().await.context("Export failed")?;

        ctx.output.success("Snapshot exported");
        ctx.output.path(&snapshot.display().to_string());
        Ok(snapshot)
    }
}
