use anyhow::{Context as AnyhowContext, Result};
use std::path::PathBuf;

use super::environment::{self, Sides};
use super::import::report_completed;
use crate::config::MigrationConfig;
use crate::context::Context;
use crate::migration::CancellationFlag;

pub struct MigrateCommand;

impl MigrateCommand {
    /// Export the source location and import the fresh snapshot
    pub async fn execute(ctx: &Context, config: &MigrationConfig, cancel: &CancellationFlag) -> Result<PathBuf> {
        ctx.output.section("Migrate Data Center");
        environment::describe(ctx, config);
        config.require_locations()?;

        let manager = environment::manager(ctx, config, Sides::Both, cancel)?;
        let progress = manager.migrate().await.context("Migration failed")?;

        report_completed(ctx, &progress);
        Ok(progress)
    }
}
