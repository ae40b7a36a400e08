use anyhow::{Context as AnyhowContext, Result};
use std::path::{Path, PathBuf};

use super::environment::{self, Sides};
use crate::config::MigrationConfig;
use crate::context::Context;
use crate::migration::CancellationFlag;

pub struct ImportCommand;

impl ImportCommand {
    /// Import a snapshot, or resume from a progress document
    pub async fn execute(ctx: &Context, config: &MigrationConfig, cancel: &CancellationFlag) -> Result<PathBuf> {
        let metadata_file = config
            .import_metadata_file
            .as_deref()
            .context("An import metadata file is required (import_metadata_file)")?;

        ctx.output.section(if config.resume_import {
            "Resume Import"
        } else {
            "Import Data Center"
        });
        environment::describe(ctx, config);
        ctx.output.key_value("Metadata", &metadata_file.display().to_string());
        config.require_locations()?;

        let manager = environment::manager(ctx, config, Sides::Both, cancel)?;
        let progress = manager
            .import(metadata_file)
            .await
            .with_context(|| format!("Import of {} failed", metadata_file.display()))?;

        report_completed(ctx, &progress);
        Ok(progress)
    }
}

pub(super) fn report_completed(ctx: &Context, progress: &Path) {
    ctx.output.success("Import completed");
    ctx.output.path(&progress.display().to_string());
}
