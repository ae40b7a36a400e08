use anyhow::{Context as AnyhowContext, Result};
use std::path::Path;

use super::environment::{self, Sides};
use crate::config::MigrationConfig;
use crate::context::Context;
use crate::migration::{CancellationFlag, RollbackResult};

pub struct RollbackCommand;

impl RollbackCommand {
    /// Remove what the import recorded in `progress_file` created
    pub async fn execute(ctx: &Context, config: &MigrationConfig, progress_file: &Path) -> Result<RollbackResult> {
        ctx.output.section("Roll Back Import");
        ctx.output.key_value("Destination", &config.destination.location);
        ctx.output.key_value("Progress document", &progress_file.display().to_string());

        let manager = environment::manager(ctx, config, Sides::DestinationOnly, &CancellationFlag::new())?;
        let result = manager
            .rollback(progress_file)
            .await
            .with_context(|| format!("Rollback of {} failed", progress_file.display()))?;

        if result.is_complete() {
            ctx.output
                .success(&format!("Removed {} resource(s)", result.removed));
            Ok(result)
        } else {
            for failure in &result.failures {
                ctx.output.error(failure);
            }
            anyhow::bail!(
                "Rollback left {} resource(s) behind; run it again once the destination recovers",
                result.failures.len()
            )
        }
    }
}
