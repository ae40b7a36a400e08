mod cloud;
mod commands;
mod config;
mod context;
mod migration;
mod output;
#[cfg(test)]
mod test_helpers;
mod traits;

use anyhow::{Context as AnyhowContext, Result};
use clap::{Args, Parser, Subcommand};
use commands::{ExportCommand, ImportCommand, MappingCommand, MigrateCommand, RollbackCommand};
use config::ConfigOverrides;
use context::Context;
use migration::CancellationFlag;
use std::path::PathBuf;
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "dcmigrate")]
#[command(about = "Data center migration - export, import and migrate a subscription's resources between locations", long_about = None)]
#[command(version)]
struct Cli {
    /// Migration configuration file (defaults to ./dcmigrate.yaml)
    #[arg(short, long, global = true, env = "DCMIGRATE_CONFIG")]
    config: Option<PathBuf>,

    /// Diagnostic log filter (e.g. "debug", "dcmigrate=trace"); RUST_LOG wins when set
    #[arg(long, global = true, env = "DCMIGRATE_LOG_LEVEL")]
    log_level: Option<String>,

    #[command(flatten)]
    overrides: OverrideArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct OverrideArgs {
    /// Location to export from
    #[arg(long, global = true, env = "DCMIGRATE_SOURCE_LOCATION")]
    source_location: Option<String>,

    /// Location to import into
    #[arg(long, global = true, env = "DCMIGRATE_DESTINATION_LOCATION")]
    destination_location: Option<String>,

    /// Folder that receives snapshots
    #[arg(long, global = true, env = "DCMIGRATE_METADATA_FOLDER")]
    metadata_folder: Option<PathBuf>,

    /// Prefix of every generated destination name
    #[arg(long, global = true, env = "DCMIGRATE_PREFIX")]
    prefix: Option<String>,

    /// Name mapping document to use (or to write when generating)
    #[arg(long, global = true)]
    mapping_file: Option<PathBuf>,

    /// Roll back created resources when an import fails
    #[arg(long, global = true)]
    rollback_on_failure: bool,

    /// Save the generated name mapping beside the snapshot
    #[arg(long, global = true)]
    generate_mapping: bool,

    /// Only report errors
    #[arg(short, long, global = true)]
    quiet: bool,
}

impl From<OverrideArgs> for ConfigOverrides {
    fn from(args: OverrideArgs) -> Self {
        Self {
            source_location: args.source_location,
            destination_location: args.destination_location,
            metadata_folder: args.metadata_folder,
            destination_prefix: args.prefix,
            mapping_file: args.mapping_file,
            rollback_on_failure: args.rollback_on_failure,
            generate_mapping: args.generate_mapping,
            quiet: args.quiet,
            ..Default::default()
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Export the source location into a snapshot document
    Export,

    /// Import a snapshot into the destination location
    Import {
        /// Snapshot to import (defaults to import_metadata_file from the config)
        metadata_file: Option<PathBuf>,

        /// Treat the file as a progress document and continue where it stopped
        #[arg(long)]
        resume: bool,
    },

    /// Export and import in one run
    Migrate,

    /// Remove every resource an import created
    Rollback {
        /// Progress document of the import
        progress_file: PathBuf,
    },

    /// Generate the destination name mapping of a snapshot
    Mapping {
        /// Snapshot to map
        metadata_file: PathBuf,
    },
}

fn init_tracing(log_level: Option<&str>) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level.unwrap_or("dcmigrate=info")))
        .unwrap_or_else(|_| EnvFilter::new("dcmigrate=info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_level.as_deref());

    let ctx = Context::new();
    let cancel = CancellationFlag::new();
    let handler_flag = cancel.clone();
    ctrlc::set_handler(move || {
        warn!("Interrupt received, stopping after the current unit of work");
        handler_flag.cancel();
    })
    .context("Failed to install the interrupt handler")?;

    let config_path = cli
        .config
        .unwrap_or_else(|| config::default_config_path(&*ctx.fs));
    let mut overrides: ConfigOverrides = cli.overrides.into();
    if let Commands::Import { metadata_file, resume } = &cli.command {
        overrides.import_metadata_file = metadata_file.clone();
        overrides.resume_import = *resume;
    }
    let config = commands::environment::load_config(&ctx, &config_path, &overrides)?;

    match cli.command {
        Commands::Export => {
            ExportCommand::execute(&ctx, &config, &cancel).await?;
        }
        Commands::Import { .. } => {
            ImportCommand::execute(&ctx, &config, &cancel).await?;
        }
        Commands::Migrate => {
            MigrateCommand::execute(&ctx, &config, &cancel).await?;
        }
        Commands::Rollback { progress_file } => {
            RollbackCommand::execute(&ctx, &config, &progress_file).await?;
        }
        Commands::Mapping { metadata_file } => {
            MappingCommand::execute(&ctx, &config, &metadata_file)?;
        }
    }

    Ok(())
}
