use anyhow::{Context as AnyhowContext, Result};
use std::path::{Path, PathBuf};

use super::environment::{self, Sides};
use crate::config::MigrationConfig;
use crate::context::Context;
use crate::migration::CancellationFlag;

pub struct MappingCommand;

impl MappingCommand {
    /// Write the destination name mapping of a snapshot without importing it
    pub fn execute(ctx: &Context, config: &MigrationConfig, metadata_file: &Path) -> Result<PathBuf> {
        ctx.output.section("Generate Name Mapping");
        ctx.output.key_value("Metadata", &metadata_file.display().to_string());
        ctx.output.key_value("Prefix", &config.destination_prefix);

        let manager = environment::manager(ctx, config, Sides::Neither, &CancellationFlag::new())?;
        let mapping = manager
            .generate_mapping(metadata_file)
            .with_context(|| format!("Failed to generate the mapping of {}", metadata_file.display()))?;

        ctx.output.success("Name mapping generated");
        ctx.output.path(&mapping.display().to_string());
        Ok(mapping)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::environment::fixtures::*;
    use crate::test_helpers::sample;
    use crate::traits::FileSystem;

    #[test]
    fn test_mapping_beside_snapshot() {
        let f = fixture();
        let snapshot = Path::new("/meta/West US-01-02-2024-03-04.json");
        f.fs.write(snapshot, &serde_json::to_string(&sample().snapshot()).unwrap())
            .unwrap();

        let mapping = MappingCommand::execute(&f.ctx, &config(), snapshot).unwrap();

        assert_eq!(mapping, PathBuf::from("/meta/West US-01-02-2024-03-04.mapping.yaml"));
        let yaml = f.fs.get_file_contents(&mapping).unwrap();
        assert!(yaml.contains("destination_prefix: dc"));
        assert!(yaml.contains("dcsvc1"));
    }

    #[test]
    fn test_mapping_of_malformed_snapshot() {
        let f = fixture();
        let snapshot = Path::new("/meta/broken.json");
        f.fs.write(snapshot, "{ not json").unwrap();

        let err = MappingCommand::execute(&f.ctx, &config(), snapshot).unwrap_err();
        assert!(format!("{:#}", err).contains("document error"));
    }
}
