//! Data center migration
//!
//! Moves every resource a subscription holds in one location to another
//! location of a (possibly different) subscription:
//!
//! - Export a location's resource graph into a snapshot document
//! - Derive destination names for every resource and persist them as a mapping
//! - Import the snapshot tier by tier, recording progress so that an interrupted
//!   run resumes where it stopped
//! - Roll back everything an import created
//!
//! # Usage
//!
//! ```bash
//! # Export, then import in one run
//! dcmigrate migrate --config migration.yaml
//!
//! # Resume an interrupted import
//! dcmigrate import --config migration.yaml --resume "West US-03-07-2024-09-05_ImportStatus.json"
//!
//! # Remove what an import created
//! dcmigrate rollback --config migration.yaml "West US-03-07-2024-09-05_ImportStatus.json"
//! ```
//!
//! # Import tiers
//!
//! 1. Affinity groups
//! 2. Storage accounts
//! 3. Disk blobs (source machines are stopped first)
//! 4. Virtual network configuration (merged into the destination's)
//! 5. Cloud services, deployments and virtual machines
//!
//! Rollback walks the tiers in reverse.

pub mod blobs;
pub mod error;
pub mod exporter;
pub mod importer;
pub mod manager;
pub mod model;
pub mod names;
pub mod network;
pub mod parallel;
pub mod progress;
pub mod rename;
pub mod reporter;
pub mod resource_type;
pub mod retry;
pub mod rollback;
pub mod validation;

pub use error::MigrationError;
pub use manager::{MigrationManager, MigrationOptions};
pub use parallel::CancellationFlag;
pub use resource_type::NameLimits;
pub use retry::RetryPolicy;
pub use rollback::RollbackResult;
