//! Migration orchestrator
//!
//! Owns the two environments, the file system and the progress stream, and
//! sequences the exporter, the import engine and the rollback coordinator.
//! It also decides where documents live:
//!
//! - snapshot: `{metadata_folder}/{location}-{MM-dd-yyyy-HH-mm}.json`
//! - import progress: `{stem}_ImportStatus.json` beside the snapshot
//! - name mapping: `{stem}.mapping.yaml` beside the snapshot, saved with the
//!   first progress write of every import and read back by resume and rollback

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use tracing::{error, info, warn};

use super::error::{MigrationError, Result};
use super::exporter::ResourceExporter;
use super::importer::{ImportEngine, ImportSettings};
use super::model::Subscription;
use super::names::NameRegistry;
use super::parallel::CancellationFlag;
use super::progress::ProgressStore;
use super::reporter::ProgressReporter;
use super::resource_type::NameLimits;
use super::retry::RetryPolicy;
use super::rollback::{RollbackCoordinator, RollbackResult, RollbackSettings};
use crate::cloud::CloudProvider;
use crate::traits::{FileSystem, Output};

/// Suffix of the progress copy written beside an imported snapshot
pub const IMPORT_STATUS_SUFFIX: &str = "_ImportStatus";
/// Extension of generated mapping documents
pub const MAPPING_EXTENSION: &str = "mapping.yaml";

/// Parameters of every migration operation, validated before they get here
#[derive(Debug, Clone, PartialEq)]
pub struct MigrationOptions {
    pub subscription_name: String,
    pub source_location: String,
    pub destination_location: String,
    pub metadata_folder: PathBuf,
    pub destination_prefix: String,
    pub name_limits: NameLimits,
    /// Existing mapping document; its prefix wins over `destination_prefix`
    pub mapping_file: Option<PathBuf>,
    pub resume_import: bool,
    pub rollback_on_failure: bool,
    pub generate_mapping: bool,
    pub retry: RetryPolicy,
    pub copy_poll_interval: Duration,
    pub rollback_cooldown: Duration,
    pub max_parallelism: usize,
    pub quiet: bool,
}

impl Default for MigrationOptions {
    fn default() -> Self {
        Self {
            subscription_name: String::new(),
            source_location: String::new(),
            destination_location: String::new(),
            metadata_folder: PathBuf::from("."),
            destination_prefix: "dc".to_string(),
            name_limits: NameLimits::default(),
            mapping_file: None,
            resume_import: false,
            rollback_on_failure: false,
            generate_mapping: false,
            retry: RetryPolicy::default(),
            copy_poll_interval: Duration::from_secs(30),
            rollback_cooldown: Duration::from_secs(60),
            max_parallelism: 8,
            quiet: false,
        }
    }
}

/// `{location}-{MM-dd-yyyy-HH-mm}.json`
pub fn snapshot_file_name(location: &str, now: chrono::DateTime<Local>) -> String {
    format!("{}-{}.json", location, now.format("%m-%d-%Y-%H-%M"))
}

fn sibling(path: &Path, file_name: String) -> PathBuf {
    match path.parent() {
        Some(parent) => parent.join(file_name),
        None => PathBuf::from(file_name),
    }
}

fn stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Progress copy written for a fresh import of `snapshot`
pub fn progress_path(snapshot: &Path) -> PathBuf {
    sibling(snapshot, format!("{}{}.json", stem(snapshot), IMPORT_STATUS_SUFFIX))
}

/// Mapping document of `document`, a snapshot or its progress copy
pub fn mapping_path(document: &Path) -> PathBuf {
    let stem = stem(document);
    let stem = stem.strip_suffix(IMPORT_STATUS_SUFFIX).unwrap_or(&stem);
    sibling(document, format!("{}.{}", stem, MAPPING_EXTENSION))
}

pub struct MigrationManager {
    source: Arc<dyn CloudProvider>,
    destination: Arc<dyn CloudProvider>,
    fs: Arc<dyn FileSystem>,
    reporter: ProgressReporter,
    options: MigrationOptions,
    cancel: CancellationFlag,
}

impl MigrationManager {
    pub fn new(
        source: Arc<dyn CloudProvider>,
        destination: Arc<dyn CloudProvider>,
        fs: Arc<dyn FileSystem>,
        output: Arc<dyn Output>,
        options: MigrationOptions,
    ) -> Self {
        let reporter = ProgressReporter::new(output, options.quiet);
        Self {
            source,
            destination,
            fs,
            reporter,
            options,
            cancel: CancellationFlag::new(),
        }
    }

    /// Share an externally raised cancellation flag
    pub fn with_cancellation(mut self, cancel: CancellationFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Export the source location and persist the snapshot, returning its path
    pub async fn export(&self) -> Result<PathBuf> {
        if self.options.source_location.is_empty() {
            return Err(MigrationError::InvalidParameter("source location is required".to_string()));
        }
        let exporter = ResourceExporter::new(&*self.source, &self.options.retry, &self.reporter);
        let snapshot = exporter
            .export(&self.options.subscription_name, &self.options.source_location)
            .await?;

        let path = self
            .options
            .metadata_folder
            .join(snapshot_file_name(&self.options.source_location, Local::now()));
        self.fs.create_dir_all(&self.options.metadata_folder)?;
        self.fs.write(&path, &serde_json::to_string_pretty(&snapshot)?)?;

        info!(path = %path.display(), "Snapshot written");
        self.reporter
            .report(format!("Export completed, snapshot saved to {}", path.display()));
        Ok(path)
    }

    /// Import `metadata_file`, honouring the resume flag; returns the progress document path
    pub async fn import(&self, metadata_file: &Path) -> Result<PathBuf> {
        self.import_with(metadata_file, self.options.resume_import).await
    }

    /// Export, then import the fresh snapshot
    pub async fn migrate(&self) -> Result<PathBuf> {
        let snapshot = self.export().await?;
        self.import_with(&snapshot, false).await
    }

    async fn import_with(&self, metadata_file: &Path, resume: bool) -> Result<PathBuf> {
        if self.options.destination_location.is_empty() {
            return Err(MigrationError::InvalidParameter(
                "destination location is required".to_string(),
            ));
        }
        let snapshot = self.read_snapshot(metadata_file)?;
        let registry = Arc::new(self.registry_for(&snapshot, metadata_file, resume)?);

        let progress_file = if resume {
            metadata_file.to_path_buf()
        } else {
            progress_path(metadata_file)
        };
        // Nothing is written until the first commit or a failure after validation
        let store = ProgressStore::new(progress_file.clone(), self.fs.clone(), registry, snapshot)
            .with_mapping_document(self.mapping_target(metadata_file));
        info!(progress = %progress_file.display(), resume, "Import started");

        let settings = ImportSettings {
            destination_location: self.options.destination_location.clone(),
            copy_poll_interval: self.options.copy_poll_interval,
            max_parallelism: self.options.max_parallelism,
        };
        let engine = ImportEngine::new(
            &*self.source,
            &*self.destination,
            &self.options.retry,
            &self.reporter,
            &store,
            &self.cancel,
            &settings,
        );

        match engine.run().await {
            Ok(()) => {
                store.flush()?;
                self.report_mapping(&store);
                self.reporter.report("Import completed");
                Ok(progress_file)
            }
            Err(e) if e.is_validation() => Err(e),
            Err(e) => {
                error!(error = %e, "Import failed");
                if let Err(flush) = store.flush() {
                    error!(error = %flush, "Progress document could not be saved");
                }
                self.report_mapping(&store);

                if self.options.rollback_on_failure {
                    self.reporter.report("Import failed, rolling back");
                    match self.roll_back_store(&store).await {
                        Ok(result) => self.reporter.report(result.to_string()),
                        Err(rollback) => error!(error = %rollback, "Rollback aborted"),
                    }
                } else {
                    self.reporter.report(format!(
                        "Import failed; resume with the progress document {}",
                        progress_file.display()
                    ));
                }

                Err(MigrationError::ImportFailed {
                    source: Box::new(e),
                    progress_file,
                })
            }
        }
    }

    /// Undo everything the progress document marks as imported
    pub async fn rollback(&self, progress_file: &Path) -> Result<RollbackResult> {
        let snapshot = self.read_snapshot(progress_file)?;
        let registry = Arc::new(self.registry_for(&snapshot, progress_file, true)?);
        let store = ProgressStore::new(progress_file.to_path_buf(), self.fs.clone(), registry, snapshot);

        let result = self.roll_back_store(&store).await?;
        self.reporter.report(result.to_string());
        Ok(result)
    }

    async fn roll_back_store(&self, store: &ProgressStore) -> Result<RollbackResult> {
        let settings = RollbackSettings {
            destination_location: self.options.destination_location.clone(),
            cooldown: self.options.rollback_cooldown,
            max_parallelism: self.options.max_parallelism,
        };
        RollbackCoordinator::new(&*self.destination, &self.options.retry, &self.reporter, store, &settings)
            .roll_back()
            .await
    }

    /// Write the mapping document of `metadata_file` without importing
    pub fn generate_mapping(&self, metadata_file: &Path) -> Result<PathBuf> {
        let snapshot = self.read_snapshot(metadata_file)?;
        let registry = self.registry_for(&snapshot, metadata_file, false)?;
        self.write_mapping(metadata_file, &registry)
    }

    fn read_snapshot(&self, path: &Path) -> Result<Subscription> {
        if !self.fs.exists(path) {
            return Err(MigrationError::validation(format!(
                "Metadata file {} does not exist",
                path.display()
            )));
        }
        let contents = self.fs.read_to_string(path)?;
        serde_json::from_str(&contents)
            .map_err(|e| MigrationError::Document(format!("{}: {}", path.display(), e)))
    }

    /// Mapping for `document`: the configured mapping document if present, then
    /// (when `reuse_saved`) the one an earlier import saved beside it, otherwise
    /// generated from the configured prefix
    fn registry_for(&self, snapshot: &Subscription, document: &Path, reuse_saved: bool) -> Result<NameRegistry> {
        if let Some(path) = &self.options.mapping_file {
            if self.fs.exists(path) {
                return self.load_mapping(path);
            }
            warn!(path = %path.display(), "Mapping document not found");
        }
        if reuse_saved {
            let saved = mapping_path(document);
            if self.fs.exists(&saved) {
                return self.load_mapping(&saved);
            }
            warn!(path = %saved.display(), "No saved mapping document, generating names");
        }
        Ok(NameRegistry::generate(
            snapshot,
            &self.options.destination_prefix,
            self.options.name_limits.clone(),
        ))
    }

    fn load_mapping(&self, path: &Path) -> Result<NameRegistry> {
        let registry = NameRegistry::from_yaml(&self.fs.read_to_string(path)?, self.options.name_limits.clone())?;
        if registry.prefix() != self.options.destination_prefix.to_lowercase() {
            warn!(
                path = %path.display(),
                configured = %self.options.destination_prefix,
                recorded = %registry.prefix(),
                "Using the prefix recorded in the mapping document"
            );
        }
        Ok(registry)
    }

    /// Where the mapping of `metadata_file` is saved
    fn mapping_target(&self, metadata_file: &Path) -> PathBuf {
        self.options
            .mapping_file
            .clone()
            .filter(|p| self.options.generate_mapping && !self.fs.exists(p))
            .unwrap_or_else(|| mapping_path(metadata_file))
    }

    fn report_mapping(&self, store: &ProgressStore) {
        if let (true, Some(path)) = (self.options.generate_mapping, store.saved_mapping()) {
            self.reporter
                .report(format!("Name mapping saved to {}", path.display()));
        }
    }

    fn write_mapping(&self, metadata_file: &Path, registry: &NameRegistry) -> Result<PathBuf> {
        let path = self
            .options
            .mapping_file
            .clone()
            .filter(|p| !self.fs.exists(p))
            .unwrap_or_else(|| mapping_path(metadata_file));
        self.fs.write(&path, &registry.to_yaml()?)?;
        self.reporter
            .report(format!("Name mapping saved to {}", path.display()));
        Ok(path)
    }
}
