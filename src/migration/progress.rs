//! Persisted import progress
//!
//! The progress document is the snapshot with source names and `is_imported`
//! flags. Workers report commits with destination names; the store translates
//! them back through the name registry, flips the flag and rewrites the file
//! before returning. All of that happens under one lock, so parallel workers
//! never interleave partial writes.
//!
//! A store can also carry the path of the name mapping document. The mapping is
//! saved together with the first write of the progress document, so resume and
//! rollback always find the names the import used.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, info, warn};

use super::error::{MigrationError, Result};
use super::model::Subscription;
use super::names::NameRegistry;
use super::resource_type::ResourceType;
use crate::traits::FileSystem;

/// A committed resource, addressed by destination names
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressKey<'a> {
    /// Location name
    DataCenter(&'a str),
    AffinityGroup(&'a str),
    StorageAccount(&'a str),
    /// Location name of the owning data center
    NetworkConfiguration(&'a str),
    CloudService(&'a str),
    Deployment { service: &'a str, deployment: &'a str },
    VirtualMachine { service: &'a str, vm: &'a str },
}

impl ProgressKey<'_> {
    fn describe(&self) -> String {
        match self {
            ProgressKey::DataCenter(location) => format!("{} '{}'", ResourceType::DataCenter, location),
            ProgressKey::AffinityGroup(name) => format!("{} '{}'", ResourceType::AffinityGroup, name),
            ProgressKey::StorageAccount(name) => format!("{} '{}'", ResourceType::StorageAccount, name),
            ProgressKey::NetworkConfiguration(location) => {
                format!("{} of '{}'", ResourceType::NetworkConfiguration, location)
            }
            ProgressKey::CloudService(name) => format!("{} '{}'", ResourceType::CloudService, name),
            ProgressKey::Deployment { service, deployment } => {
                format!("{} '{}/{}'", ResourceType::Deployment, service, deployment)
            }
            ProgressKey::VirtualMachine { service, vm } => {
                format!("{} '{}/{}'", ResourceType::VirtualMachine, service, vm)
            }
        }
    }
}

/// Single-writer owner of the persisted progress document
pub struct ProgressStore {
    path: PathBuf,
    fs: Arc<dyn FileSystem>,
    registry: Arc<NameRegistry>,
    document: Mutex<Subscription>,
    mapping: Option<PathBuf>,
    mapping_saved: AtomicBool,
}

impl ProgressStore {
    pub fn new(
        path: PathBuf,
        fs: Arc<dyn FileSystem>,
        registry: Arc<NameRegistry>,
        document: Subscription,
    ) -> Self {
        Self {
            path,
            fs,
            registry,
            document: Mutex::new(document),
            mapping: None,
            mapping_saved: AtomicBool::new(false),
        }
    }

    /// Save the registry to `path` along with the first progress write
    pub fn with_mapping_document(mut self, path: PathBuf) -> Self {
        self.mapping = Some(path);
        self
    }

    /// Mapping document written by this store, if any
    pub fn saved_mapping(&self) -> Option<&Path> {
        self.mapping
            .as_deref()
            .filter(|_| self.mapping_saved.load(Ordering::SeqCst))
    }

    /// Load an existing progress document
    pub fn load(path: &Path, fs: Arc<dyn FileSystem>, registry: Arc<NameRegistry>) -> Result<Self> {
        let contents = fs.read_to_string(path)?;
        let document: Subscription = serde_json::from_str(&contents)?;
        Ok(Self::new(path.to_path_buf(), fs, registry, document))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn registry(&self) -> &Arc<NameRegistry> {
        &self.registry
    }

    fn lock(&self) -> Result<MutexGuard<'_, Subscription>> {
        self.document
            .lock()
            .map_err(|_| MigrationError::Document("progress document lock poisoned".to_string()))
    }

    /// Copy of the current document
    pub fn snapshot(&self) -> Result<Subscription> {
        Ok(self.lock()?.clone())
    }

    /// Write the document as it is now
    pub fn flush(&self) -> Result<()> {
        let document = self.lock()?;
        self.write(&document)
    }

    fn write(&self, document: &Subscription) -> Result<()> {
        if let Some(mapping) = &self.mapping {
            if !self.mapping_saved.load(Ordering::SeqCst) {
                self.fs.write(mapping, &self.registry.to_yaml()?)?;
                self.mapping_saved.store(true, Ordering::SeqCst);
                info!(path = %mapping.display(), "Name mapping saved");
            }
        }
        let contents = serde_json::to_string_pretty(document)?;
        self.fs.write(&self.path, &contents)?;
        Ok(())
    }

    /// Set the `is_imported` flag of one resource and persist
    pub fn mark(&self, key: ProgressKey<'_>, imported: bool) -> Result<()> {
        let mut document = self.lock()?;
        let matched = apply(&mut document, &self.registry, key, imported);
        if matched == 0 {
            warn!(resource = %key.describe(), "Resource not present in progress document");
        } else {
            debug!(resource = %key.describe(), imported, "Progress updated");
        }
        self.write(&document)
    }
}

/// Flip matching flags, returning how many resources matched
fn apply(document: &mut Subscription, registry: &NameRegistry, key: ProgressKey<'_>, imported: bool) -> usize {
    let mut matched = 0;
    let mut set = |flag: &mut bool| {
        *flag = imported;
        matched += 1;
    };

    match key {
        ProgressKey::DataCenter(location) => {
            document
                .data_centers
                .iter_mut()
                .filter(|dc| dc.location_name.eq_ignore_ascii_case(location))
                .for_each(|dc| set(&mut dc.is_imported));
        }
        ProgressKey::NetworkConfiguration(location) => {
            document
                .data_centers
                .iter_mut()
                .filter(|dc| dc.location_name.eq_ignore_ascii_case(location))
                .filter_map(|dc| dc.network_configuration.as_mut())
                .for_each(|network| set(&mut network.is_imported));
        }
        ProgressKey::AffinityGroup(name) => {
            let source = registry.source_name(ResourceType::AffinityGroup, name);
            document
                .data_centers
                .iter_mut()
                .flat_map(|dc| dc.affinity_groups.iter_mut())
                .filter(|g| g.name.eq_ignore_ascii_case(&source))
                .for_each(|g| set(&mut g.is_imported));
        }
        ProgressKey::StorageAccount(name) => {
            let source = registry.source_name(ResourceType::StorageAccount, name);
            document
                .data_centers
                .iter_mut()
                .flat_map(|dc| dc.storage_accounts.iter_mut())
                .filter(|a| a.name.eq_ignore_ascii_case(&source))
                .for_each(|a| set(&mut a.is_imported));
        }
        ProgressKey::CloudService(name) => {
            let source = registry.source_name(ResourceType::CloudService, name);
            document
                .data_centers
                .iter_mut()
                .flat_map(|dc| dc.cloud_services.iter_mut())
                .filter(|s| s.service_name.eq_ignore_ascii_case(&source))
                .for_each(|s| set(&mut s.is_imported));
        }
        ProgressKey::Deployment { service, deployment } => {
            let source_service = registry.source_name(ResourceType::CloudService, service);
            let source_deployment =
                registry.child_source_name(&[(ResourceType::CloudService, service)], ResourceType::Deployment, deployment);
            document
                .data_centers
                .iter_mut()
                .flat_map(|dc| dc.cloud_services.iter_mut())
                .filter(|s| s.service_name.eq_ignore_ascii_case(&source_service))
                .filter_map(|s| s.deployment.as_mut())
                .filter(|d| d.name.eq_ignore_ascii_case(&source_deployment))
                .for_each(|d| set(&mut d.is_imported));
        }
        ProgressKey::VirtualMachine { service, vm } => {
            let source_service = registry.source_name(ResourceType::CloudService, service);
            let source_vm =
                registry.child_source_name(&[(ResourceType::CloudService, service)], ResourceType::VirtualMachine, vm);
            document
                .data_centers
                .iter_mut()
                .flat_map(|dc| dc.cloud_services.iter_mut())
                .filter(|s| s.service_name.eq_ignore_ascii_case(&source_service))
                .filter_map(|s| s.deployment.as_mut())
                .flat_map(|d| d.virtual_machines.iter_mut())
                .filter(|v| v.role_name.eq_ignore_ascii_case(&source_vm))
                .for_each(|v| set(&mut v.is_imported));
        }
    }

    matched
}
