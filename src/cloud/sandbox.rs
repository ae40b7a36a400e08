//! Simulated cloud environment
//!
//! `SandboxProvider` keeps a whole environment in memory and, when opened from
//! a file, writes it back after every mutation. It lets the tool run end to
//! end without API access, and the test-suite uses it with injected failures
//! and its call journal.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{
    BlobLocation, BlobProperties, CloudProvider, CloudResult, CopyStatus, DeploymentDetails,
    DeploymentSlot, DeploymentSpec, PostShutdownAction, ReservedIp, Role, RoleInstance, RoleSize,
    STATUS_READY_ROLE, SubscriptionCapacity,
};
use crate::migration::error::CloudError;
use crate::migration::model::{AffinityGroup, CloudService, StorageAccount, VirtualNetworkConfiguration};
use crate::traits::FileSystem;

/// Size reported for blobs created by a simulated copy
const SIMULATED_BLOB_BYTES: u64 = 30 * 1024 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct SandboxDeployment {
    pub slot: DeploymentSlot,
    pub details: DeploymentDetails,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct SandboxService {
    pub service: CloudService,
    #[serde(default)]
    pub deployments: Vec<SandboxDeployment>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct SandboxBlob {
    pub properties: BlobProperties,
    /// Status polls left before a pending copy completes
    #[serde(default)]
    pub polls_remaining: u32,
}

/// Complete state of a simulated environment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SandboxState {
    #[serde(default)]
    pub affinity_groups: Vec<AffinityGroup>,
    #[serde(default)]
    pub storage_accounts: Vec<StorageAccount>,
    #[serde(default)]
    pub cloud_services: Vec<SandboxService>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<VirtualNetworkConfiguration>,
    #[serde(default)]
    pub reserved_ips: Vec<ReservedIp>,
    #[serde(default)]
    pub capacity: SubscriptionCapacity,
    #[serde(default = "default_role_sizes")]
    pub role_sizes: Vec<RoleSize>,
    /// `account/container` keys
    #[serde(default)]
    pub containers: BTreeSet<String>,
    /// `account/container/blob` keys
    #[serde(default)]
    pub blobs: BTreeMap<String, SandboxBlob>,
}

fn default_role_sizes() -> Vec<RoleSize> {
    [("ExtraSmall", 1), ("Small", 1), ("Medium", 2), ("Large", 4), ("ExtraLarge", 8)]
        .into_iter()
        .map(|(name, cores)| RoleSize {
            name: name.to_string(),
            cores,
        })
        .collect()
}

impl Default for SandboxState {
    fn default() -> Self {
        Self {
            affinity_groups: Vec::new(),
            storage_accounts: Vec::new(),
            cloud_services: Vec::new(),
            network: None,
            reserved_ips: Vec::new(),
            capacity: SubscriptionCapacity::default(),
            role_sizes: default_role_sizes(),
            containers: BTreeSet::new(),
            blobs: BTreeMap::new(),
        }
    }
}

impl SandboxState {
    /// Add an existing blob, creating its container
    pub fn with_blob(mut self, uri: &str, bytes: u64) -> Self {
        if let Ok(location) = BlobLocation::parse(uri) {
            self.containers.insert(container_key(&location.account, &location.container));
            self.blobs.insert(
                location.to_string(),
                SandboxBlob {
                    properties: BlobProperties {
                        total_bytes: bytes,
                        ..Default::default()
                    },
                    polls_remaining: 0,
                },
            );
        }
        self
    }

    fn service_mut(&mut self, name: &str) -> CloudResult<&mut SandboxService> {
        self.cloud_services
            .iter_mut()
            .find(|s| s.service.service_name.eq_ignore_ascii_case(name))
            .ok_or_else(|| CloudError::not_found(format!("cloud service {}", name)))
    }

    fn deployment_mut(&mut self, service: &str, deployment: &str) -> CloudResult<&mut DeploymentDetails> {
        self.service_mut(service)?
            .deployments
            .iter_mut()
            .map(|d| &mut d.details)
            .find(|d| d.name.eq_ignore_ascii_case(deployment))
            .ok_or_else(|| CloudError::not_found(format!("deployment {}/{}", service, deployment)))
    }
}

fn container_key(account: &str, container: &str) -> String {
    format!("{}/{}", account, container)
}

#[derive(Debug, Clone)]
struct InjectedFailure {
    operation: String,
    target: Option<String>,
    remaining: u32,
    error: CloudError,
}

/// In-memory cloud environment implementing [`CloudProvider`]
pub struct SandboxProvider {
    name: String,
    state: Mutex<SandboxState>,
    fs: Option<Arc<dyn FileSystem>>,
    path: Option<PathBuf>,
    copy_polls: u32,
    failures: Mutex<Vec<InjectedFailure>>,
    journal: Mutex<Vec<String>>,
}

impl SandboxProvider {
    pub fn new(name: &str, state: SandboxState) -> Self {
        Self {
            name: name.to_string(),
            state: Mutex::new(state),
            fs: None,
            path: None,
            copy_polls: 1,
            failures: Mutex::new(Vec::new()),
            journal: Mutex::new(Vec::new()),
        }
    }

    /// Open a sandbox persisted at `path`; a missing file starts an empty environment
    pub fn open(name: &str, fs: Arc<dyn FileSystem>, path: &Path) -> Result<Self> {
        let state = if fs.exists(path) {
            let contents = fs.read_to_string(path)?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse sandbox state: {:?}", path))?
        } else {
            SandboxState::default()
        };

        let mut provider = Self::new(name, state);
        provider.fs = Some(fs);
        provider.path = Some(path.to_path_buf());
        Ok(provider)
    }

    /// Number of status polls a copy stays pending
    pub fn with_copy_polls(mut self, polls: u32) -> Self {
        self.copy_polls = polls;
        self
    }

    /// Make the next `times` calls of `operation` (optionally only for `target`) fail
    pub fn fail_next(&self, operation: &str, target: Option<&str>, times: u32, error: CloudError) {
        if let Ok(mut failures) = self.failures.lock() {
            failures.push(InjectedFailure {
                operation: operation.to_string(),
                target: target.map(str::to_string),
                remaining: times,
                error,
            });
        }
    }

    /// Every call made so far, as `operation target`
    pub fn journal(&self) -> Vec<String> {
        self.journal.lock().map(|j| j.clone()).unwrap_or_default()
    }

    /// Calls whose operation name starts with `prefix`
    pub fn calls_matching(&self, prefix: &str) -> Vec<String> {
        self.journal()
            .into_iter()
            .filter(|entry| entry.starts_with(prefix))
            .collect()
    }

    pub fn snapshot(&self) -> SandboxState {
        self.state.lock().map(|s| s.clone()).unwrap_or_default()
    }

    fn enter(&self, operation: &str, target: &str) -> CloudResult<()> {
        debug!(sandbox = %self.name, operation, target, "Sandbox call");
        if let Ok(mut journal) = self.journal.lock() {
            journal.push(format!("{} {}", operation, target));
        }

        let mut failures = self
            .failures
            .lock()
            .map_err(|_| CloudError::remote("sandbox failure table poisoned"))?;
        let injected = failures.iter_mut().find(|f| {
            f.remaining > 0
                && f.operation == operation
                && f.target.as_deref().is_none_or(|t| t.eq_ignore_ascii_case(target))
        });
        match injected {
            Some(failure) => {
                failure.remaining -= 1;
                Err(failure.error.clone())
            }
            None => Ok(()),
        }
    }

    fn state(&self) -> CloudResult<MutexGuard<'_, SandboxState>> {
        self.state
            .lock()
            .map_err(|_| CloudError::remote("sandbox state poisoned"))
    }

    /// Apply a mutation and write the state back when file-backed
    fn mutate<T>(&self, change: impl FnOnce(&mut SandboxState) -> CloudResult<T>) -> CloudResult<T> {
        let mut state = self.state()?;
        let value = change(&mut state)?;
        if let (Some(fs), Some(path)) = (&self.fs, &self.path) {
            let contents = serde_json::to_string_pretty(&*state)
                .map_err(|e| CloudError::remote(format!("sandbox state not serializable: {}", e)))?;
            fs.write(path, &contents)
                .map_err(|e| CloudError::remote(format!("sandbox state not saved: {:#}", e)))?;
        }
        Ok(value)
    }
}

fn conflict(what: &str, name: &str) -> CloudError {
    CloudError::remote(format!("conflict: {} '{}' already exists", what, name))
}

#[async_trait]
impl CloudProvider for SandboxProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn list_affinity_groups(&self) -> CloudResult<Vec<AffinityGroup>> {
        self.enter("list_affinity_groups", "*")?;
        Ok(self.state()?.affinity_groups.clone())
    }

    async fn create_affinity_group(&self, group: &AffinityGroup) -> CloudResult<()> {
        self.enter("create_affinity_group", &group.name)?;
        self.mutate(|state| {
            if state.affinity_groups.iter().any(|g| g.name.eq_ignore_ascii_case(&group.name)) {
                return Err(conflict("affinity group", &group.name));
            }
            state.affinity_groups.push(AffinityGroup {
                is_imported: false,
                ..group.clone()
            });
            Ok(())
        })
    }

    async fn delete_affinity_group(&self, name: &str) -> CloudResult<()> {
        self.enter("delete_affinity_group", name)?;
        self.mutate(|state| {
            let before = state.affinity_groups.len();
            state.affinity_groups.retain(|g| !g.name.eq_ignore_ascii_case(name));
            if state.affinity_groups.len() == before {
                return Err(CloudError::not_found(format!("affinity group {}", name)));
            }
            Ok(())
        })
    }

    async fn list_storage_accounts(&self) -> CloudResult<Vec<StorageAccount>> {
        self.enter("list_storage_accounts", "*")?;
        Ok(self.state()?.storage_accounts.clone())
    }

    async fn create_storage_account(&self, account: &StorageAccount) -> CloudResult<()> {
        self.enter("create_storage_account", &account.name)?;
        self.mutate(|state| {
            if state.storage_accounts.iter().any(|a| a.name.eq_ignore_ascii_case(&account.name)) {
                return Err(conflict("storage account", &account.name));
            }
            state.storage_accounts.push(StorageAccount {
                is_imported: false,
                ..account.clone()
            });
            Ok(())
        })
    }

    async fn delete_storage_account(&self, name: &str) -> CloudResult<()> {
        self.enter("delete_storage_account", name)?;
        self.mutate(|state| {
            let before = state.storage_accounts.len();
            state.storage_accounts.retain(|a| !a.name.eq_ignore_ascii_case(name));
            if state.storage_accounts.len() == before {
                return Err(CloudError::not_found(format!("storage account {}", name)));
            }
            let prefix = format!("{}/", name);
            state.containers.retain(|c| !c.starts_with(&prefix));
            state.blobs.retain(|b, _| !b.starts_with(&prefix));
            Ok(())
        })
    }

    async fn is_storage_account_name_available(&self, name: &str) -> CloudResult<bool> {
        self.enter("is_storage_account_name_available", name)?;
        Ok(!self
            .state()?
            .storage_accounts
            .iter()
            .any(|a| a.name.eq_ignore_ascii_case(name)))
    }

    async fn list_cloud_services(&self) -> CloudResult<Vec<CloudService>> {
        self.enter("list_cloud_services", "*")?;
        Ok(self
            .state()?
            .cloud_services
            .iter()
            .map(|s| s.service.clone())
            .collect())
    }

    async fn create_cloud_service(&self, service: &CloudService) -> CloudResult<()> {
        self.enter("create_cloud_service", &service.service_name)?;
        self.mutate(|state| {
            if state
                .cloud_services
                .iter()
                .any(|s| s.service.service_name.eq_ignore_ascii_case(&service.service_name))
            {
                return Err(conflict("cloud service", &service.service_name));
            }
            state.cloud_services.push(SandboxService {
                service: CloudService {
                    deployment: None,
                    is_imported: false,
                    ..service.clone()
                },
                deployments: Vec::new(),
            });
            Ok(())
        })
    }

    async fn delete_cloud_service(&self, name: &str) -> CloudResult<()> {
        self.enter("delete_cloud_service", name)?;
        self.mutate(|state| {
            let before = state.cloud_services.len();
            state
                .cloud_services
                .retain(|s| !s.service.service_name.eq_ignore_ascii_case(name));
            if state.cloud_services.len() == before {
                return Err(CloudError::not_found(format!("cloud service {}", name)));
            }
            for ip in &mut state.reserved_ips {
                if ip.service_name.as_deref().is_some_and(|s| s.eq_ignore_ascii_case(name)) {
                    ip.service_name = None;
                }
            }
            Ok(())
        })
    }

    async fn is_cloud_service_name_available(&self, name: &str) -> CloudResult<bool> {
        self.enter("is_cloud_service_name_available", name)?;
        Ok(!self
            .state()?
            .cloud_services
            .iter()
            .any(|s| s.service.service_name.eq_ignore_ascii_case(name)))
    }

    async fn get_deployment_by_slot(
        &self,
        service: &str,
        slot: DeploymentSlot,
    ) -> CloudResult<DeploymentDetails> {
        self.enter("get_deployment_by_slot", service)?;
        let mut state = self.state()?;
        state
            .service_mut(service)?
            .deployments
            .iter()
            .find(|d| d.slot == slot)
            .map(|d| d.details.clone())
            .ok_or_else(|| CloudError::not_found(format!("{:?} deployment of {}", slot, service)))
    }

    async fn create_deployment(&self, service: &str, spec: &DeploymentSpec) -> CloudResult<()> {
        self.enter("create_deployment", &format!("{}/{}", service, spec.name))?;
        self.mutate(|state| {
            let reserved_ip = spec.reserved_ip_name.clone();
            let target = state.service_mut(service)?;
            if target.deployments.iter().any(|d| d.slot == spec.slot) {
                return Err(conflict("deployment slot of", service));
            }
            target.deployments.push(SandboxDeployment {
                slot: spec.slot,
                details: DeploymentDetails {
                    name: spec.name.clone(),
                    label: Some(spec.label.clone()),
                    dns_settings: spec.dns_settings.clone(),
                    reserved_ip_name: spec.reserved_ip_name.clone(),
                    load_balancers: spec.load_balancers.clone(),
                    virtual_network_name: spec.virtual_network_name.clone(),
                    roles: vec![spec.role.clone()],
                    role_instances: vec![RoleInstance {
                        role_name: spec.role.role_name.clone(),
                        instance_status: STATUS_READY_ROLE.to_string(),
                    }],
                },
            });
            if let Some(ip_name) = reserved_ip
                && let Some(ip) = state.reserved_ips.iter_mut().find(|ip| ip.name == ip_name)
            {
                ip.service_name = Some(service.to_string());
            }
            Ok(())
        })
    }

    async fn add_virtual_machine(&self, service: &str, deployment: &str, role: &Role) -> CloudResult<()> {
        self.enter("add_virtual_machine", &format!("{}/{}", service, role.role_name))?;
        self.mutate(|state| {
            let details = state.deployment_mut(service, deployment)?;
            if details.roles.iter().any(|r| r.role_name.eq_ignore_ascii_case(&role.role_name)) {
                return Err(conflict("virtual machine", &role.role_name));
            }
            details.roles.push(role.clone());
            details.role_instances.push(RoleInstance {
                role_name: role.role_name.clone(),
                instance_status: STATUS_READY_ROLE.to_string(),
            });
            Ok(())
        })
    }

    async fn get_virtual_machine(&self, service: &str, deployment: &str, name: &str) -> CloudResult<Role> {
        self.enter("get_virtual_machine", &format!("{}/{}", service, name))?;
        let mut state = self.state()?;
        state
            .deployment_mut(service, deployment)?
            .roles
            .iter()
            .find(|r| r.role_name.eq_ignore_ascii_case(name))
            .cloned()
            .ok_or_else(|| CloudError::not_found(format!("virtual machine {}", name)))
    }

    async fn delete_virtual_machine(&self, service: &str, deployment: &str, name: &str) -> CloudResult<()> {
        self.enter("delete_virtual_machine", &format!("{}/{}", service, name))?;
        self.mutate(|state| {
            let details = state.deployment_mut(service, deployment)?;
            let before = details.roles.len();
            details.roles.retain(|r| !r.role_name.eq_ignore_ascii_case(name));
            details
                .role_instances
                .retain(|r| !r.role_name.eq_ignore_ascii_case(name));
            if details.roles.len() == before {
                return Err(CloudError::not_found(format!("virtual machine {}", name)));
            }
            Ok(())
        })
    }

    async fn shutdown_virtual_machine(
        &self,
        service: &str,
        deployment: &str,
        name: &str,
        action: PostShutdownAction,
    ) -> CloudResult<()> {
        self.enter("shutdown_virtual_machine", &format!("{}/{}", service, name))?;
        self.mutate(|state| {
            let instance = state
                .deployment_mut(service, deployment)?
                .role_instances
                .iter_mut()
                .find(|r| r.role_name.eq_ignore_ascii_case(name))
                .ok_or_else(|| CloudError::not_found(format!("virtual machine {}", name)))?;
            instance.instance_status = action.resulting_status().to_string();
            Ok(())
        })
    }

    async fn get_network_configuration(&self) -> CloudResult<VirtualNetworkConfiguration> {
        self.enter("get_network_configuration", "*")?;
        self.state()?
            .network
            .clone()
            .ok_or_else(|| CloudError::not_found("network configuration"))
    }

    async fn set_network_configuration(&self, config: &VirtualNetworkConfiguration) -> CloudResult<()> {
        self.enter("set_network_configuration", "*")?;
        self.mutate(|state| {
            state.network = Some(config.clone());
            Ok(())
        })
    }

    async fn list_reserved_ips(&self) -> CloudResult<Vec<ReservedIp>> {
        self.enter("list_reserved_ips", "*")?;
        Ok(self.state()?.reserved_ips.clone())
    }

    async fn subscription_capacity(&self) -> CloudResult<SubscriptionCapacity> {
        self.enter("subscription_capacity", "*")?;
        Ok(self.state()?.capacity.clone())
    }

    async fn list_role_sizes(&self) -> CloudResult<Vec<RoleSize>> {
        self.enter("list_role_sizes", "*")?;
        Ok(self.state()?.role_sizes.clone())
    }

    async fn blob_properties(&self, blob: &BlobLocation) -> CloudResult<BlobProperties> {
        self.enter("blob_properties", &blob.to_string())?;
        self.mutate(|state| {
            let entry = state
                .blobs
                .get_mut(&blob.to_string())
                .ok_or_else(|| CloudError::not_found(format!("blob {}", blob)))?;
            if entry.properties.copy_status == Some(CopyStatus::Pending) {
                if entry.polls_remaining > 0 {
                    entry.polls_remaining -= 1;
                    entry.properties.bytes_copied = entry.properties.total_bytes / 2;
                } else {
                    entry.properties.copy_status = Some(CopyStatus::Success);
                    entry.properties.bytes_copied = entry.properties.total_bytes;
                }
            }
            Ok(entry.properties.clone())
        })
    }

    async fn container_exists(&self, account: &str, container: &str) -> CloudResult<bool> {
        self.enter("container_exists", &container_key(account, container))?;
        Ok(self
            .state()?
            .containers
            .contains(&container_key(account, container)))
    }

    async fn create_container(&self, account: &str, container: &str) -> CloudResult<()> {
        self.enter("create_container", &container_key(account, container))?;
        self.mutate(|state| {
            if !state.storage_accounts.iter().any(|a| a.name.eq_ignore_ascii_case(account)) {
                return Err(CloudError::not_found(format!("storage account {}", account)));
            }
            if !state.containers.insert(container_key(account, container)) {
                return Err(conflict("container", container));
            }
            Ok(())
        })
    }

    async fn create_read_token(
        &self,
        blob: &BlobLocation,
        start: DateTime<Utc>,
        expiry: DateTime<Utc>,
    ) -> CloudResult<String> {
        self.enter("create_read_token", &blob.to_string())?;
        Ok(format!(
            "sv=sandbox&st={}&se={}&sp=r&sig={}",
            start.to_rfc3339_opts(SecondsFormat::Secs, true),
            expiry.to_rfc3339_opts(SecondsFormat::Secs, true),
            uuid::Uuid::new_v4().simple()
        ))
    }

    async fn start_blob_copy(&self, destination: &BlobLocation, source_uri: &str) -> CloudResult<String> {
        self.enter("start_blob_copy", &destination.to_string())?;
        let copy_polls = self.copy_polls;
        self.mutate(|state| {
            if !state
                .containers
                .contains(&container_key(&destination.account, &destination.container))
            {
                return Err(CloudError::not_found(format!(
                    "container {}/{}",
                    destination.account, destination.container
                )));
            }
            debug!(destination = %destination, source = source_uri, "Sandbox copy started");
            let copy_id = uuid::Uuid::new_v4().to_string();
            state.blobs.insert(
                destination.to_string(),
                SandboxBlob {
                    properties: BlobProperties {
                        copy_status: Some(CopyStatus::Pending),
                        copy_id: Some(copy_id.clone()),
                        bytes_copied: 0,
                        total_bytes: SIMULATED_BLOB_BYTES,
                    },
                    polls_remaining: copy_polls,
                },
            );
            Ok(copy_id)
        })
    }

    async fn abort_blob_copy(&self, blob: &BlobLocation, copy_id: &str) -> CloudResult<()> {
        self.enter("abort_blob_copy", &blob.to_string())?;
        self.mutate(|state| {
            let entry = state
                .blobs
                .get_mut(&blob.to_string())
                .filter(|b| b.properties.copy_id.as_deref() == Some(copy_id))
                .ok_or_else(|| CloudError::not_found(format!("copy {} of {}", copy_id, blob)))?;
            entry.properties.copy_status = Some(CopyStatus::Aborted);
            Ok(())
        })
    }

    async fn delete_blob(&self, blob: &BlobLocation) -> CloudResult<()> {
        self.enter("delete_blob", &blob.to_string())?;
        self.mutate(|state| {
            state
                .blobs
                .remove(&blob.to_string())
                .map(|_| ())
                .ok_or_else(|| CloudError::not_found(format!("blob {}", blob)))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::MockFileSystem;

    fn group(name: &str) -> AffinityGroup {
        AffinityGroup {
            name: name.to_string(),
            location: "West US".to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_create_and_conflict() {
        let sandbox = SandboxProvider::new("dest", SandboxState::default());
        sandbox.create_affinity_group(&group("ag1")).await.unwrap();

        let err = sandbox.create_affinity_group(&group("AG1")).await.unwrap_err();
        assert!(!err.is_not_found());
        assert_eq!(sandbox.list_affinity_groups().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_missing_is_not_found() {
        let sandbox = SandboxProvider::new("dest", SandboxState::default());
        let err = sandbox.delete_cloud_service("svc").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_injected_failures_are_consumed() {
        let sandbox = SandboxProvider::new("dest", SandboxState::default());
        sandbox.fail_next("create_affinity_group", Some("ag1"), 1, CloudError::remote("busy"));

        assert!(sandbox.create_affinity_group(&group("ag2")).await.is_ok());
        assert!(sandbox.create_affinity_group(&group("ag1")).await.is_err());
        assert!(sandbox.create_affinity_group(&group("ag1")).await.is_ok());
        assert_eq!(sandbox.calls_matching("create_affinity_group").len(), 3);
    }

    #[tokio::test]
    async fn test_blob_copy_completes_after_polls() {
        let sandbox = SandboxProvider::new("dest", SandboxState::default()).with_copy_polls(2);
        let account = StorageAccount {
            name: "dcsa1".to_string(),
            ..Default::default()
        };
        sandbox.create_storage_account(&account).await.unwrap();
        sandbox.create_container("dcsa1", "vhds").await.unwrap();

        let blob = BlobLocation::new("dcsa1", "vhds", "os.vhd");
        sandbox
            .start_blob_copy(&blob, "https://sa1.blob.core.windows.net/vhds/os.vhd?sig=x")
            .await
            .unwrap();

        let mut statuses = Vec::new();
        for _ in 0..3 {
            statuses.push(sandbox.blob_properties(&blob).await.unwrap().copy_status);
        }
        assert_eq!(
            statuses,
            vec![Some(CopyStatus::Pending), Some(CopyStatus::Pending), Some(CopyStatus::Success)]
        );
    }

    #[tokio::test]
    async fn test_file_backed_state_is_saved() {
        let fs = Arc::new(MockFileSystem::new());
        let path = Path::new("/sandbox/dest.json");
        let sandbox = SandboxProvider::open("dest", fs.clone(), path).unwrap();
        sandbox.create_affinity_group(&group("ag1")).await.unwrap();

        let reopened = SandboxProvider::open("dest", fs, path).unwrap();
        assert_eq!(reopened.snapshot().affinity_groups[0].name, "ag1");
    }

    #[tokio::test]
    async fn test_seeded_blob_exists() {
        let state = SandboxState::default().with_blob("https://sa1.blob.core.windows.net/vhds/os.vhd", 1024);
        let sandbox = SandboxProvider::new("source", state);
        let props = sandbox
            .blob_properties(&BlobLocation::new("sa1", "vhds", "os.vhd"))
            .await
            .unwrap();
        assert_eq!(props.total_bytes, 1024);
        assert!(sandbox.container_exists("sa1", "vhds").await.unwrap());
    }
}
