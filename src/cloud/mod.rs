//! Cloud management capability
//!
//! The migration talks to both environments exclusively through the
//! [`CloudProvider`] trait. Every call either succeeds or fails with a
//! [`CloudError`] that distinguishes "not found" from everything else; retries
//! are the caller's business (see [`crate::migration::retry`]).

pub mod blob;
pub mod sandbox;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::migration::error::CloudError;
use crate::migration::model::{
    AffinityGroup, CloudService, DataDisk, DnsSettings, LoadBalancer, OsDisk, StorageAccount,
    VirtualNetworkConfiguration,
};

pub use blob::BlobLocation;
pub use sandbox::{SandboxProvider, SandboxState};

pub type CloudResult<T> = std::result::Result<T, CloudError>;

/// Instance status of a virtual machine that is stopped but still allocated
pub const STATUS_STOPPED_VM: &str = "StoppedVM";
/// Instance status of a virtual machine that is stopped and deallocated
pub const STATUS_STOPPED_DEALLOCATED: &str = "StoppedDeallocated";
/// Instance status of a running virtual machine
pub const STATUS_READY_ROLE: &str = "ReadyRole";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum DeploymentSlot {
    #[default]
    Production,
    Staging,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PostShutdownAction {
    Stopped,
    StoppedDeallocated,
}

impl PostShutdownAction {
    /// Instance status reported once the shutdown completed
    pub fn resulting_status(&self) -> &'static str {
        match self {
            PostShutdownAction::Stopped => STATUS_STOPPED_VM,
            PostShutdownAction::StoppedDeallocated => STATUS_STOPPED_DEALLOCATED,
        }
    }
}

/// A role definition as exchanged with the provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Role {
    pub role_name: String,
    pub role_type: String,
    pub role_size: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub availability_set_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os_disk: Option<OsDisk>,
    #[serde(default)]
    pub data_disks: Vec<DataDisk>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub configuration_sets: Vec<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resource_extension_references: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct RoleInstance {
    pub role_name: String,
    pub instance_status: String,
}

impl RoleInstance {
    pub fn is_stopped(&self) -> bool {
        self.instance_status == STATUS_STOPPED_VM
            || self.instance_status == STATUS_STOPPED_DEALLOCATED
    }
}

/// A deployment as reported by the provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct DeploymentDetails {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dns_settings: Option<DnsSettings>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reserved_ip_name: Option<String>,
    #[serde(default)]
    pub load_balancers: Vec<LoadBalancer>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub virtual_network_name: Option<String>,
    #[serde(default)]
    pub roles: Vec<Role>,
    #[serde(default)]
    pub role_instances: Vec<RoleInstance>,
}

/// Parameters for creating a deployment together with its first virtual machine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentSpec {
    pub name: String,
    pub label: String,
    pub slot: DeploymentSlot,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dns_settings: Option<DnsSettings>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reserved_ip_name: Option<String>,
    #[serde(default)]
    pub load_balancers: Vec<LoadBalancer>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub virtual_network_name: Option<String>,
    pub role: Role,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ReservedIp {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

/// Quotas and current usage of a subscription
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionCapacity {
    pub max_hosted_services: u32,
    pub current_hosted_services: u32,
    pub max_storage_accounts: u32,
    pub current_storage_accounts: u32,
    pub max_virtual_network_sites: u32,
    pub current_virtual_network_sites: u32,
    pub max_dns_servers: u32,
    pub current_dns_servers: u32,
    pub max_local_network_sites: u32,
    pub current_local_network_sites: u32,
    pub max_core_count: u32,
    pub current_core_count: u32,
}

impl Default for SubscriptionCapacity {
    fn default() -> Self {
        Self {
            max_hosted_services: 20,
            current_hosted_services: 0,
            max_storage_accounts: 100,
            current_storage_accounts: 0,
            max_virtual_network_sites: 100,
            current_virtual_network_sites: 0,
            max_dns_servers: 100,
            current_dns_servers: 0,
            max_local_network_sites: 100,
            current_local_network_sites: 0,
            max_core_count: 20,
            current_core_count: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleSize {
    pub name: String,
    pub cores: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CopyStatus {
    Pending,
    Success,
    Aborted,
    Failed,
    Invalid,
}

impl CopyStatus {
    /// Statuses after which the destination blob is unusable
    pub fn is_failure(&self) -> bool {
        matches!(self, CopyStatus::Aborted | CopyStatus::Failed | CopyStatus::Invalid)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct BlobProperties {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub copy_status: Option<CopyStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub copy_id: Option<String>,
    #[serde(default)]
    pub bytes_copied: u64,
    #[serde(default)]
    pub total_bytes: u64,
}

impl BlobProperties {
    /// Copy progress in percent, 0 when the size is unknown
    pub fn percent_copied(&self) -> u64 {
        if self.total_bytes == 0 {
            0
        } else {
            self.bytes_copied.saturating_mul(100) / self.total_bytes
        }
    }
}

/// Management operations of one cloud environment
#[async_trait]
pub trait CloudProvider: Send + Sync {
    /// Label used in logs
    fn name(&self) -> &str;

    async fn list_affinity_groups(&self) -> CloudResult<Vec<AffinityGroup>>;
    async fn create_affinity_group(&self, group: &AffinityGroup) -> CloudResult<()>;
    async fn delete_affinity_group(&self, name: &str) -> CloudResult<()>;

    async fn list_storage_accounts(&self) -> CloudResult<Vec<StorageAccount>>;
    async fn create_storage_account(&self, account: &StorageAccount) -> CloudResult<()>;
    async fn delete_storage_account(&self, name: &str) -> CloudResult<()>;
    async fn is_storage_account_name_available(&self, name: &str) -> CloudResult<bool>;

    async fn list_cloud_services(&self) -> CloudResult<Vec<CloudService>>;
    async fn create_cloud_service(&self, service: &CloudService) -> CloudResult<()>;
    /// Deletes the service together with its deployments and virtual machines
    async fn delete_cloud_service(&self, name: &str) -> CloudResult<()>;
    async fn is_cloud_service_name_available(&self, name: &str) -> CloudResult<bool>;

    async fn get_deployment_by_slot(
        &self,
        service: &str,
        slot: DeploymentSlot,
    ) -> CloudResult<DeploymentDetails>;
    async fn create_deployment(&self, service: &str, spec: &DeploymentSpec) -> CloudResult<()>;

    async fn add_virtual_machine(&self, service: &str, deployment: &str, role: &Role) -> CloudResult<()>;
    async fn get_virtual_machine(&self, service: &str, deployment: &str, name: &str) -> CloudResult<Role>;
    async fn delete_virtual_machine(&self, service: &str, deployment: &str, name: &str) -> CloudResult<()>;
    async fn shutdown_virtual_machine(
        &self,
        service: &str,
        deployment: &str,
        name: &str,
        action: PostShutdownAction,
    ) -> CloudResult<()>;

    async fn get_network_configuration(&self) -> CloudResult<VirtualNetworkConfiguration>;
    async fn set_network_configuration(&self, config: &VirtualNetworkConfiguration) -> CloudResult<()>;

    async fn list_reserved_ips(&self) -> CloudResult<Vec<ReservedIp>>;
    async fn subscription_capacity(&self) -> CloudResult<SubscriptionCapacity>;
    async fn list_role_sizes(&self) -> CloudResult<Vec<RoleSize>>;

    async fn blob_properties(&self, blob: &BlobLocation) -> CloudResult<BlobProperties>;
    async fn container_exists(&self, account: &str, container: &str) -> CloudResult<bool>;
    async fn create_container(&self, account: &str, container: &str) -> CloudResult<()>;
    /// Delegated read-only access token for `blob`, valid between `start` and `expiry`
    async fn create_read_token(
        &self,
        blob: &BlobLocation,
        start: DateTime<Utc>,
        expiry: DateTime<Utc>,
    ) -> CloudResult<String>;
    /// Start a server-side copy into `destination`, returning the copy id
    async fn start_blob_copy(&self, destination: &BlobLocation, source_uri: &str) -> CloudResult<String>;
    async fn abort_blob_copy(&self, blob: &BlobLocation, copy_id: &str) -> CloudResult<()>;
    async fn delete_blob(&self, blob: &BlobLocation) -> CloudResult<()>;
}
