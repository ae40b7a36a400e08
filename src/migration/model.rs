//! Snapshot document model
//!
//! A [`Subscription`] is produced by the exporter, persisted as JSON, and
//! consumed by the import engine and the rollback coordinator. The
//! `is_imported` flags record which resources have been committed in the
//! destination.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::resource_type::ResourceType;

/// Role type of virtual machines carried over by the migration
pub const PERSISTENT_VM_ROLE: &str = "PersistentVMRole";

/// Root of the snapshot document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Subscription {
    pub name: String,
    #[serde(default)]
    pub data_centers: Vec<DataCenter>,
}

/// All migrated resources of one location
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct DataCenter {
    pub location_name: String,
    #[serde(default)]
    pub affinity_groups: Vec<AffinityGroup>,
    #[serde(default)]
    pub storage_accounts: Vec<StorageAccount>,
    #[serde(default)]
    pub cloud_services: Vec<CloudService>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_configuration: Option<NetworkConfiguration>,
    #[serde(default)]
    pub is_imported: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct AffinityGroup {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub location: String,
    #[serde(default)]
    pub is_imported: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct StorageAccount {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affinity_group: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_type: Option<String>,
    #[serde(default)]
    pub geo_replication_enabled: bool,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extended_properties: BTreeMap<String, String>,
    #[serde(default)]
    pub is_imported: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct CloudService {
    pub service_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affinity_group: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extended_properties: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment: Option<Deployment>,
    #[serde(default)]
    pub is_imported: bool,
}

impl CloudService {
    /// Virtual machines of the production deployment, if any
    pub fn virtual_machines(&self) -> &[VirtualMachine] {
        self.deployment
            .as_ref()
            .map(|d| d.virtual_machines.as_slice())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Deployment {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dns_settings: Option<DnsSettings>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reserved_ip_name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub load_balancers: Vec<LoadBalancer>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub virtual_network_name: Option<String>,
    #[serde(default)]
    pub virtual_machines: Vec<VirtualMachine>,
    #[serde(default)]
    pub is_imported: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct DnsSettings {
    #[serde(default)]
    pub dns_servers: Vec<DnsServer>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct LoadBalancer {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subnet_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub static_virtual_network_ip_address: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct VirtualMachine {
    pub role_name: String,
    pub role_size: String,
    #[serde(default = "default_role_type")]
    pub role_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub availability_set_name: Option<String>,
    pub os_disk: OsDisk,
    #[serde(default)]
    pub data_disks: Vec<DataDisk>,
    /// Provider-specific role configuration carried through untouched
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub configuration_sets: Vec<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resource_extension_references: Vec<serde_json::Value>,
    #[serde(default)]
    pub is_imported: bool,
}

fn default_role_type() -> String {
    PERSISTENT_VM_ROLE.to_string()
}

impl VirtualMachine {
    /// OS disk followed by data disks
    pub fn disks(&self) -> impl Iterator<Item = DiskRef<'_>> {
        std::iter::once(DiskRef {
            resource_type: ResourceType::OsDisk,
            name: &self.os_disk.disk_name,
            media_link: &self.os_disk.media_link,
        })
        .chain(self.data_disks.iter().map(|d| DiskRef {
            resource_type: ResourceType::DataDisk,
            name: &d.disk_name,
            media_link: &d.media_link,
        }))
    }
}

/// Borrowed view of one disk of a virtual machine
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DiskRef<'a> {
    pub resource_type: ResourceType,
    pub name: &'a str,
    pub media_link: &'a str,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct OsDisk {
    pub disk_name: String,
    pub media_link: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disk_label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_caching: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operating_system: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct DataDisk {
    pub disk_name: String,
    pub media_link: String,
    #[serde(default)]
    pub lun: u32,
    #[serde(default)]
    pub logical_disk_size_gb: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disk_label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_caching: Option<String>,
}

/// Network configuration of one data center, deployed as a single document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct NetworkConfiguration {
    pub virtual_network: VirtualNetworkConfiguration,
    #[serde(default)]
    pub is_imported: bool,
}

/// The subscription-wide virtual network document exchanged with the provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct VirtualNetworkConfiguration {
    #[serde(default)]
    pub dns_servers: Vec<DnsServer>,
    #[serde(default)]
    pub local_network_sites: Vec<LocalNetworkSite>,
    #[serde(default)]
    pub virtual_network_sites: Vec<VirtualNetworkSite>,
}

impl VirtualNetworkConfiguration {
    pub fn is_empty(&self) -> bool {
        self.dns_servers.is_empty()
            && self.local_network_sites.is_empty()
            && self.virtual_network_sites.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct DnsServer {
    pub name: String,
    pub ip_address: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct LocalNetworkSite {
    pub name: String,
    #[serde(default)]
    pub address_space: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vpn_gateway_address: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct VirtualNetworkSite {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affinity_group: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default)]
    pub address_space: Vec<String>,
    #[serde(default)]
    pub subnets: Vec<Subnet>,
    /// Names of [`DnsServer`] entries used by this site
    #[serde(default)]
    pub dns_servers_ref: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway: Option<Gateway>,
}

impl VirtualNetworkSite {
    /// Name of the local network site the gateway connects to
    pub fn local_network_site_ref(&self) -> Option<&str> {
        self.gateway
            .as_ref()
            .and_then(|g| g.local_network_site_ref.as_deref())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Subnet {
    pub name: String,
    pub address_prefix: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Gateway {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_network_site_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_type: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub vpn_client_address_pool: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_flags_default_to_not_imported() {
        let json = r#"{
            "name": "contoso",
            "data_centers": [{
                "location_name": "West US",
                "affinity_groups": [{"name": "ag1", "location": "West US"}]
            }]
        }"#;
        let subscription: Subscription = serde_json::from_str(json).unwrap();
        let dc = &subscription.data_centers[0];
        assert!(!dc.is_imported);
        assert!(!dc.affinity_groups[0].is_imported);
        assert!(dc.network_configuration.is_none());
    }

    #[test]
    fn test_disks_lists_os_disk_first() {
        let vm = VirtualMachine {
            role_name: "vm1".to_string(),
            role_size: "Small".to_string(),
            os_disk: OsDisk {
                disk_name: "os".to_string(),
                media_link: "https://sa1.blob.core.windows.net/vhds/os.vhd".to_string(),
                ..Default::default()
            },
            data_disks: vec![DataDisk {
                disk_name: "data".to_string(),
                media_link: "https://sa1.blob.core.windows.net/vhds/data.vhd".to_string(),
                lun: 1,
                ..Default::default()
            }],
            ..Default::default()
        };

        let disks: Vec<_> = vm.disks().collect();
        assert_eq!(disks.len(), 2);
        assert_eq!(disks[0].resource_type, ResourceType::OsDisk);
        assert_eq!(disks[1].name, "data");
    }

    #[test]
    fn test_virtual_machines_without_deployment() {
        let service = CloudService {
            service_name: "svc".to_string(),
            ..Default::default()
        };
        assert!(service.virtual_machines().is_empty());
    }
}
