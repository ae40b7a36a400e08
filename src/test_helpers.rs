//! Test helpers for building sample subscriptions and simulated environments
//!
//! [`EnvironmentBuilder`] describes one source data center once and produces
//! both the exported snapshot and a source sandbox holding the same
//! resources, deployments and disk blobs.

#![cfg(test)]

use std::time::Duration;

use crate::cloud::sandbox::{SandboxDeployment, SandboxService};
use crate::cloud::{
    DeploymentDetails, DeploymentSlot, Role, RoleInstance, STATUS_READY_ROLE, SandboxProvider, SandboxState,
};
use crate::migration::model::*;
use crate::migration::retry::RetryPolicy;

/// Retry policy with millisecond backoff
pub fn quick_policy() -> RetryPolicy {
    RetryPolicy {
        retry_count: 3,
        min_backoff: Duration::from_millis(1),
        max_backoff: Duration::from_millis(5),
        delta_backoff: Duration::from_millis(1),
        operation_timeout: None,
    }
}

/// Builder for a source data center
pub struct EnvironmentBuilder {
    location: String,
    affinity_groups: Vec<String>,
    storage_accounts: Vec<String>,
    services: Vec<(String, Vec<String>)>,
    network: bool,
}

/// `ag1`, `sa1`, `svc1` running `vm1`, and the `vnet1` network in West US
pub fn sample() -> EnvironmentBuilder {
    EnvironmentBuilder::new("West US")
        .with_affinity_group("ag1")
        .with_storage_account("sa1")
        .with_cloud_service("svc1", &["vm1"])
        .with_network()
}

impl EnvironmentBuilder {
    pub fn new(location: &str) -> Self {
        Self {
            location: location.to_string(),
            affinity_groups: Vec::new(),
            storage_accounts: Vec::new(),
            services: Vec::new(),
            network: false,
        }
    }

    pub fn with_affinity_group(mut self, name: &str) -> Self {
        self.affinity_groups.push(name.to_string());
        self
    }

    /// Storage accounts join the first affinity group, if any
    pub fn with_storage_account(mut self, name: &str) -> Self {
        self.storage_accounts.push(name.to_string());
        self
    }

    /// Cloud service whose virtual machines keep their disks in the first storage account
    pub fn with_cloud_service(mut self, name: &str, vms: &[&str]) -> Self {
        self.services
            .push((name.to_string(), vms.iter().map(|v| v.to_string()).collect()));
        self
    }

    /// Virtual network site `vnet1` using DNS server `dns1` and local site `onprem`
    pub fn with_network(mut self) -> Self {
        self.network = true;
        self
    }

    fn group(&self) -> Option<String> {
        self.affinity_groups.first().cloned()
    }

    fn disk_account(&self) -> String {
        self.storage_accounts
            .first()
            .cloned()
            .unwrap_or_else(|| "sa1".to_string())
    }

    /// Media link of a virtual machine's OS disk
    pub fn os_disk_link(&self, vm: &str) -> String {
        format!("https://{}.blob.core.windows.net/vhds/{}-os.vhd", self.disk_account(), vm)
    }

    fn virtual_machine(&self, name: &str) -> VirtualMachine {
        VirtualMachine {
            role_name: name.to_string(),
            role_size: "Small".to_string(),
            role_type: PERSISTENT_VM_ROLE.to_string(),
            os_disk: OsDisk {
                disk_name: format!("{}-os", name),
                media_link: self.os_disk_link(name),
                operating_system: Some("Linux".to_string()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn cloud_service(&self, name: &str, vms: &[String]) -> CloudService {
        let group = self.group();
        CloudService {
            service_name: name.to_string(),
            location: group.is_none().then(|| self.location.clone()),
            affinity_group: group,
            deployment: (!vms.is_empty()).then(|| Deployment {
                name: format!("{}-deployment", name),
                label: Some(format!("{}-deployment", name)),
                virtual_network_name: self.network.then(|| "vnet1".to_string()),
                virtual_machines: vms.iter().map(|vm| self.virtual_machine(vm)).collect(),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn network_configuration(&self) -> VirtualNetworkConfiguration {
        VirtualNetworkConfiguration {
            dns_servers: vec![DnsServer {
                name: "dns1".to_string(),
                ip_address: "10.0.0.4".to_string(),
            }],
            local_network_sites: vec![LocalNetworkSite {
                name: "onprem".to_string(),
                address_space: vec!["192.168.0.0/16".to_string()],
                vpn_gateway_address: Some("203.0.113.10".to_string()),
            }],
            virtual_network_sites: vec![VirtualNetworkSite {
                name: "vnet1".to_string(),
                affinity_group: self.group(),
                location: self.group().is_none().then(|| self.location.clone()),
                address_space: vec!["10.0.0.0/16".to_string()],
                subnets: vec![Subnet {
                    name: "default".to_string(),
                    address_prefix: "10.0.0.0/24".to_string(),
                }],
                dns_servers_ref: vec!["dns1".to_string()],
                gateway: Some(Gateway {
                    local_network_site_ref: Some("onprem".to_string()),
                    ..Default::default()
                }),
            }],
        }
    }

    /// The exported snapshot of the data center
    pub fn snapshot(&self) -> Subscription {
        let group = self.group();
        Subscription {
            name: "contoso".to_string(),
            data_centers: vec![DataCenter {
                location_name: self.location.clone(),
                affinity_groups: self
                    .affinity_groups
                    .iter()
                    .map(|name| AffinityGroup {
                        name: name.clone(),
                        location: self.location.clone(),
                        ..Default::default()
                    })
                    .collect(),
                storage_accounts: self
                    .storage_accounts
                    .iter()
                    .map(|name| StorageAccount {
                        name: name.clone(),
                        location: group.is_none().then(|| self.location.clone()),
                        affinity_group: group.clone(),
                        account_type: Some("Standard_LRS".to_string()),
                        ..Default::default()
                    })
                    .collect(),
                cloud_services: self
                    .services
                    .iter()
                    .map(|(name, vms)| self.cloud_service(name, vms))
                    .collect(),
                network_configuration: self.network.then(|| NetworkConfiguration {
                    virtual_network: self.network_configuration(),
                    is_imported: false,
                }),
                is_imported: false,
            }],
        }
    }

    /// Source environment holding the snapshot's resources with running machines
    pub fn source(&self) -> SandboxProvider {
        let dc = self.snapshot().data_centers.remove(0);
        let mut state = SandboxState {
            affinity_groups: dc.affinity_groups.clone(),
            storage_accounts: dc.storage_accounts.clone(),
            network: dc.network_configuration.as_ref().map(|n| n.virtual_network.clone()),
            ..Default::default()
        };

        for service in &dc.cloud_services {
            let deployments = service
                .deployment
                .iter()
                .map(|deployment| SandboxDeployment {
                    slot: DeploymentSlot::Production,
                    details: DeploymentDetails {
                        name: deployment.name.clone(),
                        label: deployment.label.clone(),
                        virtual_network_name: deployment.virtual_network_name.clone(),
                        roles: deployment
                            .virtual_machines
                            .iter()
                            .map(|vm| Role {
                                role_name: vm.role_name.clone(),
                                role_type: vm.role_type.clone(),
                                role_size: vm.role_size.clone(),
                                os_disk: Some(vm.os_disk.clone()),
                                ..Default::default()
                            })
                            .collect(),
                        role_instances: deployment
                            .virtual_machines
                            .iter()
                            .map(|vm| RoleInstance {
                                role_name: vm.role_name.clone(),
                                instance_status: STATUS_READY_ROLE.to_string(),
                            })
                            .collect(),
                        ..Default::default()
                    },
                })
                .collect();
            state.cloud_services.push(SandboxService {
                service: CloudService {
                    deployment: None,
                    ..service.clone()
                },
                deployments,
            });

            for vm in service.virtual_machines() {
                state = state.with_blob(&vm.os_disk.media_link, 1024);
            }
        }

        SandboxProvider::new("source", state)
    }

    /// Empty destination environment; copies finish on the first poll
    pub fn destination(&self) -> SandboxProvider {
        SandboxProvider::new("destination", SandboxState::default()).with_copy_polls(0)
    }
}
