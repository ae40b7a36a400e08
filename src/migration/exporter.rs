//! Resource graph export
//!
//! Builds the snapshot of one source location: its affinity groups, the
//! storage accounts and cloud services placed there (directly or through one
//! of those affinity groups), the production deployments' persistent VM roles
//! and the part of the network configuration the location uses.

use std::collections::BTreeSet;

use futures::future::try_join_all;
use tracing::{info, warn};

use super::error::Result;
use super::model::{
    AffinityGroup, CloudService, DataCenter, Deployment, NetworkConfiguration, PERSISTENT_VM_ROLE,
    StorageAccount, Subscription, VirtualMachine, VirtualNetworkConfiguration,
};
use super::reporter::ProgressReporter;
use super::resource_type::ResourceType;
use super::retry::RetryPolicy;
use crate::cloud::{CloudProvider, DeploymentDetails, DeploymentSlot, Role};

/// Number of stages reported by an export
pub const EXPORT_STAGES: usize = 4;

pub struct ResourceExporter<'a> {
    provider: &'a dyn CloudProvider,
    policy: &'a RetryPolicy,
    reporter: &'a ProgressReporter,
}

impl<'a> ResourceExporter<'a> {
    pub fn new(provider: &'a dyn CloudProvider, policy: &'a RetryPolicy, reporter: &'a ProgressReporter) -> Self {
        Self {
            provider,
            policy,
            reporter,
        }
    }

    /// Snapshot everything in `location`; all `is_imported` flags start false
    pub async fn export(&self, subscription_name: &str, location: &str) -> Result<Subscription> {
        self.reporter
            .report(format!("Export of data center '{}' started", location));

        let provider = self.provider;
        let groups = self
            .policy
            .operation(ResourceType::AffinityGroup, "*")
            .run(|| provider.list_affinity_groups())
            .await?;
        let services = self
            .policy
            .operation(ResourceType::CloudService, "*")
            .run(|| provider.list_cloud_services())
            .await?;
        let network = self
            .policy
            .operation(ResourceType::NetworkConfiguration, "*")
            .run_or_absent(|| provider.get_network_configuration())
            .await?;
        let accounts = self
            .policy
            .operation(ResourceType::StorageAccount, "*")
            .run(|| provider.list_storage_accounts())
            .await?;

        self.reporter.stage(1, EXPORT_STAGES, "Exporting affinity groups");
        let affinity_groups = filter_affinity_groups(groups, location);
        let group_names: BTreeSet<String> = affinity_groups.iter().map(|g| g.name.to_lowercase()).collect();

        self.reporter.stage(2, EXPORT_STAGES, "Exporting virtual network configuration");
        let network_configuration = network
            .map(|config| filter_network(config, location, &group_names))
            .filter(|config| !config.is_empty())
            .map(|virtual_network| NetworkConfiguration {
                virtual_network,
                is_imported: false,
            });

        self.reporter.stage(3, EXPORT_STAGES, "Exporting cloud services");
        let cloud_services = try_join_all(
            services
                .into_iter()
                .filter(|s| is_resident(s.location.as_deref(), s.affinity_group.as_deref(), location, &group_names))
                .map(|service| self.export_service(service)),
        )
        .await?;

        self.reporter.stage(4, EXPORT_STAGES, "Exporting storage accounts");
        let storage_accounts = accounts
            .into_iter()
            .filter(|a| is_resident(a.location.as_deref(), a.affinity_group.as_deref(), location, &group_names))
            .map(|account| StorageAccount {
                is_imported: false,
                ..account
            })
            .collect::<Vec<_>>();

        info!(
            location,
            affinity_groups = affinity_groups.len(),
            storage_accounts = storage_accounts.len(),
            cloud_services = cloud_services.len(),
            "Export completed"
        );

        Ok(Subscription {
            name: subscription_name.to_string(),
            data_centers: vec![DataCenter {
                location_name: location.to_string(),
                affinity_groups,
                storage_accounts,
                cloud_services,
                network_configuration,
                is_imported: false,
            }],
        })
    }

    async fn export_service(&self, service: CloudService) -> Result<CloudService> {
        let provider = self.provider;
        let name = service.service_name.clone();
        let details = self
            .policy
            .operation(ResourceType::Deployment, &name)
            .run_or_absent(|| provider.get_deployment_by_slot(&name, DeploymentSlot::Production))
            .await?;

        Ok(CloudService {
            deployment: details.map(|d| export_deployment(&name, d)),
            is_imported: false,
            ..service
        })
    }
}

fn filter_affinity_groups(groups: Vec<AffinityGroup>, location: &str) -> Vec<AffinityGroup> {
    groups
        .into_iter()
        .filter(|g| g.location.eq_ignore_ascii_case(location))
        .map(|g| AffinityGroup {
            is_imported: false,
            ..g
        })
        .collect()
}

/// Placed in `location` directly, or without a location in one of its affinity groups
fn is_resident(
    resource_location: Option<&str>,
    affinity_group: Option<&str>,
    location: &str,
    group_names: &BTreeSet<String>,
) -> bool {
    match resource_location {
        Some(l) => l.eq_ignore_ascii_case(location),
        None => affinity_group.is_some_and(|g| group_names.contains(&g.to_lowercase())),
    }
}

fn export_deployment(service: &str, details: DeploymentDetails) -> Deployment {
    let virtual_machines = details
        .roles
        .into_iter()
        .filter(|r| r.role_type == PERSISTENT_VM_ROLE)
        .filter_map(|role| {
            let name = role.role_name.clone();
            let vm = virtual_machine(role);
            if vm.is_none() {
                warn!(service, role = %name, "Role without OS disk skipped");
            }
            vm
        })
        .collect();

    Deployment {
        name: details.name,
        label: details.label,
        dns_settings: details.dns_settings,
        reserved_ip_name: details.reserved_ip_name,
        load_balancers: details.load_balancers,
        virtual_network_name: details.virtual_network_name,
        virtual_machines,
        is_imported: false,
    }
}

fn virtual_machine(role: Role) -> Option<VirtualMachine> {
    Some(VirtualMachine {
        os_disk: role.os_disk?,
        role_name: role.role_name,
        role_size: role.role_size,
        role_type: role.role_type,
        availability_set_name: role.availability_set_name,
        data_disks: role.data_disks,
        configuration_sets: role.configuration_sets,
        resource_extension_references: role.resource_extension_references,
        is_imported: false,
    })
}

/// Keep the sites of this location and the DNS servers and local sites they reference
fn filter_network(
    config: VirtualNetworkConfiguration,
    location: &str,
    group_names: &BTreeSet<String>,
) -> VirtualNetworkConfiguration {
    let virtual_network_sites: Vec<_> = config
        .virtual_network_sites
        .into_iter()
        .filter(|site| {
            site.affinity_group
                .as_deref()
                .is_some_and(|g| group_names.contains(&g.to_lowercase()))
                || site.location.as_deref().is_some_and(|l| l.eq_ignore_ascii_case(location))
        })
        .collect();

    // Network entry names are case-insensitive
    let dns_refs: BTreeSet<String> = virtual_network_sites
        .iter()
        .flat_map(|site| site.dns_servers_ref.iter().map(|r| r.to_lowercase()))
        .collect();
    let local_refs: BTreeSet<String> = virtual_network_sites
        .iter()
        .filter_map(|site| site.local_network_site_ref())
        .map(str::to_lowercase)
        .collect();

    let dns_servers = config
        .dns_servers
        .into_iter()
        .filter(|dns| dns_refs.contains(&dns.name.to_lowercase()))
        .collect();
    let local_network_sites = config
        .local_network_sites
        .into_iter()
        .filter(|local| local_refs.contains(&local.name.to_lowercase()))
        .collect();

    VirtualNetworkConfiguration {
        dns_servers,
        local_network_sites,
        virtual_network_sites,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cloud::{SandboxProvider, SandboxState};
    use crate::migration::error::{CloudError, MigrationError};
    use crate::migration::model::{DnsServer, Gateway, LocalNetworkSite, OsDisk, VirtualNetworkSite};
    use crate::traits::MockOutput;
    use std::sync::Arc;
    use std::time::Duration;

    fn quick_policy() -> RetryPolicy {
        RetryPolicy {
            retry_count: 2,
            min_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(2),
            delta_backoff: Duration::from_millis(1),
            operation_timeout: None,
        }
    }

    fn role(name: &str, role_type: &str) -> Role {
        Role {
            role_name: name.to_string(),
            role_type: role_type.to_string(),
            role_size: "Small".to_string(),
            os_disk: Some(OsDisk {
                disk_name: format!("{}-os", name),
                media_link: format!("https://sa1.blob.core.windows.net/vhds/{}-os.vhd", name),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    async fn source() -> SandboxProvider {
        let mut state = SandboxState::default();
        state.affinity_groups = vec![
            AffinityGroup {
                name: "ag1".to_string(),
                location: "West US".to_string(),
                ..Default::default()
            },
            AffinityGroup {
                name: "ag2".to_string(),
                location: "East US".to_string(),
                ..Default::default()
            },
        ];
        state.storage_accounts = vec![
            StorageAccount {
                name: "sa1".to_string(),
                affinity_group: Some("ag1".to_string()),
                ..Default::default()
            },
            StorageAccount {
                name: "sa2".to_string(),
                location: Some("East US".to_string()),
                ..Default::default()
            },
        ];
        state.network = Some(VirtualNetworkConfiguration {
            dns_servers: vec![
                DnsServer {
                    name: "dns1".to_string(),
                    ip_address: "10.0.0.4".to_string(),
                },
                DnsServer {
                    name: "dns2".to_string(),
                    ip_address: "10.0.0.5".to_string(),
                },
            ],
            local_network_sites: vec![LocalNetworkSite {
                name: "onprem".to_string(),
                ..Default::default()
            }],
            virtual_network_sites: vec![
                VirtualNetworkSite {
                    name: "vnet1".to_string(),
                    affinity_group: Some("ag1".to_string()),
                    dns_servers_ref: vec!["dns1".to_string()],
                    gateway: Some(Gateway {
                        local_network_site_ref: Some("onprem".to_string()),
                        ..Default::default()
                    }),
                    ..Default::default()
                },
                VirtualNetworkSite {
                    name: "vnet2".to_string(),
                    location: Some("East US".to_string()),
                    dns_servers_ref: vec!["dns2".to_string()],
                    ..Default::default()
                },
            ],
        });

        let sandbox = SandboxProvider::new("source", state);
        for (name, group) in [("svc1", "ag1"), ("svc2", "ag2")] {
            sandbox
                .create_cloud_service(&CloudService {
                    service_name: name.to_string(),
                    affinity_group: Some(group.to_string()),
                    ..Default::default()
                })
                .await
                .unwrap();
        }
        sandbox
            .create_deployment(
                "svc1",
                &crate::cloud::DeploymentSpec {
                    name: "deploy1".to_string(),
                    label: "deploy1".to_string(),
                    slot: DeploymentSlot::Production,
                    dns_settings: None,
                    reserved_ip_name: None,
                    load_balancers: Vec::new(),
                    virtual_network_name: Some("vnet1".to_string()),
                    role: role("vm1", PERSISTENT_VM_ROLE),
                },
            )
            .await
            .unwrap();
        sandbox
            .add_virtual_machine("svc1", "deploy1", &role("web", "WebRole"))
            .await
            .unwrap();
        sandbox
    }

    #[tokio::test]
    async fn test_export_filters_by_location() {
        let provider = source().await;
        let output = Arc::new(MockOutput::new());
        let reporter = ProgressReporter::new(output.clone(), false);
        let policy = quick_policy();

        let subscription = ResourceExporter::new(&provider, &policy, &reporter)
            .export("contoso", "west us")
            .await
            .unwrap();

        let dc = &subscription.data_centers[0];
        assert_eq!(dc.location_name, "west us");
        assert_eq!(dc.affinity_groups.len(), 1);
        assert_eq!(dc.affinity_groups[0].name, "ag1");
        assert_eq!(dc.storage_accounts.len(), 1);
        assert_eq!(dc.storage_accounts[0].name, "sa1");
        assert_eq!(dc.cloud_services.len(), 1);

        let vms = dc.cloud_services[0].virtual_machines();
        assert_eq!(vms.len(), 1);
        assert_eq!(vms[0].role_name, "vm1");

        let network = &dc.network_configuration.as_ref().unwrap().virtual_network;
        assert_eq!(network.virtual_network_sites.len(), 1);
        assert_eq!(network.dns_servers.len(), 1);
        assert_eq!(network.dns_servers[0].name, "dns1");
        assert_eq!(network.local_network_sites.len(), 1);

        assert_eq!(output.get_steps().len(), EXPORT_STAGES);
    }

    #[tokio::test]
    async fn test_missing_deployment_and_network_are_absent() {
        let provider = source().await;
        provider
            .delete_cloud_service("svc1")
            .await
            .unwrap();
        provider
            .create_cloud_service(&CloudService {
                service_name: "empty".to_string(),
                location: Some("West US".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        provider.fail_next("get_network_configuration", None, 1, CloudError::not_found("network"));

        let reporter = ProgressReporter::new(Arc::new(MockOutput::new()), true);
        let policy = quick_policy();
        let subscription = ResourceExporter::new(&provider, &policy, &reporter)
            .export("contoso", "West US")
            .await
            .unwrap();

        let dc = &subscription.data_centers[0];
        assert_eq!(dc.cloud_services.len(), 1);
        assert!(dc.cloud_services[0].deployment.is_none());
        assert!(dc.network_configuration.is_none());
    }

    #[tokio::test]
    async fn test_exhausted_list_call_aborts_export() {
        let provider = source().await;
        provider.fail_next("list_storage_accounts", None, 5, CloudError::remote("busy"));

        let reporter = ProgressReporter::new(Arc::new(MockOutput::new()), true);
        let policy = quick_policy();
        let err = ResourceExporter::new(&provider, &policy, &reporter)
            .export("contoso", "West US")
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            MigrationError::RetriesExhausted { resource_type: ResourceType::StorageAccount, .. }
        ));
        assert_eq!(provider.calls_matching("list_storage_accounts").len(), 2);
    }

    #[test]
    fn test_network_references_ignore_case() {
        let config = VirtualNetworkConfiguration {
            dns_servers: vec![
                DnsServer {
                    name: "dns1".to_string(),
                    ip_address: "10.0.0.4".to_string(),
                },
                DnsServer {
                    name: "dns2".to_string(),
                    ip_address: "10.0.0.5".to_string(),
                },
            ],
            local_network_sites: vec![LocalNetworkSite {
                name: "OnPrem".to_string(),
                ..Default::default()
            }],
            virtual_network_sites: vec![VirtualNetworkSite {
                name: "vnet1".to_string(),
                affinity_group: Some("AG1".to_string()),
                dns_servers_ref: vec!["DNS1".to_string()],
                gateway: Some(Gateway {
                    local_network_site_ref: Some("onprem".to_string()),
                    ..Default::default()
                }),
                ..Default::default()
            }],
        };
        let groups = BTreeSet::from(["ag1".to_string()]);

        let filtered = filter_network(config, "West US", &groups);

        assert_eq!(filtered.virtual_network_sites.len(), 1);
        assert_eq!(filtered.dns_servers.len(), 1);
        assert_eq!(filtered.dns_servers[0].name, "dns1");
        assert_eq!(filtered.local_network_sites[0].name, "OnPrem");
    }

    #[test]
    fn test_role_without_os_disk_is_skipped() {
        let mut details = DeploymentDetails {
            name: "d".to_string(),
            roles: vec![role("vm1", PERSISTENT_VM_ROLE), role("vm2", PERSISTENT_VM_ROLE)],
            ..Default::default()
        };
        details.roles[1].os_disk = None;

        let deployment = export_deployment("svc", details);
        assert_eq!(deployment.virtual_machines.len(), 1);
        assert!(!deployment.is_imported);
    }
}
