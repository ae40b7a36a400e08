//! Applies destination names to the working copy of a snapshot.
//!
//! The import engine creates resources from a renamed copy while progress is
//! recorded against the untouched document. Data center location names and
//! disk media links stay as exported: the former key the progress document,
//! the latter still point at the source blobs that tier 3 copies.

use std::collections::BTreeMap;

use super::model::{CloudService, DataCenter, NetworkConfiguration, Subscription};
use super::names::NameRegistry;
use super::resource_type::ResourceType;

/// Rename every resource of `subscription` in place
pub fn apply_destination_names(subscription: &mut Subscription, registry: &NameRegistry, destination_location: &str) {
    for dc in &mut subscription.data_centers {
        rename_data_center(dc, registry, destination_location);
    }
}

fn rename_data_center(dc: &mut DataCenter, registry: &NameRegistry, destination_location: &str) {
    for group in &mut dc.affinity_groups {
        group.name = registry.destination_name(ResourceType::AffinityGroup, &group.name);
        group.label = None;
    }

    for account in &mut dc.storage_accounts {
        account.name = registry.destination_name(ResourceType::StorageAccount, &account.name);
        account.affinity_group = rename_group(registry, account.affinity_group.as_deref());
        if account.location.is_some() {
            account.location = Some(destination_location.to_string());
        }
    }

    if let Some(network) = &mut dc.network_configuration {
        rename_network(network, registry, destination_location);
    }

    for service in &mut dc.cloud_services {
        rename_service(service, registry, destination_location);
    }
}

fn rename_group(registry: &NameRegistry, group: Option<&str>) -> Option<String> {
    group.map(|g| registry.destination_name(ResourceType::AffinityGroup, g))
}

fn rename_network(network: &mut NetworkConfiguration, registry: &NameRegistry, destination_location: &str) {
    let config = &mut network.virtual_network;
    let mut dns_names = BTreeMap::new();
    let mut local_names = BTreeMap::new();

    for site in &mut config.virtual_network_sites {
        site.name = registry.destination_name(ResourceType::VirtualNetworkSite, &site.name);
        let scope = [(ResourceType::VirtualNetworkSite, site.name.as_str())];

        if site.location.is_some() {
            site.location = Some(destination_location.to_string());
        }
        site.affinity_group = rename_group(registry, site.affinity_group.as_deref());

        for dns in &mut site.dns_servers_ref {
            let renamed = registry.child_destination_name(&scope, ResourceType::DnsServer, dns);
            dns_names.insert(dns.to_lowercase(), renamed.clone());
            *dns = renamed;
        }

        if let Some(local) = site.gateway.as_mut().and_then(|g| g.local_network_site_ref.as_mut()) {
            let renamed = registry.child_destination_name(&scope, ResourceType::LocalNetworkSite, local);
            local_names.insert(local.to_lowercase(), renamed.clone());
            *local = renamed;
        }
    }

    for dns in &mut config.dns_servers {
        if let Some(renamed) = dns_names.get(&dns.name.to_lowercase()) {
            dns.name = renamed.clone();
        }
    }
    for local in &mut config.local_network_sites {
        if let Some(renamed) = local_names.get(&local.name.to_lowercase()) {
            local.name = renamed.clone();
        }
    }
}

fn rename_service(service: &mut CloudService, registry: &NameRegistry, destination_location: &str) {
    service.service_name = registry.destination_name(ResourceType::CloudService, &service.service_name);
    service.affinity_group = rename_group(registry, service.affinity_group.as_deref());
    if service.location.is_some() {
        service.location = Some(destination_location.to_string());
    }

    let Some(deployment) = &mut service.deployment else {
        return;
    };
    let service_scope = [(ResourceType::CloudService, service.service_name.as_str())];

    deployment.virtual_network_name = deployment
        .virtual_network_name
        .as_deref()
        .map(|v| registry.destination_name(ResourceType::VirtualNetworkSite, v));
    deployment.name = registry.child_destination_name(&service_scope, ResourceType::Deployment, &deployment.name);

    for vm in &mut deployment.virtual_machines {
        vm.role_name = registry.child_destination_name(&service_scope, ResourceType::VirtualMachine, &vm.role_name);
        let vm_scope = [
            (ResourceType::CloudService, service.service_name.as_str()),
            (ResourceType::VirtualMachine, vm.role_name.as_str()),
        ];
        vm.os_disk.disk_name = registry.child_destination_name(&vm_scope, ResourceType::OsDisk, &vm.os_disk.disk_name);
        for disk in &mut vm.data_disks {
            disk.disk_name = registry.child_destination_name(&vm_scope, ResourceType::DataDisk, &disk.disk_name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migration::model::*;
    use crate::migration::resource_type::NameLimits;

    fn snapshot() -> Subscription {
        Subscription {
            name: "contoso".to_string(),
            data_centers: vec![DataCenter {
                location_name: "West US".to_string(),
                affinity_groups: vec![AffinityGroup {
                    name: "ag1".to_string(),
                    label: Some("ag1".to_string()),
                    location: "West US".to_string(),
                    ..Default::default()
                }],
                storage_accounts: vec![StorageAccount {
                    name: "sa1".to_string(),
                    affinity_group: Some("ag1".to_string()),
                    ..Default::default()
                }],
                cloud_services: vec![CloudService {
                    service_name: "svc1".to_string(),
                    location: Some("West US".to_string()),
                    deployment: Some(Deployment {
                        name: "deploy1".to_string(),
                        virtual_network_name: Some("vnet1".to_string()),
                        virtual_machines: vec![VirtualMachine {
                            role_name: "vm1".to_string(),
                            role_size: "Small".to_string(),
                            os_disk: OsDisk {
                                disk_name: "disk1".to_string(),
                                media_link: "https://sa1.blob.core.windows.net/vhds/disk1.vhd".to_string(),
                                ..Default::default()
                            },
                            ..Default::default()
                        }],
                        ..Default::default()
                    }),
                    ..Default::default()
                }],
                network_configuration: Some(NetworkConfiguration {
                    virtual_network: VirtualNetworkConfiguration {
                        dns_servers: vec![DnsServer {
                            name: "dns1".to_string(),
                            ip_address: "10.0.0.4".to_string(),
                        }],
                        local_network_sites: vec![LocalNetworkSite {
                            name: "onprem".to_string(),
                            ..Default::default()
                        }],
                        virtual_network_sites: vec![VirtualNetworkSite {
                            name: "vnet1".to_string(),
                            affinity_group: Some("ag1".to_string()),
                            location: Some("West US".to_string()),
                            dns_servers_ref: vec!["dns1".to_string()],
                            gateway: Some(Gateway {
                                local_network_site_ref: Some("onprem".to_string()),
                                ..Default::default()
                            }),
                            ..Default::default()
                        }],
                    },
                    is_imported: false,
                }),
                is_imported: false,
            }],
        }
    }

    #[test]
    fn test_working_copy_gets_destination_names() {
        let mut subscription = snapshot();
        let registry = NameRegistry::generate(&subscription, "dc", NameLimits::default());
        apply_destination_names(&mut subscription, &registry, "North Europe");

        let dc = &subscription.data_centers[0];
        assert_eq!(dc.location_name, "West US");
        assert_eq!(dc.affinity_groups[0].name, "dcag1");
        assert!(dc.affinity_groups[0].label.is_none());
        assert_eq!(dc.storage_accounts[0].name, "dcsa1");
        assert_eq!(dc.storage_accounts[0].affinity_group.as_deref(), Some("dcag1"));

        let service = &dc.cloud_services[0];
        assert_eq!(service.service_name, "dcsvc1");
        assert_eq!(service.location.as_deref(), Some("North Europe"));
        let deployment = service.deployment.as_ref().unwrap();
        assert_eq!(deployment.name, "dcdeploy1");
        assert_eq!(deployment.virtual_network_name.as_deref(), Some("dcvnet1"));
        let vm = &deployment.virtual_machines[0];
        assert_eq!(vm.role_name, "vm1");
        assert_eq!(vm.os_disk.disk_name, "dcdisk1");
        assert!(vm.os_disk.media_link.starts_with("https://sa1."));
    }

    #[test]
    fn test_network_references_follow_renamed_entries() {
        let mut subscription = snapshot();
        let registry = NameRegistry::generate(&subscription, "dc", NameLimits::default());
        apply_destination_names(&mut subscription, &registry, "North Europe");

        let network = &subscription.data_centers[0]
            .network_configuration
            .as_ref()
            .unwrap()
            .virtual_network;
        let site = &network.virtual_network_sites[0];
        assert_eq!(site.name, "dcvnet1");
        assert_eq!(site.location.as_deref(), Some("North Europe"));
        assert_eq!(site.affinity_group.as_deref(), Some("dcag1"));
        assert_eq!(site.dns_servers_ref, vec!["dcdns1".to_string()]);
        assert_eq!(site.local_network_site_ref(), Some("dconprem"));
        assert_eq!(network.dns_servers[0].name, "dcdns1");
        assert_eq!(network.local_network_sites[0].name, "dconprem");
    }

    #[test]
    fn test_unmapped_names_are_kept() {
        let mut subscription = snapshot();
        let registry = NameRegistry::new("dc", NameLimits::default());
        apply_destination_names(&mut subscription, &registry, "North Europe");
        assert_eq!(subscription.data_centers[0].affinity_groups[0].name, "ag1");
    }
}
