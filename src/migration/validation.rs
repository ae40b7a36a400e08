//! Pre-flight checks of a renamed working copy against the destination.
//!
//! Nothing here mutates either environment. Every violation is collected and
//! reported together as one [`MigrationError::Validation`].

use std::collections::{BTreeMap, BTreeSet};

use lazy_static::lazy_static;
use regex::Regex;
use tracing::{debug, warn};

use super::error::{MigrationError, Result};
use super::model::{CloudService, DataCenter, NetworkConfiguration, StorageAccount};
use super::resource_type::ResourceType;
use super::retry::RetryPolicy;
use crate::cloud::{BlobLocation, CloudProvider, SubscriptionCapacity};

/// Affinity groups a destination subscription can hold
pub const MAX_AFFINITY_GROUPS: usize = 256;

const STORAGE_NAME_LENGTH: (usize, usize) = (3, 24);
const VM_NAME_LENGTH: (usize, usize) = (3, 15);

lazy_static! {
    static ref STORAGE_NAME_PATTERN: Regex =
        Regex::new(r"^[a-z0-9]+$").expect("Invalid storage account name regex");
}

/// Names in `names` that occur more than once, ignoring case
fn duplicates<'n>(names: impl IntoIterator<Item = &'n str>) -> Vec<String> {
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for name in names {
        *counts.entry(name.to_lowercase()).or_default() += 1;
    }
    counts
        .into_iter()
        .filter(|(_, count)| *count > 1)
        .map(|(name, _)| name)
        .collect()
}

fn length_within(name: &str, (min, max): (usize, usize)) -> bool {
    (min..=max).contains(&name.chars().count())
}

fn free(max: u32, current: u32) -> usize {
    max.saturating_sub(current) as usize
}

/// Runs the checks of one data center and accumulates violations
pub struct Validator<'a> {
    source: &'a dyn CloudProvider,
    destination: &'a dyn CloudProvider,
    policy: &'a RetryPolicy,
    violations: Vec<String>,
}

impl<'a> Validator<'a> {
    pub fn new(source: &'a dyn CloudProvider, destination: &'a dyn CloudProvider, policy: &'a RetryPolicy) -> Self {
        Self {
            source,
            destination,
            policy,
            violations: Vec::new(),
        }
    }

    fn violation(&mut self, message: String) {
        debug!(violation = %message, "Validation failed");
        self.violations.push(message);
    }

    /// Validate the renamed data center; remote failures abort immediately
    pub async fn validate(mut self, dc: &DataCenter) -> Result<()> {
        self.check_capacity(dc).await?;
        self.check_affinity_groups(dc).await?;
        if let Some(network) = dc.network_configuration.as_ref().filter(|n| !n.is_imported) {
            self.check_network(network).await?;
        }
        self.check_storage_accounts(&dc.storage_accounts).await?;
        self.check_cloud_services(&dc.cloud_services).await?;

        if self.violations.is_empty() {
            Ok(())
        } else {
            Err(MigrationError::Validation(self.violations))
        }
    }

    async fn check_capacity(&mut self, dc: &DataCenter) -> Result<()> {
        let destination = self.destination;
        let capacity: SubscriptionCapacity = self
            .policy
            .operation(ResourceType::DataCenter, &dc.location_name)
            .run(|| destination.subscription_capacity())
            .await?;

        let services = dc.cloud_services.iter().filter(|s| !s.is_imported).count();
        if free(capacity.max_hosted_services, capacity.current_hosted_services) < services {
            self.violation(format!("Insufficient capacity for {} cloud service(s)", services));
        }

        let accounts = dc.storage_accounts.iter().filter(|a| !a.is_imported).count();
        if free(capacity.max_storage_accounts, capacity.current_storage_accounts) < accounts {
            self.violation(format!("Insufficient capacity for {} storage account(s)", accounts));
        }

        if let Some(network) = dc.network_configuration.as_ref().filter(|n| !n.is_imported) {
            let config = &network.virtual_network;
            if free(capacity.max_virtual_network_sites, capacity.current_virtual_network_sites)
                < config.virtual_network_sites.len()
            {
                self.violation("Insufficient capacity for virtual network sites".to_string());
            }
            if free(capacity.max_dns_servers, capacity.current_dns_servers) < config.dns_servers.len() {
                self.violation("Insufficient capacity for DNS servers".to_string());
            }
            if free(capacity.max_local_network_sites, capacity.current_local_network_sites)
                < config.local_network_sites.len()
            {
                self.violation("Insufficient capacity for local network sites".to_string());
            }
        }

        let role_sizes = self
            .policy
            .operation(ResourceType::VirtualMachine, "role sizes")
            .run(|| destination.list_role_sizes())
            .await?;
        let cores_by_size: BTreeMap<String, u32> = role_sizes
            .into_iter()
            .map(|size| (size.name.to_lowercase(), size.cores))
            .collect();

        let mut cores: usize = 0;
        for vm in dc
            .cloud_services
            .iter()
            .flat_map(|s| s.virtual_machines())
            .filter(|vm| !vm.is_imported)
        {
            match cores_by_size.get(&vm.role_size.to_lowercase()) {
                Some(count) => cores += *count as usize,
                None => warn!(vm = %vm.role_name, size = %vm.role_size, "Unknown role size counted as 0 cores"),
            }
        }
        if free(capacity.max_core_count, capacity.current_core_count) < cores {
            self.violation(format!("Insufficient capacity for {} core(s)", cores));
        }

        Ok(())
    }

    async fn check_affinity_groups(&mut self, dc: &DataCenter) -> Result<()> {
        let destination = self.destination;
        let existing = self
            .policy
            .operation(ResourceType::AffinityGroup, "*")
            .run(|| destination.list_affinity_groups())
            .await?;

        let pending: Vec<_> = dc.affinity_groups.iter().filter(|g| !g.is_imported).collect();
        if MAX_AFFINITY_GROUPS.saturating_sub(existing.len()) < pending.len() {
            self.violation(format!("Insufficient capacity for {} affinity group(s)", pending.len()));
        }

        for group in pending {
            if existing.iter().any(|e| e.name.eq_ignore_ascii_case(&group.name)) {
                self.violation(format!("Affinity group '{}' already exists in destination", group.name));
            }
        }

        for name in duplicates(dc.affinity_groups.iter().map(|g| g.name.as_str())) {
            self.violation(format!("Duplicate affinity group name '{}'", name));
        }
        Ok(())
    }

    async fn check_network(&mut self, network: &NetworkConfiguration) -> Result<()> {
        let destination = self.destination;
        let existing = self
            .policy
            .operation(ResourceType::NetworkConfiguration, "*")
            .run_or_absent(|| destination.get_network_configuration())
            .await?
            .unwrap_or_default();
        let config = &network.virtual_network;

        let collisions = |kind: &str, incoming: Vec<&str>, present: Vec<&str>| -> Vec<String> {
            let present: BTreeSet<String> = present.into_iter().map(str::to_lowercase).collect();
            incoming
                .into_iter()
                .filter(|name| present.contains(&name.to_lowercase()))
                .map(|name| format!("{} '{}' already exists in destination", kind, name))
                .collect()
        };

        let mut found = collisions(
            "Virtual network site",
            config.virtual_network_sites.iter().map(|v| v.name.as_str()).collect(),
            existing.virtual_network_sites.iter().map(|v| v.name.as_str()).collect(),
        );
        found.extend(collisions(
            "DNS server",
            config.dns_servers.iter().map(|d| d.name.as_str()).collect(),
            existing.dns_servers.iter().map(|d| d.name.as_str()).collect(),
        ));
        found.extend(collisions(
            "Local network site",
            config.local_network_sites.iter().map(|l| l.name.as_str()).collect(),
            existing.local_network_sites.iter().map(|l| l.name.as_str()).collect(),
        ));
        for message in found {
            self.violation(message);
        }

        for name in duplicates(config.virtual_network_sites.iter().map(|v| v.name.as_str())) {
            self.violation(format!("Duplicate virtual network site name '{}'", name));
        }
        for name in duplicates(config.dns_servers.iter().map(|d| d.name.as_str())) {
            self.violation(format!("Duplicate DNS server name '{}'", name));
        }
        for name in duplicates(config.local_network_sites.iter().map(|l| l.name.as_str())) {
            self.violation(format!("Duplicate local network site name '{}'", name));
        }
        Ok(())
    }

    async fn check_storage_accounts(&mut self, accounts: &[StorageAccount]) -> Result<()> {
        let destination = self.destination;
        for account in accounts.iter().filter(|a| !a.is_imported) {
            if !length_within(&account.name, STORAGE_NAME_LENGTH) || !STORAGE_NAME_PATTERN.is_match(&account.name) {
                self.violation(format!(
                    "Storage account name '{}' must be 3 to 24 lower-case letters or digits",
                    account.name
                ));
                continue;
            }

            let name = account.name.as_str();
            let available = self
                .policy
                .operation(ResourceType::StorageAccount, name)
                .run(|| destination.is_storage_account_name_available(name))
                .await?;
            if !available {
                self.violation(format!("Storage account '{}' already exists", name));
            }
        }

        for name in duplicates(accounts.iter().map(|a| a.name.as_str())) {
            self.violation(format!("Duplicate storage account name '{}'", name));
        }
        Ok(())
    }

    async fn check_cloud_services(&mut self, services: &[CloudService]) -> Result<()> {
        let destination = self.destination;

        let reserved_names = services
            .iter()
            .filter_map(|s| s.deployment.as_ref())
            .filter_map(|d| d.reserved_ip_name.as_deref());
        for name in duplicates(reserved_names) {
            self.violation(format!("Reserved IP '{}' is used by more than one deployment", name));
        }

        let needs_reserved_ips = services
            .iter()
            .filter(|s| !s.is_imported)
            .any(|s| s.deployment.as_ref().is_some_and(|d| d.reserved_ip_name.is_some()));
        let reserved_ips = if needs_reserved_ips {
            self.policy
                .operation(ResourceType::ReservedIp, "*")
                .run(|| destination.list_reserved_ips())
                .await?
        } else {
            Vec::new()
        };

        for service in services {
            if !service.is_imported {
                let name = service.service_name.as_str();
                let available = self
                    .policy
                    .operation(ResourceType::CloudService, name)
                    .run(|| destination.is_cloud_service_name_available(name))
                    .await?;
                if !available {
                    self.violation(format!("Cloud service '{}' already exists", name));
                }

                if let Some(ip_name) = service.deployment.as_ref().and_then(|d| d.reserved_ip_name.as_deref()) {
                    match reserved_ips.iter().find(|ip| ip.name.eq_ignore_ascii_case(ip_name)) {
                        None => self.violation(format!("Reserved IP '{}' does not exist in destination", ip_name)),
                        Some(ip) => {
                            if let Some(holder) = ip.service_name.as_deref()
                                && !holder.eq_ignore_ascii_case(name)
                            {
                                self.violation(format!(
                                    "Reserved IP '{}' is already in use by cloud service '{}'",
                                    ip_name, holder
                                ));
                            }
                        }
                    }
                }
            }

            self.check_virtual_machines(service).await?;
        }

        for name in duplicates(services.iter().map(|s| s.service_name.as_str())) {
            self.violation(format!("Duplicate cloud service name '{}'", name));
        }
        Ok(())
    }

    async fn check_virtual_machines(&mut self, service: &CloudService) -> Result<()> {
        let vms = service.virtual_machines();

        for vm in vms.iter().filter(|vm| !vm.is_imported) {
            if !length_within(&vm.role_name, VM_NAME_LENGTH) {
                self.violation(format!(
                    "Virtual machine name '{}' must be 3 to 15 characters long",
                    vm.role_name
                ));
            }
            for disk in vm.disks() {
                self.check_source_blob(disk.resource_type, disk.media_link).await?;
            }
        }

        for name in duplicates(vms.iter().map(|vm| vm.role_name.as_str())) {
            self.violation(format!(
                "Duplicate virtual machine name '{}' in cloud service '{}'",
                name, service.service_name
            ));
        }
        Ok(())
    }

    async fn check_source_blob(&mut self, disk_type: ResourceType, media_link: &str) -> Result<()> {
        let location = match BlobLocation::parse(media_link) {
            Ok(location) => location,
            Err(e) => {
                self.violation(e.to_string());
                return Ok(());
            }
        };

        let source = self.source;
        let properties = self
            .policy
            .operation(ResourceType::Blob, location.to_string())
            .run_or_absent(|| source.blob_properties(&location))
            .await?;
        if properties.is_none() {
            self.violation(format!("Source {} blob '{}' does not exist", disk_type, media_link));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cloud::{ReservedIp, SandboxProvider, SandboxState};
    use crate::migration::model::*;
    use std::time::Duration;

    fn quick_policy() -> RetryPolicy {
        RetryPolicy {
            retry_count: 1,
            min_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(1),
            delta_backoff: Duration::from_millis(1),
            operation_timeout: None,
        }
    }

    const OS_LINK: &str = "https://sa1.blob.core.windows.net/vhds/disk1.vhd";

    fn renamed_dc() -> DataCenter {
        DataCenter {
            location_name: "West US".to_string(),
            affinity_groups: vec![AffinityGroup {
                name: "dcag1".to_string(),
                location: "West US".to_string(),
                ..Default::default()
            }],
            storage_accounts: vec![StorageAccount {
                name: "dcsa1".to_string(),
                affinity_group: Some("dcag1".to_string()),
                ..Default::default()
            }],
            cloud_services: vec![CloudService {
                service_name: "dcsvc1".to_string(),
                deployment: Some(Deployment {
                    name: "dcdeploy1".to_string(),
                    virtual_machines: vec![VirtualMachine {
                        role_name: "vm1".to_string(),
                        role_size: "Small".to_string(),
                        os_disk: OsDisk {
                            disk_name: "dcdisk1".to_string(),
                            media_link: OS_LINK.to_string(),
                            ..Default::default()
                        },
                        ..Default::default()
                    }],
                    ..Default::default()
                }),
                ..Default::default()
            }],
            network_configuration: None,
            is_imported: false,
        }
    }

    fn source() -> SandboxProvider {
        SandboxProvider::new("source", SandboxState::default().with_blob(OS_LINK, 1024))
    }

    #[tokio::test]
    async fn test_clean_data_center_passes() {
        let source = source();
        let destination = SandboxProvider::new("dest", SandboxState::default());
        let policy = quick_policy();

        Validator::new(&source, &destination, &policy)
            .validate(&renamed_dc())
            .await
            .unwrap();
        assert!(destination.calls_matching("create_").is_empty());
    }

    #[tokio::test]
    async fn test_all_violations_are_reported_together() {
        let source = SandboxProvider::new("source", SandboxState::default());
        let mut state = SandboxState::default();
        state.affinity_groups.push(AffinityGroup {
            name: "DCAG1".to_string(),
            location: "North Europe".to_string(),
            ..Default::default()
        });
        state.capacity.max_core_count = 0;
        let destination = SandboxProvider::new("dest", state);
        let policy = quick_policy();

        let mut dc = renamed_dc();
        dc.storage_accounts[0].name = "dc_SA".to_string();
        dc.cloud_services[0].deployment.as_mut().unwrap().virtual_machines[0].role_name = "v".to_string();

        let err = Validator::new(&source, &destination, &policy)
            .validate(&dc)
            .await
            .unwrap_err();
        let MigrationError::Validation(violations) = err else {
            panic!("expected validation error");
        };
        let text = violations.join("\n");
        assert!(text.contains("core"));
        assert!(text.contains("Affinity group 'dcag1' already exists"));
        assert!(text.contains("dc_SA"));
        assert!(text.contains("'v' must be 3 to 15"));
        assert!(text.contains("does not exist"));
        assert_eq!(violations.len(), 5);
    }

    #[tokio::test]
    async fn test_imported_resources_skip_collision_checks() {
        let source = source();
        let mut state = SandboxState::default();
        state.affinity_groups.push(AffinityGroup {
            name: "dcag1".to_string(),
            location: "West US".to_string(),
            ..Default::default()
        });
        let destination = SandboxProvider::new("dest", state);
        let policy = quick_policy();

        let mut dc = renamed_dc();
        dc.affinity_groups[0].is_imported = true;
        Validator::new(&source, &destination, &policy)
            .validate(&dc)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_reserved_ip_checks() {
        let source = source();
        let mut state = SandboxState::default();
        state.reserved_ips.push(ReservedIp {
            name: "ip1".to_string(),
            service_name: Some("other".to_string()),
            location: None,
        });
        let destination = SandboxProvider::new("dest", state);
        let policy = quick_policy();

        let mut dc = renamed_dc();
        dc.cloud_services[0].deployment.as_mut().unwrap().reserved_ip_name = Some("ip1".to_string());
        let mut second = dc.cloud_services[0].clone();
        second.service_name = "dcsvc2".to_string();
        second.deployment.as_mut().unwrap().reserved_ip_name = Some("ip2".to_string());
        dc.cloud_services.push(second);

        let err = Validator::new(&source, &destination, &policy)
            .validate(&dc)
            .await
            .unwrap_err();
        let text = err.to_string();
        assert!(text.contains("already in use by cloud service 'other'"));
        assert!(text.contains("Reserved IP 'ip2' does not exist"));
    }

    #[tokio::test]
    async fn test_network_collisions_and_duplicates() {
        let source = source();
        let mut state = SandboxState::default();
        state.network = Some(VirtualNetworkConfiguration {
            virtual_network_sites: vec![VirtualNetworkSite {
                name: "dcvnet1".to_string(),
                ..Default::default()
            }],
            ..Default::default()
        });
        let destination = SandboxProvider::new("dest", state);
        let policy = quick_policy();

        let mut dc = renamed_dc();
        dc.network_configuration = Some(NetworkConfiguration {
            virtual_network: VirtualNetworkConfiguration {
                dns_servers: vec![
                    DnsServer {
                        name: "dcdns".to_string(),
                        ip_address: "10.0.0.4".to_string(),
                    },
                    DnsServer {
                        name: "DCDNS".to_string(),
                        ip_address: "10.0.0.5".to_string(),
                    },
                ],
                virtual_network_sites: vec![VirtualNetworkSite {
                    name: "dcvnet1".to_string(),
                    ..Default::default()
                }],
                ..Default::default()
            },
            is_imported: false,
        });

        let err = Validator::new(&source, &destination, &policy)
            .validate(&dc)
            .await
            .unwrap_err();
        let text = err.to_string();
        assert!(text.contains("Virtual network site 'dcvnet1' already exists"));
        assert!(text.contains("Duplicate DNS server name 'dcdns'"));
    }

    #[test]
    fn test_duplicates_ignore_case() {
        assert_eq!(duplicates(["a", "B", "b", "c"]), vec!["b".to_string()]);
        assert!(duplicates(["a", "b"]).is_empty());
    }
}
