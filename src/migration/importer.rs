//! Resumable tiered import engine
//!
//! Each data center moves through six strictly ordered stages:
//!
//! 1. validation of the renamed working copy (no mutation)
//! 2. affinity groups
//! 3. storage accounts
//! 4. disk replication
//! 5. network configuration merge
//! 6. cloud services, deployments and virtual machines
//!
//! Resources inside a stage are created concurrently. Every commit is recorded
//! in the [`ProgressStore`] before the next unit of work starts, and anything
//! already flagged as imported is skipped, so an interrupted run resumes from
//! the same progress document.

use std::time::Duration;

use futures::FutureExt;
use tracing::{debug, error, info};

use super::blobs::BlobReplicator;
use super::error::Result;
use super::model::{
    AffinityGroup, CloudService, DataCenter, Deployment, StorageAccount, VirtualMachine, VirtualNetworkConfiguration,
};
use super::network;
use super::parallel::{CancellationFlag, run_tier};
use super::progress::{ProgressKey, ProgressStore};
use super::rename::apply_destination_names;
use super::reporter::ProgressReporter;
use super::resource_type::ResourceType;
use super::retry::RetryPolicy;
use super::validation::Validator;
use crate::cloud::{BlobLocation, CloudProvider, DeploymentSlot, DeploymentSpec, PostShutdownAction, Role};

pub const IMPORT_STAGES: usize = 6;

/// Tunables of an import run
#[derive(Debug, Clone, PartialEq)]
pub struct ImportSettings {
    /// Location every created resource without an affinity group lands in
    pub destination_location: String,
    pub copy_poll_interval: Duration,
    pub max_parallelism: usize,
}

pub struct ImportEngine<'a> {
    source: &'a dyn CloudProvider,
    destination: &'a dyn CloudProvider,
    policy: &'a RetryPolicy,
    reporter: &'a ProgressReporter,
    store: &'a ProgressStore,
    cancel: &'a CancellationFlag,
    settings: &'a ImportSettings,
}

impl<'a> ImportEngine<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        source: &'a dyn CloudProvider,
        destination: &'a dyn CloudProvider,
        policy: &'a RetryPolicy,
        reporter: &'a ProgressReporter,
        store: &'a ProgressStore,
        cancel: &'a CancellationFlag,
        settings: &'a ImportSettings,
    ) -> Self {
        Self {
            source,
            destination,
            policy,
            reporter,
            store,
            cancel,
            settings,
        }
    }

    /// Import every data center of the progress document that is not yet imported
    pub async fn run(&self) -> Result<()> {
        let progress = self.store.snapshot()?;
        let mut working = progress.clone();
        apply_destination_names(&mut working, self.store.registry(), &self.settings.destination_location);

        for (source_dc, dc) in progress.data_centers.iter().zip(&working.data_centers) {
            if dc.is_imported {
                info!(location = %dc.location_name, "Data center already imported, skipping");
                continue;
            }
            self.import_data_center(source_dc, dc).await?;
        }
        Ok(())
    }

    /// `source_dc` carries source names, `dc` the same data center renamed
    async fn import_data_center(&self, source_dc: &DataCenter, dc: &DataCenter) -> Result<()> {
        let parallelism = self.settings.max_parallelism;
        info!(
            location = %dc.location_name,
            destination = %self.settings.destination_location,
            "Importing data center"
        );

        self.reporter.stage(1, IMPORT_STAGES, "Validating destination");
        Validator::new(self.source, self.destination, self.policy)
            .validate(dc)
            .await?;
        self.cancel.check()?;

        self.reporter.stage(2, IMPORT_STAGES, "Creating affinity groups");
        let groups = dc
            .affinity_groups
            .iter()
            .filter(|g| !g.is_imported)
            .map(|g| (g.name.clone(), g))
            .collect();
        run_tier(groups, parallelism, self.cancel, |g| self.create_affinity_group(g)).await?;

        self.reporter.stage(3, IMPORT_STAGES, "Creating storage accounts");
        let accounts = dc
            .storage_accounts
            .iter()
            .filter(|a| !a.is_imported)
            .map(|a| (a.name.clone(), a))
            .collect();
        run_tier(accounts, parallelism, self.cancel, |a| self.create_storage_account(a)).await?;

        self.reporter.stage(4, IMPORT_STAGES, "Copying disks");
        BlobReplicator::new(
            self.source,
            self.destination,
            self.policy,
            self.store.registry(),
            self.reporter,
            self.cancel,
            self.settings.copy_poll_interval,
            parallelism,
        )
        .replicate(source_dc)
        .await?;
        self.cancel.check()?;

        self.reporter.stage(5, IMPORT_STAGES, "Deploying network configuration");
        if let Some(config) = dc.network_configuration.as_ref().filter(|n| !n.is_imported) {
            self.deploy_network(&dc.location_name, &config.virtual_network).await?;
        }
        self.cancel.check()?;

        self.reporter.stage(6, IMPORT_STAGES, "Creating cloud services and virtual machines");
        let services = dc
            .cloud_services
            .iter()
            .map(|s| (s.service_name.clone(), s))
            .collect();
        run_tier(services, parallelism, self.cancel, |s| self.import_cloud_service(s)).await?;

        self.store.mark(ProgressKey::DataCenter(&dc.location_name), true)?;
        self.reporter
            .report(format!("Data center '{}' imported", dc.location_name));
        Ok(())
    }

    async fn create_affinity_group(&self, group: &AffinityGroup) -> Result<()> {
        let destination = self.destination;
        let name = group.name.as_str();
        let request = AffinityGroup {
            location: self.settings.destination_location.clone(),
            is_imported: false,
            ..group.clone()
        };

        self.reporter.report(format!("Creating affinity group '{}'", name));
        self.policy
            .operation(ResourceType::AffinityGroup, name)
            .with_prelude(move || self.discard_affinity_group(name).boxed())
            .run(|| destination.create_affinity_group(&request))
            .await?;
        self.store.mark(ProgressKey::AffinityGroup(name), true)?;
        self.reporter.report(format!("Affinity group '{}' created", name));
        Ok(())
    }

    async fn create_storage_account(&self, account: &StorageAccount) -> Result<()> {
        let destination = self.destination;
        let name = account.name.as_str();
        let request = StorageAccount {
            location: self.placement(account.affinity_group.as_deref()),
            label: None,
            is_imported: false,
            ..account.clone()
        };

        self.reporter.report(format!("Creating storage account '{}'", name));
        self.policy
            .operation(ResourceType::StorageAccount, name)
            .with_prelude(move || self.discard_storage_account(name).boxed())
            .run(|| destination.create_storage_account(&request))
            .await?;
        self.store.mark(ProgressKey::StorageAccount(name), true)?;
        self.reporter.report(format!("Storage account '{}' created", name));
        Ok(())
    }

    /// Location for a resource: none when it joins an affinity group
    fn placement(&self, affinity_group: Option<&str>) -> Option<String> {
        match affinity_group {
            Some(_) => None,
            None => Some(self.settings.destination_location.clone()),
        }
    }

    async fn deploy_network(&self, location: &str, incoming: &VirtualNetworkConfiguration) -> Result<()> {
        let destination = self.destination;
        let existing = self
            .policy
            .operation(ResourceType::NetworkConfiguration, "*")
            .run_or_absent(|| destination.get_network_configuration())
            .await?
            .unwrap_or_default();

        let merged = network::merge(&existing, incoming);
        debug!(
            sites = merged.virtual_network_sites.len(),
            dns_servers = merged.dns_servers.len(),
            local_sites = merged.local_network_sites.len(),
            "Merged network configuration"
        );
        self.policy
            .operation(ResourceType::NetworkConfiguration, location)
            .run(|| destination.set_network_configuration(&merged))
            .await?;
        self.store.mark(ProgressKey::NetworkConfiguration(location), true)?;
        self.reporter.report("Network configuration deployed");
        Ok(())
    }

    async fn import_cloud_service(&self, service: &CloudService) -> Result<()> {
        let destination = self.destination;
        let name = service.service_name.as_str();

        if !service.is_imported {
            let request = CloudService {
                label: None,
                location: self.placement(service.affinity_group.as_deref()),
                deployment: None,
                is_imported: false,
                ..service.clone()
            };
            self.reporter.report(format!("Creating cloud service '{}'", name));
            self.policy
                .operation(ResourceType::CloudService, name)
                .with_prelude(move || self.discard_cloud_service(name).boxed())
                .run(|| destination.create_cloud_service(&request))
                .await?;
            self.store.mark(ProgressKey::CloudService(name), true)?;
            self.reporter.report(format!("Cloud service '{}' created", name));
        }

        match &service.deployment {
            Some(deployment) if !deployment.is_imported && !deployment.virtual_machines.is_empty() => {
                self.import_deployment(name, deployment).await
            }
            _ => Ok(()),
        }
    }

    /// Create the deployment with its first machine, then add the rest one at a time
    async fn import_deployment(&self, service: &str, deployment: &Deployment) -> Result<()> {
        let destination = self.destination;
        let mut deployed = deployment.virtual_machines.iter().any(|vm| vm.is_imported);

        for vm in deployment.virtual_machines.iter().filter(|vm| !vm.is_imported) {
            self.cancel.check()?;
            let role = self.destination_role(vm)?;
            let vm_name = vm.role_name.as_str();

            if deployed {
                self.reporter.report(format!(
                    "Adding virtual machine '{}' to deployment '{}'",
                    vm_name, deployment.name
                ));
                self.policy
                    .operation(ResourceType::VirtualMachine, vm_name)
                    .with_prelude(move || {
                        self.discard_virtual_machine(service, &deployment.name, vm_name)
                            .boxed()
                    })
                    .run(|| destination.add_virtual_machine(service, &deployment.name, &role))
                    .await?;
            } else {
                let spec = DeploymentSpec {
                    name: deployment.name.clone(),
                    label: deployment.label.clone().unwrap_or_else(|| deployment.name.clone()),
                    slot: DeploymentSlot::Production,
                    dns_settings: deployment.dns_settings.clone(),
                    reserved_ip_name: deployment.reserved_ip_name.clone(),
                    load_balancers: deployment.load_balancers.clone(),
                    virtual_network_name: deployment.virtual_network_name.clone(),
                    role,
                };
                self.reporter.report(format!(
                    "Creating deployment '{}' with virtual machine '{}'",
                    deployment.name, vm_name
                ));
                self.policy
                    .operation(ResourceType::Deployment, &deployment.name)
                    .run(|| destination.create_deployment(service, &spec))
                    .await?;
                deployed = true;
            }

            self.store
                .mark(ProgressKey::VirtualMachine { service, vm: vm_name }, true)?;
            self.reporter
                .report(format!("Virtual machine '{}' created", vm_name));

            self.policy
                .operation(ResourceType::VirtualMachine, vm_name)
                .run(|| {
                    destination.shutdown_virtual_machine(
                        service,
                        &deployment.name,
                        vm_name,
                        PostShutdownAction::StoppedDeallocated,
                    )
                })
                .await?;
        }

        self.store.mark(
            ProgressKey::Deployment {
                service,
                deployment: &deployment.name,
            },
            true,
        )?;
        self.reporter
            .report(format!("Deployment '{}' imported", deployment.name));
        Ok(())
    }

    /// Role definition of `vm` with disks pointing at the copied blobs
    fn destination_role(&self, vm: &VirtualMachine) -> Result<Role> {
        let mut os_disk = vm.os_disk.clone();
        os_disk.media_link = self.destination_media_link(&os_disk.media_link)?;

        let mut data_disks = vm.data_disks.clone();
        for disk in &mut data_disks {
            disk.media_link = self.destination_media_link(&disk.media_link)?;
        }

        Ok(Role {
            role_name: vm.role_name.clone(),
            role_type: vm.role_type.clone(),
            role_size: vm.role_size.clone(),
            availability_set_name: vm.availability_set_name.clone(),
            os_disk: Some(os_disk),
            data_disks,
            configuration_sets: vm.configuration_sets.clone(),
            resource_extension_references: vm.resource_extension_references.clone(),
        })
    }

    fn destination_media_link(&self, source_link: &str) -> Result<String> {
        let blob = BlobLocation::parse(source_link)?;
        let account = self
            .store
            .registry()
            .destination_name(ResourceType::StorageAccount, &blob.account);
        Ok(blob.in_account(&account).uri())
    }

    async fn discard_affinity_group(&self, name: &str) {
        match self.destination.list_affinity_groups().await {
            Ok(groups) if groups.iter().any(|g| g.name.eq_ignore_ascii_case(name)) => {
                info!(affinity_group = name, "Removing partially created affinity group");
                if let Err(e) = self.destination.delete_affinity_group(name).await {
                    error!(affinity_group = name, error = %e, "Cleanup failed");
                }
            }
            Ok(_) => {}
            Err(e) => error!(affinity_group = name, error = %e, "Cleanup lookup failed"),
        }
    }

    async fn discard_storage_account(&self, name: &str) {
        match self.destination.list_storage_accounts().await {
            Ok(accounts) if accounts.iter().any(|a| a.name.eq_ignore_ascii_case(name)) => {
                info!(storage_account = name, "Removing partially created storage account");
                if let Err(e) = self.destination.delete_storage_account(name).await {
                    error!(storage_account = name, error = %e, "Cleanup failed");
                }
            }
            Ok(_) => {}
            Err(e) => error!(storage_account = name, error = %e, "Cleanup lookup failed"),
        }
    }

    async fn discard_cloud_service(&self, name: &str) {
        match self.destination.list_cloud_services().await {
            Ok(services) if services.iter().any(|s| s.service_name.eq_ignore_ascii_case(name)) => {
                info!(cloud_service = name, "Removing partially created cloud service");
                if let Err(e) = self.destination.delete_cloud_service(name).await {
                    error!(cloud_service = name, error = %e, "Cleanup failed");
                }
            }
            Ok(_) => {}
            Err(e) => error!(cloud_service = name, error = %e, "Cleanup lookup failed"),
        }
    }

    async fn discard_virtual_machine(&self, service: &str, deployment: &str, name: &str) {
        match self.destination.get_virtual_machine(service, deployment, name).await {
            Ok(_) => {
                info!(cloud_service = service, vm = name, "Removing partially created virtual machine");
                if let Err(e) = self
                    .destination
                    .delete_virtual_machine(service, deployment, name)
                    .await
                {
                    error!(cloud_service = service, vm = name, error = %e, "Cleanup failed");
                }
            }
            Err(e) if e.is_not_found() => {}
            Err(e) => error!(cloud_service = service, vm = name, error = %e, "Cleanup lookup failed"),
        }
    }
}
