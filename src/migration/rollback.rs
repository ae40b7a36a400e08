//! Rollback coordinator
//!
//! Undoes an import in reverse creation order: cloud services (which take
//! their deployments and virtual machines with them), storage accounts, the
//! network entries this import introduced, then affinity groups. Only
//! resources flagged as imported are touched. A failed deletion is recorded
//! and the sweep carries on with everything else.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tracing::{info, warn};

use super::error::Result;
use super::model::{CloudService, DataCenter, NetworkConfiguration};
use super::network::{self, NetworkNames};
use super::parallel::{CancellationFlag, UnitResult, run_units};
use super::progress::{ProgressKey, ProgressStore};
use super::rename::apply_destination_names;
use super::reporter::ProgressReporter;
use super::resource_type::ResourceType;
use super::retry::RetryPolicy;
use crate::cloud::CloudProvider;

pub const ROLLBACK_STAGES: usize = 4;

/// Tunables of a rollback run
#[derive(Debug, Clone, PartialEq)]
pub struct RollbackSettings {
    pub destination_location: String,
    /// Pause after a stage that deleted something
    pub cooldown: Duration,
    pub max_parallelism: usize,
}

/// Outcome of a rollback sweep
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RollbackResult {
    /// Resources actually deleted; already-absent ones are not counted
    pub removed: usize,
    /// `resource: error` for every deletion that failed
    pub failures: Vec<String>,
}

impl RollbackResult {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    fn absorb(&mut self, results: Vec<UnitResult>) {
        for result in results {
            if let Some(error) = result.error {
                self.failures.push(format!("{}: {}", result.label, error));
            }
        }
    }
}

impl fmt::Display for RollbackResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_complete() {
            write!(f, "Rollback complete, {} resource(s) removed", self.removed)
        } else {
            writeln!(
                f,
                "Rollback partial, {} resource(s) removed, {} failed:",
                self.removed,
                self.failures.len()
            )?;
            for failure in &self.failures {
                writeln!(f, "  {}", failure)?;
            }
            Ok(())
        }
    }
}

pub struct RollbackCoordinator<'a> {
    destination: &'a dyn CloudProvider,
    policy: &'a RetryPolicy,
    reporter: &'a ProgressReporter,
    store: &'a ProgressStore,
    settings: &'a RollbackSettings,
    // Never raised: rollback runs to the end even after an interrupt
    cancel: CancellationFlag,
}

impl<'a> RollbackCoordinator<'a> {
    pub fn new(
        destination: &'a dyn CloudProvider,
        policy: &'a RetryPolicy,
        reporter: &'a ProgressReporter,
        store: &'a ProgressStore,
        settings: &'a RollbackSettings,
    ) -> Self {
        Self {
            destination,
            policy,
            reporter,
            store,
            settings,
            cancel: CancellationFlag::new(),
        }
    }

    /// Remove every imported resource and reset its progress flag
    pub async fn roll_back(&self) -> Result<RollbackResult> {
        let mut working = self.store.snapshot()?;
        apply_destination_names(&mut working, self.store.registry(), &self.settings.destination_location);

        let mut result = RollbackResult::default();
        for dc in &working.data_centers {
            self.roll_back_data_center(dc, &mut result).await?;
        }
        self.store.flush()?;

        if result.is_complete() {
            info!(removed = result.removed, "Rollback complete");
        } else {
            warn!(removed = result.removed, failed = result.failures.len(), "Rollback incomplete");
        }
        Ok(result)
    }

    async fn roll_back_data_center(&self, dc: &DataCenter, result: &mut RollbackResult) -> Result<()> {
        info!(location = %dc.location_name, "Rolling back data center");

        self.reporter.stage(1, ROLLBACK_STAGES, "Removing cloud services");
        let removed = AtomicUsize::new(0);
        let services = dc
            .cloud_services
            .iter()
            .filter(|s| s.is_imported)
            .map(|s| (s.service_name.clone(), s))
            .collect();
        let results = run_units(services, self.settings.max_parallelism, &self.cancel, |s| {
            self.remove_cloud_service(s, &removed)
        })
        .await;
        self.finish_stage(results, &removed, result).await;

        self.reporter.stage(2, ROLLBACK_STAGES, "Removing storage accounts");
        let removed = AtomicUsize::new(0);
        let accounts = dc
            .storage_accounts
            .iter()
            .filter(|a| a.is_imported)
            .map(|a| (a.name.clone(), a.name.as_str()))
            .collect();
        let results = run_units(accounts, self.settings.max_parallelism, &self.cancel, |name| {
            self.remove_storage_account(name, &removed)
        })
        .await;
        self.finish_stage(results, &removed, result).await;

        self.reporter.stage(3, ROLLBACK_STAGES, "Removing network entries");
        let removed = AtomicUsize::new(0);
        if let Some(config) = dc.network_configuration.as_ref().filter(|n| n.is_imported) {
            let outcome = self.remove_network_entries(&dc.location_name, config, &removed).await;
            let label = format!("{} of '{}'", ResourceType::NetworkConfiguration, dc.location_name);
            let results = vec![match outcome {
                Ok(()) => UnitResult::success(label),
                Err(e) => UnitResult::failure(label, e),
            }];
            self.finish_stage(results, &removed, result).await;
        }

        self.reporter.stage(4, ROLLBACK_STAGES, "Removing affinity groups");
        let removed = AtomicUsize::new(0);
        let groups = dc
            .affinity_groups
            .iter()
            .filter(|g| g.is_imported)
            .map(|g| (g.name.clone(), g.name.as_str()))
            .collect();
        let results = run_units(groups, self.settings.max_parallelism, &self.cancel, |name| {
            self.remove_affinity_group(name, &removed)
        })
        .await;
        self.finish_stage(results, &removed, result).await;

        self.store.mark(ProgressKey::DataCenter(&dc.location_name), false)?;
        Ok(())
    }

    /// Record the stage outcome and cool down if anything was deleted
    async fn finish_stage(&self, results: Vec<UnitResult>, removed: &AtomicUsize, result: &mut RollbackResult) {
        let removed = removed.load(Ordering::SeqCst);
        result.removed += removed;
        result.absorb(results);

        if removed > 0 && !self.settings.cooldown.is_zero() {
            self.reporter.report(format!(
                "Waiting {}s for deletions to settle",
                self.settings.cooldown.as_secs()
            ));
            tokio::time::sleep(self.settings.cooldown).await;
        }
    }

    async fn remove_cloud_service(&self, service: &CloudService, removed: &AtomicUsize) -> Result<()> {
        let destination = self.destination;
        let name = service.service_name.as_str();

        self.reporter.report(format!("Deleting cloud service '{}'", name));
        let deleted = self
            .policy
            .operation(ResourceType::CloudService, name)
            .run_or_absent(|| destination.delete_cloud_service(name))
            .await?;
        if deleted.is_some() {
            removed.fetch_add(1, Ordering::SeqCst);
        }

        self.store.mark(ProgressKey::CloudService(name), false)?;
        if let Some(deployment) = &service.deployment {
            self.store.mark(
                ProgressKey::Deployment {
                    service: name,
                    deployment: &deployment.name,
                },
                false,
            )?;
            for vm in deployment.virtual_machines.iter().filter(|vm| vm.is_imported) {
                self.store
                    .mark(ProgressKey::VirtualMachine { service: name, vm: &vm.role_name }, false)?;
            }
        }
        self.reporter.report(format!("Cloud service '{}' deleted", name));
        Ok(())
    }

    async fn remove_storage_account(&self, name: &str, removed: &AtomicUsize) -> Result<()> {
        let destination = self.destination;
        self.reporter.report(format!("Deleting storage account '{}'", name));
        let deleted = self
            .policy
            .operation(ResourceType::StorageAccount, name)
            .run_or_absent(|| destination.delete_storage_account(name))
            .await?;
        if deleted.is_some() {
            removed.fetch_add(1, Ordering::SeqCst);
        }
        self.store.mark(ProgressKey::StorageAccount(name), false)?;
        self.reporter.report(format!("Storage account '{}' deleted", name));
        Ok(())
    }

    async fn remove_affinity_group(&self, name: &str, removed: &AtomicUsize) -> Result<()> {
        let destination = self.destination;
        self.reporter.report(format!("Deleting affinity group '{}'", name));
        let deleted = self
            .policy
            .operation(ResourceType::AffinityGroup, name)
            .run_or_absent(|| destination.delete_affinity_group(name))
            .await?;
        if deleted.is_some() {
            removed.fetch_add(1, Ordering::SeqCst);
        }
        self.store.mark(ProgressKey::AffinityGroup(name), false)?;
        self.reporter.report(format!("Affinity group '{}' deleted", name));
        Ok(())
    }

    /// Push the destination network document back without this import's entries
    async fn remove_network_entries(
        &self,
        location: &str,
        config: &NetworkConfiguration,
        removed: &AtomicUsize,
    ) -> Result<()> {
        let destination = self.destination;
        let names = NetworkNames::of(&config.virtual_network);

        let current = self
            .policy
            .operation(ResourceType::NetworkConfiguration, "*")
            .run_or_absent(|| destination.get_network_configuration())
            .await?;

        if let Some(mut current) = current
            && !names.is_empty()
        {
            let count = network::strip(&mut current, &names);
            if count > 0 {
                self.reporter
                    .report(format!("Removing {} network entries", count));
                self.policy
                    .operation(ResourceType::NetworkConfiguration, location)
                    .run(|| destination.set_network_configuration(&current))
                    .await?;
                removed.fetch_add(count, Ordering::SeqCst);
            }
        }

        self.store.mark(ProgressKey::NetworkConfiguration(location), false)?;
        Ok(())
    }
}
