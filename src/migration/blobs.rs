//! Disk replication (tier 3).
//!
//! Source virtual machines are stopped first so their disks are consistent.
//! Every disk blob is then copied server-side into the renamed storage
//! account, keeping container and blob names. A destination blob that already
//! finished copying in an earlier run is left alone; one stuck in a pending
//! copy is aborted, deleted and copied again.

use std::time::Duration;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{info, warn};

use super::error::{MigrationError, Result};
use super::model::{DataCenter, VirtualMachine};
use super::names::NameRegistry;
use super::parallel::{CancellationFlag, run_tier};
use super::reporter::ProgressReporter;
use super::resource_type::ResourceType;
use super::retry::RetryPolicy;
use crate::cloud::{BlobLocation, CloudProvider, CopyStatus, DeploymentSlot, PostShutdownAction};

/// Read tokens become valid this long before the copy starts
pub const READ_TOKEN_BACKDATE: chrono::Duration = chrono::Duration::minutes(15);
/// Read tokens stay valid this long after the copy starts
pub const READ_TOKEN_LIFETIME: chrono::Duration = chrono::Duration::days(7);

pub struct BlobReplicator<'a> {
    source: &'a dyn CloudProvider,
    destination: &'a dyn CloudProvider,
    policy: &'a RetryPolicy,
    registry: &'a NameRegistry,
    reporter: &'a ProgressReporter,
    cancel: &'a CancellationFlag,
    poll_interval: Duration,
    max_parallelism: usize,
    containers: Mutex<()>,
}

impl<'a> BlobReplicator<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        source: &'a dyn CloudProvider,
        destination: &'a dyn CloudProvider,
        policy: &'a RetryPolicy,
        registry: &'a NameRegistry,
        reporter: &'a ProgressReporter,
        cancel: &'a CancellationFlag,
        poll_interval: Duration,
        max_parallelism: usize,
    ) -> Self {
        Self {
            source,
            destination,
            policy,
            registry,
            reporter,
            cancel,
            poll_interval,
            max_parallelism,
            containers: Mutex::new(()),
        }
    }

    /// Stop the source machines of `dc` and copy their disks
    ///
    /// `dc` carries source names. Machines already imported are skipped.
    pub async fn replicate(&self, dc: &DataCenter) -> Result<()> {
        self.reporter.report("Shutting down source virtual machines");
        let services: Vec<_> = dc
            .cloud_services
            .iter()
            .filter(|s| s.virtual_machines().iter().any(|vm| !vm.is_imported))
            .map(|s| (s.service_name.clone(), s))
            .collect();
        run_tier(services, self.max_parallelism, self.cancel, |service| {
            self.stop_source_machines(&service.service_name, service.virtual_machines())
        })
        .await?;

        let mut disks = Vec::new();
        for vm in dc
            .cloud_services
            .iter()
            .flat_map(|s| s.virtual_machines())
            .filter(|vm| !vm.is_imported)
        {
            for disk in vm.disks() {
                disks.push((disk.media_link.to_string(), BlobLocation::parse(disk.media_link)?));
            }
        }

        info!(count = disks.len(), "Copying disk blobs");
        run_tier(disks, self.max_parallelism, self.cancel, |blob| self.copy_blob(blob)).await?;
        Ok(())
    }

    async fn stop_source_machines(
        &self,
        service: &str,
        machines: &[VirtualMachine],
    ) -> Result<()> {
        let source = self.source;
        let Some(deployment) = self
            .policy
            .operation(ResourceType::Deployment, service)
            .run_or_absent(|| source.get_deployment_by_slot(service, DeploymentSlot::Production))
            .await?
        else {
            warn!(service, "Source deployment not found, nothing to shut down");
            return Ok(());
        };

        for vm in machines.iter().filter(|vm| !vm.is_imported) {
            let running = deployment
                .role_instances
                .iter()
                .find(|i| i.role_name.eq_ignore_ascii_case(&vm.role_name))
                .is_some_and(|i| !i.is_stopped());
            if !running {
                continue;
            }

            let name = vm.role_name.as_str();
            self.reporter
                .report(format!("Shutting down virtual machine '{}' of '{}'", name, service));
            self.policy
                .operation(ResourceType::VirtualMachine, name)
                .run(|| source.shutdown_virtual_machine(service, &deployment.name, name, PostShutdownAction::Stopped))
                .await?;
        }
        Ok(())
    }

    async fn ensure_container(&self, account: &str, container: &str) -> Result<()> {
        let destination = self.destination;
        let _guard = self.containers.lock().await;
        let exists = self
            .policy
            .operation(ResourceType::Blob, format!("{}/{}", account, container))
            .run(|| destination.container_exists(account, container))
            .await?;
        if !exists {
            self.policy
                .operation(ResourceType::Blob, format!("{}/{}", account, container))
                .run(|| destination.create_container(account, container))
                .await?;
        }
        Ok(())
    }

    async fn copy_blob(&self, source_blob: BlobLocation) -> Result<()> {
        let destination = self.destination;
        let source = self.source;
        let account = self
            .registry
            .destination_name(ResourceType::StorageAccount, &source_blob.account);
        let target = source_blob.in_account(&account);
        let label = target.to_string();

        self.ensure_container(&target.account, &target.container).await?;

        let existing = self
            .policy
            .operation(ResourceType::Blob, &label)
            .run_or_absent(|| destination.blob_properties(&target))
            .await?;
        if let Some(properties) = existing {
            match (properties.copy_status, properties.copy_id) {
                (Some(CopyStatus::Pending), Some(copy_id)) => {
                    warn!(blob = %label, "Abandoned pending copy found, restarting");
                    self.policy
                        .operation(ResourceType::Blob, &label)
                        .run_or_absent(|| destination.abort_blob_copy(&target, &copy_id))
                        .await?;
                    self.policy
                        .operation(ResourceType::Blob, &label)
                        .run_or_absent(|| destination.delete_blob(&target))
                        .await?;
                }
                _ => {
                    info!(blob = %label, "Destination blob already present, copy skipped");
                    return Ok(());
                }
            }
        }

        let now = Utc::now();
        let token = self
            .policy
            .operation(ResourceType::Blob, source_blob.to_string())
            .run(|| source.create_read_token(&source_blob, now - READ_TOKEN_BACKDATE, now + READ_TOKEN_LIFETIME))
            .await?;
        let source_uri = format!("{}?{}", source_blob.uri(), token);

        self.policy
            .operation(ResourceType::Blob, &label)
            .run(|| destination.start_blob_copy(&target, &source_uri))
            .await?;
        self.reporter
            .report(format!("Copy of {} to {} started", source_blob.uri(), target.uri()));

        self.wait_for_copy(&target).await?;
        self.reporter
            .report(format!("Copy of {} to {} completed", source_blob.uri(), target.uri()));
        Ok(())
    }

    async fn wait_for_copy(&self, target: &BlobLocation) -> Result<()> {
        let destination = self.destination;
        let label = target.to_string();

        loop {
            let properties = self
                .policy
                .operation(ResourceType::Blob, &label)
                .run(|| destination.blob_properties(target))
                .await?;

            match properties.copy_status {
                Some(CopyStatus::Pending) => {
                    self.reporter
                        .report(format!("Copying {}: {}%", target.blob, properties.percent_copied()));
                    self.cancel.check()?;
                    tokio::time::sleep(self.poll_interval).await;
                }
                Some(status) if status.is_failure() => {
                    self.policy
                        .operation(ResourceType::Blob, &label)
                        .run_or_absent(|| destination.delete_blob(target))
                        .await?;
                    return Err(MigrationError::BlobCopy {
                        blob: label,
                        status: format!("{:?}", status),
                    });
                }
                _ => return Ok(()),
            }
        }
    }
}
