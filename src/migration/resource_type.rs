use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Closed set of resource kinds the migration knows how to move
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ResourceType {
    DataCenter,
    AffinityGroup,
    StorageAccount,
    CloudService,
    Deployment,
    VirtualMachine,
    OsDisk,
    DataDisk,
    NetworkConfiguration,
    VirtualNetwork,
    VirtualNetworkSite,
    DnsServer,
    LocalNetworkSite,
    Blob,
    ReservedIp,
}

impl ResourceType {
    /// Human readable name used in progress messages and errors
    pub fn display_name(&self) -> &'static str {
        match self {
            ResourceType::DataCenter => "Data Center",
            ResourceType::AffinityGroup => "Affinity Group",
            ResourceType::StorageAccount => "Storage Account",
            ResourceType::CloudService => "Cloud Service",
            ResourceType::Deployment => "Deployment",
            ResourceType::VirtualMachine => "Virtual Machine",
            ResourceType::OsDisk => "OS Disk",
            ResourceType::DataDisk => "Data Disk",
            ResourceType::NetworkConfiguration => "Network Configuration",
            ResourceType::VirtualNetwork => "Virtual Network",
            ResourceType::VirtualNetworkSite => "Virtual Network Site",
            ResourceType::DnsServer => "DNS Server",
            ResourceType::LocalNetworkSite => "Local Network Site",
            ResourceType::Blob => "Blob",
            ResourceType::ReservedIp => "Reserved IP",
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// Maximum destination name length per resource type
///
/// Types without an entry are never truncated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NameLimits(BTreeMap<ResourceType, usize>);

impl NameLimits {
    /// No limits at all
    pub fn unlimited() -> Self {
        Self(BTreeMap::new())
    }

    pub fn get(&self, resource_type: ResourceType) -> Option<usize> {
        self.0.get(&resource_type).copied()
    }

    pub fn with_limit(mut self, resource_type: ResourceType, max_length: usize) -> Self {
        self.0.insert(resource_type, max_length);
        self
    }

    /// Apply overrides on top of these limits
    pub fn merged(mut self, overrides: &NameLimits) -> Self {
        for (resource_type, max_length) in &overrides.0 {
            self.0.insert(*resource_type, *max_length);
        }
        self
    }
}

impl Default for NameLimits {
    fn default() -> Self {
        Self::unlimited()
            .with_limit(ResourceType::AffinityGroup, 63)
            .with_limit(ResourceType::StorageAccount, 23)
            .with_limit(ResourceType::CloudService, 63)
            .with_limit(ResourceType::NetworkConfiguration, 63)
            .with_limit(ResourceType::LocalNetworkSite, 63)
            .with_limit(ResourceType::VirtualNetworkSite, 63)
            .with_limit(ResourceType::Deployment, 63)
            .with_limit(ResourceType::VirtualMachine, 63)
            .with_limit(ResourceType::VirtualNetwork, 63)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_limits() {
        let limits = NameLimits::default();
        assert_eq!(limits.get(ResourceType::StorageAccount), Some(23));
        assert_eq!(limits.get(ResourceType::AffinityGroup), Some(63));
        assert_eq!(limits.get(ResourceType::OsDisk), None);
    }

    #[test]
    fn test_merged_overrides() {
        let overrides = NameLimits::unlimited().with_limit(ResourceType::StorageAccount, 10);
        let limits = NameLimits::default().merged(&overrides);
        assert_eq!(limits.get(ResourceType::StorageAccount), Some(10));
        assert_eq!(limits.get(ResourceType::CloudService), Some(63));
    }

    #[test]
    fn test_limits_yaml_shape() {
        let limits: NameLimits = serde_yaml::from_str("StorageAccount: 12\nDnsServer: 20\n").unwrap();
        assert_eq!(limits.get(ResourceType::StorageAccount), Some(12));
        assert_eq!(limits.get(ResourceType::DnsServer), Some(20));
    }
}
