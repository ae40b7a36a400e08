//! Merging and unmerging of the subscription-wide network document.
//!
//! The destination has one network configuration for the whole subscription.
//! Import merges the migrated entries into it; rollback removes exactly the
//! entries carrying this import's destination names.

use std::collections::BTreeSet;

use super::model::VirtualNetworkConfiguration;

fn union_by_name<T: Clone>(existing: &mut Vec<T>, incoming: &[T], name: impl Fn(&T) -> &str) {
    for item in incoming {
        if !existing.iter().any(|e| name(e).eq_ignore_ascii_case(name(item))) {
            existing.push(item.clone());
        }
    }
}

/// Union of `existing` and `incoming`; entries already present by name are kept as they are
pub fn merge(existing: &VirtualNetworkConfiguration, incoming: &VirtualNetworkConfiguration) -> VirtualNetworkConfiguration {
    let mut merged = existing.clone();
    union_by_name(&mut merged.dns_servers, &incoming.dns_servers, |d| &d.name);
    union_by_name(&mut merged.local_network_sites, &incoming.local_network_sites, |l| &l.name);
    union_by_name(&mut merged.virtual_network_sites, &incoming.virtual_network_sites, |v| &v.name);
    merged
}

/// Destination names introduced by one import
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NetworkNames {
    pub virtual_network_sites: BTreeSet<String>,
    pub dns_servers: BTreeSet<String>,
    pub local_network_sites: BTreeSet<String>,
}

impl NetworkNames {
    /// Names of everything in `config`, lower-cased
    pub fn of(config: &VirtualNetworkConfiguration) -> Self {
        Self {
            virtual_network_sites: config.virtual_network_sites.iter().map(|v| v.name.to_lowercase()).collect(),
            dns_servers: config.dns_servers.iter().map(|d| d.name.to_lowercase()).collect(),
            local_network_sites: config.local_network_sites.iter().map(|l| l.name.to_lowercase()).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.virtual_network_sites.is_empty() && self.dns_servers.is_empty() && self.local_network_sites.is_empty()
    }
}

/// `config` without the entries named in `names`; returns the number of removed entries
pub fn strip(config: &mut VirtualNetworkConfiguration, names: &NetworkNames) -> usize {
    let before = config.virtual_network_sites.len() + config.dns_servers.len() + config.local_network_sites.len();
    config
        .virtual_network_sites
        .retain(|v| !names.virtual_network_sites.contains(&v.name.to_lowercase()));
    config
        .dns_servers
        .retain(|d| !names.dns_servers.contains(&d.name.to_lowercase()));
    config
        .local_network_sites
        .retain(|l| !names.local_network_sites.contains(&l.name.to_lowercase()));
    before - (config.virtual_network_sites.len() + config.dns_servers.len() + config.local_network_sites.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migration::model::{DnsServer, LocalNetworkSite, VirtualNetworkSite};

    fn site(name: &str) -> VirtualNetworkSite {
        VirtualNetworkSite {
            name: name.to_string(),
            ..Default::default()
        }
    }

    fn dns(name: &str, ip: &str) -> DnsServer {
        DnsServer {
            name: name.to_string(),
            ip_address: ip.to_string(),
        }
    }

    #[test]
    fn test_merge_keeps_existing_entries() {
        let existing = VirtualNetworkConfiguration {
            dns_servers: vec![dns("corp", "10.0.0.4")],
            virtual_network_sites: vec![site("prod")],
            ..Default::default()
        };
        let incoming = VirtualNetworkConfiguration {
            dns_servers: vec![dns("CORP", "10.9.9.9"), dns("dcdns1", "10.1.0.4")],
            virtual_network_sites: vec![site("dcvnet1")],
            local_network_sites: vec![LocalNetworkSite {
                name: "dconprem".to_string(),
                ..Default::default()
            }],
        };

        let merged = merge(&existing, &incoming);
        assert_eq!(merged.dns_servers.len(), 2);
        assert_eq!(merged.dns_servers[0].ip_address, "10.0.0.4");
        assert_eq!(merged.virtual_network_sites.len(), 2);
        assert_eq!(merged.local_network_sites.len(), 1);
    }

    #[test]
    fn test_merge_into_empty() {
        let incoming = VirtualNetworkConfiguration {
            virtual_network_sites: vec![site("dcvnet1")],
            ..Default::default()
        };
        assert_eq!(merge(&VirtualNetworkConfiguration::default(), &incoming), incoming);
    }

    #[test]
    fn test_strip_removes_only_named_entries() {
        let incoming = VirtualNetworkConfiguration {
            dns_servers: vec![dns("dcdns1", "10.1.0.4")],
            virtual_network_sites: vec![site("dcvnet1")],
            ..Default::default()
        };
        let existing = VirtualNetworkConfiguration {
            dns_servers: vec![dns("corp", "10.0.0.4")],
            virtual_network_sites: vec![site("prod")],
            ..Default::default()
        };
        let mut merged = merge(&existing, &incoming);

        let removed = strip(&mut merged, &NetworkNames::of(&incoming));
        assert_eq!(removed, 2);
        assert_eq!(merged, existing);
    }

    #[test]
    fn test_names_are_case_insensitive() {
        let mut config = VirtualNetworkConfiguration {
            virtual_network_sites: vec![site("DCVnet1")],
            ..Default::default()
        };
        let names = NetworkNames::of(&VirtualNetworkConfiguration {
            virtual_network_sites: vec![site("dcvnet1")],
            ..Default::default()
        });
        assert!(!names.is_empty());
        assert_eq!(strip(&mut config, &names), 1);
        assert!(config.is_empty());
    }
}
