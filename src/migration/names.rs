//! Name mapping registry
//!
//! Translates resource names between the source and the destination
//! environment. Globally unique resources (affinity groups, storage accounts,
//! cloud services, virtual network sites) are registered at the top level.
//! Names that are only unique below a parent (deployments, virtual machines,
//! disks, DNS servers, local network sites) live in the parent's subtree, so
//! the same `disk1` under two virtual machines maps independently.
//!
//! The registry is an arena of nodes; parent/child links are indices into it.
//! It is persisted as a YAML tree document with the destination prefix at the
//! root.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::error::{MigrationError, Result};
use super::model::Subscription;
use super::resource_type::{NameLimits, ResourceType};

pub type NodeId = usize;

/// Chain of `(type, destination name)` pairs from a top-level entry down to a parent
pub type Scope<'a> = [(ResourceType, &'a str)];

/// Which side of the mapping a lookup starts from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    ToDestination,
    ToSource,
}

#[derive(Debug, Clone, PartialEq)]
struct NameNode {
    resource_type: ResourceType,
    source_name: String,
    destination_name: String,
    children: Vec<NodeId>,
}

impl NameNode {
    fn name(&self, side: Direction) -> &str {
        match side {
            Direction::ToDestination => &self.source_name,
            Direction::ToSource => &self.destination_name,
        }
    }

    fn other_name(&self, side: Direction) -> &str {
        match side {
            Direction::ToDestination => &self.destination_name,
            Direction::ToSource => &self.source_name,
        }
    }
}

/// Bidirectional source/destination name registry
#[derive(Debug, Clone, PartialEq)]
pub struct NameRegistry {
    prefix: String,
    limits: NameLimits,
    nodes: Vec<NameNode>,
    roots: BTreeMap<ResourceType, Vec<NodeId>>,
}

impl NameRegistry {
    /// Create an empty registry; the prefix is stored lower-cased
    pub fn new(prefix: &str, limits: NameLimits) -> Self {
        Self {
            prefix: prefix.to_lowercase(),
            limits,
            nodes: Vec::new(),
            roots: BTreeMap::new(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Number of top-level entries
    pub fn len(&self) -> usize {
        self.roots.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// `prefix + source`, truncated to `max - 1` when the type's limit is exceeded
    pub fn derive_name(&self, resource_type: ResourceType, source_name: &str) -> String {
        let name = format!("{}{}", self.prefix, source_name);
        match self.limits.get(resource_type) {
            Some(max) if name.chars().count() > max => {
                name.chars().take(max.saturating_sub(1)).collect()
            }
            _ => name,
        }
    }

    /// Register a top-level resource and return its destination name
    ///
    /// Registering the same `(type, source)` twice yields the same name and one entry.
    pub fn generate_destination_name(
        &mut self,
        resource_type: ResourceType,
        source_name: &str,
    ) -> String {
        let id = self.register(resource_type, source_name);
        self.nodes[id].destination_name.clone()
    }

    /// Register a top-level resource, returning its node
    pub fn register(&mut self, resource_type: ResourceType, source_name: &str) -> NodeId {
        if let Some(id) = self.find_root(resource_type, source_name, Direction::ToDestination) {
            return id;
        }
        let destination_name = self.derive_name(resource_type, source_name);
        let id = self.push_node(resource_type, source_name, destination_name);
        self.roots.entry(resource_type).or_default().push(id);
        id
    }

    /// Register a child below `parent` with an explicit destination name
    pub fn add_child(
        &mut self,
        parent: NodeId,
        resource_type: ResourceType,
        source_name: &str,
        destination_name: &str,
    ) -> NodeId {
        let existing = self.nodes[parent].children.iter().copied().find(|&c| {
            let node = &self.nodes[c];
            node.resource_type == resource_type && node.source_name.eq_ignore_ascii_case(source_name)
        });
        if let Some(id) = existing {
            return id;
        }
        let id = self.push_node(resource_type, source_name, destination_name.to_string());
        self.nodes[parent].children.push(id);
        id
    }

    fn push_node(&mut self, resource_type: ResourceType, source_name: &str, destination_name: String) -> NodeId {
        self.nodes.push(NameNode {
            resource_type,
            source_name: source_name.to_string(),
            destination_name,
            children: Vec::new(),
        });
        self.nodes.len() - 1
    }

    fn find_root(&self, resource_type: ResourceType, name: &str, side: Direction) -> Option<NodeId> {
        self.roots
            .get(&resource_type)?
            .iter()
            .copied()
            .find(|&id| self.nodes[id].name(side).eq_ignore_ascii_case(name))
    }

    /// Depth-first search of `start`'s subtree (excluding `start`)
    fn find_descendant(
        &self,
        start: NodeId,
        resource_type: ResourceType,
        name: &str,
        side: Direction,
    ) -> Option<NodeId> {
        let mut stack: Vec<NodeId> = self.nodes[start].children.iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            let node = &self.nodes[id];
            if node.resource_type == resource_type && node.name(side).eq_ignore_ascii_case(name) {
                return Some(id);
            }
            stack.extend(node.children.iter().rev().copied());
        }
        None
    }

    fn find_scope(&self, scope: &Scope<'_>) -> Option<NodeId> {
        let ((root_type, root_name), rest) = scope.split_first()?;
        let mut current = self.find_root(*root_type, root_name, Direction::ToSource)?;
        for (resource_type, name) in rest {
            current = self.find_descendant(current, *resource_type, name, Direction::ToSource)?;
        }
        Some(current)
    }

    /// Translate `name` in the given direction
    ///
    /// `scope` locates the parent entry by destination names; an empty scope
    /// means a top-level lookup. Unknown names come back unchanged.
    pub fn resolve(
        &self,
        direction: Direction,
        resource_type: ResourceType,
        name: &str,
        scope: &Scope<'_>,
    ) -> String {
        let found = if scope.is_empty() {
            self.find_root(resource_type, name, direction)
        } else {
            self.find_scope(scope)
                .and_then(|parent| self.find_descendant(parent, resource_type, name, direction))
        };
        match found {
            Some(id) => self.nodes[id].other_name(direction).to_string(),
            None => name.to_string(),
        }
    }

    pub fn destination_name(&self, resource_type: ResourceType, source_name: &str) -> String {
        self.resolve(Direction::ToDestination, resource_type, source_name, &[])
    }

    pub fn source_name(&self, resource_type: ResourceType, destination_name: &str) -> String {
        self.resolve(Direction::ToSource, resource_type, destination_name, &[])
    }

    pub fn child_destination_name(
        &self,
        scope: &Scope<'_>,
        resource_type: ResourceType,
        source_name: &str,
    ) -> String {
        self.resolve(Direction::ToDestination, resource_type, source_name, scope)
    }

    pub fn child_source_name(
        &self,
        scope: &Scope<'_>,
        resource_type: ResourceType,
        destination_name: &str,
    ) -> String {
        self.resolve(Direction::ToSource, resource_type, destination_name, scope)
    }

    /// Build the full mapping for a snapshot
    pub fn generate(subscription: &Subscription, prefix: &str, limits: NameLimits) -> Self {
        let mut registry = Self::new(prefix, limits);

        for dc in &subscription.data_centers {
            for group in &dc.affinity_groups {
                registry.register(ResourceType::AffinityGroup, &group.name);
            }

            for account in &dc.storage_accounts {
                registry.register(ResourceType::StorageAccount, &account.name);
            }

            for service in &dc.cloud_services {
                let service_id = registry.register(ResourceType::CloudService, &service.service_name);
                let Some(deployment) = &service.deployment else {
                    continue;
                };
                let deployment_name = registry.derive_name(ResourceType::Deployment, &deployment.name);
                let deployment_id = registry.add_child(
                    service_id,
                    ResourceType::Deployment,
                    &deployment.name,
                    &deployment_name,
                );
                for vm in &deployment.virtual_machines {
                    // Role names keep their source name
                    let vm_id = registry.add_child(
                        deployment_id,
                        ResourceType::VirtualMachine,
                        &vm.role_name,
                        &vm.role_name,
                    );
                    for disk in vm.disks() {
                        let disk_name = format!("{}{}", registry.prefix, disk.name);
                        registry.add_child(vm_id, disk.resource_type, disk.name, &disk_name);
                    }
                }
            }

            if let Some(network) = &dc.network_configuration {
                for site in &network.virtual_network.virtual_network_sites {
                    let site_id = registry.register(ResourceType::VirtualNetworkSite, &site.name);
                    for dns in &site.dns_servers_ref {
                        let name = registry.derive_name(ResourceType::DnsServer, dns);
                        registry.add_child(site_id, ResourceType::DnsServer, dns, &name);
                    }
                    if let Some(local) = site.local_network_site_ref() {
                        let name = registry.derive_name(ResourceType::LocalNetworkSite, local);
                        registry.add_child(site_id, ResourceType::LocalNetworkSite, local, &name);
                    }
                }
            }
        }

        registry
    }

    fn entry(&self, id: NodeId) -> MappingEntry {
        let node = &self.nodes[id];
        MappingEntry {
            source_name: node.source_name.clone(),
            destination_name: node.destination_name.clone(),
            resource_type: node.resource_type,
            children: node.children.iter().map(|&c| self.entry(c)).collect(),
        }
    }

    /// Export to the persisted tree document
    pub fn to_document(&self) -> MappingDocument {
        MappingDocument {
            destination_prefix: self.prefix.clone(),
            resources: self
                .roots
                .iter()
                .map(|(resource_type, ids)| (*resource_type, ids.iter().map(|&id| self.entry(id)).collect()))
                .collect(),
        }
    }

    /// Rebuild from the persisted tree document; its prefix wins
    pub fn from_document(document: &MappingDocument, limits: NameLimits) -> Result<Self> {
        let mut registry = Self::new(&document.destination_prefix, limits);

        for (section, entries) in &document.resources {
            for entry in entries {
                if entry.resource_type != *section {
                    return Err(MigrationError::Document(format!(
                        "mapping entry '{}' of type {:?} listed under {:?}",
                        entry.source_name, entry.resource_type, section
                    )));
                }
                let id = registry.push_node(entry.resource_type, &entry.source_name, entry.destination_name.clone());
                registry.roots.entry(*section).or_default().push(id);
                registry.load_children(id, &entry.children);
            }
        }

        Ok(registry)
    }

    fn load_children(&mut self, parent: NodeId, children: &[MappingEntry]) {
        for child in children {
            let id = self.push_node(child.resource_type, &child.source_name, child.destination_name.clone());
            self.nodes[parent].children.push(id);
            self.load_children(id, &child.children);
        }
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(&self.to_document())?)
    }

    pub fn from_yaml(contents: &str, limits: NameLimits) -> Result<Self> {
        let document: MappingDocument = serde_yaml::from_str(contents)?;
        Self::from_document(&document, limits)
    }
}

/// Persisted form of the registry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingDocument {
    pub destination_prefix: String,
    #[serde(default)]
    pub resources: BTreeMap<ResourceType, Vec<MappingEntry>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingEntry {
    pub source_name: String,
    pub destination_name: String,
    pub resource_type: ResourceType,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<MappingEntry>,
}
