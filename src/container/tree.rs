//! The container hierarchy: a process-wide map from name to node, plus the
//! Get/Set property algorithm that combines the registry with per-container
//! value stores and parent-chain inheritance (spec §4.1, §4.2).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;

use crate::container::container::Container;
use crate::container::lifecycle::State;
use crate::error::{DaemonError, ErrorCode};
use crate::property::{Slot, Value, REGISTRY};

/// Properties whose admission is governed by the hierarchical invariant
/// (spec §3 "Hierarchical numeric properties (memory guarantee, memory
/// limit)..."). Guarantees are checked against the sum of committed
/// children; limits are checked against the max of committed children.
fn hierarchical_kind(property: &str) -> Option<HierarchicalKind> {
    match property {
        "memory_guarantee" => Some(HierarchicalKind::Guarantee),
        "memory_limit" => Some(HierarchicalKind::Limit),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HierarchicalKind {
    Guarantee,
    Limit,
}

/// Process-wide container registry, replacing a flat manager with a
/// name-indexed map plus parent-pointer traversal for inheritance.
pub struct ContainerTree {
    nodes: DashMap<String, Arc<Container>>,
    next_id: AtomicU64,
    /// Total host memory in bytes, used by the guarantee-vs-host-memory
    /// admission check (spec §3 "total of all committed memory guarantees
    /// plus a configured reserve must not exceed host memory").
    host_memory: AtomicU64,
    memory_reserve: AtomicU64,
}

impl ContainerTree {
    pub fn new() -> Self {
        let tree = Self { nodes: DashMap::new(), next_id: AtomicU64::new(1), host_memory: AtomicU64::new(u64::MAX), memory_reserve: AtomicU64::new(0) };
        tree.nodes.insert("/".to_string(), Container::root());
        tree
    }

    /// Configures the host-memory ceiling used by `memory_guarantee`
    /// admission (spec §3). Called once at startup; `host_memory` defaults
    /// to `u64::MAX` (no ceiling) until set, so tests that never call this
    /// are unaffected.
    pub fn set_memory_budget(&self, host_memory: u64, memory_reserve: u64) {
        self.host_memory.store(host_memory, Ordering::SeqCst);
        self.memory_reserve.store(memory_reserve, Ordering::SeqCst);
    }

    pub fn get(&self, name: &str) -> Option<Arc<Container>> {
        self.nodes.get(name).map(|e| e.clone())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    pub fn list(&self) -> Vec<String> {
        self.nodes.iter().map(|e| e.key().clone()).collect()
    }

    pub fn children_of<'a>(&'a self, name: &'a str) -> Vec<Arc<Container>> {
        self.nodes
            .iter()
            .filter(|e| e.value().parent_name.as_deref() == Some(name))
            .map(|e| e.value().clone())
            .collect()
    }

    /// Walk from `name` up to and including the root, closest first.
    fn ancestor_chain(&self, name: &str) -> Vec<Arc<Container>> {
        let mut chain = Vec::new();
        let mut current = self.get(name);
        while let Some(node) = current {
            let parent = node.parent_name.clone();
            chain.push(node);
            current = parent.and_then(|p| self.get(&p));
        }
        chain
    }

    /// The container's own explicitly-set value for `property`, ignoring
    /// inheritance and registry defaults — admission control only ever
    /// reasons about what was actually committed (spec §4.2
    /// "GetChildrenSum").
    fn explicit_uint(node: &Container, property: &str) -> u64 {
        match node.values.read().slot(property) {
            Some(Slot::Explicit(Value::UInt(v))) => *v,
            _ => 0,
        }
    }

    /// Sum (for guarantees) or max (for limits) of `property` over `name`'s
    /// direct children, optionally substituting `override_value` for
    /// `excluded` (the child currently being validated, spec §4.2
    /// "GetChildrenSum(property, excluded, override)").
    fn children_aggregate(&self, name: &str, property: &str, kind: HierarchicalKind, excluded: &str, override_value: u64) -> u64 {
        let children = self.children_of(name);
        match kind {
            HierarchicalKind::Guarantee => children
                .iter()
                .map(|c| if c.name == excluded { override_value } else { Self::explicit_uint(c, property) })
                .sum(),
            HierarchicalKind::Limit => children
                .iter()
                .map(|c| if c.name == excluded { override_value } else { Self::explicit_uint(c, property) })
                .max()
                .unwrap_or(0),
        }
    }

    /// Sum of every container's explicit `memory_guarantee`, substituting
    /// `override_value` for `name` (spec §3 "total of all committed memory
    /// guarantees plus a configured reserve must not exceed host memory").
    fn total_committed_guarantee(&self, name: &str, override_value: u64) -> u64 {
        self.nodes
            .iter()
            .map(|e| if e.key() == name { override_value } else { Self::explicit_uint(e.value(), "memory_guarantee") })
            .sum()
    }

    /// `ValidHierarchicalProperty(name, value)` (spec §4.2): a guarantee
    /// must not exceed the parent's own guarantee (once the parent has
    /// explicitly committed to one) and must leave room for siblings; a
    /// limit must not exceed the parent's limit and must cover whatever
    /// children already committed to. `memory_guarantee` additionally never
    /// pushes the tree-wide committed total past host memory minus the
    /// configured reserve.
    fn validate_hierarchical(&self, name: &str, property: &str, kind: HierarchicalKind, value: u64) -> Result<(), DaemonError> {
        let node = self.get(name).ok_or_else(|| DaemonError::new(ErrorCode::ContainerDoesNotExist, format!("{} does not exist", name)))?;

        match kind {
            HierarchicalKind::Guarantee => {
                let siblings_sum = self.children_aggregate(node.parent_name.as_deref().unwrap_or(""), property, kind, name, value);
                if let Some(parent_name) = &node.parent_name {
                    if let Some(parent) = self.get(parent_name) {
                        let parent_guarantee = Self::explicit_uint(&parent, property);
                        if parent_guarantee > 0 && siblings_sum > parent_guarantee {
                            return Err(DaemonError::new(ErrorCode::ResourceNotAvailable, format!("{} exceeds parent's committed guarantee", property)));
                        }
                    }
                }

                let host_memory = self.host_memory.load(Ordering::SeqCst);
                let reserve = self.memory_reserve.load(Ordering::SeqCst);
                if property == "memory_guarantee" {
                    let total = self.total_committed_guarantee(name, value);
                    if total.saturating_add(reserve) > host_memory {
                        return Err(DaemonError::new(ErrorCode::ResourceNotAvailable, "memory_guarantee exceeds available host memory"));
                    }
                }
            }
            HierarchicalKind::Limit => {
                let children_max = self.children_aggregate(name, property, kind, name, value);
                if children_max > value {
                    return Err(DaemonError::new(ErrorCode::ResourceNotAvailable, format!("{} is below an existing child's limit", property)));
                }
                if let Some(parent_name) = &node.parent_name {
                    if let Some(parent) = self.get(parent_name) {
                        let parent_limit = Self::explicit_uint(&parent, property);
                        if parent_limit > 0 && value > parent_limit {
                            return Err(DaemonError::new(ErrorCode::ResourceNotAvailable, format!("{} exceeds parent's limit", property)));
                        }
                    }
                }
            }
        }
        Ok(())
    }

    pub fn create(&self, name: &str, parent_name: &str, owner_uid: u32, owner_gid: u32) -> Result<Arc<Container>, DaemonError> {
        if self.nodes.contains_key(name) {
            return Err(DaemonError::new(ErrorCode::ContainerAlreadyExists, format!("{} already exists", name)));
        }
        if !self.nodes.contains_key(parent_name) {
            return Err(DaemonError::new(ErrorCode::ContainerDoesNotExist, format!("parent {} does not exist", parent_name)));
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let node = Container::new(name, id, Some(parent_name.to_string()), owner_uid, owner_gid);
        self.nodes.insert(name.to_string(), node.clone());
        Ok(node)
    }

    /// Removes a leaf node. Callers must have already stopped it and
    /// released its runtime resources (spec §4.2 "Destroy").
    pub fn destroy(&self, name: &str) -> Result<(), DaemonError> {
        if name == "/" {
            return Err(DaemonError::new(ErrorCode::Permission, "cannot destroy the root container"));
        }
        if !self.children_of(name).is_empty() {
            return Err(DaemonError::new(ErrorCode::InvalidState, format!("{} still has children", name)));
        }
        self.nodes.remove(name).ok_or_else(|| DaemonError::new(ErrorCode::ContainerDoesNotExist, format!("{} does not exist", name)))?;
        Ok(())
    }

    /// Resolve a property's effective value: explicit value on this
    /// container, else (if the property is `inherited`) the nearest
    /// ancestor's explicit value, else the registry default computed
    /// against this container (spec §4.1 "Get").
    pub fn get_property(&self, name: &str, property: &str) -> Result<String, DaemonError> {
        let descriptor = REGISTRY
            .get(property)
            .ok_or_else(|| DaemonError::new(ErrorCode::InvalidProperty, format!("unknown property: {}", property)))?;
        let node = self.get(name).ok_or_else(|| DaemonError::new(ErrorCode::ContainerDoesNotExist, format!("{} does not exist", name)))?;

        if descriptor.flags.inherited {
            for ancestor in self.ancestor_chain(name) {
                if let Some(Slot::Explicit(value)) = ancestor.values.read().slot(property) {
                    return Ok(value.to_wire());
                }
            }
        } else if let Some(Slot::Explicit(value)) = node.values.read().slot(property) {
            return Ok(value.to_wire());
        }

        Ok((descriptor.default)(&node).to_wire())
    }

    /// Validate, type-check and store a property value (spec §4.1 "Set").
    pub fn set_property(&self, name: &str, property: &str, raw: &str) -> Result<(), DaemonError> {
        let descriptor = REGISTRY
            .get(property)
            .ok_or_else(|| DaemonError::new(ErrorCode::InvalidProperty, format!("unknown property: {}", property)))?;
        let node = self.get(name).ok_or_else(|| DaemonError::new(ErrorCode::ContainerDoesNotExist, format!("{} does not exist", name)))?;

        if descriptor.flags.read_only_if_has_parent && node.parent_name.as_deref().is_some_and(|p| p != "/") {
            return Err(DaemonError::new(ErrorCode::Permission, format!("{} is read-only once a container has a non-root parent", property)));
        }
        if !descriptor.settable_in(node.state()) {
            return Err(DaemonError::new(ErrorCode::InvalidState, format!("{} cannot be set in state {}", property, node.state())));
        }

        let value: Value = (descriptor.validator)(raw)?;
        if value.kind() != descriptor.kind {
            return Err(DaemonError::new(ErrorCode::InvalidValue, format!("{} expects {:?}, got {:?}", property, descriptor.kind, value.kind())));
        }

        if let (Some(kind), Some(raw_uint)) = (hierarchical_kind(property), value.as_uint()) {
            self.validate_hierarchical(name, property, kind, raw_uint)?;
        }

        node.values.write().set_explicit(property, value);
        Ok(())
    }

    /// Read-only runtime facts that never go through the Value Store (spec
    /// §6 "Data" properties: uid, gid, state, exit_status, root_pid, ...).
    pub fn get_data(&self, name: &str, field: &str) -> Result<String, DaemonError> {
        let node = self.get(name).ok_or_else(|| DaemonError::new(ErrorCode::ContainerDoesNotExist, format!("{} does not exist", name)))?;
        let out = match field {
            "state" => node.state().to_string(),
            "uid" => node.access.owner_uid.to_string(),
            "gid" => node.access.owner_gid.to_string(),
            "id" => node.id.to_string(),
            "root_pid" => node.pid().map(|p| p.to_string()).unwrap_or_default(),
            "absolute_name" => node.name.clone(),
            _ => return Err(DaemonError::new(ErrorCode::InvalidProperty, format!("unknown data field: {}", field))),
        };
        Ok(out)
    }
}

impl Default for ContainerTree {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_rejects_duplicate_and_missing_parent() {
        let tree = ContainerTree::new();
        tree.create("/a", "/", 0, 0).unwrap();
        assert!(tree.create("/a", "/", 0, 0).is_err());
        assert!(tree.create("/b", "/missing", 0, 0).is_err());
    }

    #[test]
    fn destroy_refuses_nodes_with_children() {
        let tree = ContainerTree::new();
        tree.create("/a", "/", 0, 0).unwrap();
        tree.create("/a/b", "/a", 0, 0).unwrap();
        assert!(tree.destroy("/a").is_err());
        tree.destroy("/a/b").unwrap();
        tree.destroy("/a").unwrap();
    }

    #[test]
    fn memory_limit_inherits_from_parent_when_unset() {
        let tree = ContainerTree::new();
        tree.create("/a", "/", 0, 0).unwrap();
        tree.create("/a/b", "/a", 0, 0).unwrap();
        tree.set_property("/a", "memory_limit", "1000").unwrap();
        assert_eq!(tree.get_property("/a/b", "memory_limit").unwrap(), "1000");
        tree.set_property("/a/b", "memory_limit", "500").unwrap();
        assert_eq!(tree.get_property("/a/b", "memory_limit").unwrap(), "500");
    }

    #[test]
    fn set_rejects_unknown_property() {
        let tree = ContainerTree::new();
        tree.create("/a", "/", 0, 0).unwrap();
        assert_eq!(tree.set_property("/a", "not_real", "x").unwrap_err().code(), ErrorCode::InvalidProperty);
    }

    #[test]
    fn set_rejects_wrong_state() {
        let tree = ContainerTree::new();
        tree.create("/a", "/", 0, 0).unwrap();
        let node = tree.get("/a").unwrap();
        node.set_state(State::Running);
        assert_eq!(tree.set_property("/a", "command", "/bin/true").unwrap_err().code(), ErrorCode::InvalidState);
    }

    #[test]
    fn memory_guarantee_exceeding_host_memory_is_rejected() {
        let tree = ContainerTree::new();
        tree.set_memory_budget(2_000_000_000, 0);
        tree.create("/a", "/", 0, 0).unwrap();
        tree.set_property("/a", "memory_guarantee", "1000000000").unwrap();
        tree.create("/a/b", "/a", 0, 0).unwrap();

        let err = tree.set_property("/a/b", "memory_guarantee", "2000000000").unwrap_err();
        assert_eq!(err.code(), ErrorCode::ResourceNotAvailable);
    }

    #[test]
    fn memory_guarantee_within_parent_and_host_budget_succeeds() {
        let tree = ContainerTree::new();
        tree.set_memory_budget(4_000_000_000, 0);
        tree.create("/a", "/", 0, 0).unwrap();
        tree.set_property("/a", "memory_guarantee", "1000000000").unwrap();
        tree.create("/a/b", "/a", 0, 0).unwrap();

        tree.set_property("/a/b", "memory_guarantee", "500000000").unwrap();
        assert_eq!(tree.get_property("/a/b", "memory_guarantee").unwrap(), "500000000");
    }

    #[test]
    fn memory_limit_below_existing_childs_limit_is_rejected() {
        let tree = ContainerTree::new();
        tree.create("/a", "/", 0, 0).unwrap();
        tree.create("/a/b", "/a", 0, 0).unwrap();
        tree.set_property("/a/b", "memory_limit", "1000").unwrap();

        let err = tree.set_property("/a", "memory_limit", "500").unwrap_err();
        assert_eq!(err.code(), ErrorCode::ResourceNotAvailable);
    }
}
