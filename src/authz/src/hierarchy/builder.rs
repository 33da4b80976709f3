//! Mutable hierarchy construction with loop and type-order checks
//!
//! Snapshots are immutable; edits go through a `HierarchyBuilder` which
//! validates every edge and then freezes into a new [`Hierarchy`].

use super::snapshot::Hierarchy;
use crate::error::{AuthzError, Result};
use crate::types::{Item, ItemName, ItemType};
use std::collections::{BTreeMap, HashSet};

/// Builder for hierarchy snapshots
///
/// # Example
///
/// ```rust
/// use authz_rbac::hierarchy::HierarchyBuilder;
/// use authz_rbac::types::ItemType;
///
/// # fn example() -> authz_rbac::Result<()> {
/// let mut builder = HierarchyBuilder::new();
/// builder.create_item("Admin", ItemType::Role)?;
/// builder.create_item("manageUser", ItemType::Task)?;
/// builder.add_item_child("Admin", "manageUser")?;
///
/// let hierarchy = builder.build();
/// assert!(hierarchy.has_item_child("Admin", "manageUser"));
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct HierarchyBuilder {
    items: BTreeMap<ItemName, Item>,
}

impl HierarchyBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing snapshot
    pub fn from_hierarchy(hierarchy: &Hierarchy) -> Self {
        Self {
            items: hierarchy
                .items()
                .map(|item| (item.name.clone(), item.clone()))
                .collect(),
        }
    }

    /// Add a new item with no children
    pub fn create_item(&mut self, name: impl Into<String>, item_type: ItemType) -> Result<&mut Item> {
        self.insert_item(Item::new(name, item_type))
    }

    /// Add a fully described item; its child edges are validated one by one
    pub fn insert_item(&mut self, mut item: Item) -> Result<&mut Item> {
        if item.name.is_empty() {
            return Err(AuthzError::InvalidInput("Item name cannot be empty".to_string()));
        }
        if self.items.contains_key(&item.name) {
            return Err(AuthzError::DuplicateItem(item.name));
        }

        let children = std::mem::take(&mut item.children);
        let name = item.name.clone();
        self.items.insert(name.clone(), item);

        for child in &children {
            if let Err(e) = self.add_item_child(&name, child) {
                self.items.remove(&name);
                return Err(e);
            }
        }

        self.items
            .get_mut(&name)
            .ok_or_else(|| AuthzError::UnknownItem(name.clone()))
    }

    /// Remove an item and every edge pointing at it
    pub fn remove_item(&mut self, name: &str) -> bool {
        if self.items.remove(name).is_none() {
            return false;
        }
        for item in self.items.values_mut() {
            item.children.remove(name);
        }
        true
    }

    /// Add a parent -> child edge
    ///
    /// # Errors
    ///
    /// - `UnknownItem` if either end is missing
    /// - `InvalidHierarchy` if the child outranks the parent
    /// - `CycleDetected` if the edge would close a loop
    pub fn add_item_child(&mut self, parent: &str, child: &str) -> Result<()> {
        let parent_type = self
            .items
            .get(parent)
            .map(|item| item.item_type)
            .ok_or_else(|| AuthzError::UnknownItem(parent.to_string()))?;
        let child_type = self
            .items
            .get(child)
            .map(|item| item.item_type)
            .ok_or_else(|| AuthzError::UnknownItem(child.to_string()))?;

        if child_type > parent_type {
            return Err(AuthzError::InvalidHierarchy(format!(
                "Cannot add {} '{}' as a child of {} '{}'",
                child_type, child, parent_type, parent
            )));
        }

        if let Some(path) = self.find_path(child, parent) {
            let mut cycle = vec![parent.to_string()];
            cycle.extend(path);
            return Err(AuthzError::CycleDetected(cycle.join(" -> ")));
        }

        if let Some(item) = self.items.get_mut(parent) {
            item.children.insert(child.to_string());
        }
        Ok(())
    }

    pub fn remove_item_child(&mut self, parent: &str, child: &str) -> bool {
        self.items
            .get_mut(parent)
            .map(|item| item.children.remove(child))
            .unwrap_or(false)
    }

    pub fn get(&self, name: &str) -> Option<&Item> {
        self.items.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Item> {
        self.items.get_mut(name)
    }

    pub fn build(self) -> Hierarchy {
        Hierarchy::from_items(self.items.into_values())
    }

    /// DFS along child edges from `from`; returns the path to `to` if reachable
    fn find_path(&self, from: &str, to: &str) -> Option<Vec<String>> {
        let mut visited: HashSet<&str> = HashSet::new();
        let mut path: Vec<String> = Vec::new();
        if self.dfs_path(from, to, &mut visited, &mut path) {
            Some(path)
        } else {
            None
        }
    }

    fn dfs_path<'a>(
        &'a self,
        node: &'a str,
        target: &str,
        visited: &mut HashSet<&'a str>,
        path: &mut Vec<String>,
    ) -> bool {
        path.push(node.to_string());
        if node == target {
            return true;
        }
        if !visited.insert(node) {
            path.pop();
            return false;
        }

        if let Some(item) = self.items.get(node) {
            for child in &item.children {
                if self.dfs_path(child, target, visited, path) {
                    return true;
                }
            }
        }

        path.pop();
        false
    }
}
