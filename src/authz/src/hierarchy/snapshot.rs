//! Immutable hierarchy snapshot with a precomputed reverse index
//!
//! Items keep their forward edges (parent -> children). The snapshot builds
//! the reverse edges (child -> parents) once at construction so that the
//! ancestor walk in the evaluator is a map lookup per step instead of a scan
//! over every item.

use crate::types::{Item, ItemName, ItemType};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::warn;

/// One entry of a hierarchy document: `{ "<name>": ItemDefinition }`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ItemDefinition {
    #[serde(rename = "type")]
    pub item_type: Option<ItemType>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, rename = "bizRule", skip_serializing_if = "Option::is_none")]
    pub biz_rule: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<ItemName>,
}

/// Serialized form of a hierarchy, ordered by item name
pub type HierarchyDocument = BTreeMap<ItemName, ItemDefinition>;

/// Read-only view of all items and their edges
///
/// Cheap to share behind an `Arc`; nothing mutates a snapshot after
/// construction, so concurrent readers need no synchronization.
#[derive(Debug, Clone, Default)]
pub struct Hierarchy {
    items: HashMap<ItemName, Item>,
    parents: HashMap<ItemName, BTreeSet<ItemName>>,
}

impl Hierarchy {
    /// Create an empty hierarchy
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a snapshot from fully formed items
    ///
    /// Child references to names that are not part of `items` are dropped.
    pub fn from_items(items: impl IntoIterator<Item = Item>) -> Self {
        let mut items: HashMap<ItemName, Item> = items
            .into_iter()
            .map(|item| (item.name.clone(), item))
            .collect();

        let known: BTreeSet<ItemName> = items.keys().cloned().collect();
        for item in items.values_mut() {
            let dangling: Vec<ItemName> = item
                .children
                .iter()
                .filter(|child| !known.contains(*child))
                .cloned()
                .collect();
            for child in dangling {
                warn!("Dropping unknown child '{}' of item '{}'", child, item.name);
                item.children.remove(&child);
            }
        }

        let mut parents: HashMap<ItemName, BTreeSet<ItemName>> = HashMap::new();
        for item in items.values() {
            for child in &item.children {
                parents
                    .entry(child.clone())
                    .or_default()
                    .insert(item.name.clone());
            }
        }

        Self { items, parents }
    }

    /// Build a snapshot from a hierarchy document
    ///
    /// Entries without a `type` are treated as operations; missing optional
    /// fields default to empty.
    pub fn from_document(document: HierarchyDocument) -> Self {
        let items = document.into_iter().map(|(name, def)| Item {
            item_type: def.item_type.unwrap_or(ItemType::Operation),
            description: def.description,
            biz_rule: def.biz_rule,
            data: def.data,
            children: def.children.into_iter().collect(),
            name,
        });

        Self::from_items(items)
    }

    /// Serialize back into document form
    pub fn to_document(&self) -> HierarchyDocument {
        self.items
            .values()
            .map(|item| {
                (
                    item.name.clone(),
                    ItemDefinition {
                        item_type: Some(item.item_type),
                        description: item.description.clone(),
                        biz_rule: item.biz_rule.clone(),
                        data: item.data.clone(),
                        children: item.children.iter().cloned().collect(),
                    },
                )
            })
            .collect()
    }

    pub fn get(&self, name: &str) -> Option<&Item> {
        self.items.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.items.contains_key(name)
    }

    /// Names of the items that list `name` as a child
    pub fn parents_of(&self, name: &str) -> impl Iterator<Item = &str> {
        self.parents
            .get(name)
            .into_iter()
            .flat_map(|set| set.iter().map(String::as_str))
    }

    /// Direct children of `name`; empty for unknown items
    pub fn children_of(&self, name: &str) -> Vec<&Item> {
        self.items
            .get(name)
            .map(|item| {
                item.children
                    .iter()
                    .filter_map(|child| self.items.get(child))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn has_item_child(&self, parent: &str, child: &str) -> bool {
        self.items
            .get(parent)
            .map(|item| item.children.contains(child))
            .unwrap_or(false)
    }

    /// Items of one type, sorted by name
    pub fn items_of_type(&self, item_type: ItemType) -> Vec<&Item> {
        let mut items: Vec<&Item> = self
            .items
            .values()
            .filter(|item| item.item_type == item_type)
            .collect();
        items.sort_by(|a, b| a.name.cmp(&b.name));
        items
    }

    pub fn items(&self) -> impl Iterator<Item = &Item> {
        self.items.values()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.items.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Consume the snapshot, returning its items
    pub fn into_items(self) -> impl Iterator<Item = Item> {
        self.items.into_values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn admin_document() -> HierarchyDocument {
        serde_json::from_value(json!({
            "Admin": {"type": "role", "children": ["manageUser"]},
            "manageUser": {"type": "task", "children": ["createUser"]},
            "createUser": {"type": "operation"}
        }))
        .unwrap()
    }

    #[test]
    fn test_reverse_index() {
        let hierarchy = Hierarchy::from_document(admin_document());

        let parents: Vec<&str> = hierarchy.parents_of("createUser").collect();
        assert_eq!(parents, vec!["manageUser"]);

        let parents: Vec<&str> = hierarchy.parents_of("manageUser").collect();
        assert_eq!(parents, vec!["Admin"]);

        assert_eq!(hierarchy.parents_of("Admin").count(), 0);
        assert_eq!(hierarchy.parents_of("missing").count(), 0);
    }

    #[test]
    fn test_dangling_children_are_dropped() {
        let document: HierarchyDocument = serde_json::from_value(json!({
            "reader": {"type": "role", "children": ["readPost", "ghost"]},
            "readPost": {"type": "operation"}
        }))
        .unwrap();

        let hierarchy = Hierarchy::from_document(document);
        let reader = hierarchy.get("reader").unwrap();

        assert_eq!(reader.children.len(), 1);
        assert!(hierarchy.has_item_child("reader", "readPost"));
        assert_eq!(hierarchy.parents_of("ghost").count(), 0);
    }

    #[test]
    fn test_missing_optional_fields() {
        let document: HierarchyDocument = serde_json::from_value(json!({
            "bare": {}
        }))
        .unwrap();

        let hierarchy = Hierarchy::from_document(document);
        let bare = hierarchy.get("bare").unwrap();

        assert_eq!(bare.item_type, ItemType::Operation);
        assert!(bare.biz_rule.is_none());
        assert!(bare.children.is_empty());
    }

    #[test]
    fn test_items_of_type() {
        let hierarchy = Hierarchy::from_document(admin_document());

        let roles: Vec<&str> = hierarchy
            .items_of_type(ItemType::Role)
            .into_iter()
            .map(|item| item.name.as_str())
            .collect();
        assert_eq!(roles, vec!["Admin"]);
        assert_eq!(hierarchy.items_of_type(ItemType::Operation).len(), 1);
    }

    #[test]
    fn test_document_roundtrip_preserves_edges() {
        let hierarchy = Hierarchy::from_document(admin_document());
        let restored = Hierarchy::from_document(hierarchy.to_document());

        assert_eq!(restored.len(), 3);
        assert!(restored.has_item_child("Admin", "manageUser"));
        assert!(restored.has_item_child("manageUser", "createUser"));
        assert_eq!(restored.get("Admin").unwrap().item_type, ItemType::Role);
    }
}
