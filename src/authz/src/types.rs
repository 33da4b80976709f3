//! Core authorization types

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use std::fmt;

/// Unique item identifier
pub type ItemName = String;

/// User identifier as stored in the assignment table
pub type UserId = String;

/// Call-time parameters handed to business rules
pub type Params = HashMap<String, Value>;

/// All assignments of one user, keyed by item name
pub type AssignmentSet = HashMap<ItemName, Assignment>;

/// Kind of authorization item
///
/// Ordered by rank: an item may only contain children of equal or lower rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemType {
    Operation,
    Task,
    Role,
}

impl ItemType {
    /// Numeric code used by legacy hierarchy documents
    pub fn code(self) -> u8 {
        match self {
            ItemType::Operation => 0,
            ItemType::Task => 1,
            ItemType::Role => 2,
        }
    }

    pub fn from_code(code: u64) -> Option<Self> {
        match code {
            0 => Some(ItemType::Operation),
            1 => Some(ItemType::Task),
            2 => Some(ItemType::Role),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ItemType::Operation => "operation",
            ItemType::Task => "task",
            ItemType::Role => "role",
        }
    }
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ItemType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "operation" | "0" => Ok(ItemType::Operation),
            "task" | "1" => Ok(ItemType::Task),
            "role" | "2" => Ok(ItemType::Role),
            other => Err(format!("unknown item type '{}'", other)),
        }
    }
}

impl<'de> Deserialize<'de> for ItemType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Code(u64),
            Name(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Code(code) => ItemType::from_code(code)
                .ok_or_else(|| serde::de::Error::custom(format!("unknown item type code {}", code))),
            Raw::Name(name) => name.parse().map_err(serde::de::Error::custom),
        }
    }
}

/// Node of the permission graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub name: ItemName,

    #[serde(rename = "type")]
    pub item_type: ItemType,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Predicate gating every grant that passes through this item
    #[serde(default, rename = "bizRule", skip_serializing_if = "Option::is_none")]
    pub biz_rule: Option<String>,

    /// Opaque payload handed to the business rule
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,

    /// Items this item grants (parent -> child edges)
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub children: BTreeSet<ItemName>,
}

impl Item {
    pub fn new(name: impl Into<String>, item_type: ItemType) -> Self {
        Self {
            name: name.into(),
            item_type,
            description: None,
            biz_rule: None,
            data: None,
            children: BTreeSet::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_biz_rule(mut self, rule: impl Into<String>) -> Self {
        self.biz_rule = Some(rule.into());
        self
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_child(mut self, child: impl Into<String>) -> Self {
        self.children.insert(child.into());
        self
    }
}

/// Binding of one user to one item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub item_name: ItemName,
    pub user_id: UserId,

    /// Per-assignment predicate, evaluated after the item's own rule
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub biz_rule: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl Assignment {
    pub fn new(item_name: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            item_name: item_name.into(),
            user_id: user_id.into(),
            biz_rule: None,
            data: None,
        }
    }

    pub fn with_biz_rule(mut self, rule: impl Into<String>) -> Self {
        self.biz_rule = Some(rule.into());
        self
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// Whether a hierarchy load is in progress
///
/// Passed explicitly into bulk-clear operations: a clear issued while
/// `Loading` must leave the assignment store untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadPhase {
    Loading,
    Ready,
}
