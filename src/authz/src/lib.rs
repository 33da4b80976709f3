//! # Role-based authorization manager
//!
//! Answers "may user U use item I?" from a hierarchy of operations, tasks
//! and roles plus per-user assignments.
//!
//! ## Features
//!
//! - **Hierarchy snapshots** with a precomputed child -> parents index
//! - **Business rules** in CEL on items and on assignments
//! - **Default roles** granted to every user
//! - **Per-user assignment cache** with local memo and shared TTL backend
//! - **PostgreSQL assignment store** (feature `postgres`)
//!
//! ## Example
//!
//! ```rust
//! use authz_rbac::{AuthConfig, AuthManager, ItemType, Params};
//! use authz_rbac::hierarchy::StaticHierarchyStore;
//! use authz_rbac::store::InMemoryAssignmentStore;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let manager = AuthManager::new(
//!         AuthConfig::default(),
//!         Arc::new(StaticHierarchyStore::default()),
//!         Arc::new(InMemoryAssignmentStore::new()),
//!     );
//!
//!     manager
//!         .update_hierarchy(|h| {
//!             h.create_item("Admin", ItemType::Role)?;
//!             h.create_item("manageUser", ItemType::Task)?;
//!             h.create_item("createUser", ItemType::Operation)?;
//!             h.add_item_child("Admin", "manageUser")?;
//!             h.add_item_child("manageUser", "createUser")
//!         })
//!         .await?;
//!
//!     manager.assignments().assign("Admin", "7", None, None).await?;
//!
//!     assert!(manager.check_access("createUser", "7", &Params::new()).await?);
//!     assert!(!manager.check_access("createUser", "8", &Params::new()).await?);
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod cel; // CEL business-rule engine
pub mod config;
pub mod engine;
pub mod error;
pub mod evaluator;
pub mod hierarchy;
pub mod manager;
pub mod rule;
pub mod store;
pub mod types;

// Re-export commonly used types
pub use cache::{AssignmentCache, CacheBackend, CacheDuration, CacheStats, InMemoryCacheBackend};
pub use config::AuthConfig;
pub use engine::AuthManager;
pub use error::{AuthzError, Result};
pub use evaluator::AccessEvaluator;
pub use hierarchy::{Hierarchy, HierarchyBuilder, HierarchyStore};
pub use manager::AssignmentManager;
pub use rule::{CelRuleEvaluator, RuleEvaluator};
pub use store::AssignmentStore;
pub use types::{Assignment, AssignmentSet, Item, ItemType, LoadPhase, Params};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
