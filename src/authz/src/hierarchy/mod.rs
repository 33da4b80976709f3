//! Permission hierarchy: snapshots, construction, and sources
//!
//! - **Snapshot**: immutable item map plus reverse (child -> parents) index
//! - **Builder**: validated edits with loop detection and type ordering
//! - **Stores**: in-memory and JSON-file sources with change detection

pub mod builder;
pub mod snapshot;
pub mod store;

pub use builder::HierarchyBuilder;
pub use snapshot::{Hierarchy, HierarchyDocument, ItemDefinition};
pub use store::{FileHierarchyStore, HierarchyStore, StaticHierarchyStore};
