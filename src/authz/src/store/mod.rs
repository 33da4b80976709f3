//! Assignment persistence
//!
//! The core only needs the keyed surface below; referential integrity
//! against the hierarchy is checked by the assignment manager, not by stores.

use crate::error::Result;
use crate::types::{Assignment, AssignmentSet};
use async_trait::async_trait;

pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;

pub use memory::InMemoryAssignmentStore;
#[cfg(feature = "postgres")]
pub use postgres::PostgresAssignmentStore;

/// Keyed storage of (item name, user id) -> assignment
#[async_trait]
pub trait AssignmentStore: Send + Sync {
    /// Insert a new assignment
    ///
    /// Fails with `DuplicateAssignment` if the pair already exists.
    async fn insert(&self, assignment: &Assignment) -> Result<()>;

    /// Delete one assignment; returns whether a row existed
    async fn delete(&self, item_name: &str, user_id: &str) -> Result<bool>;

    /// Delete every assignment; returns the number of rows removed
    async fn delete_all(&self) -> Result<u64>;

    /// Point lookup
    async fn select_one(&self, item_name: &str, user_id: &str) -> Result<Option<Assignment>>;

    /// Every assignment of one user
    async fn select_all_for_user(&self, user_id: &str) -> Result<AssignmentSet>;

    /// Replace rule and data of an existing assignment; returns whether it existed
    async fn update(&self, assignment: &Assignment) -> Result<bool>;
}
