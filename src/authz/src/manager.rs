//! Assignment mutations with cache invalidation
//!
//! Every write that changes a user's assignment set drops that user's cached
//! set afterwards, so the next read goes back to the store. Store write and
//! invalidation are not one transaction; a failure between them leaves a
//! stale entry bounded by the backend TTL.

use crate::cache::AssignmentCache;
use crate::error::{AuthzError, Result};
use crate::hierarchy::HierarchyStore;
use crate::store::AssignmentStore;
use crate::types::{Assignment, AssignmentSet, LoadPhase};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

/// Creates, updates, and removes user assignments
#[derive(Clone)]
pub struct AssignmentManager {
    hierarchy: Arc<dyn HierarchyStore>,
    cache: Arc<AssignmentCache>,
    invalidate_on_revoke: bool,
}

impl AssignmentManager {
    pub fn new(hierarchy: Arc<dyn HierarchyStore>, cache: Arc<AssignmentCache>) -> Self {
        Self {
            hierarchy,
            cache,
            invalidate_on_revoke: true,
        }
    }

    /// Whether `revoke` drops the user's cached set (default `true`)
    pub fn with_invalidate_on_revoke(mut self, invalidate: bool) -> Self {
        self.invalidate_on_revoke = invalidate;
        self
    }

    fn store(&self) -> &Arc<dyn AssignmentStore> {
        self.cache.store()
    }

    /// Assign `item_name` to `user_id`
    ///
    /// Fails with `UnknownItem` if the item is not in the current hierarchy,
    /// and with `DuplicateAssignment` if the pair already exists.
    pub async fn assign(
        &self,
        item_name: &str,
        user_id: &str,
        biz_rule: Option<String>,
        data: Option<Value>,
    ) -> Result<Assignment> {
        let hierarchy = self.hierarchy.snapshot().await?;
        if !hierarchy.contains(item_name) {
            return Err(AuthzError::UnknownItem(item_name.to_string()));
        }

        let assignment = Assignment {
            item_name: item_name.to_string(),
            user_id: user_id.to_string(),
            biz_rule,
            data,
        };

        self.store().insert(&assignment).await?;
        self.cache.invalidate(user_id).await?;

        info!("Assigned '{}' to user {}", item_name, user_id);
        Ok(assignment)
    }

    /// Remove an assignment; returns whether one existed
    pub async fn revoke(&self, item_name: &str, user_id: &str) -> Result<bool> {
        let removed = self.store().delete(item_name, user_id).await?;

        if self.invalidate_on_revoke {
            self.cache.invalidate(user_id).await?;
        }

        if removed {
            info!("Revoked '{}' from user {}", item_name, user_id);
        } else {
            debug!("No assignment of '{}' to user {} to revoke", item_name, user_id);
        }
        Ok(removed)
    }

    /// Persist changed rule and data of an existing assignment
    pub async fn save_assignment(&self, assignment: &Assignment) -> Result<()> {
        if !self.store().update(assignment).await? {
            return Err(AuthzError::AssignmentNotFound {
                item: assignment.item_name.clone(),
                user: assignment.user_id.clone(),
            });
        }

        self.cache.invalidate(&assignment.user_id).await?;
        info!(
            "Updated assignment of '{}' to user {}",
            assignment.item_name, assignment.user_id
        );
        Ok(())
    }

    /// Point lookup, always served by the store
    pub async fn get_assignment(&self, item_name: &str, user_id: &str) -> Result<Option<Assignment>> {
        self.store().select_one(item_name, user_id).await
    }

    /// All assignments of a user, served through the cache
    pub async fn get_assignments(&self, user_id: &str) -> Result<Arc<AssignmentSet>> {
        self.cache.assignments(user_id).await
    }

    pub async fn is_assigned(&self, item_name: &str, user_id: &str) -> Result<bool> {
        Ok(self.get_assignment(item_name, user_id).await?.is_some())
    }

    /// Delete every assignment
    ///
    /// Does nothing while a hierarchy load is in progress, so that loading
    /// never wipes the store as a side effect. Returns whether the clear ran.
    /// Every cached set of the application is dropped, including the ones
    /// other instances wrote to the shared backend.
    pub async fn clear_all_assignments(&self, phase: LoadPhase) -> Result<bool> {
        if phase == LoadPhase::Loading {
            debug!("Skipping assignment clear during hierarchy load");
            return Ok(false);
        }

        let removed = self.store().delete_all().await?;
        self.cache.clear().await?;

        info!("Cleared {} assignments", removed);
        Ok(true)
    }
}
