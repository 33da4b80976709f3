//! In-memory assignment store

use super::AssignmentStore;
use crate::error::{AuthzError, Result};
use crate::types::{Assignment, AssignmentSet, ItemName, UserId};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Assignment store kept in process memory, indexed by user
pub struct InMemoryAssignmentStore {
    assignments: Arc<RwLock<HashMap<UserId, HashMap<ItemName, Assignment>>>>,
}

impl InMemoryAssignmentStore {
    pub fn new() -> Self {
        Self {
            assignments: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Total number of stored assignments
    pub async fn len(&self) -> usize {
        let assignments = self.assignments.read().await;
        assignments.values().map(HashMap::len).sum()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for InMemoryAssignmentStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AssignmentStore for InMemoryAssignmentStore {
    async fn insert(&self, assignment: &Assignment) -> Result<()> {
        let mut assignments = self.assignments.write().await;
        let user = assignments.entry(assignment.user_id.clone()).or_default();

        if user.contains_key(&assignment.item_name) {
            return Err(AuthzError::DuplicateAssignment {
                item: assignment.item_name.clone(),
                user: assignment.user_id.clone(),
            });
        }

        user.insert(assignment.item_name.clone(), assignment.clone());
        Ok(())
    }

    async fn delete(&self, item_name: &str, user_id: &str) -> Result<bool> {
        let mut assignments = self.assignments.write().await;
        let Some(user) = assignments.get_mut(user_id) else {
            return Ok(false);
        };

        let removed = user.remove(item_name).is_some();
        if user.is_empty() {
            assignments.remove(user_id);
        }
        Ok(removed)
    }

    async fn delete_all(&self) -> Result<u64> {
        let mut assignments = self.assignments.write().await;
        let count = assignments.values().map(HashMap::len).sum::<usize>() as u64;
        assignments.clear();
        Ok(count)
    }

    async fn select_one(&self, item_name: &str, user_id: &str) -> Result<Option<Assignment>> {
        let assignments = self.assignments.read().await;
        Ok(assignments
            .get(user_id)
            .and_then(|user| user.get(item_name))
            .cloned())
    }

    async fn select_all_for_user(&self, user_id: &str) -> Result<AssignmentSet> {
        let assignments = self.assignments.read().await;
        Ok(assignments.get(user_id).cloned().unwrap_or_default())
    }

    async fn update(&self, assignment: &Assignment) -> Result<bool> {
        let mut assignments = self.assignments.write().await;
        let existing = assignments
            .get_mut(&assignment.user_id)
            .and_then(|user| user.get_mut(&assignment.item_name));

        match existing {
            Some(stored) => {
                stored.biz_rule = assignment.biz_rule.clone();
                stored.data = assignment.data.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
