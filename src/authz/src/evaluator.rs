//! Access checks over the permission hierarchy
//!
//! A check starts at the requested item and walks upward through the
//! reverse (child -> parents) index. At each node:
//!
//! 1. the item's own business rule must hold, otherwise the node denies;
//! 2. a default role grants;
//! 3. a direct assignment grants if its own business rule holds;
//! 4. otherwise every parent is tried until one grants.
//!
//! Results are memoized per node for the duration of one top-level check,
//! never across checks, since rules depend on the call-time parameters. A
//! node reached again while it is still being evaluated (a loop in the
//! hierarchy) denies along that path.

use crate::cache::AssignmentCache;
use crate::error::Result;
use crate::hierarchy::{Hierarchy, HierarchyStore};
use crate::rule::RuleEvaluator;
use crate::types::{AssignmentSet, Params};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, trace};

/// Decides whether a user may use an item
#[derive(Clone)]
pub struct AccessEvaluator {
    hierarchy: Arc<dyn HierarchyStore>,
    cache: Arc<AssignmentCache>,
    rules: Arc<dyn RuleEvaluator>,
    default_roles: Arc<HashSet<String>>,
}

impl AccessEvaluator {
    pub fn new(
        hierarchy: Arc<dyn HierarchyStore>,
        cache: Arc<AssignmentCache>,
        rules: Arc<dyn RuleEvaluator>,
        default_roles: HashSet<String>,
    ) -> Self {
        Self {
            hierarchy,
            cache,
            rules,
            default_roles: Arc::new(default_roles),
        }
    }

    /// An evaluator over the same collaborators with its own assignment memo
    ///
    /// Mutations made through a manager sharing the original cache only
    /// reach a fork through the shared backend, bounded by its TTL.
    pub fn fork(&self) -> Self {
        Self {
            hierarchy: self.hierarchy.clone(),
            cache: Arc::new(self.cache.fork()),
            rules: self.rules.clone(),
            default_roles: self.default_roles.clone(),
        }
    }

    pub fn cache(&self) -> &Arc<AssignmentCache> {
        &self.cache
    }

    pub fn default_roles(&self) -> &HashSet<String> {
        &self.default_roles
    }

    /// Check whether `user_id` may use `item_name`
    ///
    /// Unknown items deny without error. Failures of the hierarchy source,
    /// assignment store or cache backend propagate.
    pub async fn check_access(&self, item_name: &str, user_id: &str, params: &Params) -> Result<bool> {
        let hierarchy = self.hierarchy.snapshot().await?;
        if !hierarchy.contains(item_name) {
            debug!("Access check for unknown item '{}' denied", item_name);
            return Ok(false);
        }

        let assignments = self.cache.assignments(user_id).await?;
        let allowed = self.evaluate(&hierarchy, &assignments, item_name, params);

        debug!(
            "Access check '{}' for user {}: {}",
            item_name,
            user_id,
            if allowed { "granted" } else { "denied" }
        );
        Ok(allowed)
    }

    /// Evaluate one check against an explicit snapshot and assignment set
    pub fn evaluate(
        &self,
        hierarchy: &Hierarchy,
        assignments: &AssignmentSet,
        item_name: &str,
        params: &Params,
    ) -> bool {
        let mut walk = Walk {
            hierarchy,
            assignments,
            params,
            rules: self.rules.as_ref(),
            default_roles: &self.default_roles,
            memo: HashMap::new(),
            visiting: HashSet::new(),
        };
        walk.check(item_name)
    }
}

/// State of one top-level check
struct Walk<'a> {
    hierarchy: &'a Hierarchy,
    assignments: &'a AssignmentSet,
    params: &'a Params,
    rules: &'a dyn RuleEvaluator,
    default_roles: &'a HashSet<String>,
    memo: HashMap<&'a str, bool>,
    visiting: HashSet<&'a str>,
}

impl<'a> Walk<'a> {
    fn check(&mut self, name: &str) -> bool {
        let hierarchy: &'a Hierarchy = self.hierarchy;
        let Some(item) = hierarchy.get(name) else {
            return false;
        };
        let name = item.name.as_str();

        if let Some(&result) = self.memo.get(name) {
            return result;
        }
        if !self.visiting.insert(name) {
            debug!("Loop in hierarchy at item '{}', path denied", name);
            return false;
        }

        let result = self.resolve(name);

        self.visiting.remove(name);
        self.memo.insert(name, result);
        result
    }

    fn resolve(&mut self, name: &'a str) -> bool {
        let hierarchy: &'a Hierarchy = self.hierarchy;
        let Some(item) = hierarchy.get(name) else {
            return false;
        };

        if !self
            .rules
            .evaluate(item.biz_rule.as_deref(), self.params, item.data.as_ref())
        {
            trace!("Business rule of item '{}' denied", name);
            return false;
        }

        if self.default_roles.contains(name) {
            trace!("Item '{}' is a default role", name);
            return true;
        }

        if let Some(assignment) = self.assignments.get(name) {
            if self.rules.evaluate(
                assignment.biz_rule.as_deref(),
                self.params,
                assignment.data.as_ref(),
            ) {
                trace!("Item '{}' granted by assignment", name);
                return true;
            }
            trace!("Business rule of assignment '{}' denied", name);
        }

        hierarchy.parents_of(name).any(|parent| self.check(parent))
    }
}
