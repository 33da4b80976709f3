//! Authorization manager facade
//!
//! Wires the hierarchy source, assignment store, cache, and rule evaluator
//! together from an [`AuthConfig`].
//!
//! ```text
//! check_access ─► AccessEvaluator ─► HierarchyStore (snapshot)
//!                       │
//!                       └──────────► AssignmentCache ─► CacheBackend
//!                                          ▲     └────► AssignmentStore
//! assign/revoke ─► AssignmentManager ──────┘ (invalidate)
//! ```

use crate::cache::{AssignmentCache, CacheBackend, CacheDuration, InMemoryCacheBackend};
use crate::config::AuthConfig;
use crate::error::Result;
use crate::evaluator::AccessEvaluator;
use crate::hierarchy::{
    FileHierarchyStore, Hierarchy, HierarchyBuilder, HierarchyStore, StaticHierarchyStore,
};
use crate::manager::AssignmentManager;
use crate::rule::{CelRuleEvaluator, RuleEvaluator};
use crate::store::{AssignmentStore, InMemoryAssignmentStore};
use crate::types::{Item, ItemType, LoadPhase, Params};
use std::sync::Arc;
use tracing::info;

/// Role-based authorization manager
pub struct AuthManager {
    config: AuthConfig,
    hierarchy: Arc<dyn HierarchyStore>,
    rules: Arc<dyn RuleEvaluator>,
    cache: Arc<AssignmentCache>,
    evaluator: AccessEvaluator,
    assignments: AssignmentManager,
}

impl AuthManager {
    /// Create a manager over the given hierarchy source and assignment store
    ///
    /// Business rules are CEL expressions. With a positive `cache_duration`
    /// an in-process backend of `cache.capacity` entries is created; use
    /// [`with_cache_backend`](Self::with_cache_backend) to share another one.
    pub fn new(
        config: AuthConfig,
        hierarchy: Arc<dyn HierarchyStore>,
        store: Arc<dyn AssignmentStore>,
    ) -> Self {
        let backend: Option<Arc<dyn CacheBackend>> = match config.cache_duration {
            CacheDuration::Ttl(_) => Some(Arc::new(InMemoryCacheBackend::new(config.cache.capacity))),
            CacheDuration::Disabled | CacheDuration::LocalOnly => None,
        };

        let cache = Arc::new(AssignmentCache::new(
            store,
            backend,
            config.cache_duration,
            config.application_id.clone(),
        ));

        info!(
            "AuthManager initialized with cache_duration={:?}, default_roles={:?}",
            config.cache_duration, config.default_roles
        );

        Self::assemble(config, hierarchy, Arc::new(CelRuleEvaluator::new()), cache)
    }

    /// Build the hierarchy source and assignment store named by `config`
    ///
    /// A hierarchy path selects the JSON file store, otherwise the hierarchy
    /// lives in memory. A database URL selects PostgreSQL, otherwise
    /// assignments live in memory.
    pub async fn from_config(config: AuthConfig) -> Result<Self> {
        config.validate()?;

        let hierarchy: Arc<dyn HierarchyStore> = match &config.hierarchy.path {
            Some(path) => Arc::new(FileHierarchyStore::new(path)),
            None => Arc::new(StaticHierarchyStore::default()),
        };
        let store = connect_store(&config).await?;

        Ok(Self::new(config, hierarchy, store))
    }

    fn assemble(
        config: AuthConfig,
        hierarchy: Arc<dyn HierarchyStore>,
        rules: Arc<dyn RuleEvaluator>,
        cache: Arc<AssignmentCache>,
    ) -> Self {
        let evaluator = AccessEvaluator::new(
            hierarchy.clone(),
            cache.clone(),
            rules.clone(),
            config.default_roles.iter().cloned().collect(),
        );
        let assignments = AssignmentManager::new(hierarchy.clone(), cache.clone())
            .with_invalidate_on_revoke(config.invalidate_on_revoke);

        Self {
            config,
            hierarchy,
            rules,
            cache,
            evaluator,
            assignments,
        }
    }

    /// Use `backend` as the shared assignment cache
    ///
    /// Only consulted when `cache_duration` is positive.
    pub fn with_cache_backend(self, backend: Arc<dyn CacheBackend>) -> Self {
        let cache = Arc::new(AssignmentCache::new(
            self.cache.store().clone(),
            Some(backend),
            self.config.cache_duration,
            self.config.application_id.clone(),
        ));
        Self::assemble(self.config, self.hierarchy, self.rules, cache)
    }

    /// Replace the business-rule evaluator
    pub fn with_rule_evaluator(self, rules: Arc<dyn RuleEvaluator>) -> Self {
        Self::assemble(self.config, self.hierarchy, rules, self.cache)
    }

    /// A manager over the same sources with a fresh local assignment memo
    ///
    /// Behaves like a new process or request sharing the same store and
    /// backend.
    pub fn fork(&self) -> Self {
        Self::assemble(
            self.config.clone(),
            self.hierarchy.clone(),
            self.rules.clone(),
            Arc::new(self.cache.fork()),
        )
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    pub fn evaluator(&self) -> &AccessEvaluator {
        &self.evaluator
    }

    pub fn assignments(&self) -> &AssignmentManager {
        &self.assignments
    }

    pub fn cache(&self) -> &Arc<AssignmentCache> {
        &self.cache
    }

    pub fn hierarchy_store(&self) -> &Arc<dyn HierarchyStore> {
        &self.hierarchy
    }

    /// Current hierarchy snapshot
    pub async fn hierarchy(&self) -> Result<Arc<Hierarchy>> {
        self.hierarchy.snapshot().await
    }

    /// Check whether `user_id` may use `item_name`
    pub async fn check_access(&self, item_name: &str, user_id: &str, params: &Params) -> Result<bool> {
        self.evaluator.check_access(item_name, user_id, params).await
    }

    /// Items sorted by name, optionally restricted to one type and to the
    /// items directly assigned to one user
    pub async fn items(&self, item_type: Option<ItemType>, user_id: Option<&str>) -> Result<Vec<Item>> {
        let hierarchy = self.hierarchy.snapshot().await?;
        let assigned = match user_id {
            Some(user_id) => Some(self.assignments.get_assignments(user_id).await?),
            None => None,
        };

        let mut items: Vec<Item> = hierarchy
            .items()
            .filter(|item| item_type.map_or(true, |t| item.item_type == t))
            .filter(|item| assigned.as_ref().map_or(true, |set| set.contains_key(&item.name)))
            .cloned()
            .collect();
        items.sort_by(|a, b| a.name.cmp(&b.name));

        Ok(items)
    }

    /// Edit the hierarchy through a builder and publish the result
    ///
    /// Nothing is published if `edit` fails.
    pub async fn update_hierarchy<F>(&self, edit: F) -> Result<Arc<Hierarchy>>
    where
        F: FnOnce(&mut HierarchyBuilder) -> Result<()> + Send,
    {
        let current = self.hierarchy.snapshot().await?;
        let mut builder = HierarchyBuilder::from_hierarchy(&current);
        edit(&mut builder)?;

        let updated = self.hierarchy.replace(builder.build()).await?;
        info!("Hierarchy updated: {} items", updated.len());
        Ok(updated)
    }

    /// Re-read the hierarchy from its source
    ///
    /// Reloading only replaces items and edges; assignments are never touched.
    /// Callers that reset the hierarchy as part of a load pass
    /// `LoadPhase::Loading` to [`AssignmentManager::clear_all_assignments`].
    pub async fn reload_hierarchy(&self) -> Result<Arc<Hierarchy>> {
        let hierarchy = self.hierarchy.reload().await?;

        info!("Hierarchy reloaded: {} items", hierarchy.len());
        Ok(hierarchy)
    }

    /// Remove every item and every assignment
    pub async fn clear_all(&self) -> Result<()> {
        self.hierarchy.replace(Hierarchy::new()).await?;
        self.assignments.clear_all_assignments(LoadPhase::Ready).await?;
        info!("Cleared all authorization data");
        Ok(())
    }
}

#[cfg(feature = "postgres")]
async fn connect_store(config: &AuthConfig) -> Result<Arc<dyn AssignmentStore>> {
    use crate::store::PostgresAssignmentStore;

    match &config.database.url {
        Some(url) => {
            let store = PostgresAssignmentStore::new(
                url,
                &config.database.assignment_table,
                config.database.max_connections,
            )
            .await?;
            Ok(Arc::new(store))
        }
        None => Ok(Arc::new(InMemoryAssignmentStore::new())),
    }
}

#[cfg(not(feature = "postgres"))]
async fn connect_store(config: &AuthConfig) -> Result<Arc<dyn AssignmentStore>> {
    match &config.database.url {
        Some(_) => Err(crate::error::AuthzError::Config(
            "database.url requires the 'postgres' feature".to_string(),
        )),
        None => Ok(Arc::new(InMemoryAssignmentStore::new())),
    }
}
