//! Hierarchy sources
//!
//! A `HierarchyStore` hands out fully materialized snapshots. How often a
//! snapshot is rebuilt is the store's concern: the in-process store only
//! changes when replaced, the file store re-reads when the file changes.

use super::snapshot::{Hierarchy, HierarchyDocument};
use crate::error::{AuthzError, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{debug, info, warn};

/// Source of hierarchy snapshots
#[async_trait]
pub trait HierarchyStore: Send + Sync {
    /// Current snapshot (possibly cached)
    async fn snapshot(&self) -> Result<Arc<Hierarchy>>;

    /// Discard any cached snapshot and rebuild from the source
    async fn reload(&self) -> Result<Arc<Hierarchy>>;

    /// Replace the hierarchy with `hierarchy`, persisting it where supported
    async fn replace(&self, hierarchy: Hierarchy) -> Result<Arc<Hierarchy>>;
}

/// In-process hierarchy held in memory
pub struct StaticHierarchyStore {
    current: RwLock<Arc<Hierarchy>>,
}

impl StaticHierarchyStore {
    pub fn new(hierarchy: Hierarchy) -> Self {
        Self {
            current: RwLock::new(Arc::new(hierarchy)),
        }
    }
}

impl Default for StaticHierarchyStore {
    fn default() -> Self {
        Self::new(Hierarchy::new())
    }
}

#[async_trait]
impl HierarchyStore for StaticHierarchyStore {
    async fn snapshot(&self) -> Result<Arc<Hierarchy>> {
        Ok(self.current.read().clone())
    }

    async fn reload(&self) -> Result<Arc<Hierarchy>> {
        Ok(self.current.read().clone())
    }

    async fn replace(&self, hierarchy: Hierarchy) -> Result<Arc<Hierarchy>> {
        let snapshot = Arc::new(hierarchy);
        *self.current.write() = snapshot.clone();
        Ok(snapshot)
    }
}

/// Snapshot cached together with the file modification time it was read at
struct CachedSnapshot {
    hierarchy: Arc<Hierarchy>,
    modified: Option<SystemTime>,
}

/// Hierarchy stored as a JSON document on disk
///
/// The parsed snapshot is cached and reused until the file's modification
/// time changes. A missing file is an empty hierarchy.
pub struct FileHierarchyStore {
    path: PathBuf,
    cached: RwLock<Option<CachedSnapshot>>,
}

impl FileHierarchyStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cached: RwLock::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn modified_time(&self) -> Result<Option<SystemTime>> {
        match tokio::fs::metadata(&self.path).await {
            Ok(meta) => Ok(meta.modified().ok()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn read_file(&self) -> Result<Hierarchy> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("Hierarchy file {} not found, using empty hierarchy", self.path.display());
                return Ok(Hierarchy::new());
            }
            Err(e) => return Err(e.into()),
        };

        if contents.trim().is_empty() {
            return Ok(Hierarchy::new());
        }

        let document: HierarchyDocument = serde_json::from_str(&contents).map_err(|e| {
            AuthzError::InvalidHierarchy(format!(
                "Failed to parse hierarchy file {}: {}",
                self.path.display(),
                e
            ))
        })?;

        Ok(Hierarchy::from_document(document))
    }

    async fn load_and_cache(&self) -> Result<Arc<Hierarchy>> {
        let modified = self.modified_time().await?;
        let hierarchy = Arc::new(self.read_file().await?);

        info!(
            "Loaded {} authorization items from {}",
            hierarchy.len(),
            self.path.display()
        );

        *self.cached.write() = Some(CachedSnapshot {
            hierarchy: hierarchy.clone(),
            modified,
        });

        Ok(hierarchy)
    }

    /// Write `hierarchy` to the file as a JSON document
    pub async fn save(&self, hierarchy: &Hierarchy) -> Result<()> {
        let contents = serde_json::to_string_pretty(&hierarchy.to_document())?;
        tokio::fs::write(&self.path, contents).await?;
        debug!("Saved {} authorization items to {}", hierarchy.len(), self.path.display());
        Ok(())
    }
}

#[async_trait]
impl HierarchyStore for FileHierarchyStore {
    async fn snapshot(&self) -> Result<Arc<Hierarchy>> {
        let modified = self.modified_time().await?;

        if let Some(cached) = self.cached.read().as_ref() {
            if cached.modified == modified {
                return Ok(cached.hierarchy.clone());
            }
            debug!("Hierarchy file {} changed, reloading", self.path.display());
        }

        self.load_and_cache().await
    }

    async fn reload(&self) -> Result<Arc<Hierarchy>> {
        *self.cached.write() = None;
        self.load_and_cache().await
    }

    async fn replace(&self, hierarchy: Hierarchy) -> Result<Arc<Hierarchy>> {
        if let Err(e) = self.save(&hierarchy).await {
            warn!("Failed to save hierarchy to {}: {}", self.path.display(), e);
            return Err(e);
        }
        self.load_and_cache().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hierarchy::HierarchyBuilder;
    use crate::types::ItemType;

    const DOCUMENT: &str = r#"{
        "Admin": {"type": "role", "children": ["manageUser"]},
        "manageUser": {"type": "task", "children": ["createUser"]},
        "createUser": {"type": "operation", "description": "create a user"}
    }"#;

    #[tokio::test]
    async fn test_static_store_replace() {
        let store = StaticHierarchyStore::default();
        assert!(store.snapshot().await.unwrap().is_empty());

        let mut builder = HierarchyBuilder::new();
        builder.create_item("reader", ItemType::Role).unwrap();
        store.replace(builder.build()).await.unwrap();

        assert!(store.snapshot().await.unwrap().contains("reader"));
    }

    #[tokio::test]
    async fn test_file_store_reads_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("auth.json");
        std::fs::write(&path, DOCUMENT).unwrap();

        let store = FileHierarchyStore::new(&path);
        let hierarchy = store.snapshot().await.unwrap();

        assert_eq!(hierarchy.len(), 3);
        assert!(hierarchy.has_item_child("Admin", "manageUser"));
        assert_eq!(
            hierarchy.get("createUser").unwrap().description.as_deref(),
            Some("create a user")
        );
    }

    #[tokio::test]
    async fn test_file_store_reuses_cached_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("auth.json");
        std::fs::write(&path, DOCUMENT).unwrap();

        let store = FileHierarchyStore::new(&path);
        let first = store.snapshot().await.unwrap();
        let second = store.snapshot().await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn test_file_store_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileHierarchyStore::new(dir.path().join("absent.json"));

        assert!(store.snapshot().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_file_store_rejects_malformed_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("auth.json");
        std::fs::write(&path, "{ not json").unwrap();

        let store = FileHierarchyStore::new(&path);
        assert!(matches!(
            store.snapshot().await,
            Err(AuthzError::InvalidHierarchy(_))
        ));
    }

    #[tokio::test]
    async fn test_file_store_replace_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("auth.json");

        let store = FileHierarchyStore::new(&path);
        let mut builder = HierarchyBuilder::new();
        builder.create_item("author", ItemType::Role).unwrap();
        builder.create_item("createPost", ItemType::Operation).unwrap();
        builder.add_item_child("author", "createPost").unwrap();
        store.replace(builder.build()).await.unwrap();

        let fresh = FileHierarchyStore::new(&path);
        let hierarchy = fresh.snapshot().await.unwrap();
        assert!(hierarchy.has_item_child("author", "createPost"));
    }
}
