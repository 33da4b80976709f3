//! Hierarchy source integration tests
//!
//! File-backed hierarchies: document format, change detection, reloads, and
//! the assignment-preserving load guard.

use authz_rbac::hierarchy::{FileHierarchyStore, HierarchyStore};
use authz_rbac::store::InMemoryAssignmentStore;
use authz_rbac::{AuthConfig, AuthManager, AuthzError, ItemType, Params};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

const BLOG: &str = r#"{
    "admin": {
        "type": 2,
        "description": "Administrator",
        "children": ["editor", "deleteUser"]
    },
    "editor": {
        "type": "role",
        "children": ["updatePost", "ghostItem"]
    },
    "updatePost": {
        "type": "operation",
        "bizRule": "params.draft == false",
        "data": {"max_length": 5000}
    },
    "deleteUser": {"type": 0}
}"#;

fn write(path: &Path, contents: &str) {
    std::fs::write(path, contents).unwrap();
}

fn manager_for(path: &Path) -> AuthManager {
    AuthManager::new(
        AuthConfig::default(),
        Arc::new(FileHierarchyStore::new(path)),
        Arc::new(InMemoryAssignmentStore::new()),
    )
}

// ============================================================================
// DOCUMENT FORMAT
// ============================================================================

#[tokio::test]
async fn test_document_loads_names_codes_and_optional_fields() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("auth.json");
    write(&path, BLOG);

    let hierarchy = FileHierarchyStore::new(&path).snapshot().await.unwrap();

    assert_eq!(hierarchy.len(), 4);
    assert_eq!(hierarchy.get("admin").unwrap().item_type, ItemType::Role);
    assert_eq!(hierarchy.get("deleteUser").unwrap().item_type, ItemType::Operation);
    assert_eq!(hierarchy.get("admin").unwrap().description.as_deref(), Some("Administrator"));
    assert!(hierarchy.get("deleteUser").unwrap().biz_rule.is_none());
    assert!(hierarchy.get("updatePost").unwrap().data.is_some());

    // Unknown children are dropped, not an error
    assert!(!hierarchy.has_item_child("editor", "ghostItem"));
    assert!(hierarchy.has_item_child("editor", "updatePost"));
    assert_eq!(hierarchy.parents_of("updatePost").collect::<Vec<_>>(), vec!["editor"]);
}

#[tokio::test]
async fn test_malformed_document_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("auth.json");
    write(&path, r#"{"admin": {"type": "superuser"}}"#);

    let result = FileHierarchyStore::new(&path).snapshot().await;
    assert!(matches!(result, Err(AuthzError::InvalidHierarchy(_))));
}

#[tokio::test]
async fn test_missing_file_is_empty_hierarchy() {
    let dir = tempfile::tempdir().unwrap();
    let manager = manager_for(&dir.path().join("absent.json"));

    assert!(manager.hierarchy().await.unwrap().is_empty());
    assert!(!manager.check_access("anything", "7", &Params::new()).await.unwrap());
}

#[tokio::test]
async fn test_rules_from_document_apply() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("auth.json");
    write(&path, BLOG);

    let manager = manager_for(&path);
    manager.assignments().assign("editor", "7", None, None).await.unwrap();

    let published = [("draft".to_string(), serde_json::json!(false))].into_iter().collect::<Params>();
    let draft = [("draft".to_string(), serde_json::json!(true))].into_iter().collect::<Params>();

    assert!(manager.check_access("updatePost", "7", &published).await.unwrap());
    assert!(!manager.check_access("updatePost", "7", &draft).await.unwrap());
    assert!(!manager.check_access("deleteUser", "7", &Params::new()).await.unwrap());
}

// ============================================================================
// CHANGE DETECTION AND RELOAD
// ============================================================================

#[tokio::test]
async fn test_file_change_is_picked_up() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("auth.json");
    write(&path, r#"{"reader": {"type": "role"}}"#);

    let store = FileHierarchyStore::new(&path);
    let first = store.snapshot().await.unwrap();
    let again = store.snapshot().await.unwrap();
    assert!(Arc::ptr_eq(&first, &again));

    // Filesystems with coarse timestamps need a visible mtime step
    tokio::time::sleep(Duration::from_millis(1100)).await;
    write(&path, r#"{"reader": {"type": "role"}, "writer": {"type": "role"}}"#);

    let changed = store.snapshot().await.unwrap();
    assert_eq!(changed.len(), 2);
}

#[tokio::test]
async fn test_reload_preserves_assignments() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("auth.json");
    write(&path, BLOG);

    let manager = manager_for(&path);
    manager.assignments().assign("admin", "1", None, None).await.unwrap();

    let reloaded = manager.reload_hierarchy().await.unwrap();

    assert_eq!(reloaded.len(), 4);
    assert!(manager.assignments().is_assigned("admin", "1").await.unwrap());
    assert!(manager.check_access("deleteUser", "1", &Params::new()).await.unwrap());
}

#[tokio::test]
async fn test_edits_are_saved_to_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("auth.json");
    write(&path, BLOG);

    let manager = manager_for(&path);
    manager
        .update_hierarchy(|h| {
            h.create_item("moderator", ItemType::Role)?;
            h.add_item_child("admin", "moderator")
        })
        .await
        .unwrap();

    let fresh = FileHierarchyStore::new(&path).snapshot().await.unwrap();
    assert!(fresh.has_item_child("admin", "moderator"));
    assert_eq!(fresh.get("updatePost").unwrap().biz_rule.as_deref(), Some("params.draft == false"));
}

#[tokio::test]
async fn test_clear_all_empties_file_and_assignments() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("auth.json");
    write(&path, BLOG);

    let manager = manager_for(&path);
    manager.assignments().assign("admin", "1", None, None).await.unwrap();

    manager.clear_all().await.unwrap();

    assert!(FileHierarchyStore::new(&path).snapshot().await.unwrap().is_empty());
    assert!(!manager.assignments().is_assigned("admin", "1").await.unwrap());
}
