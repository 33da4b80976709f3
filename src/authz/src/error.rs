//! Error types for the authorization manager

use thiserror::Error;

/// Authorization manager errors
#[derive(Debug, Error)]
pub enum AuthzError {
    /// Item name is not part of the hierarchy
    #[error("Unknown authorization item: {0}")]
    UnknownItem(String),

    /// Item name already exists in the hierarchy
    #[error("Authorization item already exists: {0}")]
    DuplicateItem(String),

    /// (item, user) pair is already assigned
    #[error("Item '{item}' is already assigned to user '{user}'")]
    DuplicateAssignment { item: String, user: String },

    /// (item, user) pair has no assignment
    #[error("No assignment of item '{item}' to user '{user}'")]
    AssignmentNotFound { item: String, user: String },

    /// Adding an edge would create a loop
    #[error("Cycle detected: {0}")]
    CycleDetected(String),

    /// Structurally invalid hierarchy edit
    #[error("Invalid hierarchy: {0}")]
    InvalidHierarchy(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Business rule evaluation error
    #[error("Business rule evaluation failed: {0}")]
    EvaluationError(String),

    /// Cache backend error
    #[error("Cache error: {0}")]
    CacheError(String),

    /// Database error
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for authorization operations
pub type Result<T> = std::result::Result<T, AuthzError>;
