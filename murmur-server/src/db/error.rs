use std::fmt;

/// Coarse classification of a [`StoreError`], for callers that branch on the
/// kind of failure rather than its details.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Conflict,
    Reference,
    NotFound,
    Storage,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Reference => "reference",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Storage => "storage",
        };
        f.write_str(name)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A required field is missing or malformed
    #[error("{entity}.{field} {reason}")]
    Validation {
        entity: String,
        field: String,
        reason: String,
    },

    /// A uniqueness constraint rejected the row
    #[error("duplicate value violates {constraint}")]
    Conflict { constraint: String },

    /// A foreign key points at a row that does not exist
    #[error("{entity}.{column} references a missing {target} row")]
    Reference {
        entity: String,
        column: String,
        target: String,
    },

    #[error("{entity} {id} not found")]
    NotFound { entity: String, id: String },

    #[error("invalid schema: {0}")]
    Schema(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    pub fn validation(entity: &str, field: &str, reason: impl Into<String>) -> Self {
        StoreError::Validation {
            entity: entity.to_string(),
            field: field.to_string(),
            reason: reason.into(),
        }
    }

    pub fn not_found(entity: &str, id: impl ToString) -> Self {
        StoreError::NotFound {
            entity: entity.to_string(),
            id: id.to_string(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::Validation { .. } => ErrorKind::Validation,
            StoreError::Conflict { .. } => ErrorKind::Conflict,
            StoreError::Reference { .. } => ErrorKind::Reference,
            StoreError::NotFound { .. } => ErrorKind::NotFound,
            StoreError::Schema(_)
            | StoreError::Database(_)
            | StoreError::Pool(_)
            | StoreError::Serialization(_) => ErrorKind::Storage,
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
