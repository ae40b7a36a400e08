use std::path::PathBuf;

use thiserror::Error;

use super::resource_type::ResourceType;

/// Failure classification returned by a [`CloudProvider`](crate::cloud::CloudProvider)
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CloudError {
    /// The addressed resource does not exist
    #[error("resource not found: {0}")]
    NotFound(String),

    /// Any other remote failure, assumed transient
    #[error("remote call failed: {0}")]
    Remote(String),

    /// The call did not complete in time and its outcome is unknown
    #[error("remote call timed out after {0:?}")]
    Timeout(std::time::Duration),
}

impl CloudError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, CloudError::NotFound(_))
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        CloudError::NotFound(what.into())
    }

    pub fn remote(message: impl Into<String>) -> Self {
        CloudError::Remote(message.into())
    }
}

/// Error types for export, import and rollback operations
#[derive(Debug, Error)]
pub enum MigrationError {
    /// Pre-flight contract violation; nothing was mutated
    #[error("validation failed:\n{}", .0.join("\n"))]
    Validation(Vec<String>),

    /// A resource that had to exist was absent
    #[error("{resource_type} '{name}' not found")]
    NotFound {
        resource_type: ResourceType,
        name: String,
    },

    /// Every attempt of a remote operation failed
    #[error(
        "{resource_type} '{resource_name}' failed after {} attempt(s): {}",
        .attempts.len(),
        .attempts.last().map(|e| e.to_string()).unwrap_or_default()
    )]
    RetriesExhausted {
        resource_type: ResourceType,
        resource_name: String,
        attempts: Vec<CloudError>,
    },

    /// Server-side blob copy ended in a terminal failure state
    #[error("copy of blob '{blob}' ended with status {status}")]
    BlobCopy { blob: String, status: String },

    /// Interrupted by the operator
    #[error("operation cancelled")]
    Cancelled,

    /// Fatal import failure; progress was persisted and the run can be resumed
    #[error("import failed: {source} (progress saved to {})", .progress_file.display())]
    ImportFailed {
        #[source]
        source: Box<MigrationError>,
        progress_file: PathBuf,
    },

    /// Malformed snapshot, progress or mapping document
    #[error("document error: {0}")]
    Document(String),

    /// Invalid operation parameters
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// General I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl MigrationError {
    pub fn validation(message: impl Into<String>) -> Self {
        MigrationError::Validation(vec![message.into()])
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, MigrationError::Validation(_))
    }

    /// Unwrap a fatal import error to the failure that caused it
    pub fn root(&self) -> &MigrationError {
        match self {
            MigrationError::ImportFailed { source, .. } => source.root(),
            other => other,
        }
    }
}

impl From<serde_json::Error> for MigrationError {
    fn from(err: serde_json::Error) -> Self {
        MigrationError::Document(err.to_string())
    }
}

impl From<serde_yaml::Error> for MigrationError {
    fn from(err: serde_yaml::Error) -> Self {
        MigrationError::Document(err.to_string())
    }
}

impl From<anyhow::Error> for MigrationError {
    fn from(err: anyhow::Error) -> Self {
        MigrationError::Document(format!("{:#}", err))
    }
}

/// Result type for migration operations
pub type Result<T> = std::result::Result<T, MigrationError>;
