//! Error taxonomy shared by the stores, the allocation engine and the
//! release coordinator.

use crate::allocation::AllocationResult;
use crate::catalog::ResourceId;
use crate::distance::CoordinateError;
use crate::release::ReleaseSummary;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("resource {resource_id} is not available")]
    Conflict { resource_id: ResourceId },

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("{entity} '{key}' already exists")]
    AlreadyExists { entity: &'static str, key: String },

    #[error("invalid data: {0}")]
    InvalidData(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[cfg(feature = "sqlite")]
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
}

impl StoreError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        StoreError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Whether the failure concerns the store as a whole rather than one row.
    ///
    /// Fatal errors abort a multi-resource call; the rest are aggregated per
    /// resource.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            StoreError::Conflict { .. }
                | StoreError::NotFound { .. }
                | StoreError::AlreadyExists { .. }
                | StoreError::InvalidData(_)
        )
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, thiserror::Error)]
pub enum AllocationError {
    #[error("invalid incident location: {0}")]
    InvalidCoordinates(#[from] CoordinateError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(
        "allocation aborted after {} committed resource(s): {source}",
        .partial.assigned_resources.len()
    )]
    Aborted {
        partial: Box<AllocationResult>,
        #[source]
        source: StoreError,
    },
}

impl AllocationError {
    /// Resources that were committed durably before the call failed.
    pub fn partial(&self) -> Option<&AllocationResult> {
        match self {
            AllocationError::Aborted { partial, .. } => Some(partial),
            _ => None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ReleaseError {
    #[error(
        "release aborted after {} resource(s): {source}",
        .partial.released.len()
    )]
    Aborted {
        partial: ReleaseSummary,
        #[source]
        source: StoreError,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {message}")]
    InvalidValue { key: &'static str, message: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config parse error: {0}")]
    Parse(#[from] serde_json::Error),
}
