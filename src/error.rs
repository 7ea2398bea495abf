use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("configuration file not found in '{0}'")]
    NotFound(PathBuf),
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum BackendError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error(transparent)]
    Store(#[from] StoreError),

    // External errors
    #[error(transparent)]
    Database(#[from] mongodb::error::Error),
    #[error(transparent)]
    Cors(#[from] rocket_cors::Error),
}

/// Failures raised by record store adapters.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Database(#[from] mongodb::error::Error),
    #[error(transparent)]
    Serialize(#[from] bson::ser::Error),
    #[error(transparent)]
    Deserialize(#[from] bson::de::Error),
    #[error("key predicates must be equality checks (field '{0}')")]
    MalformedKey(String),
    #[error("record in '{0}' has no string id")]
    MissingId(String),
}

/// Failures raised by object storage backends.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("invalid object path '{0}'")]
    InvalidPath(String),
}

/// The only error type that crosses the service boundary.
///
/// Validation and authorization messages are meant to be shown to the user
/// as they are; `RemoteUnavailable` keeps its cause for logging only.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{collection} '{id}' doesn't exist")]
    NotFound { collection: &'static str, id: String },
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("enrollment code is invalid or was already used")]
    InvalidOrUsedCode,
    #[error("{0}")]
    ValidationFailed(String),
    #[error("remote service unavailable: {0}")]
    RemoteUnavailable(String),
}

impl ServiceError {
    pub fn not_found(collection: &'static str, id: impl ToString) -> ServiceError {
        ServiceError::NotFound {
            collection,
            id: id.to_string(),
        }
    }

    pub fn unauthorized(reason: impl ToString) -> ServiceError {
        ServiceError::Unauthorized(reason.to_string())
    }

    pub fn invalid(reason: impl ToString) -> ServiceError {
        ServiceError::ValidationFailed(reason.to_string())
    }
}

impl From<StoreError> for ServiceError {
    fn from(e: StoreError) -> Self {
        tracing::error!("record store failure: {}", e);
        ServiceError::RemoteUnavailable(e.to_string())
    }
}

impl From<StorageError> for ServiceError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::InvalidPath(path) => {
                ServiceError::ValidationFailed(format!("invalid file name '{}'", path))
            }
            other => {
                tracing::error!("object storage failure: {}", other);
                ServiceError::RemoteUnavailable(other.to_string())
            }
        }
    }
}

impl From<bson::ser::Error> for ServiceError {
    fn from(e: bson::ser::Error) -> Self {
        StoreError::from(e).into()
    }
}

impl From<bson::de::Error> for ServiceError {
    fn from(e: bson::de::Error) -> Self {
        StoreError::from(e).into()
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;
