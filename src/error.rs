//! Error types for the workspace resource engine.

use crate::tree::path::ResourcePath;
use crate::types::QualifiedName;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Coarse classification of a [`ResourceError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    ResourceNotFound,
    ResourceExists,
    OutOfSyncLocal,
    InvalidValue,
    DerivedRootOrProject,
    LinkMissingLocal,
    WrongTypeLocal,
    ProjectClosed,
    OperationCanceled,
    NotInOperation,
    TreeLocked,
    RuleConflict,
    UnknownSyncPartner,
    Io,
    Storage,
    Config,
    Multiple,
}

impl ErrorKind {
    /// Not-found class: plain not-found and link targets missing locally.
    pub fn is_not_found(self) -> bool {
        matches!(self, ErrorKind::ResourceNotFound | ErrorKind::LinkMissingLocal)
    }
}

/// Storage-related errors raised by the save store.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Save store error: {0}")]
    Database(String),

    #[error("Record encoding error: {0}")]
    Encoding(String),

    #[error("Corrupt record at key {key}: {reason}")]
    CorruptRecord { key: String, reason: String },

    #[error("Storage I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Errors produced by workspace operations.
#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("Resource not found: {0}")]
    NotFound(ResourcePath),

    #[error("Resource already exists: {0}")]
    AlreadyExists(ResourcePath),

    #[error("Resource is out of sync with the file system: {0}")]
    OutOfSync(ResourcePath),

    #[error("Invalid value for {path}: {reason}")]
    InvalidValue { path: ResourcePath, reason: String },

    #[error("Operation '{operation}' is not supported on {path}")]
    DerivedRootOrProject {
        path: ResourcePath,
        operation: &'static str,
    },

    #[error("Local location for {path} does not exist: {location}")]
    LinkMissingLocal { path: ResourcePath, location: PathBuf },

    #[error("Local location for {path} has the wrong type: {location}")]
    WrongTypeLocal { path: ResourcePath, location: PathBuf },

    #[error("Project is closed: {0}")]
    ProjectClosed(ResourcePath),

    #[error("Operation canceled")]
    Canceled,

    #[error("Modification of {0} outside of an operation")]
    NotInOperation(ResourcePath),

    #[error("Resource tree is locked during {0} notification")]
    TreeLocked(&'static str),

    #[error("Scheduling rule {requested} is not contained in the held rule {held}")]
    RuleConflict { held: String, requested: String },

    #[error("Sync partner is not registered: {0}")]
    UnknownSyncPartner(QualifiedName),

    #[error("I/O error at {location}: {source}")]
    Io {
        location: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Multiple(MultiStatus),
}

impl ResourceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ResourceError::NotFound(_) => ErrorKind::ResourceNotFound,
            ResourceError::AlreadyExists(_) => ErrorKind::ResourceExists,
            ResourceError::OutOfSync(_) => ErrorKind::OutOfSyncLocal,
            ResourceError::InvalidValue { .. } => ErrorKind::InvalidValue,
            ResourceError::DerivedRootOrProject { .. } => ErrorKind::DerivedRootOrProject,
            ResourceError::LinkMissingLocal { .. } => ErrorKind::LinkMissingLocal,
            ResourceError::WrongTypeLocal { .. } => ErrorKind::WrongTypeLocal,
            ResourceError::ProjectClosed(_) => ErrorKind::ProjectClosed,
            ResourceError::Canceled => ErrorKind::OperationCanceled,
            ResourceError::NotInOperation(_) => ErrorKind::NotInOperation,
            ResourceError::TreeLocked(_) => ErrorKind::TreeLocked,
            ResourceError::RuleConflict { .. } => ErrorKind::RuleConflict,
            ResourceError::UnknownSyncPartner(_) => ErrorKind::UnknownSyncPartner,
            ResourceError::Io { .. } => ErrorKind::Io,
            ResourceError::Storage(_) => ErrorKind::Storage,
            ResourceError::Config(_) => ErrorKind::Config,
            ResourceError::Multiple(_) => ErrorKind::Multiple,
        }
    }

    pub fn is_not_found(&self) -> bool {
        match self {
            ResourceError::Multiple(status) => {
                !status.errors.is_empty() && status.errors.iter().all(|e| e.is_not_found())
            }
            other => other.kind().is_not_found(),
        }
    }

    pub fn is_cancellation(&self) -> bool {
        matches!(self, ResourceError::Canceled)
    }

    pub fn invalid(path: &ResourcePath, reason: impl Into<String>) -> Self {
        ResourceError::InvalidValue {
            path: path.clone(),
            reason: reason.into(),
        }
    }

    pub fn io(location: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ResourceError::Io {
            location: location.into(),
            source,
        }
    }
}

/// Aggregate of per-resource failures from a deep operation.
#[derive(Debug, Default)]
pub struct MultiStatus {
    pub message: String,
    pub errors: Vec<ResourceError>,
}

impl MultiStatus {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            errors: Vec::new(),
        }
    }

    pub fn add(&mut self, error: ResourceError) {
        self.errors.push(error);
    }

    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    /// Collapse into a result: no errors is success, a single error is
    /// returned unwrapped.
    pub fn into_result(mut self) -> Result<(), ResourceError> {
        match self.errors.len() {
            0 => Ok(()),
            1 => Err(self.errors.remove(0)),
            _ => Err(ResourceError::Multiple(self)),
        }
    }
}

impl fmt::Display for MultiStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} problems)", self.message, self.errors.len())?;
        for error in &self.errors {
            write!(f, "\n  - {}", error)?;
        }
        Ok(())
    }
}

impl From<config::ConfigError> for ResourceError {
    fn from(err: config::ConfigError) -> Self {
        ResourceError::Config(err.to_string())
    }
}

impl From<sled::Error> for StorageError {
    fn from(err: sled::Error) -> Self {
        StorageError::Database(err.to_string())
    }
}

impl From<bincode::Error> for StorageError {
    fn from(err: bincode::Error) -> Self {
        StorageError::Encoding(err.to_string())
    }
}
