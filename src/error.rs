use core::fmt;
use std::fmt::{Debug, Display, Formatter};
use std::io;

use thiserror::Error;

use crate::types::{LogicalPath, VersionNum};

pub type Result<T, E = OcflError> = core::result::Result<T, E>;

/// Application errors
#[derive(Error)]
pub enum OcflError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Key not found: {0}")]
    KeyNotFound(String),

    #[error("Object {object_id} cannot be updated: {message}")]
    ObjectOutOfSync { object_id: String, message: String },

    #[error("Object {object_id} is corrupt: {message}")]
    CorruptObject { object_id: String, message: String },

    #[error("Fixity check failed: expected {expected} digest {expected_digest}; found {actual}")]
    FixityCheck {
        expected: String,
        expected_digest: String,
        actual: String,
    },

    #[error("Path {0} already exists. Specify the overwrite flag to replace it.")]
    Overwrite(LogicalPath),

    #[error("Illegal path: {0}")]
    PathConstraint(String),

    #[error("Extension {0} is not supported")]
    ExtensionUnsupported(String),

    #[error("Invalid value: {0}")]
    InvalidValue(String),

    #[error("Illegal state: {0}")]
    IllegalState(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Failed to acquire lock on object {0}")]
    LockAcquire(String),

    #[error("The repository is closed")]
    Closed,

    #[error("{0}")]
    Io(#[from] io::Error),

    #[error("{0}")]
    Serde(#[from] serde_json::Error),

    #[error("{0}")]
    General(String),
}

/// Constructs an `OcflError::NotFound` error for an object or object version
pub fn not_found(object_id: &str, version_num: Option<VersionNum>) -> OcflError {
    match version_num {
        Some(version) => OcflError::NotFound(format!("Object {} version {}", object_id, version)),
        None => OcflError::NotFound(format!("Object {}", object_id)),
    }
}

/// Constructs an `OcflError::NotFound` error for a logical path within an object version
pub fn not_found_path(object_id: &str, version_num: VersionNum, path: &LogicalPath) -> OcflError {
    OcflError::NotFound(format!(
        "Path {} not found in object {} version {}",
        path, object_id, version_num
    ))
}

impl Debug for OcflError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(self, f)
    }
}

impl From<walkdir::Error> for OcflError {
    fn from(e: walkdir::Error) -> Self {
        OcflError::General(e.to_string())
    }
}

impl From<globset::Error> for OcflError {
    fn from(e: globset::Error) -> Self {
        OcflError::General(e.to_string())
    }
}
