use std::{fmt, io};

use regex::Error as RegexError;
use serde::{Deserialize, Serialize};
use serde_json::Error as JsonError;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
pub enum RepositoryError {
    /// A node state was requested from the store that it does not hold.
    #[error("No such item state: {0}")]
    NoSuchItemState(String),
    #[error("Item Not Found: {0}")]
    NotFound(String),
    #[error("Namespace error: {0}")]
    Namespace(String),
    /// A broken installation, e.g. a derivative definition naming an unregistered function.
    #[error("Repository configuration error: {0}")]
    Configuration(String),
    /// The node was modified by someone else since it was read.
    #[error("Write conflict on {id}: expected version {expected}, found {found}")]
    Conflict { id: String, expected: u64, found: u64 },
    #[error("(De)Serialization error: {0}")]
    Serialization(String),
    #[error("File System error: {0}")]
    Io(String),
    #[error("Custom error: {0}")]
    Custom(String),
}

impl RepositoryError {
    /// Whether the error is a transient per-node problem that batch operations may skip.
    pub fn is_transient(&self) -> bool {
        matches!(self, RepositoryError::Conflict { .. })
    }
}

impl From<toml::de::Error> for RepositoryError {
    fn from(src: toml::de::Error) -> RepositoryError {
        RepositoryError::Serialization(format!("Toml deserialization error: {src}"))
    }
}

impl From<toml::ser::Error> for RepositoryError {
    fn from(src: toml::ser::Error) -> RepositoryError {
        RepositoryError::Serialization(format!("Toml serialization error: {src}"))
    }
}

impl From<JsonError> for RepositoryError {
    fn from(src: JsonError) -> RepositoryError {
        RepositoryError::Serialization(format!("JSON (de)serialization error: {src}"))
    }
}

impl From<uuid::Error> for RepositoryError {
    fn from(src: uuid::Error) -> RepositoryError {
        RepositoryError::Serialization(format!("UUID conversion failed: {src}"))
    }
}

impl From<io::Error> for RepositoryError {
    fn from(x: io::Error) -> Self {
        match x.kind() {
            io::ErrorKind::NotFound => RepositoryError::NotFound(format!("{x}")),
            _ => RepositoryError::Io(format!("IOError: {}", x.kind())),
        }
    }
}

impl From<fmt::Error> for RepositoryError {
    fn from(x: fmt::Error) -> Self {
        RepositoryError::Custom(format!("{x}"))
    }
}

impl From<RegexError> for RepositoryError {
    fn from(x: RegexError) -> Self {
        RepositoryError::Serialization(format!("Regex parse failed: {x}"))
    }
}
