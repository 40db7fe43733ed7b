use std::io;

use serde::{Deserialize, Serialize};
use serde_json::Error as JsonError;
use thiserror::Error;
use tokio::sync::mpsc::error::SendError as TokioSendError;

use crate::storage::StoreDelta;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Error)]
pub enum RamifyError {
    /// The forward and backlink maps disagree, or the tree failed a structural
    /// self check. Recovered by a full index rebuild, never patched in place.
    #[error("Consistency violation: {0}")]
    Consistency(String),
    #[error("Custom error: {0}")]
    Custom(String),
    #[error("File system error: {0}")]
    Io(String),
    #[error("Item not found: {0}")]
    NotFound(String),
    /// A bulk operation observed its cancellation flag at a chunk boundary.
    /// State is left at the last completed chunk.
    #[error("Operation cancelled")]
    OperationCancelled,
    #[error("(De)serialization error: {0}")]
    Serialization(String),
    /// The operation would break a tree or selection invariant. The engine
    /// state is left unchanged.
    #[error("Validation failed: {0}")]
    Validation(String),
}

impl From<toml::de::Error> for RamifyError {
    fn from(src: toml::de::Error) -> RamifyError {
        RamifyError::Serialization(format!("Toml deserialization error: {src}"))
    }
}

impl From<toml::ser::Error> for RamifyError {
    fn from(src: toml::ser::Error) -> RamifyError {
        RamifyError::Serialization(format!("Toml serialization error: {src}"))
    }
}

impl From<JsonError> for RamifyError {
    fn from(src: JsonError) -> RamifyError {
        RamifyError::Serialization(format!("JSON (de)serialization error: {src}"))
    }
}

impl From<uuid::Error> for RamifyError {
    fn from(src: uuid::Error) -> RamifyError {
        RamifyError::Serialization(format!("UUID conversion failed: {src}"))
    }
}

impl From<io::Error> for RamifyError {
    fn from(x: io::Error) -> Self {
        match x.kind() {
            io::ErrorKind::NotFound => RamifyError::NotFound(format!("{x}")),
            _ => RamifyError::Io(format!("IOError: {}", x.kind())),
        }
    }
}

impl From<TokioSendError<StoreDelta>> for RamifyError {
    fn from(x: TokioSendError<StoreDelta>) -> Self {
        RamifyError::Io(format!(
            "Channel send error, could not transmit store delta {}",
            x.0
        ))
    }
}
