use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Wire-safe error shape sent back by the coordinator. Kept separate from
/// [`SharedStateError`] because the latter wraps non-serializable sources
/// (`std::io::Error`, bincode's).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) enum WireError {
    UnknownObject(String),
    UnknownMethod(String),
    UnknownProperty(String),
    MethodFailed(String),
    ReadTimedOut,
}

impl WireError {
    pub(crate) fn into_error(self, object: &str) -> SharedStateError {
        match self {
            WireError::UnknownObject(name) => SharedStateError::UnknownObject(name),
            WireError::UnknownMethod(method) => {
                SharedStateError::UnknownMethod(object.to_string(), method)
            }
            WireError::UnknownProperty(property) => {
                SharedStateError::UnknownProperty(object.to_string(), property)
            }
            WireError::MethodFailed(msg) => SharedStateError::MethodFailed(msg),
            WireError::ReadTimedOut => SharedStateError::ReadTimedOut,
        }
    }
}

/// Errors surfaced to a [`SharedStateProxy`][crate::SharedStateProxy] or
/// [`SharedState`][crate::SharedState] caller.
#[derive(Error, Debug)]
pub enum SharedStateError {
    #[error("shared-state coordinator is unavailable")]
    Unavailable,

    #[error("no object registered under name {0:?}")]
    UnknownObject(String),

    #[error("object {0:?} has no method named {1:?}")]
    UnknownMethod(String, String),

    #[error("object {0:?} has no property named {1:?}")]
    UnknownProperty(String, String),

    #[error("method invocation failed: {0}")]
    MethodFailed(String),

    #[error("read did not observe completion of its dependent writes before the deadline")]
    ReadTimedOut,

    #[error("failed to spawn or signal the coordinator process: {0}")]
    Spawn(String),

    #[error("I/O error talking to the coordinator: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization failed: {0}")]
    Serialization(#[from] suitkaise_serializer::SerializationError),

    #[error("deserialization failed: {0}")]
    Deserialization(#[from] suitkaise_serializer::DeserializationError),
}
