use thiserror::Error;

/// Errors raised while turning a value into bytes.
#[derive(Error, Debug)]
pub enum SerializationError {
    #[error("registered handler rejected the value for encoding")]
    HandlerRejected,
    #[error("bincode encoding failed: {0}")]
    Codec(#[from] bincode::Error),
}

/// Errors raised while turning bytes back into a value.
#[derive(Error, Debug)]
pub enum DeserializationError {
    #[error("input was truncated before a complete message could be read")]
    Truncated,
    #[error("unknown tag {0} in encoded stream")]
    UnknownTag(u32),
    #[error("registered handler failed: {0}")]
    HandlerFailed(String),
    #[error("format version skew: expected {expected}, found {found}")]
    VersionSkew { expected: u16, found: u16 },
    #[error("bincode decoding failed: {0}")]
    Codec(#[from] bincode::Error),
}
