use thiserror::Error;

/// Errors surfaced by a `Pool` operation.
///
/// Any item's failure aborts the whole batch and is surfaced with its index
/// rather than silently skipped - there is no "best effort" mode.
#[derive(Error, Debug)]
pub enum PoolError {
    #[error("item {index} missed its deadline and was killed")]
    Timeout { index: usize },
    #[error("item {index} failed: {source}")]
    Worker { index: usize, source: String },
    #[error("failed to spawn pool worker: {0}")]
    Spawn(String),
    #[error("serialization failed: {0}")]
    Serialization(#[from] suitkaise_serializer::SerializationError),
    #[error("deserialization failed: {0}")]
    Deserialization(#[from] suitkaise_serializer::DeserializationError),
    #[error("channel error: {0}")]
    Channel(#[from] suitkaise_channel::ChannelError),
}
