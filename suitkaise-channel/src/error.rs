use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChannelError {
    #[error("the channel's peer has closed its end")]
    Closed,
    #[error("endpoint is locked and cannot be transferred again")]
    EndpointLocked,
    #[error("attempted a receive on a send-only endpoint, or a send on a receive-only endpoint")]
    WrongDirection,
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("failed to encode message: {0}")]
    Encode(#[from] suitkaise_serializer::SerializationError),
    #[error("failed to decode message: {0}")]
    Decode(#[from] suitkaise_serializer::DeserializationError),
}
