//! Network-layer error types.

/// Errors from the message registry, the codec, and the shard iterator.
#[derive(Debug, thiserror::Error)]
pub enum NetError {
    /// Failed to encode a message to MessagePack.
    #[error("failed to encode message: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    /// Failed to decode a message from MessagePack.
    #[error("failed to decode message: {0}")]
    Decode(#[from] rmp_serde::decode::Error),

    /// A message with this name was already registered.
    #[error("message '{0}' is already registered")]
    DuplicateMessage(String),

    /// The registry no longer accepts registrations.
    #[error("cannot register message '{0}': registry is frozen")]
    RegistryFrozen(String),

    /// A message ID that no registration corresponds to.
    #[error("queried message with ID {0}, but it does not exist")]
    UnknownMessage(u64),

    /// Shard iteration was asked for an empty or inverted tick range.
    #[error("first number in range must be less than the second (start,stop): got ({start},{stop})")]
    InvalidRange {
        /// First tick requested.
        start: u64,
        /// Last tick requested.
        stop: u64,
    },

    /// The shard feed failed.
    #[error("shard feed error: {0}")]
    Transport(String),

    /// The shard iteration callback failed.
    #[error(transparent)]
    Callback(#[from] anyhow::Error),
}
