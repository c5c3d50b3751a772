/// Error type for this crate.
#[derive(Debug, thiserror::Error)]
pub enum KadosError {
    /// Redis error.
    #[error("redis error: {0}")]
    RedisError(#[from] redis::RedisError),

    /// A bucket key failed validation.
    #[error("invalid bucket key: {0}")]
    InvalidBucketKey(String),

    /// A charge carried an argument outside the caller contract.
    #[error("invalid charge argument: {0}")]
    InvalidChargeArgument(String),

    /// The evaluation script returned a reply of an unexpected shape.
    #[error("unexpected script reply: {0}")]
    UnexpectedScriptReply(String),
}
