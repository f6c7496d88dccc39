/// Errors returned when validating a [`BufferConfig`](crate::config::BufferConfig).
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// The capacity is zero.
    ///
    /// A cycle could never close on size, and the submission queue cannot be bounded to zero.
    #[error("buffer capacity must be positive")]
    ZeroCapacity,
    /// The interval is zero.
    #[error("buffer interval must be positive")]
    ZeroInterval,
}
