//! Buffer error types.

mod buffer;
pub use buffer::BufferError;

mod config;
pub use config::ConfigError;
