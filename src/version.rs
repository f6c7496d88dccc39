//! Coalesce version.

/// The version of coalesce.
pub const COALESCE_VERSION: &str = env!("CARGO_PKG_VERSION");
