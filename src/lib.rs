//! # Coalesce
//!
//! Batching of concurrent requests into a single aggregated operation, dispatched when either a
//! fixed number of requests accumulated or a fixed interval elapsed.
//!
//! See [`buffer`] for an overview.

pub mod buffer;
pub mod config;
pub mod constants;
pub mod error;
pub mod serde;
pub mod version;
