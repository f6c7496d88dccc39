//! Serde helpers.

pub mod duration;
