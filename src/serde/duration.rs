//! Human-friendly (de)serialization of [`Duration`] as milliseconds.
//!
//! Buffer intervals are typically a handful of milliseconds, which reads poorly as the
//! `{ secs, nanos }` struct serde uses by default. Whole milliseconds are written as integers,
//! anything finer as a fractional number of milliseconds (`0.5` is 500µs).

use serde::{Deserialize, Deserializer, Serializer, de::Error};
use std::time::Duration;

const NANOS_PER_MILLI: u128 = 1_000_000;

/// Serializes [`Duration`] as milliseconds.
pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let nanos = duration.as_nanos();
    if nanos % NANOS_PER_MILLI == 0 {
        let millis = u64::try_from(nanos / NANOS_PER_MILLI).unwrap_or(u64::MAX);
        serializer.serialize_u64(millis)
    } else {
        serializer.serialize_f64(nanos as f64 / NANOS_PER_MILLI as f64)
    }
}

/// Deserializes milliseconds, whole or fractional, into a [`Duration`].
pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let millis = f64::deserialize(deserializer)?;
    if !millis.is_finite() || millis < 0.0 {
        return Err(D::Error::custom(format!("invalid duration: {millis}ms")));
    }

    let nanos = (millis * NANOS_PER_MILLI as f64).round();
    if nanos > u64::MAX as f64 {
        return Err(D::Error::custom(format!("duration out of range: {millis}ms")));
    }
    Ok(Duration::from_nanos(nanos as u64))
}
