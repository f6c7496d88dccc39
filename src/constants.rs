//! Buffer constants.

use std::time::Duration;

/// Default number of submissions that closes a cycle.
pub const DEFAULT_CAPACITY: usize = 64;

/// Default time a cycle stays open before it is dispatched.
///
/// The countdown restarts after every dispatch, so this is the maximum latency a submission adds
/// on top of the aggregation itself.
pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(10);

/// Label attached to metrics of buffers that were not given a name.
pub const DEFAULT_BUFFER_NAME: &str = "default";
