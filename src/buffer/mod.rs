//! Size- and time-bounded batching of concurrent submissions.
//!
//! Components:
//! - **Buffer**: owns the current cycle and its timer, runs the [`Aggregate`] operation once per
//!   cycle and hands every submitter its share
//! - **BufferHandle**: submits [`Fragment`]s and waits for their share
//!
//! A cycle closes when `capacity` submissions are buffered or when `interval` elapsed since the
//! previous dispatch, whichever comes first. Cycles run one after the other: the next cycle only
//! opens once the operation of the previous one returned.
//!
//! ```no_run
//! use coalesce::{
//!     buffer::{Buffer, Fragment},
//!     config::BufferConfig,
//! };
//! use std::{convert::Infallible, sync::Arc, time::Duration};
//! use tokio_util::sync::CancellationToken;
//!
//! struct UserId(u64);
//!
//! impl Fragment<Vec<(u64, String)>> for UserId {
//!     type Share = String;
//!
//!     fn pick(&self, users: &Arc<Vec<(u64, String)>>) -> Option<String> {
//!         users.iter().find(|(id, _)| *id == self.0).map(|(_, name)| name.clone())
//!     }
//! }
//!
//! # async fn example() {
//! let load_users = |_: &CancellationToken, ids: &[UserId]| {
//!     // SELECT id, name FROM users WHERE id IN (...)
//!     let users = ids.iter().map(|id| (id.0, format!("user-{}", id.0))).collect::<Vec<_>>();
//!     async move { Ok::<_, Infallible>(users) }
//! };
//!
//! let cancel = CancellationToken::new();
//! let users = Buffer::<UserId, _>::spawn(
//!     &cancel,
//!     load_users,
//!     BufferConfig::new(100, Duration::from_millis(5)),
//! );
//!
//! let name = users.submit(UserId(7)).await.unwrap();
//! assert_eq!(name.as_deref(), Some("user-7"));
//! # }
//! ```

mod handle;
mod metrics;
mod service;
mod types;

pub use handle::BufferHandle;
pub use self::metrics::BufferMetrics;
pub use service::{Buffer, HandleFor};
pub use types::{Aggregate, BufferStats, Fragment, SubmitResult, Whole};
