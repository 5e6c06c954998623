//! Protocol-specific fetch drivers.
//!
//! All three drivers feed raw source bytes into a [`FetchSession`] and hand
//! the finished session back to the scheduler, which owns the commit step.
//! The drivers themselves never touch the published slot.
//!
//! [`FetchSession`]: crate::session::FetchSession

pub mod file;
pub mod http_async;
pub mod http_sync;

use crate::session::FetchSession;

/// Read-buffer size used by the blocking drivers.
pub(crate) const READ_BUF: usize = 4096;

/// Terminal result of a fetch cycle that did not fail.
pub enum FetchOutcome {
    /// Server answered 304; only `last_checked` should move
    NotModified,
    /// Source fully consumed; ready for the scheduler to commit
    Complete(FetchSession),
}
