//! Durable storage for Waymark: the location record queue and the
//! persisted auth token.
//!
//! The queue is a single-table SQLite database accessed through transactional
//! write blocks. Records enter as `unsynced`, are claimed under a lease while
//! an upload is in flight (`syncing`), and are purged once confirmed
//! `synced`. An upload that dies without releasing its claim is recovered by
//! lease expiry.

mod credentials;
mod queue;
mod sqlite_util;

pub use credentials::TokenFile;
pub use queue::{DEFAULT_LEASE_SECS, LocationStore, StatusCounts};
