//! Core engine for Waymark - ingestion filtering, the sync state machine,
//! and the tracker that ties them to the store and the platform client.
//!
//! The engine is single-writer: fixes are filtered and persisted on the
//! caller's task, and at most one sync cycle runs at a time. The store
//! provides transactional writes; the only timer is the fixed delay between
//! halving retries of a refused batch. Cancellation is by dropping the cycle
//! future - an interrupted claim is recovered by lease expiry.

use std::time::{SystemTime, UNIX_EPOCH};

mod config;
mod filter;
mod sync;
mod tracker;

pub use config::{
    ConfigError, OwnerSection, OwnerSettings, StorageSection, SyncPolicy, SyncSection,
    WaymarkConfig,
};
pub use filter::{IngestReport, ingest_fixes};
pub use sync::{SyncOutcome, run_cycle};
pub use tracker::Tracker;

pub use waymark_api::{HatClient, UploadOutcome};
pub use waymark_store::{LocationStore, StatusCounts, TokenFile};
pub use waymark_types::{AuthToken, LocationFix, LocationRecord, Phata, SyncStatus};

/// Wall clock as seconds since the Unix epoch.
#[must_use]
pub fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}
