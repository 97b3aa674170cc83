//! Persisted location records and their synchronization state.

use std::fmt;

use chrono::{Local, TimeZone};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::fix::LocationFix;

/// Row identifier of a persisted record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(i64);

impl RecordId {
    #[must_use]
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    #[must_use]
    pub fn value(self) -> i64 {
        self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Synchronization state of a stored record.
///
/// The lifecycle is monotonic: `Unsynced -> Syncing -> Synced`. The single
/// backward edge, `Syncing -> Unsynced`, exists only for lease recovery - a
/// claim that was abandoned mid-upload (lease expired) or explicitly released
/// after a failed delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Unsynced,
    Syncing,
    Synced,
}

#[derive(Debug, Error)]
#[error("unknown sync status: {0:?}")]
pub struct SyncStatusParseError(String);

impl SyncStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unsynced => "unsynced",
            Self::Syncing => "syncing",
            Self::Synced => "synced",
        }
    }

    /// Whether moving to `next` is a legal lifecycle edge.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Unsynced, Self::Syncing)
                | (Self::Syncing, Self::Synced)
                | (Self::Syncing, Self::Unsynced)
        )
    }
}

impl std::str::FromStr for SyncStatus {
    type Err = SyncStatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unsynced" => Ok(Self::Unsynced),
            "syncing" => Ok(Self::Syncing),
            "synced" => Ok(Self::Synced),
            other => Err(SyncStatusParseError(other.to_string())),
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A location fix as persisted in the record queue.
#[derive(Debug, Clone, PartialEq)]
pub struct LocationRecord {
    pub id: RecordId,
    pub latitude: f64,
    pub longitude: f64,
    pub horizontal_accuracy: f64,
    pub vertical_accuracy: f64,
    pub altitude: f64,
    pub speed: f64,
    pub course: f64,
    /// Creation time, seconds since the Unix epoch.
    pub recorded_at: i64,
    /// The same instant formatted in the local timezone.
    pub recorded_local: String,
    pub status: SyncStatus,
    /// When `status` last changed. For `Syncing` this is the lease
    /// acquisition instant.
    pub status_changed_at: i64,
}

impl LocationRecord {
    /// Build an unsynced record from an accepted fix.
    ///
    /// `now` is the creation instant; the fix's own capture timestamp is kept
    /// only when the feed provided one.
    #[must_use]
    pub fn from_fix(fix: &LocationFix, now: i64) -> Self {
        let recorded_at = if fix.timestamp > 0 { fix.timestamp } else { now };
        Self {
            id: RecordId::new(0),
            latitude: fix.latitude,
            longitude: fix.longitude,
            horizontal_accuracy: fix.horizontal_accuracy,
            vertical_accuracy: fix.vertical_accuracy,
            altitude: fix.altitude,
            speed: fix.speed,
            course: fix.course,
            recorded_at,
            recorded_local: local_timestamp(recorded_at),
            status: SyncStatus::Unsynced,
            status_changed_at: now,
        }
    }
}

/// Format an epoch-seconds instant as ISO 8601 in the local timezone,
/// e.g. `2024-01-15T10:30:00+01:00`.
#[must_use]
pub fn local_timestamp(epoch_secs: i64) -> String {
    match Local.timestamp_opt(epoch_secs, 0).single() {
        Some(t) => t.format("%Y-%m-%dT%H:%M:%S%:z").to_string(),
        None => String::new(),
    }
}
