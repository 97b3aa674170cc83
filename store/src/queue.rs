//! The persisted location record queue.

use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result};
use rusqlite::{Connection, Row, params};
use tracing::debug;

use waymark_types::{LocationRecord, RecordId, SyncStatus};

use crate::sqlite_util::open_secure_db;

/// How long a `syncing` claim stays valid before it is considered abandoned
/// and reclaimable.
pub const DEFAULT_LEASE_SECS: i64 = 300;

const RECORD_COLUMNS: &str = "id, latitude, longitude, horizontal_accuracy, vertical_accuracy, \
     altitude, speed, course, recorded_at, recorded_local, sync_status, status_changed_at";

/// Queue depth broken down by sync status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusCounts {
    pub unsynced: usize,
    pub syncing: usize,
    pub synced: usize,
}

impl StatusCounts {
    #[must_use]
    pub fn total(&self) -> usize {
        self.unsynced + self.syncing + self.synced
    }
}

/// SQLite-backed queue of location records awaiting upload.
pub struct LocationStore {
    db: Connection,
    lease_secs: i64,
}

impl LocationStore {
    const SCHEMA: &'static str = r"
        CREATE TABLE IF NOT EXISTS locations (
            id INTEGER PRIMARY KEY,
            latitude REAL NOT NULL,
            longitude REAL NOT NULL,
            horizontal_accuracy REAL NOT NULL,
            vertical_accuracy REAL NOT NULL,
            altitude REAL NOT NULL,
            speed REAL NOT NULL,
            course REAL NOT NULL,
            recorded_at INTEGER NOT NULL,
            recorded_local TEXT NOT NULL,
            sync_status TEXT NOT NULL,
            status_changed_at INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_locations_status
        ON locations(sync_status);

        CREATE INDEX IF NOT EXISTS idx_locations_recorded
        ON locations(recorded_at);
    ";

    /// Open or create the queue database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let db = open_secure_db(path.as_ref())?;
        Self::initialize(db)
    }

    /// Open an in-memory queue (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let db = Connection::open_in_memory().context("Failed to open in-memory queue")?;
        Self::initialize(db)
    }

    fn initialize(db: Connection) -> Result<Self> {
        db.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=FULL;")
            .context("Failed to set queue pragmas")?;
        db.execute_batch(Self::SCHEMA)
            .context("Failed to create queue schema")?;
        Ok(Self {
            db,
            lease_secs: DEFAULT_LEASE_SECS,
        })
    }

    /// Override the claim lease duration (seconds).
    pub fn set_lease_secs(&mut self, lease_secs: i64) {
        self.lease_secs = lease_secs;
    }

    /// Persist an accepted fix. The record always enters as `unsynced`.
    pub fn append(&mut self, record: &LocationRecord) -> Result<RecordId> {
        self.db
            .execute(
                "INSERT INTO locations (latitude, longitude, horizontal_accuracy,
                     vertical_accuracy, altitude, speed, course, recorded_at,
                     recorded_local, sync_status, status_changed_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    record.latitude,
                    record.longitude,
                    record.horizontal_accuracy,
                    record.vertical_accuracy,
                    record.altitude,
                    record.speed,
                    record.course,
                    record.recorded_at,
                    &record.recorded_local,
                    SyncStatus::Unsynced.as_str(),
                    record.status_changed_at,
                ],
            )
            .context("Failed to insert location record")?;

        Ok(RecordId::new(self.db.last_insert_rowid()))
    }

    /// The most recently recorded fix, if any. Input to the ingestion
    /// filter's movement gate.
    pub fn latest(&self) -> Result<Option<LocationRecord>> {
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM locations ORDER BY recorded_at DESC, id DESC LIMIT 1"
        );
        let mut stmt = self
            .db
            .prepare(&sql)
            .context("Failed to prepare latest query")?;

        let mut rows = stmt
            .query_map([], row_to_record)
            .context("Failed to query latest record")?;

        match rows.next() {
            Some(row) => Ok(Some(row.context("Failed to read latest record")?)),
            None => Ok(None),
        }
    }

    /// Return abandoned `syncing` claims (lease older than the window) to
    /// `unsynced`. Returns how many were reclaimed.
    pub fn reclaim_expired(&mut self, now: i64) -> Result<usize> {
        let reclaimed = self
            .db
            .execute(
                "UPDATE locations SET sync_status = ?1, status_changed_at = ?2
                 WHERE sync_status = ?3 AND status_changed_at <= ?4",
                params![
                    SyncStatus::Unsynced.as_str(),
                    now,
                    SyncStatus::Syncing.as_str(),
                    now - self.lease_secs,
                ],
            )
            .context("Failed to reclaim expired claims")?;
        if reclaimed > 0 {
            debug!(reclaimed, "Reclaimed expired sync claims");
        }
        Ok(reclaimed)
    }

    /// Count of `unsynced` records - the sync trigger input.
    pub fn pending_count(&self) -> Result<usize> {
        let count: i64 = self
            .db
            .query_row(
                "SELECT COUNT(*) FROM locations WHERE sync_status = ?1",
                [SyncStatus::Unsynced.as_str()],
                |row| row.get(0),
            )
            .context("Failed to count pending records")?;
        Ok(count as usize)
    }

    /// Claim up to `limit` records for upload, in one transaction:
    /// expired claims are reclaimed first, then the *newest* `unsynced`
    /// records (recorded time descending) are marked `syncing` with a fresh
    /// lease stamped at `now`.
    pub fn claim_batch(&mut self, limit: usize, now: i64) -> Result<Vec<LocationRecord>> {
        let lease_secs = self.lease_secs;
        let tx = self
            .db
            .transaction()
            .context("Failed to start claim transaction")?;

        tx.execute(
            "UPDATE locations SET sync_status = ?1, status_changed_at = ?2
             WHERE sync_status = ?3 AND status_changed_at <= ?4",
            params![
                SyncStatus::Unsynced.as_str(),
                now,
                SyncStatus::Syncing.as_str(),
                now - lease_secs,
            ],
        )
        .context("Failed to reclaim expired claims")?;

        let mut records = {
            let sql = format!(
                "SELECT {RECORD_COLUMNS} FROM locations WHERE sync_status = ?1
                 ORDER BY recorded_at DESC, id DESC LIMIT ?2"
            );
            let mut stmt = tx.prepare(&sql).context("Failed to prepare claim query")?;
            let rows = stmt
                .query_map(params![SyncStatus::Unsynced.as_str(), limit as i64], row_to_record)
                .context("Failed to query claim candidates")?;

            let mut records = Vec::new();
            for row in rows {
                records.push(row.context("Failed to read claim candidate")?);
            }
            records
        };

        for record in &mut records {
            tx.execute(
                "UPDATE locations SET sync_status = ?1, status_changed_at = ?2 WHERE id = ?3",
                params![SyncStatus::Syncing.as_str(), now, record.id.value()],
            )
            .context("Failed to mark record syncing")?;
            record.status = SyncStatus::Syncing;
            record.status_changed_at = now;
        }

        tx.commit().context("Failed to commit claim")?;
        Ok(records)
    }

    /// Release claimed records back to `unsynced` (failed or abandoned
    /// delivery). Only rows currently `syncing` are touched.
    pub fn release(&mut self, ids: &[RecordId], now: i64) -> Result<usize> {
        self.transition(ids, SyncStatus::Syncing, SyncStatus::Unsynced, now)
    }

    /// Mark claimed records as delivered. Only rows currently `syncing` are
    /// touched - a record can never jump straight from `unsynced` to `synced`.
    pub fn mark_synced(&mut self, ids: &[RecordId], now: i64) -> Result<usize> {
        self.transition(ids, SyncStatus::Syncing, SyncStatus::Synced, now)
    }

    fn transition(
        &mut self,
        ids: &[RecordId],
        from: SyncStatus,
        to: SyncStatus,
        now: i64,
    ) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        debug_assert!(from.can_transition_to(to));

        let tx = self
            .db
            .transaction()
            .context("Failed to start transition transaction")?;
        let mut changed = 0;
        for id in ids {
            changed += tx
                .execute(
                    "UPDATE locations SET sync_status = ?1, status_changed_at = ?2
                     WHERE id = ?3 AND sync_status = ?4",
                    params![to.as_str(), now, id.value(), from.as_str()],
                )
                .with_context(|| format!("Failed to transition record {id}"))?;
        }
        tx.commit().context("Failed to commit transition")?;
        Ok(changed)
    }

    /// Delete records confirmed as delivered. Returns how many were removed.
    pub fn purge_synced(&mut self) -> Result<usize> {
        self.db
            .execute(
                "DELETE FROM locations WHERE sync_status = ?1",
                [SyncStatus::Synced.as_str()],
            )
            .context("Failed to purge synced records")
    }

    /// Queue depth broken down by status.
    pub fn status_counts(&self) -> Result<StatusCounts> {
        let mut stmt = self
            .db
            .prepare("SELECT sync_status, COUNT(*) FROM locations GROUP BY sync_status")
            .context("Failed to prepare status count query")?;
        let rows = stmt
            .query_map([], |row| {
                let status: String = row.get(0)?;
                let count: i64 = row.get(1)?;
                Ok((status, count))
            })
            .context("Failed to count by status")?;

        let mut counts = StatusCounts::default();
        for row in rows {
            let (status, count) = row.context("Failed to read status count")?;
            match SyncStatus::from_str(&status) {
                Ok(SyncStatus::Unsynced) => counts.unsynced = count as usize,
                Ok(SyncStatus::Syncing) => counts.syncing = count as usize,
                Ok(SyncStatus::Synced) => counts.synced = count as usize,
                Err(_) => continue,
            }
        }
        Ok(counts)
    }
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<LocationRecord> {
    let status_str: String = row.get(10)?;
    let status = SyncStatus::from_str(&status_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(10, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(LocationRecord {
        id: RecordId::new(row.get(0)?),
        latitude: row.get(1)?,
        longitude: row.get(2)?,
        horizontal_accuracy: row.get(3)?,
        vertical_accuracy: row.get(4)?,
        altitude: row.get(5)?,
        speed: row.get(6)?,
        course: row.get(7)?,
        recorded_at: row.get(8)?,
        recorded_local: row.get(9)?,
        status,
        status_changed_at: row.get(11)?,
    })
}
