//! The tracker: one owner's capture-and-sync loop.

use anyhow::Result;
use tokio::sync::watch;

use waymark_api::HatClient;
use waymark_store::{LocationStore, StatusCounts, TokenFile};
use waymark_types::LocationFix;

use crate::config::SyncPolicy;
use crate::filter::{IngestReport, ingest_fixes};
use crate::sync::{SyncOutcome, run_cycle};
use crate::unix_now;

/// Ties the ingestion filter and the sync state machine to one store, one
/// endpoint, and one token file.
pub struct Tracker {
    store: LocationStore,
    client: HatClient,
    token_file: TokenFile,
    policy: SyncPolicy,
    sync_active: watch::Sender<bool>,
}

impl Tracker {
    #[must_use]
    pub fn new(
        mut store: LocationStore,
        client: HatClient,
        token_file: TokenFile,
        policy: SyncPolicy,
    ) -> Self {
        store.set_lease_secs(policy.lease_secs);
        let (sync_active, _) = watch::channel(false);
        Self {
            store,
            client,
            token_file,
            policy,
            sync_active,
        }
    }

    /// Observe whether a sync is in flight. Flips to `false` once no
    /// further sync is pending, so a host holding a background execution
    /// grant can scope it to this flag.
    #[must_use]
    pub fn subscribe_sync_active(&self) -> watch::Receiver<bool> {
        self.sync_active.subscribe()
    }

    /// Filter and persist a batch of raw fixes.
    pub fn ingest(&mut self, fixes: &[LocationFix]) -> Result<IngestReport> {
        ingest_fixes(&mut self.store, fixes, unix_now())
    }

    /// Run a sync cycle if the pending backlog warrants one.
    ///
    /// Returns `None` when the backlog is at or below the trigger
    /// threshold and nothing was attempted.
    pub async fn maybe_sync(&mut self) -> Result<Option<SyncOutcome>> {
        self.store.reclaim_expired(unix_now())?;
        if self.store.pending_count()? <= self.policy.trigger_threshold {
            return Ok(None);
        }
        self.sync_now().await.map(Some)
    }

    /// Run a sync cycle regardless of backlog depth (shutdown flush).
    pub async fn flush(&mut self) -> Result<SyncOutcome> {
        self.sync_now().await
    }

    async fn sync_now(&mut self) -> Result<SyncOutcome> {
        let _ = self.sync_active.send(true);
        let result = run_cycle(&mut self.store, &self.client, &self.token_file, &self.policy).await;
        let _ = self.sync_active.send(false);
        result
    }

    /// Queue depth by status.
    pub fn status(&self) -> Result<StatusCounts> {
        self.store.status_counts()
    }
}
