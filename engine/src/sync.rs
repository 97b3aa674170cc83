//! The sync cycle: claim, upload, and the halving fallback for refused
//! batches.
//!
//! A cycle claims the newest pending records (up to the batch cap) under a
//! lease and POSTs them as one batch. A 201 acknowledgement marks them
//! synced; a 400 on a batch large enough to split triggers the fallback -
//! wait a fixed delay, bisect, and retry each half, until sub-batches reach
//! the terminal size. Every terminal batch must earn its own 201; anything
//! else returns its records to the queue for a later cycle.

use anyhow::{Context, Result, anyhow};
use tracing::{debug, info, warn};

use waymark_api::{HatClient, UploadOutcome};
use waymark_store::{LocationStore, TokenFile};
use waymark_types::{LocationPayload, LocationRecord, RecordId};

use crate::config::SyncPolicy;
use crate::unix_now;

/// What a sync cycle did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncOutcome {
    /// Records claimed at cycle start.
    pub claimed: usize,
    /// Records acknowledged by the server and marked synced.
    pub delivered: usize,
    /// Records released back to the queue after failed delivery.
    pub released: usize,
    /// Synced records purged at cycle end.
    pub purged: usize,
    /// Whether the server rotated the auth token during the cycle.
    pub token_rotated: bool,
}

fn ids_of(records: &[LocationRecord]) -> Vec<RecordId> {
    records.iter().map(|r| r.id).collect()
}

/// Run one sync cycle against the owner's endpoint.
///
/// The claim is processed as a stack of chunks, which yields the same order
/// a recursive bisection would: a refused chunk's first half is retried
/// before its second.
pub async fn run_cycle(
    store: &mut LocationStore,
    client: &HatClient,
    token_file: &TokenFile,
    policy: &SyncPolicy,
) -> Result<SyncOutcome> {
    let batch = store.claim_batch(policy.max_batch, unix_now())?;
    let mut outcome = SyncOutcome {
        claimed: batch.len(),
        ..Default::default()
    };
    if batch.is_empty() {
        return Ok(outcome);
    }

    let mut token = token_file
        .load()?
        .ok_or_else(|| anyhow!("no auth token available; set owner.token or WAYMARK_TOKEN"))?;

    debug!(records = batch.len(), "Starting sync cycle");
    let mut chunks: Vec<Vec<LocationRecord>> = vec![batch];

    while let Some(chunk) = chunks.pop() {
        let payloads: Vec<LocationPayload> = chunk.iter().map(LocationPayload::from).collect();

        match client.upload(&token, &payloads).await {
            UploadOutcome::Created { refreshed_token } => {
                if let Some(new_token) = refreshed_token {
                    token_file
                        .save(&new_token)
                        .context("Failed to persist rotated auth token")?;
                    token = new_token;
                    outcome.token_rotated = true;
                }
                outcome.delivered += store.mark_synced(&ids_of(&chunk), unix_now())?;
            }
            UploadOutcome::Rejected => {
                if chunk.len() > policy.split_threshold {
                    debug!(
                        records = chunk.len(),
                        delay_ms = policy.split_delay.as_millis(),
                        "Batch refused; retrying as halves after delay"
                    );
                    tokio::time::sleep(policy.split_delay).await;

                    let mut first = chunk;
                    let second = first.split_off(first.len() / 2);
                    chunks.push(second);
                    chunks.push(first);
                } else {
                    // Terminal size and still refused: likely a poison
                    // record. Back to the queue, never faked as delivered.
                    warn!(
                        records = chunk.len(),
                        "Terminal batch refused; releasing for a later cycle"
                    );
                    outcome.released += store.release(&ids_of(&chunk), unix_now())?;
                }
            }
            UploadOutcome::Failed { status, detail } => {
                // Transport or server trouble is not batch-specific; stop
                // the cycle and release everything still claimed.
                warn!(?status, detail, "Upload failed; ending sync cycle");
                let mut ids = ids_of(&chunk);
                for rest in chunks.drain(..) {
                    ids.extend(ids_of(&rest));
                }
                outcome.released += store.release(&ids, unix_now())?;
            }
        }
    }

    outcome.purged = store.purge_synced()?;
    if outcome.delivered > 0 {
        info!(
            delivered = outcome.delivered,
            released = outcome.released,
            "Sync cycle complete"
        );
    }
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use waymark_types::{AuthToken, LocationFix};
    use wiremock::{Mock, MockServer, Request, ResponseTemplate};
    use wiremock::matchers::method;

    const NOW: i64 = 1_700_000_000;

    /// Fast policy for tests (no real delays).
    fn fast_policy() -> SyncPolicy {
        SyncPolicy {
            split_delay: Duration::from_millis(1),
            ..Default::default()
        }
    }

    fn store_with(n: usize) -> LocationStore {
        let mut store = LocationStore::open_in_memory().expect("open store");
        for i in 0..n {
            let fix = LocationFix {
                latitude: 1.0 + i as f64,
                longitude: 2.0,
                horizontal_accuracy: 10.0,
                vertical_accuracy: 0.0,
                altitude: 0.0,
                speed: 0.0,
                course: 0.0,
                timestamp: NOW + i as i64,
            };
            store
                .append(&LocationRecord::from_fix(&fix, NOW))
                .expect("append");
        }
        store
    }

    fn token_file(dir: &tempfile::TempDir) -> TokenFile {
        let file = TokenFile::new(dir.path().join("token"));
        file.save(&AuthToken::new("test-token").unwrap())
            .expect("seed token");
        file
    }

    fn client_for(server: &MockServer) -> HatClient {
        HatClient::with_endpoint(format!("{}/locations", server.uri()), reqwest::Client::new())
    }

    fn body_len(request: &Request) -> usize {
        let body: serde_json::Value = serde_json::from_slice(&request.body).unwrap();
        body.as_array().expect("JSON array body").len()
    }

    #[tokio::test]
    async fn empty_queue_is_a_noop() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(201))
            .expect(0)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let mut store = store_with(0);
        let outcome = run_cycle(&mut store, &client_for(&server), &token_file(&dir), &fast_policy())
            .await
            .expect("cycle");

        assert_eq!(outcome, SyncOutcome::default());
    }

    #[tokio::test]
    async fn acknowledged_batch_is_marked_synced_and_purged() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let mut store = store_with(12);
        let outcome = run_cycle(&mut store, &client_for(&server), &token_file(&dir), &fast_policy())
            .await
            .expect("cycle");

        assert_eq!(outcome.claimed, 12);
        assert_eq!(outcome.delivered, 12);
        assert_eq!(outcome.purged, 12);
        assert_eq!(store.status_counts().unwrap().total(), 0);
    }

    #[tokio::test]
    async fn batch_never_exceeds_the_cap() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(|request: &Request| {
                assert!(body_len(request) <= 100, "batch exceeded cap");
                ResponseTemplate::new(201)
            })
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let mut store = store_with(150);
        let outcome = run_cycle(&mut store, &client_for(&server), &token_file(&dir), &fast_policy())
            .await
            .expect("cycle");

        assert_eq!(outcome.claimed, 100);
        assert_eq!(outcome.delivered, 100);
        // The overflow stays queued for the next cycle.
        assert_eq!(store.pending_count().unwrap(), 50);
    }

    #[tokio::test]
    async fn refused_batch_is_halved_until_terminal_and_each_half_acked() {
        let server = MockServer::start().await;
        let terminal_sizes = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sizes = terminal_sizes.clone();

        // Refuse anything above the terminal size, accept the rest.
        Mock::given(method("POST"))
            .respond_with(move |request: &Request| {
                let len = body_len(request);
                if len > 10 {
                    ResponseTemplate::new(400)
                } else {
                    sizes.lock().unwrap().push(len);
                    ResponseTemplate::new(201)
                }
            })
            .expect(3) // 20 -> 400, then 10 + 10 -> 201
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let mut store = store_with(20);
        let outcome = run_cycle(&mut store, &client_for(&server), &token_file(&dir), &fast_policy())
            .await
            .expect("cycle");

        assert_eq!(outcome.delivered, 20);
        assert_eq!(outcome.released, 0);
        assert_eq!(store.status_counts().unwrap().total(), 0);
        for size in terminal_sizes.lock().unwrap().iter() {
            assert!(*size <= 10, "terminal sub-batch of {size} records");
        }
    }

    #[tokio::test]
    async fn persistently_refused_records_are_released_not_faked() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400))
            .expect(3) // 12 -> 400, then 6 + 6 -> 400
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let mut store = store_with(12);
        let outcome = run_cycle(&mut store, &client_for(&server), &token_file(&dir), &fast_policy())
            .await
            .expect("cycle");

        assert_eq!(outcome.delivered, 0);
        assert_eq!(outcome.released, 12);
        let counts = store.status_counts().unwrap();
        assert_eq!(counts.unsynced, 12);
        assert_eq!(counts.synced, 0);
    }

    #[tokio::test]
    async fn transport_failure_releases_the_whole_claim() {
        let server = MockServer::start().await;
        let uri = server.uri();
        drop(server);

        let dir = tempfile::tempdir().unwrap();
        let mut store = store_with(15);
        let client = HatClient::with_endpoint(format!("{uri}/locations"), reqwest::Client::new());
        let outcome = run_cycle(&mut store, &client, &token_file(&dir), &fast_policy())
            .await
            .expect("cycle");

        assert_eq!(outcome.delivered, 0);
        assert_eq!(outcome.released, 15);
        assert_eq!(store.pending_count().unwrap(), 15);
    }

    #[tokio::test]
    async fn server_error_mid_split_releases_remaining_halves() {
        let server = MockServer::start().await;
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();

        // Full batch refused, first half hits a 500: the second half must
        // not be attempted.
        Mock::given(method("POST"))
            .respond_with(move |_: &Request| {
                match counter.fetch_add(1, Ordering::SeqCst) {
                    0 => ResponseTemplate::new(400),
                    _ => ResponseTemplate::new(500),
                }
            })
            .expect(2)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let mut store = store_with(14);
        let outcome = run_cycle(&mut store, &client_for(&server), &token_file(&dir), &fast_policy())
            .await
            .expect("cycle");

        assert_eq!(outcome.delivered, 0);
        assert_eq!(outcome.released, 14);
        assert_eq!(store.pending_count().unwrap(), 14);
    }

    #[tokio::test]
    async fn rotated_token_is_persisted_and_used_for_later_halves() {
        let server = MockServer::start().await;
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();

        Mock::given(method("POST"))
            .respond_with(move |request: &Request| {
                let token = request
                    .headers
                    .get("x-auth-token")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("")
                    .to_string();
                match counter.fetch_add(1, Ordering::SeqCst) {
                    // Full batch refused.
                    0 => {
                        assert_eq!(token, "test-token");
                        ResponseTemplate::new(400)
                    }
                    // First half accepted, token rotated in the response.
                    1 => {
                        assert_eq!(token, "test-token");
                        ResponseTemplate::new(201).insert_header("x-auth-token", "rotated-token")
                    }
                    // Second half must already carry the rotated token.
                    _ => {
                        assert_eq!(token, "rotated-token");
                        ResponseTemplate::new(201)
                    }
                }
            })
            .expect(3)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let mut store = store_with(14);
        let file = token_file(&dir);
        let outcome = run_cycle(&mut store, &client_for(&server), &file, &fast_policy())
            .await
            .expect("cycle");

        assert_eq!(outcome.delivered, 14);
        assert!(outcome.token_rotated);
        assert_eq!(file.load().unwrap().unwrap().as_str(), "rotated-token");
    }

    #[tokio::test]
    async fn missing_token_is_an_error_and_claim_recovers_by_lease() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        let empty_token_file = TokenFile::new(dir.path().join("token"));

        let mut store = store_with(2);
        let result = run_cycle(
            &mut store,
            &client_for(&server),
            &empty_token_file,
            &fast_policy(),
        )
        .await;
        assert!(result.is_err());

        // The claim was taken before the token lookup failed; the lease
        // makes those records reclaimable rather than stuck.
        assert_eq!(store.status_counts().unwrap().syncing, 2);
        store.set_lease_secs(0);
        assert_eq!(store.reclaim_expired(unix_now() + 1).unwrap(), 2);
    }

    #[test]
    fn bisection_order_matches_recursive_halving() {
        // Chunk stack discipline: first half of a refused chunk is retried
        // before the second, depth first.
        let mut chunks: Vec<Vec<u32>> = vec![(0..5).collect()];
        let mut order = Vec::new();
        while let Some(chunk) = chunks.pop() {
            if chunk.len() > 1 {
                let mut first = chunk;
                let second = first.split_off(first.len() / 2);
                chunks.push(second);
                chunks.push(first);
            } else {
                order.push(chunk[0]);
            }
        }
        assert_eq!(order, vec![0, 1, 2, 3, 4]);
    }
}
