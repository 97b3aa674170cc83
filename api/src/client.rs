//! Batch upload client and its outcome type.

use reqwest::StatusCode;
use reqwest::header::HeaderMap;
use tracing::{debug, warn};

use waymark_types::{AuthToken, LocationPayload, Phata};

use crate::{AUTH_HEADER, http_client, locations_endpoint};

/// Outcome of one batch POST.
///
/// A sum type that structurally separates the three cases the sync engine
/// treats differently, so a caller cannot mistake a refusal or a transport
/// failure for a delivery.
#[derive(Debug)]
pub enum UploadOutcome {
    /// 201 - the server accepted and stored the batch. May carry a rotated
    /// auth token from the response headers.
    Created { refreshed_token: Option<AuthToken> },
    /// 400 - the server refused the batch content. Candidate for the
    /// halving fallback when the batch is large enough to split.
    Rejected,
    /// Any other status, or a transport error (`status` is `None`).
    Failed {
        status: Option<StatusCode>,
        detail: String,
    },
}

impl UploadOutcome {
    /// Returns true if the batch was acknowledged as stored.
    #[must_use]
    pub const fn is_created(&self) -> bool {
        matches!(self, Self::Created { .. })
    }
}

/// Client for the owner's fixed location endpoint.
#[derive(Debug, Clone)]
pub struct HatClient {
    client: reqwest::Client,
    endpoint: String,
}

impl HatClient {
    /// Client for the owner's endpoint, using the shared hardened HTTP
    /// client.
    #[must_use]
    pub fn new(phata: &Phata) -> Self {
        Self {
            client: http_client().clone(),
            endpoint: locations_endpoint(phata),
        }
    }

    /// Client against an explicit endpoint with a caller-supplied
    /// `reqwest::Client`. Used for tests and endpoint overrides.
    #[must_use]
    pub fn with_endpoint(endpoint: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }

    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// POST one batch as a JSON array with the auth token header.
    pub async fn upload(&self, token: &AuthToken, batch: &[LocationPayload]) -> UploadOutcome {
        let response = self
            .client
            .post(&self.endpoint)
            .header(AUTH_HEADER, token.as_str())
            .json(&batch)
            .send()
            .await;

        let response = match response {
            Ok(response) => response,
            Err(e) => {
                warn!(endpoint = %self.endpoint, "Location upload failed in transport: {e}");
                return UploadOutcome::Failed {
                    status: None,
                    detail: e.to_string(),
                };
            }
        };

        let status = response.status();
        match status {
            StatusCode::CREATED => {
                let refreshed_token = token_from_headers(response.headers());
                debug!(
                    records = batch.len(),
                    token_rotated = refreshed_token.is_some(),
                    "Location batch stored"
                );
                UploadOutcome::Created { refreshed_token }
            }
            StatusCode::BAD_REQUEST => {
                debug!(records = batch.len(), "Location batch refused by server");
                UploadOutcome::Rejected
            }
            _ => {
                warn!(%status, records = batch.len(), "Unexpected status for location upload");
                UploadOutcome::Failed {
                    status: Some(status),
                    detail: format!("unexpected status {status}"),
                }
            }
        }
    }
}

/// A rotated token arrives in the same header the request carries it in.
fn token_from_headers(headers: &HeaderMap) -> Option<AuthToken> {
    let value = headers.get(AUTH_HEADER)?.to_str().ok()?;
    AuthToken::new(value).ok()
}
