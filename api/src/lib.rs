//! HTTP client for the personal data store's location endpoint.
//!
//! The platform exposes one fixed per-owner path for location data; this
//! crate owns that path, the `x-auth-token` header contract (request *and*
//! response - the server may rotate the token in a response header), and the
//! shared hardened [`reqwest`] client every upload goes through.

mod client;

pub use client::{HatClient, UploadOutcome};

use std::sync::OnceLock;
use std::time::Duration;

use waymark_types::Phata;

/// Header carrying the platform auth token, both directions.
pub const AUTH_HEADER: &str = "x-auth-token";

/// Fixed per-owner location endpoint path.
const LOCATIONS_PATH: &str = "/api/v2.6/data/rumpel/locations";

const CONNECT_TIMEOUT_SECS: u64 = 30;
const REQUEST_TIMEOUT_SECS: u64 = 60;
const TCP_KEEPALIVE_SECS: u64 = 60;
const POOL_MAX_IDLE_PER_HOST: usize = 4;
const POOL_IDLE_TIMEOUT_SECS: u64 = 90;

/// The owner's location endpoint URL.
#[must_use]
pub fn locations_endpoint(phata: &Phata) -> String {
    format!("https://{phata}{LOCATIONS_PATH}")
}

/// Shared hardened HTTP client.
pub fn http_client() -> &'static reqwest::Client {
    static CLIENT: OnceLock<reqwest::Client> = OnceLock::new();
    CLIENT.get_or_init(|| {
        base_client_builder().build().unwrap_or_else(|e| {
            tracing::error!(
                "Failed to build hardened HTTP client: {e}. Attempting minimal hardened fallback."
            );
            reqwest::Client::builder()
                .https_only(true)
                .redirect(reqwest::redirect::Policy::none())
                .build()
                .expect("Minimal hardened HTTP client must build; cannot proceed without TLS")
        })
    })
}

fn base_client_builder() -> reqwest::ClientBuilder {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
        .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
        .redirect(reqwest::redirect::Policy::none())
        .https_only(true)
        .tcp_keepalive(Some(Duration::from_secs(TCP_KEEPALIVE_SECS)))
        .pool_max_idle_per_host(POOL_MAX_IDLE_PER_HOST)
        .pool_idle_timeout(Some(Duration::from_secs(POOL_IDLE_TIMEOUT_SECS)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_is_per_owner() {
        let phata = Phata::new("mary.hubofallthings.net").unwrap();
        assert_eq!(
            locations_endpoint(&phata),
            "https://mary.hubofallthings.net/api/v2.6/data/rumpel/locations"
        );
    }
}
