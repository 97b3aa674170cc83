//! Core domain types for Waymark.
//!
//! This crate contains pure domain types with no IO, no async, and minimal
//! dependencies. Everything here can be used from any layer of the application.

mod auth;
mod fix;
mod payload;
mod record;

pub use auth::{AuthToken, AuthTokenError, Phata, PhataError};
pub use fix::{LocationFix, haversine_meters};
pub use payload::LocationPayload;
pub use record::{LocationRecord, RecordId, SyncStatus, SyncStatusParseError, local_timestamp};
