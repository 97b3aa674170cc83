//! Ingestion filter for raw location fixes.
//!
//! Two gates stand between the feed and the store: readings with a negative
//! uncertainty radius are invalid and rejected outright, and a fix that moved
//! less than its own uncertainty radius from the last stored point is noise,
//! not movement.

use anyhow::Result;
use tracing::{debug, trace};

use waymark_store::LocationStore;
use waymark_types::{LocationFix, LocationRecord};

/// What happened to a batch of raw fixes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub accepted: usize,
    pub rejected_invalid: usize,
    pub dropped_noise: usize,
}

/// Run a batch of raw fixes through both gates, persisting the survivors in
/// feed order. Each accepted fix becomes the comparison point for the next.
pub fn ingest_fixes(
    store: &mut LocationStore,
    fixes: &[LocationFix],
    now: i64,
) -> Result<IngestReport> {
    let mut report = IngestReport::default();

    for fix in fixes {
        if !fix.is_valid() {
            debug!(
                accuracy = fix.horizontal_accuracy,
                "Rejected fix with negative horizontal accuracy"
            );
            report.rejected_invalid += 1;
            continue;
        }

        if let Some(last) = store.latest()? {
            let distance = fix.distance_from(last.latitude, last.longitude);
            // Movement below the uncertainty radius is indistinguishable
            // from noise.
            if distance < fix.horizontal_accuracy {
                trace!(
                    distance,
                    accuracy = fix.horizontal_accuracy,
                    "Dropped fix within uncertainty radius"
                );
                report.dropped_noise += 1;
                continue;
            }
        }

        store.append(&LocationRecord::from_fix(fix, now))?;
        report.accepted += 1;
    }

    if report.accepted > 0 {
        debug!(
            accepted = report.accepted,
            rejected = report.rejected_invalid,
            noise = report.dropped_noise,
            "Ingested fix batch"
        );
    }
    Ok(report)
}
