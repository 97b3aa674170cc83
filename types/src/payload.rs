//! Wire shape for the platform's location endpoint.

use serde::Serialize;

use crate::record::LocationRecord;

fn is_zero(value: &f64) -> bool {
    *value == 0.0
}

/// One element of the JSON array POSTed to the data endpoint.
///
/// Numeric channels the feed could not measure stay at their `0.0` default
/// and are omitted from the JSON entirely; the server treats an absent field
/// and an unmeasured one the same way.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationPayload {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(skip_serializing_if = "is_zero")]
    pub horizontal_accuracy: f64,
    #[serde(skip_serializing_if = "is_zero")]
    pub vertical_accuracy: f64,
    #[serde(skip_serializing_if = "is_zero")]
    pub altitude: f64,
    #[serde(skip_serializing_if = "is_zero")]
    pub speed: f64,
    #[serde(skip_serializing_if = "is_zero")]
    pub course: f64,
    pub date_created: i64,
    pub date_created_local: String,
}

impl From<&LocationRecord> for LocationPayload {
    fn from(record: &LocationRecord) -> Self {
        Self {
            latitude: record.latitude,
            longitude: record.longitude,
            horizontal_accuracy: record.horizontal_accuracy,
            vertical_accuracy: record.vertical_accuracy,
            altitude: record.altitude,
            speed: record.speed,
            course: record.course,
            date_created: record.recorded_at,
            date_created_local: record.recorded_local.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{RecordId, SyncStatus};

    fn record() -> LocationRecord {
        LocationRecord {
            id: RecordId::new(7),
            latitude: 48.85,
            longitude: 2.35,
            horizontal_accuracy: 12.0,
            vertical_accuracy: 0.0,
            altitude: 0.0,
            speed: 1.5,
            course: 0.0,
            recorded_at: 1_700_000_000,
            recorded_local: "2023-11-14T23:13:20+01:00".to_string(),
            status: SyncStatus::Unsynced,
            status_changed_at: 1_700_000_000,
        }
    }

    #[test]
    fn omits_all_default_numeric_fields() {
        let json = serde_json::to_value(LocationPayload::from(&record())).unwrap();

        assert_eq!(json["latitude"], 48.85);
        assert_eq!(json["horizontalAccuracy"], 12.0);
        assert_eq!(json["speed"], 1.5);
        assert_eq!(json["dateCreated"], 1_700_000_000_i64);
        assert_eq!(json["dateCreatedLocal"], "2023-11-14T23:13:20+01:00");

        let obj = json.as_object().unwrap();
        assert!(!obj.contains_key("verticalAccuracy"));
        assert!(!obj.contains_key("altitude"));
        assert!(!obj.contains_key("course"));
    }

    #[test]
    fn coordinates_are_always_present() {
        let mut r = record();
        r.latitude = 0.0;
        r.longitude = 0.0;
        let json = serde_json::to_value(LocationPayload::from(&r)).unwrap();

        // A fix on the equator/meridian is still a fix.
        let obj = json.as_object().unwrap();
        assert!(obj.contains_key("latitude"));
        assert!(obj.contains_key("longitude"));
    }
}
