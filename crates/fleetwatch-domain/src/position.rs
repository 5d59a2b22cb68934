use chrono::{DateTime, Duration, Utc};
use garde::Validate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Maximum clock drift accepted for a report's source timestamp, in either
/// direction. Reports older or further in the future are rejected.
pub const MAX_TIMESTAMP_DRIFT_SECS: i64 = 300;

/// Incoming GPS position report, as submitted by a device or gateway.
///
/// Validation bounds live on the fields; `validate::validate_report` turns a
/// garde report into a per-field error list so callers can surface every
/// violation at once.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct PositionReport {
    /// Vehicle identifier (partition key for the event stream)
    #[garde(length(min = 1))]
    pub vehicle_id: String,

    /// Human-readable vehicle label, e.g. a fleet number
    #[garde(skip)]
    pub vehicle_label: Option<String>,

    #[garde(range(min = -90.0, max = 90.0))]
    pub latitude: f64,

    #[garde(range(min = -180.0, max = 180.0))]
    pub longitude: f64,

    /// Altitude in meters; bounds reject barometric glitches
    #[garde(inner(range(min = -500.0, max = 9000.0)))]
    pub altitude: Option<f64>,

    /// Speed in km/h
    #[garde(inner(range(min = 0.0, max = 200.0)))]
    pub speed: Option<f64>,

    /// Compass heading in degrees
    #[garde(inner(range(min = 0, max = 359)))]
    pub heading: Option<u16>,

    /// GPS accuracy in meters
    #[garde(inner(range(min = 0.0)))]
    pub accuracy: Option<f64>,

    /// Number of satellites used for the fix
    #[garde(skip)]
    pub satellites: Option<u8>,

    /// Source timestamp, must be within the accepted drift window
    #[garde(custom(timestamp_within_drift))]
    pub recorded_at: DateTime<Utc>,
}

fn timestamp_within_drift(value: &DateTime<Utc>, _ctx: &()) -> garde::Result {
    let now = Utc::now();
    let drift = Duration::seconds(MAX_TIMESTAMP_DRIFT_SECS);
    if *value > now + drift {
        return Err(garde::Error::new(format!(
            "timestamp cannot be more than {MAX_TIMESTAMP_DRIFT_SECS} seconds in the future"
        )));
    }
    if *value < now - drift {
        return Err(garde::Error::new(format!(
            "timestamp is too old, must be within {MAX_TIMESTAMP_DRIFT_SECS} seconds of now"
        )));
    }
    Ok(())
}

impl PositionReport {
    /// The exact (0, 0) coordinate almost always means GPS signal loss, not a
    /// vehicle in the Gulf of Guinea.
    pub fn is_null_island(&self) -> bool {
        self.latitude == 0.0 && self.longitude == 0.0
    }
}

/// A validated position report stamped with a unique event id.
///
/// Immutable once published; the event id is the idempotency key for
/// reprocessing after bus redelivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionEvent {
    pub event_id: Uuid,
    pub vehicle_id: String,
    pub vehicle_label: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: Option<f64>,
    pub speed: Option<f64>,
    pub heading: Option<u16>,
    pub accuracy: Option<f64>,
    pub satellites: Option<u8>,
    /// Source timestamp from the device
    pub recorded_at: DateTime<Utc>,
    /// When the report entered the system
    pub ingested_at: DateTime<Utc>,
}

impl PositionEvent {
    /// Build an event from an already-validated report.
    pub fn from_report(report: PositionReport) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            vehicle_id: report.vehicle_id,
            vehicle_label: report.vehicle_label,
            latitude: report.latitude,
            longitude: report.longitude,
            altitude: report.altitude,
            speed: report.speed,
            heading: report.heading,
            accuracy: report.accuracy,
            satellites: report.satellites,
            recorded_at: report.recorded_at,
            ingested_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_report() -> PositionReport {
        PositionReport {
            vehicle_id: "truck-001".to_string(),
            vehicle_label: Some("TRK-001".to_string()),
            latitude: 48.8566,
            longitude: 2.3522,
            altitude: Some(35.0),
            speed: Some(62.5),
            heading: Some(270),
            accuracy: Some(4.5),
            satellites: Some(11),
            recorded_at: Utc::now(),
        }
    }

    #[test]
    fn test_valid_report_passes() {
        assert!(valid_report().validate().is_ok());
    }

    #[test]
    fn test_latitude_out_of_range() {
        let mut report = valid_report();
        report.latitude = 91.0;
        assert!(report.validate().is_err());
    }

    #[test]
    fn test_future_timestamp_rejected() {
        let mut report = valid_report();
        report.recorded_at = Utc::now() + Duration::minutes(10);
        assert!(report.validate().is_err());
    }

    #[test]
    fn test_stale_timestamp_rejected() {
        let mut report = valid_report();
        report.recorded_at = Utc::now() - Duration::minutes(10);
        assert!(report.validate().is_err());
    }

    #[test]
    fn test_small_clock_skew_tolerated() {
        let mut report = valid_report();
        report.recorded_at = Utc::now() + Duration::seconds(30);
        assert!(report.validate().is_ok());
    }

    #[test]
    fn test_null_island_detection() {
        let mut report = valid_report();
        report.latitude = 0.0;
        report.longitude = 0.0;
        assert!(report.is_null_island());
    }

    #[test]
    fn test_event_from_report_assigns_unique_ids() {
        let a = PositionEvent::from_report(valid_report());
        let b = PositionEvent::from_report(valid_report());
        assert_ne!(a.event_id, b.event_id);
        assert_eq!(a.vehicle_id, "truck-001");
    }
}
