use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Operational status of a vehicle, derived from its latest position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VehicleStatus {
    Active,
    Idle,
    Offline,
}

impl std::fmt::Display for VehicleStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "ACTIVE"),
            Self::Idle => write!(f, "IDLE"),
            Self::Offline => write!(f, "OFFLINE"),
        }
    }
}

/// Thresholds driving status derivation.
#[derive(Debug, Clone, Copy)]
pub struct StatusThresholds {
    /// Speed above which a vehicle counts as moving, in km/h
    pub moving_speed_kmh: f64,
    /// Maximum position age for ACTIVE
    pub active_window: Duration,
    /// Maximum position age for IDLE
    pub idle_window: Duration,
}

impl Default for StatusThresholds {
    fn default() -> Self {
        Self {
            moving_speed_kmh: 5.0,
            active_window: Duration::minutes(2),
            idle_window: Duration::minutes(5),
        }
    }
}

/// Derive status from the latest known speed and the age of the latest
/// position. Pure; never asserted by devices.
///
/// A missing speed counts as not moving: the vehicle is at least reporting,
/// so it is IDLE while the data is fresh.
pub fn derive_status(
    speed_kmh: Option<f64>,
    age: Duration,
    thresholds: &StatusThresholds,
) -> VehicleStatus {
    let moving = speed_kmh.is_some_and(|s| s > thresholds.moving_speed_kmh);

    if moving && age < thresholds.active_window {
        VehicleStatus::Active
    } else if !moving && age < thresholds.idle_window {
        VehicleStatus::Idle
    } else {
        VehicleStatus::Offline
    }
}

/// Last-known state of a vehicle, owned by the status engine and written only
/// by the single active partition worker for that vehicle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleState {
    pub vehicle_id: String,
    pub vehicle_label: Option<String>,
    pub status: VehicleStatus,
    pub latitude: f64,
    pub longitude: f64,
    pub speed: Option<f64>,
    pub heading: Option<u16>,
    /// Source timestamp of the newest position seen, not the newest processed
    pub last_seen: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Emitted only on an actual status transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusChangeEvent {
    pub vehicle_id: String,
    pub previous: VehicleStatus,
    pub current: VehicleStatus,
    pub latitude: f64,
    pub longitude: f64,
    pub changed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn thresholds() -> StatusThresholds {
        StatusThresholds::default()
    }

    #[test]
    fn test_moving_and_fresh_is_active() {
        let status = derive_status(Some(40.0), Duration::seconds(30), &thresholds());
        assert_eq!(status, VehicleStatus::Active);
    }

    #[test]
    fn test_slow_and_recent_is_idle() {
        let status = derive_status(Some(2.0), Duration::minutes(3), &thresholds());
        assert_eq!(status, VehicleStatus::Idle);
    }

    #[test]
    fn test_stale_is_offline_regardless_of_speed() {
        let status = derive_status(Some(80.0), Duration::minutes(10), &thresholds());
        assert_eq!(status, VehicleStatus::Offline);
        let status = derive_status(Some(0.0), Duration::minutes(10), &thresholds());
        assert_eq!(status, VehicleStatus::Offline);
    }

    #[test]
    fn test_missing_speed_is_idle_when_fresh() {
        let status = derive_status(None, Duration::seconds(10), &thresholds());
        assert_eq!(status, VehicleStatus::Idle);
    }

    #[test]
    fn test_moving_but_past_active_window_is_offline() {
        // Moving reports older than the active window no longer count as
        // ACTIVE, and a moving vehicle is never IDLE
        let status = derive_status(Some(40.0), Duration::minutes(3), &thresholds());
        assert_eq!(status, VehicleStatus::Offline);
    }

    #[test]
    fn test_speed_at_threshold_is_not_moving() {
        let status = derive_status(Some(5.0), Duration::seconds(10), &thresholds());
        assert_eq!(status, VehicleStatus::Idle);
    }

    #[test]
    fn test_derivation_is_deterministic_over_a_sequence() {
        // Same (speed, age) inputs always produce the same status sequence
        let inputs = [
            (Some(40.0), Duration::seconds(30)),
            (Some(3.0), Duration::seconds(60)),
            (Some(3.0), Duration::minutes(4)),
            (None, Duration::minutes(10)),
        ];
        let expected = [
            VehicleStatus::Active,
            VehicleStatus::Idle,
            VehicleStatus::Idle,
            VehicleStatus::Offline,
        ];
        for ((speed, age), want) in inputs.iter().zip(expected.iter()) {
            assert_eq!(derive_status(*speed, *age, &thresholds()), *want);
        }
    }
}
