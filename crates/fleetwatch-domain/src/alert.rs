use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Closed set of rule kinds; each kind has exactly one evaluation function in
/// the rule engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertKind {
    OfflineTimeout,
    IdleTimeout,
    GeofenceEnter,
    GeofenceExit,
    SpeedLimit,
}

impl AlertKind {
    pub fn title(&self) -> &'static str {
        match self {
            Self::OfflineTimeout => "Vehicle Offline Alert",
            Self::IdleTimeout => "Vehicle Idle Alert",
            Self::GeofenceEnter => "Geofence Entry Alert",
            Self::GeofenceExit => "Geofence Exit Alert",
            Self::SpeedLimit => "Speed Limit Alert",
        }
    }

    /// Default severity per kind.
    pub fn severity(&self) -> Severity {
        match self {
            Self::OfflineTimeout => Severity::Critical,
            Self::IdleTimeout => Severity::Warning,
            Self::GeofenceEnter | Self::GeofenceExit => Severity::Info,
            Self::SpeedLimit => Severity::Warning,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

/// Which vehicles a rule applies to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuleScope {
    AllVehicles,
    Vehicle { vehicle_id: String },
}

impl RuleScope {
    pub fn matches(&self, vehicle_id: &str) -> bool {
        match self {
            Self::AllVehicles => true,
            Self::Vehicle { vehicle_id: id } => id == vehicle_id,
        }
    }
}

/// Externally configured alerting rule. Read-only to the rule engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRule {
    pub id: Uuid,
    pub name: String,
    pub kind: AlertKind,
    pub scope: RuleScope,
    /// Speed threshold in km/h (speed-limit rules)
    pub threshold_kmh: Option<f64>,
    /// Duration threshold in seconds (offline/idle-timeout rules)
    pub threshold_secs: Option<i64>,
    /// Geofence to test against (geofence rules)
    pub geofence_id: Option<Uuid>,
    pub enabled: bool,
}

/// Phase of a (vehicle, rule) pair. A rule fires only on the rising edge and
/// re-arms only once the condition has cleared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TriggerPhase {
    Inactive,
    Triggered,
}

/// Per-(vehicle, rule) evaluation state, owned exclusively by the rule engine
/// and mutated only within the single partition worker for the vehicle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerState {
    pub vehicle_id: String,
    pub rule_id: Uuid,
    pub phase: TriggerPhase,
    /// Start of the current continuous idle stretch (idle-timeout rules)
    pub idle_since: Option<DateTime<Utc>>,
    /// Last observed geofence membership (geofence rules); `None` until the
    /// first observation, which records membership without firing
    pub last_inside: Option<bool>,
    /// Source timestamp of the last position this rule was evaluated against
    pub last_observed: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl TriggerState {
    pub fn initial(vehicle_id: &str, rule_id: Uuid) -> Self {
        Self {
            vehicle_id: vehicle_id.to_string(),
            rule_id,
            phase: TriggerPhase::Inactive,
            idle_since: None,
            last_inside: None,
            last_observed: None,
            updated_at: Utc::now(),
        }
    }
}

/// Emitted by the rule engine on a rising edge. Immutable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertTriggeredEvent {
    pub event_id: Uuid,
    pub rule_id: Uuid,
    pub vehicle_id: String,
    pub vehicle_label: Option<String>,
    pub kind: AlertKind,
    pub severity: Severity,
    pub message: String,
    pub latitude: f64,
    pub longitude: f64,
    pub triggered_at: DateTime<Utc>,
    /// Recipients resolved at trigger time from the directory
    pub recipient_ids: Vec<String>,
}
