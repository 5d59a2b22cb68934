//! Position report validation.
//!
//! Wraps garde so callers get a structured list of every violated field,
//! which lets the bulk ingestion path report partial success instead of
//! failing a whole batch on its first bad item.

use garde::{Report, Validate};
use serde::{Deserialize, Serialize};

use crate::position::PositionReport;

/// A single violated constraint on a named field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

/// All violations found in one report. Never empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationErrors {
    pub errors: Vec<FieldError>,
}

impl std::fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let joined = self
            .errors
            .iter()
            .map(|e| format!("{}: {}", e.field, e.message))
            .collect::<Vec<_>>()
            .join(", ");
        write!(f, "{joined}")
    }
}

impl std::error::Error for ValidationErrors {}

/// Validate a position report, collecting every violated field.
pub fn validate_report(report: &PositionReport) -> Result<(), ValidationErrors> {
    let mut errors = match report.validate() {
        Ok(()) => Vec::new(),
        Err(report) => collect_field_errors(&report),
    };

    // Not expressible as a single-field garde rule
    if report.is_null_island() {
        errors.push(FieldError {
            field: "latitude,longitude".to_string(),
            message: "coordinates (0, 0) indicate GPS signal loss".to_string(),
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ValidationErrors { errors })
    }
}

fn collect_field_errors(report: &Report) -> Vec<FieldError> {
    report
        .iter()
        .map(|(path, error)| {
            let path = path.to_string();
            FieldError {
                field: if path.is_empty() {
                    "report".to_string()
                } else {
                    path
                },
                message: error.message().to_string(),
            }
        })
        .collect()
}

/// Outcome of validating a batch of reports.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkOutcome {
    pub accepted: usize,
    pub rejected: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn report(lat: f64, lon: f64) -> PositionReport {
        PositionReport {
            vehicle_id: "truck-001".to_string(),
            vehicle_label: None,
            latitude: lat,
            longitude: lon,
            altitude: None,
            speed: Some(50.0),
            heading: Some(90),
            accuracy: None,
            satellites: None,
            recorded_at: Utc::now(),
        }
    }

    #[test]
    fn test_valid_report() {
        assert!(validate_report(&report(48.85, 2.35)).is_ok());
    }

    #[test]
    fn test_all_violations_reported() {
        let mut bad = report(123.0, -200.0);
        bad.vehicle_id = String::new();
        bad.speed = Some(500.0);

        let errors = validate_report(&bad).unwrap_err();
        // Every violated field shows up, not just the first one
        assert!(errors.errors.len() >= 4, "got: {errors:?}");
        assert!(errors.errors.iter().any(|e| e.field.contains("latitude")));
        assert!(errors.errors.iter().any(|e| e.field.contains("longitude")));
        assert!(errors.errors.iter().any(|e| e.field.contains("vehicle_id")));
        assert!(errors.errors.iter().any(|e| e.field.contains("speed")));
    }

    #[test]
    fn test_null_island_rejected() {
        let errors = validate_report(&report(0.0, 0.0)).unwrap_err();
        assert!(errors
            .errors
            .iter()
            .any(|e| e.message.contains("signal loss")));
    }

    #[test]
    fn test_display_joins_fields() {
        let errors = validate_report(&report(99.0, 2.35)).unwrap_err();
        assert!(errors.to_string().contains("latitude"));
    }
}
