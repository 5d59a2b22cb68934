use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};

use fleetwatch_domain::{validate_report, BulkOutcome, PositionEvent, PositionReport};

use crate::error::ApiError;
use crate::state::AppState;

/// `POST /positions` — validate one report and publish it to the positions
/// stream. Returns 202 with the assigned event id, or 400 listing every
/// violated field.
pub async fn ingest_position(
    State(state): State<Arc<AppState>>,
    Json(report): Json<PositionReport>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    debug!(vehicle_id = %report.vehicle_id, "received position report");

    validate_report(&report).map_err(ApiError::Validation)?;

    let event = PositionEvent::from_report(report);
    state
        .producer
        .publish(&event)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    debug!(event_id = %event.event_id, "position accepted");

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({
            "status": "accepted",
            "event_id": event.event_id,
            "timestamp": Utc::now(),
        })),
    ))
}

/// `POST /positions/bulk` — validate and publish each report independently;
/// one bad item never fails the batch.
pub async fn ingest_positions_bulk(
    State(state): State<Arc<AppState>>,
    Json(reports): Json<Vec<PositionReport>>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    info!(count = reports.len(), "received bulk position reports");

    let mut outcome = BulkOutcome::default();

    for report in reports {
        let vehicle_id = report.vehicle_id.clone();
        if let Err(errors) = validate_report(&report) {
            warn!(vehicle_id = %vehicle_id, errors = %errors, "rejecting bulk item");
            outcome.rejected += 1;
            continue;
        }

        let event = PositionEvent::from_report(report);
        match state.producer.publish(&event).await {
            Ok(()) => outcome.accepted += 1,
            Err(e) => {
                warn!(vehicle_id = %vehicle_id, error = %e, "failed to publish bulk item");
                outcome.rejected += 1;
            }
        }
    }

    info!(
        accepted = outcome.accepted,
        rejected = outcome.rejected,
        "bulk ingestion complete"
    );

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({
            "accepted": outcome.accepted,
            "rejected": outcome.rejected,
            "timestamp": Utc::now(),
        })),
    ))
}
