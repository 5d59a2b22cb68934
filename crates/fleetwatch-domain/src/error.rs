use thiserror::Error;

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Vehicle not found: {0}")]
    VehicleNotFound(String),

    #[error("Geofence not found: {0}")]
    GeofenceNotFound(String),

    #[error("Invalid position report: {0}")]
    InvalidPosition(String),

    #[error("Rule evaluation failed for rule {rule_id}: {reason}")]
    RuleEvaluation { rule_id: String, reason: String },

    #[error("Lookup timed out after {0:?}")]
    LookupTimeout(std::time::Duration),

    #[error("Circuit breaker is open for {0}")]
    CircuitOpen(&'static str),

    #[error("Notification delivery failed: {0}")]
    DeliveryFailed(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Cache error: {0}")]
    CacheError(String),

    #[error("Repository error: {0}")]
    RepositoryError(#[from] anyhow::Error),
}

pub type DomainResult<T> = Result<T, DomainError>;
