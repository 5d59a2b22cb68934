use config::{Config, ConfigError, Environment};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use fleetwatch_domain::retry::RetryPolicy;
use fleetwatch_domain::StatusThresholds;
use fleetwatch_nats::ConsumerPolicy;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServiceConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    // NATS configuration
    /// NATS server URL
    #[serde(default = "default_nats_url")]
    pub nats_url: String,

    /// Stream carrying position events
    #[serde(default = "default_positions_stream")]
    pub positions_stream: String,

    /// Subject filter for position consumers
    #[serde(default = "default_positions_subject")]
    pub positions_subject: String,

    /// Stream carrying triggered alerts
    #[serde(default = "default_alerts_stream")]
    pub alerts_stream: String,

    /// Subject filter for alert consumers
    #[serde(default = "default_alerts_subject")]
    pub alerts_subject: String,

    /// Durable consumer name for the status engine group
    #[serde(default = "default_status_consumer_name")]
    pub status_consumer_name: String,

    /// Durable consumer name for the rule engine group
    #[serde(default = "default_rule_consumer_name")]
    pub rule_consumer_name: String,

    /// Durable consumer name for the dispatch group
    #[serde(default = "default_dispatch_consumer_name")]
    pub dispatch_consumer_name: String,

    /// Messages fetched per batch
    #[serde(default = "default_nats_batch_size")]
    pub nats_batch_size: usize,

    /// Max wait for a batch in seconds
    #[serde(default = "default_nats_batch_wait_secs")]
    pub nats_batch_wait_secs: u64,

    /// Parallel partition lanes per consumer
    #[serde(default = "default_worker_concurrency")]
    pub worker_concurrency: usize,

    /// Delivery attempts before dead-lettering an event
    #[serde(default = "default_max_deliveries")]
    pub max_deliveries: i64,

    /// Startup timeout for initialization in seconds
    #[serde(default = "default_startup_timeout_secs")]
    pub startup_timeout_secs: u64,

    // HTTP API configuration
    /// API bind host
    #[serde(default = "default_api_host")]
    pub api_host: String,

    /// API bind port
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Per-connection live-feed send buffer
    #[serde(default = "default_ws_send_buffer")]
    pub ws_send_buffer: usize,

    // Status derivation
    /// Speed above which a vehicle counts as moving, km/h
    #[serde(default = "default_moving_speed_kmh")]
    pub moving_speed_kmh: f64,

    /// Maximum position age for ACTIVE, seconds
    #[serde(default = "default_active_window_secs")]
    pub active_window_secs: i64,

    /// Maximum position age for IDLE, seconds
    #[serde(default = "default_idle_window_secs")]
    pub idle_window_secs: i64,

    /// Status cache TTL in seconds
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,

    // External lookup guards
    /// Timeout for geofence/directory lookups, seconds
    #[serde(default = "default_lookup_timeout_secs")]
    pub lookup_timeout_secs: u64,

    /// Consecutive lookup failures before the breaker opens
    #[serde(default = "default_breaker_failure_threshold")]
    pub breaker_failure_threshold: u32,

    /// Breaker cool-down before a half-open probe, seconds
    #[serde(default = "default_breaker_cool_down_secs")]
    pub breaker_cool_down_secs: u64,

    // Dispatch
    /// Delivery retries after the initial attempt
    #[serde(default = "default_dispatch_max_retries")]
    pub dispatch_max_retries: u32,

    /// Initial delivery backoff in milliseconds
    #[serde(default = "default_dispatch_backoff_ms")]
    pub dispatch_backoff_ms: u64,

    /// Backoff ceiling in milliseconds
    #[serde(default = "default_dispatch_backoff_max_ms")]
    pub dispatch_backoff_max_ms: u64,

    /// Per-attempt channel transport timeout, seconds
    #[serde(default = "default_delivery_timeout_secs")]
    pub delivery_timeout_secs: u64,
}

fn default_log_level() -> String {
    "info".to_string()
}

// NATS defaults
fn default_nats_url() -> String {
    "nats://localhost:4222".to_string()
}

fn default_positions_stream() -> String {
    "positions".to_string()
}

fn default_positions_subject() -> String {
    "positions.>".to_string()
}

fn default_alerts_stream() -> String {
    "alerts".to_string()
}

fn default_alerts_subject() -> String {
    "alerts.>".to_string()
}

fn default_status_consumer_name() -> String {
    "status-engine".to_string()
}

fn default_rule_consumer_name() -> String {
    "rule-engine".to_string()
}

fn default_dispatch_consumer_name() -> String {
    "dispatch-service".to_string()
}

fn default_nats_batch_size() -> usize {
    30
}

fn default_nats_batch_wait_secs() -> u64 {
    5
}

fn default_worker_concurrency() -> usize {
    3
}

fn default_max_deliveries() -> i64 {
    5
}

fn default_startup_timeout_secs() -> u64 {
    30
}

// API defaults
fn default_api_host() -> String {
    "0.0.0.0".to_string()
}

fn default_api_port() -> u16 {
    8080
}

fn default_ws_send_buffer() -> usize {
    64
}

// Status derivation defaults
fn default_moving_speed_kmh() -> f64 {
    5.0
}

fn default_active_window_secs() -> i64 {
    120
}

fn default_idle_window_secs() -> i64 {
    300
}

fn default_cache_ttl_secs() -> u64 {
    30
}

// Lookup guard defaults
fn default_lookup_timeout_secs() -> u64 {
    3
}

fn default_breaker_failure_threshold() -> u32 {
    5
}

fn default_breaker_cool_down_secs() -> u64 {
    30
}

// Dispatch defaults
fn default_dispatch_max_retries() -> u32 {
    3
}

fn default_dispatch_backoff_ms() -> u64 {
    500
}

fn default_dispatch_backoff_max_ms() -> u64 {
    10_000
}

fn default_delivery_timeout_secs() -> u64 {
    3
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(Environment::with_prefix("FLEETWATCH"))
            .build()?
            .try_deserialize()
    }

    pub fn consumer_policy(&self) -> ConsumerPolicy {
        ConsumerPolicy {
            batch_size: self.nats_batch_size,
            max_wait: Duration::from_secs(self.nats_batch_wait_secs),
            concurrency: self.worker_concurrency,
            max_deliveries: self.max_deliveries,
        }
    }

    pub fn status_thresholds(&self) -> StatusThresholds {
        StatusThresholds {
            moving_speed_kmh: self.moving_speed_kmh,
            active_window: chrono::Duration::seconds(self.active_window_secs),
            idle_window: chrono::Duration::seconds(self.idle_window_secs),
        }
    }

    pub fn dispatch_retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.dispatch_max_retries,
            Duration::from_millis(self.dispatch_backoff_ms),
            Duration::from_millis(self.dispatch_backoff_max_ms),
        )
    }
}
