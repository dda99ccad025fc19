//! Logging setup and flight-level log payloads.

use crate::flight::FlightCheckpoint;
use tracing_subscriber::EnvFilter;

/// Output format for `init_tracing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Pretty,
    /// One JSON object per line.
    Json,
}

/// Installs a global subscriber filtered by `RUST_LOG` (default `info`).
///
/// Returns false if a subscriber was already installed.
pub fn init_tracing(format: LogFormat) -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);
    match format {
        LogFormat::Pretty => builder.try_init().is_ok(),
        LogFormat::Json => builder.json().try_init().is_ok(),
    }
}

/// Span wrapping everything a flight logs.
#[must_use]
pub fn flight_span(flight_id: &str, flight_type: &str) -> tracing::Span {
    tracing::info_span!("flight", flight_id = %flight_id, flight_type = %flight_type)
}

/// One wide payload describing how a flight ended.
#[must_use]
pub fn flight_summary(checkpoint: &FlightCheckpoint) -> serde_json::Value {
    let duration_ms = checkpoint
        .completed_at
        .map(|done| (done - checkpoint.submitted_at).num_milliseconds());
    let steps: Vec<serde_json::Value> = checkpoint
        .steps
        .iter()
        .map(|s| {
            serde_json::json!({
                "step": s.name,
                "attempts": s.attempts,
                "succeeded": s.succeeded,
                "compensation_attempts": s.compensation_attempts,
                "compensated": s.compensated,
            })
        })
        .collect();

    let mut payload = serde_json::json!({
        "flight_id": checkpoint.flight_id,
        "flight_type": checkpoint.flight_type,
        "status": checkpoint.status.to_string(),
        "submitted_at": checkpoint.submitted_at.to_rfc3339(),
        "duration_ms": duration_ms,
        "steps": steps,
    });
    if let Some(error) = &checkpoint.error {
        payload["error"] = serde_json::json!(error.message);
    }
    if let Some(error) = &checkpoint.compensation_error {
        payload["compensation_error"] = serde_json::json!(error.message);
    }
    payload
}
