//! Decision metrics for Warden.
//!
//! Recording goes through the `metrics` facade and is a no-op until a
//! recorder is installed with [`init_metrics`].
//!
//! # Standard Metrics
//!
//! | Metric | Type | Labels | Description |
//! |--------|------|--------|-------------|
//! | `warden_authz_decisions_total` | Counter | `allowed`, `reason` | Authorization decisions |
//! | `warden_probe_requests_total` | Counter | `outcome` | Filter probes sent to the tracker |
//!
//! # Example
//!
//! ```rust,ignore
//! use warden_telemetry::metrics::{init_metrics, render_metrics, MetricsConfig};
//!
//! init_metrics(&MetricsConfig::default())?;
//! // ... authorize ...
//! if let Some(text) = render_metrics() {
//!     eprintln!("{text}");
//! }
//! ```

use crate::error::TelemetryError;
use crate::TelemetryResult;
use metrics::{counter, describe_counter};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;

/// Global metrics handle for rendering.
static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Authorization decision counter.
pub const AUTHZ_DECISIONS_TOTAL: &str = "warden_authz_decisions_total";

/// Probe request counter.
pub const PROBE_REQUESTS_TOTAL: &str = "warden_probe_requests_total";

/// Metrics configuration.
#[derive(Debug, Clone, Default)]
pub struct MetricsConfig {
    /// Whether a recorder is installed.
    pub enabled: bool,
}

/// Outcome of one filter probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// The issue matched the filters.
    Match,
    /// The issue did not match.
    NoMatch,
    /// The tracker could not be queried.
    Unavailable,
}

impl ProbeOutcome {
    /// Label value.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Match => "match",
            Self::NoMatch => "no_match",
            Self::Unavailable => "unavailable",
        }
    }
}

/// Installs the Prometheus recorder.
///
/// Metrics are kept in-process and rendered on demand with
/// [`render_metrics`]; no listener is started.
///
/// # Errors
///
/// Returns `TelemetryError::MetricsInit` if a recorder is already installed.
pub fn init_metrics(config: &MetricsConfig) -> TelemetryResult<()> {
    if !config.enabled {
        return Ok(());
    }

    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    let _ = METRICS_HANDLE.set(handle);

    register_metric_descriptions();
    Ok(())
}

/// Renders metrics in Prometheus format.
///
/// Returns `None` if metrics are not initialized.
#[must_use]
pub fn render_metrics() -> Option<String> {
    METRICS_HANDLE.get().map(PrometheusHandle::render)
}

fn register_metric_descriptions() {
    describe_counter!(
        AUTHZ_DECISIONS_TOTAL,
        "Total authorization decisions by result and denial reason"
    );
    describe_counter!(
        PROBE_REQUESTS_TOTAL,
        "Total filter probes sent to the tracker by outcome"
    );
}

/// Records an authorization decision.
///
/// # Arguments
///
/// * `allowed` - Whether the operation was allowed
/// * `reason` - Denial reason code; `None` for allowances
pub fn record_authz_decision(allowed: bool, reason: Option<&str>) {
    counter!(
        AUTHZ_DECISIONS_TOTAL,
        "allowed" => allowed.to_string(),
        "reason" => reason.unwrap_or("none").to_string()
    )
    .increment(1);
}

/// Records a filter probe.
pub fn record_probe(outcome: ProbeOutcome) {
    counter!(PROBE_REQUESTS_TOTAL, "outcome" => outcome.as_str()).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        assert!(!MetricsConfig::default().enabled);
        assert!(init_metrics(&MetricsConfig::default()).is_ok());
    }

    #[test]
    fn test_record_functions_dont_panic() {
        record_authz_decision(true, None);
        record_authz_decision(false, Some("FILTER_MISMATCH"));
        record_probe(ProbeOutcome::Unavailable);
    }

    #[test]
    fn test_recorded_values_render() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();

        metrics::with_local_recorder(&recorder, || {
            record_authz_decision(false, Some("PROJECT_NOT_ALLOWED"));
            record_probe(ProbeOutcome::Match);
            record_probe(ProbeOutcome::Match);
        });

        let text = handle.render();
        assert!(text.contains(
            r#"warden_authz_decisions_total{allowed="false",reason="PROJECT_NOT_ALLOWED"} 1"#
        ));
        assert!(text.contains(r#"warden_probe_requests_total{outcome="match"} 2"#));
    }
}
