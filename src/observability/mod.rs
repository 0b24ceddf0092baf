//! Observability: OpenTelemetry metrics for the bridge, tool loop, and
//! agent registry. Grounded on the reference crate's `observability/mod.rs`
//! (global `OnceLock<Metrics>`, meter-built counters/histograms); the
//! concerns named below replace that file's per-sync-job metrics with this
//! crate's own.

use opentelemetry::metrics::{Counter, Histogram, Meter, MeterProvider};
use opentelemetry::KeyValue;
use opentelemetry_sdk::metrics::SdkMeterProvider;
use std::sync::OnceLock;
use std::time::Instant;

static METRICS: OnceLock<Metrics> = OnceLock::new();

pub struct Metrics {
    pub bridge_requests_total: Counter<u64>,
    pub bridge_request_duration_seconds: Histogram<f64>,
    pub tool_loop_iterations_total: Counter<u64>,
    pub tool_loop_escalations_total: Counter<u64>,
    pub agents_registered: Counter<u64>,
    pub agents_dead_total: Counter<u64>,
    pub agents_resumed_total: Counter<u64>,
}

impl Metrics {
    pub fn new(meter: &Meter) -> Self {
        Self {
            bridge_requests_total: meter
                .u64_counter("conduit_bridge_requests_total")
                .with_description("Total bridge requests sent to a client, by kind")
                .with_unit("requests")
                .build(),
            bridge_request_duration_seconds: meter
                .f64_histogram("conduit_bridge_request_duration_seconds")
                .with_description("Round-trip time of bridge requests")
                .with_unit("s")
                .build(),
            tool_loop_iterations_total: meter
                .u64_counter("conduit_tool_loop_iterations_total")
                .with_description("Total tool loop iterations across all agents")
                .with_unit("iterations")
                .build(),
            tool_loop_escalations_total: meter
                .u64_counter("conduit_tool_loop_escalations_total")
                .with_description("Total forced stuck-detection escalations")
                .with_unit("escalations")
                .build(),
            agents_registered: meter
                .u64_counter("conduit_agents_registered_total")
                .with_description("Total agents registered in the recovery registry")
                .with_unit("agents")
                .build(),
            agents_dead_total: meter
                .u64_counter("conduit_agents_dead_total")
                .with_description("Total agents the dead-agent scan found unregistered")
                .with_unit("agents")
                .build(),
            agents_resumed_total: meter
                .u64_counter("conduit_agents_resumed_total")
                .with_description("Total dead agents resumed from their last completed step")
                .with_unit("agents")
                .build(),
        }
    }

    pub fn record_bridge_request(&self, kind: &str, duration: f64) {
        let attrs = &[KeyValue::new("kind", kind.to_string())];
        self.bridge_requests_total.add(1, attrs);
        self.bridge_request_duration_seconds.record(duration, attrs);
    }

    pub fn record_tool_loop_iteration(&self, persona_id: &str) {
        self.tool_loop_iterations_total
            .add(1, &[KeyValue::new("persona_id", persona_id.to_string())]);
    }

    pub fn record_escalation(&self, reason: &str) {
        self.tool_loop_escalations_total
            .add(1, &[KeyValue::new("reason", reason.to_string())]);
    }

    pub fn record_agent_registered(&self) {
        self.agents_registered.add(1, &[]);
    }

    pub fn record_agent_dead(&self, resumable: bool) {
        self.agents_dead_total
            .add(1, &[KeyValue::new("resumable", resumable)]);
    }

    pub fn record_agent_resumed(&self) {
        self.agents_resumed_total.add(1, &[]);
    }
}

#[derive(Debug, Clone)]
pub struct ObservabilityConfig {
    pub otlp_endpoint: Option<String>,
    pub service_name: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            otlp_endpoint: std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").ok(),
            service_name: "conduit".to_string(),
        }
    }
}

/// Initialize observability with optional OTLP export. If
/// `OTEL_EXPORTER_OTLP_ENDPOINT` is unset, metrics are still collected
/// in-memory but not exported anywhere.
pub fn init(config: ObservabilityConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let meter_provider = if let Some(endpoint) = &config.otlp_endpoint {
        use opentelemetry_otlp::WithExportConfig;
        use opentelemetry_sdk::metrics::PeriodicReader;
        use opentelemetry_sdk::runtime;

        let exporter = opentelemetry_otlp::MetricExporter::builder()
            .with_tonic()
            .with_endpoint(endpoint)
            .build()?;

        let reader = PeriodicReader::builder(exporter, runtime::Tokio)
            .with_interval(std::time::Duration::from_secs(30))
            .build();

        SdkMeterProvider::builder().with_reader(reader).build()
    } else {
        tracing::info!("OTEL_EXPORTER_OTLP_ENDPOINT not set, metrics will be logged only");
        SdkMeterProvider::builder().build()
    };

    let meter = meter_provider.meter("conduit");
    let metrics = Metrics::new(&meter);

    METRICS
        .set(metrics)
        .map_err(|_| "metrics already initialized")?;

    tracing::info!(otlp_endpoint = ?config.otlp_endpoint, "observability initialized");

    Ok(())
}

/// Returns `None` if [`init`] has not been called; every call site treats
/// missing metrics as a no-op rather than panicking, so tests that never
/// call `init` still exercise the rest of the system.
pub fn metrics() -> Option<&'static Metrics> {
    METRICS.get()
}

/// Times one bridge request. Mirrors the reference crate's `JobTimer`.
pub struct BridgeRequestTimer {
    kind: String,
    start: Instant,
}

impl BridgeRequestTimer {
    pub fn start(kind: &str) -> Self {
        Self {
            kind: kind.to_string(),
            start: Instant::now(),
        }
    }

    pub fn finish(self) {
        let duration = self.start.elapsed().as_secs_f64();
        if let Some(m) = metrics() {
            m.record_bridge_request(&self.kind, duration);
        }
    }

    pub fn elapsed(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bridge_request_timer_elapsed() {
        let timer = BridgeRequestTimer::start("execution");
        std::thread::sleep(std::time::Duration::from_millis(10));
        assert!(timer.elapsed() >= 0.01);
    }
}
