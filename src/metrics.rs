use std::sync::{Arc, OnceLock};
use std::time::Instant;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tokio::sync::RwLock;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the global Prometheus recorder. Idempotent; the first call wins.
pub fn install_recorder() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            PrometheusBuilder::new()
                .install_recorder()
                .expect("failed to install Prometheus metrics recorder")
        })
        .clone()
}

pub fn handle() -> Option<PrometheusHandle> {
    METRICS_HANDLE.get().cloned()
}

/// Health state of the ingestion side, reported by `/health`.
#[derive(Clone, Debug, Default)]
pub struct IngestHealth {
    pub upstream_connected: bool,
    pub last_message_at: Option<Instant>,
}

static INGEST_HEALTH: OnceLock<Arc<RwLock<IngestHealth>>> = OnceLock::new();

pub fn ingest_health() -> Arc<RwLock<IngestHealth>> {
    INGEST_HEALTH
        .get_or_init(|| Arc::new(RwLock::new(IngestHealth::default())))
        .clone()
}
