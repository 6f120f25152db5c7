use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use anyhow::Result;
use axum::{
    Router,
    body::Body,
    extract::{ConnectInfo, Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Json, Response},
    routing::get,
};
use diesel::PgConnection;
use diesel::r2d2::{ConnectionManager, Pool};
use diesel::RunQueryDsl;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::actions;
use crate::dedup::DedupCache;
use crate::live_packets::LivePacketService;

pub type PgPool = Pool<ConnectionManager<PgConnection>>;

/// Shared state for the HTTP surface.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub live: LivePacketService,
    pub dedup: DedupCache,
    pub rate_limiter: RateLimiter,
}

/// Fixed-window per-IP request limiter for the query API. Windows are
/// tracked in a TTL cache so idle clients cost nothing.
#[derive(Clone)]
pub struct RateLimiter {
    windows: moka::sync::Cache<IpAddr, Arc<AtomicU32>>,
    limit: u32,
}

impl RateLimiter {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            windows: moka::sync::Cache::builder()
                .max_capacity(100_000)
                .time_to_live(window)
                .build(),
            limit,
        }
    }

    /// Count one request from `addr`; false when over the limit.
    pub fn check(&self, addr: IpAddr) -> bool {
        let counter = self
            .windows
            .get_with(addr, || Arc::new(AtomicU32::new(0)));
        counter.fetch_add(1, Ordering::Relaxed) < self.limit
    }
}

async fn rate_limit(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if !state.rate_limiter.check(addr.ip()) {
        metrics::counter!("http.rate_limited").increment(1);
        return actions::json_error(StatusCode::TOO_MANY_REQUESTS, "rate limit exceeded");
    }
    next.run(request).await
}

/// Liveness of the database and the dedup cache, plus upstream state.
async fn health(State(state): State<AppState>) -> Response {
    let pool = state.pool.clone();
    let database_ok = tokio::task::spawn_blocking(move || {
        let mut conn = pool.get()?;
        diesel::sql_query("SELECT 1").execute(&mut conn)?;
        Ok::<(), anyhow::Error>(())
    })
    .await
    .map(|result| result.is_ok())
    .unwrap_or(false);

    let ingest = crate::metrics::ingest_health();
    let upstream_connected = ingest.read().await.upstream_connected;

    let status = if database_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        status,
        Json(json!({
            "status": if database_ok { "ok" } else { "degraded" },
            "database": database_ok,
            "cache": { "entries": state.dedup.entry_count() },
            "upstreamConnected": upstream_connected,
        })),
    )
        .into_response()
}

/// Prometheus exposition.
async fn metrics_endpoint() -> Response {
    match crate::metrics::handle() {
        Some(handle) => handle.render().into_response(),
        None => actions::json_error(
            StatusCode::SERVICE_UNAVAILABLE,
            "metrics recorder not installed",
        ),
    }
}

pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/api/v1/packets", get(actions::packets::get_packets))
        .route("/api/v1/packets/{id}", get(actions::packets::get_packet))
        .layer(middleware::from_fn_with_state(state.clone(), rate_limit));

    Router::new()
        .merge(api)
        .route("/hubs/packets", get(actions::live::packets_hub))
        .route("/health", get(health))
        .route("/metrics", get(metrics_endpoint))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn start_web_server(
    interface: &str,
    port: u16,
    state: AppState,
    cancel: CancellationToken,
) -> Result<()> {
    let address = format!("{interface}:{port}");
    let listener = tokio::net::TcpListener::bind(&address).await?;
    info!("Web server listening on {}", address);

    axum::serve(
        listener,
        router(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move { cancel.cancelled().await })
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limiter_blocks_after_the_window_budget() {
        let limiter = RateLimiter::new(3, Duration::from_secs(60));
        let addr: IpAddr = "127.0.0.1".parse().unwrap();
        assert!(limiter.check(addr));
        assert!(limiter.check(addr));
        assert!(limiter.check(addr));
        assert!(!limiter.check(addr));

        // other clients have their own window
        let other: IpAddr = "10.0.0.1".parse().unwrap();
        assert!(limiter.check(other));
    }
}
