use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Error, Result};
use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::get,
};
use chrono::Utc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::models::health::{HealthCheckResponse, HealthStatus, ServiceHealth};
use crate::tasks::Dependencies;

pub struct AppState {
    deps: Arc<Dependencies>,
}

pub async fn run_api_server(deps: Arc<Dependencies>) -> Result<(), Error> {
    let port = deps.config.server_port;
    let state = Arc::new(AppState { deps });

    let app = Router::new()
        .route("/health", get(health_check))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = format!("0.0.0.0:{}", port);
    let listener = TcpListener::bind(&addr).await?;

    info!(address = %addr, "Health check server started");

    axum::serve(listener, app).await?;

    Ok(())
}

async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = check_all(&state.deps).await;

    let status_code = match health.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

async fn check_all(deps: &Dependencies) -> HealthCheckResponse {
    let mut checks = HashMap::new();

    checks.insert("cache_service".to_string(), check_redis(deps).await);
    checks.insert("job_queue".to_string(), check_queue(deps).await);
    checks.insert("email_channel".to_string(), check_email(deps));
    checks.insert("messaging_channel".to_string(), check_messaging(deps));

    let status = overall_status(&checks);

    HealthCheckResponse {
        status,
        timestamp: Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
        checks,
    }
}

async fn check_redis(deps: &Dependencies) -> ServiceHealth {
    let start = Instant::now();
    if deps.store.ping().await {
        ServiceHealth::healthy(start.elapsed().as_millis() as u64)
    } else {
        ServiceHealth::unhealthy("Redis ping failed".to_string())
    }
}

async fn check_queue(deps: &Dependencies) -> ServiceHealth {
    let start = Instant::now();
    match deps.queue.queue_depth().await {
        Some(depth) => ServiceHealth::healthy(start.elapsed().as_millis() as u64)
            .with_detail(format!("{} queued jobs", depth)),
        None => ServiceHealth::unhealthy("Queue depth unavailable".to_string()),
    }
}

fn check_email(deps: &Dependencies) -> ServiceHealth {
    if deps.config.sendgrid_api_key.is_some() {
        ServiceHealth::healthy(0).with_detail("smtp with api fallback".to_string())
    } else {
        ServiceHealth::degraded("smtp only, no fallback API key".to_string())
    }
}

fn check_messaging(deps: &Dependencies) -> ServiceHealth {
    if deps.twilio.is_some() {
        ServiceHealth::healthy(0)
    } else {
        ServiceHealth::degraded("messaging channel disabled".to_string())
    }
}

fn overall_status(checks: &HashMap<String, ServiceHealth>) -> HealthStatus {
    let has_unhealthy = checks
        .values()
        .any(|health| health.status == HealthStatus::Unhealthy);
    let has_degraded = checks
        .values()
        .any(|health| health.status == HealthStatus::Degraded);

    if has_unhealthy {
        HealthStatus::Unhealthy
    } else if has_degraded {
        HealthStatus::Degraded
    } else {
        HealthStatus::Healthy
    }
}
