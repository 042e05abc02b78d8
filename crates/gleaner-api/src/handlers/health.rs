use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use gleaner_infrastructure::SystemSampler;
use serde_json::{json, Value};

use crate::routes::AppState;

async fn db_ok(state: &AppState) -> bool {
    sqlx::query("SELECT 1").execute(&state.db).await.is_ok()
}

/// GET /health: 数据库可达即 200，否则 503
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let db = db_ok(&state).await;
    let cache = state.cache.health_check().await;

    let status = if db {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let body = json!({
        "status": if db { "healthy" } else { "unhealthy" },
        "db": if db { "up" } else { "down" },
        "cache": if cache { "up" } else { "unavailable" },
        "memory_mb": SystemSampler::rss_mb(),
        "uptime_seconds": state.started_at.elapsed().as_secs(),
    });

    (status, Json(body))
}

/// GET /health/detailed: 附带队列健康与堆积情况
pub async fn health_detailed(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let db = db_ok(&state).await;
    let cache = state.cache.health_check().await;
    let queue_up = state.queue.health_check().await;
    let queue_stats = state.queue.stats().await.ok();

    let status = if db {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let body = json!({
        "status": if db { "healthy" } else { "unhealthy" },
        "db": if db { "up" } else { "down" },
        "cache": if cache { "up" } else { "unavailable" },
        "queue": if queue_up { "up" } else { "unavailable" },
        "queue_stats": queue_stats,
        "memory_mb": SystemSampler::rss_mb(),
        "uptime_seconds": state.started_at.elapsed().as_secs(),
        "version": env!("CARGO_PKG_VERSION"),
    });

    (status, Json(body))
}
