use std::time::Duration;

use axum::{extract::State, Extension, Json};
use gleaner_infrastructure::cache_keys;
use gleaner_infrastructure::queue::QueueStats;
use gleaner_pipeline::SubmissionReceipt;
use serde::Deserialize;

use crate::auth::AuthPrincipal;
use crate::error::{ApiError, ApiResult};
use crate::response::{ApiResponse, Created};
use crate::routes::AppState;
use crate::validation;

/// 队列状态快照缓存 TTL
const QUEUE_STATS_TTL: Duration = Duration::from_secs(5);

#[derive(Debug, Deserialize)]
pub struct ScrapeRequest {
    pub urls: Vec<String>,
}

/// POST /api/scrape: 校验 URL 列表并展开为队列条目
pub async fn submit(
    State(state): State<AppState>,
    Extension(principal): Extension<AuthPrincipal>,
    Json(body): Json<ScrapeRequest>,
) -> ApiResult<Created<SubmissionReceipt>> {
    validation::validate_urls(&body.urls, state.config.scraper.max_urls_per_request)?;

    // Basic 主体对应的用户行存在时关联 user_id
    let user_id = state
        .users
        .find_by_username(&principal.username)
        .await
        .ok()
        .flatten()
        .map(|user| user.id);

    let receipt = state.controller.enqueue_job(user_id, body.urls).await?;
    Ok(Created(ApiResponse::success(receipt)))
}

/// GET /api/scrape/queue/stats
pub async fn queue_stats(
    State(state): State<AppState>,
) -> ApiResult<ApiResponse<QueueStats>> {
    let queue = state.queue.clone();
    let stats = state
        .cache
        .get_or_set(cache_keys::QUEUE_STATS, QUEUE_STATS_TTL, move || async move {
            queue.stats().await
        })
        .await
        .map_err(ApiError::from)?;

    Ok(ApiResponse::success(stats))
}
