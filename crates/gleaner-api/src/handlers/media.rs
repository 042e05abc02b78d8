use std::time::Duration;

use axum::extract::{Path, Query, State};
use gleaner_domain::{JobStatus, Media, MediaFilter, MediaStats};
use gleaner_infrastructure::cache_keys;
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiResult};
use crate::response::{ApiResponse, Pagination};
use crate::routes::AppState;
use crate::validation;

/// 媒体列表页缓存 TTL
const MEDIA_LIST_TTL: Duration = Duration::from_secs(60);
/// 聚合统计缓存 TTL
const MEDIA_STATS_TTL: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub page: Option<String>,
    pub limit: Option<String>,
    #[serde(rename = "type")]
    pub media_type: Option<String>,
    pub search: Option<String>,
}

/// 结果页缓存载荷
#[derive(Debug, Serialize, Deserialize)]
pub struct MediaPage {
    pub items: Vec<Media>,
    pub total: i64,
}

/// 详情里内嵌的任务摘要
#[derive(Debug, Serialize)]
pub struct JobBrief {
    pub job_id: i64,
    pub status: JobStatus,
    pub total_urls: usize,
    pub media_found: i64,
}

#[derive(Debug, Serialize)]
pub struct MediaDetail {
    #[serde(flatten)]
    pub media: Media,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job: Option<JobBrief>,
}

/// GET /api/media?page&limit&type&search
pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> ApiResult<ApiResponse<Vec<Media>>> {
    let (page, limit) =
        validation::parse_page_limit(query.page.as_deref(), query.limit.as_deref())?;
    let media_type = validation::parse_media_type(query.media_type.as_deref())?;
    let search = query.search.unwrap_or_default();

    let filter = MediaFilter {
        media_type,
        search: Some(search.clone()).filter(|s| !s.is_empty()),
        page,
        limit,
    };

    let cache_key = cache_keys::media_list_key(
        page,
        limit,
        media_type.map(|t| t.as_str()),
        &search,
    );

    let media_repo = state.media.clone();
    let page_data = state
        .cache
        .get_or_set(&cache_key, MEDIA_LIST_TTL, move || async move {
            let (items, total) = media_repo.list(&filter).await?;
            Ok::<_, gleaner_errors::GleanError>(MediaPage { items, total })
        })
        .await
        .map_err(ApiError::from)?;

    Ok(ApiResponse::success_paginated(
        page_data.items,
        Pagination::new(page_data.total, page, limit),
    ))
}

/// GET /api/media/stats
pub async fn stats(State(state): State<AppState>) -> ApiResult<ApiResponse<MediaStats>> {
    let media_repo = state.media.clone();
    let stats = state
        .cache
        .get_or_set(cache_keys::MEDIA_STATS, MEDIA_STATS_TTL, move || async move {
            media_repo.stats().await
        })
        .await
        .map_err(ApiError::from)?;

    Ok(ApiResponse::success(stats))
}

/// GET /api/media/:id: 含所属任务摘要
pub async fn detail(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<ApiResponse<MediaDetail>> {
    let media = state
        .media
        .get_by_id(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("media {id}")))?;

    let job = state
        .jobs
        .get_with_count(media.job_id)
        .await
        .ok()
        .flatten()
        .map(|entry| JobBrief {
            job_id: entry.job.id,
            status: entry.job.status,
            total_urls: entry.job.urls.len(),
            media_found: entry.media_found,
        });

    Ok(ApiResponse::success(MediaDetail { media, job }))
}
