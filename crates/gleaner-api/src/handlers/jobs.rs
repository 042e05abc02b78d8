use axum::extract::{Path, Query, State};
use chrono::{DateTime, Utc};
use gleaner_domain::{JobStatus, JobWithCount};
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiResult};
use crate::response::{ApiResponse, Pagination};
use crate::routes::AppState;
use crate::validation;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub page: Option<String>,
    pub limit: Option<String>,
}

/// 任务列表项
#[derive(Debug, Serialize)]
pub struct JobSummary {
    pub job_id: i64,
    pub status: JobStatus,
    pub total_urls: usize,
    pub media_found: i64,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// 任务详情，比列表项多出原始 URL 列表
#[derive(Debug, Serialize)]
pub struct JobDetail {
    #[serde(flatten)]
    pub summary: JobSummary,
    pub urls: Vec<String>,
}

impl From<&JobWithCount> for JobSummary {
    fn from(entry: &JobWithCount) -> Self {
        Self {
            job_id: entry.job.id,
            status: entry.job.status,
            total_urls: entry.job.urls.len(),
            media_found: entry.media_found,
            created_at: entry.job.created_at,
            completed_at: entry.job.completed_at,
        }
    }
}

/// GET /api/jobs?page&limit
pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> ApiResult<ApiResponse<Vec<JobSummary>>> {
    let (page, limit) =
        validation::parse_page_limit(query.page.as_deref(), query.limit.as_deref())?;

    let (jobs, total) = state.jobs.list(page, limit).await?;
    let summaries: Vec<JobSummary> = jobs.iter().map(JobSummary::from).collect();

    Ok(ApiResponse::success_paginated(
        summaries,
        Pagination::new(total, page, limit),
    ))
}

/// GET /api/jobs/:id
pub async fn detail(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<ApiResponse<JobDetail>> {
    if id < 1 {
        return Err(ApiError::Validation(format!("invalid job id: {id}")));
    }

    let entry = state
        .jobs
        .get_with_count(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("job {id}")))?;

    Ok(ApiResponse::success(JobDetail {
        summary: JobSummary::from(&entry),
        urls: entry.job.urls.clone(),
    }))
}
