use std::sync::Arc;
use std::time::Instant;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use gleaner_config::AppConfig;
use gleaner_domain::{JobRepository, MediaRepository, UserRepository};
use gleaner_infrastructure::{JobQueue, RedisCacheManager};
use gleaner_pipeline::PipelineController;
use sqlx::PgPool;

use crate::auth::require_basic_auth;
use crate::handlers;

/// HTTP 层共享状态
#[derive(Clone)]
pub struct AppState {
    pub jobs: Arc<dyn JobRepository>,
    pub media: Arc<dyn MediaRepository>,
    pub users: Arc<dyn UserRepository>,
    pub cache: Arc<RedisCacheManager>,
    pub queue: Arc<dyn JobQueue>,
    pub controller: Arc<PipelineController>,
    pub config: Arc<AppConfig>,
    pub db: PgPool,
    pub started_at: Instant,
}

/// 组路由: /health* 公开，/api/* 全部要求 Basic 认证
pub fn create_routes(state: AppState) -> Router {
    let public = Router::new()
        .route("/health", get(handlers::health::health))
        .route("/health/detailed", get(handlers::health::health_detailed));

    let protected = Router::new()
        .route("/api/auth/login", post(handlers::auth::login))
        .route("/api/auth/me", get(handlers::auth::me))
        .route("/api/scrape", post(handlers::scrape::submit))
        .route(
            "/api/scrape/queue/stats",
            get(handlers::scrape::queue_stats),
        )
        .route("/api/jobs", get(handlers::jobs::list))
        .route("/api/jobs/:id", get(handlers::jobs::detail))
        .route("/api/media", get(handlers::media::list))
        .route("/api/media/stats", get(handlers::media::stats))
        .route("/api/media/:id", get(handlers::media::detail))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            require_basic_auth,
        ));

    public.merge(protected).with_state(state)
}
