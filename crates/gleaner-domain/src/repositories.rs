use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gleaner_errors::GleanResult;

use crate::entities::{
    JobStatus, JobWithCount, Media, MediaFilter, MediaStats, NewMedia, ScrapeJob, User,
};

/// 抓取任务仓储
#[async_trait]
pub trait JobRepository: Send + Sync {
    /// 插入 pending 状态的新任务并返回带 id 的实体
    async fn create(&self, user_id: Option<i64>, urls: &[String]) -> GleanResult<ScrapeJob>;

    async fn get_by_id(&self, id: i64) -> GleanResult<Option<ScrapeJob>>;

    /// 带媒体数量的分页任务列表，按创建时间倒序
    async fn list(&self, page: i64, limit: i64) -> GleanResult<(Vec<JobWithCount>, i64)>;

    /// 任务详情及其媒体数量
    async fn get_with_count(&self, id: i64) -> GleanResult<Option<JobWithCount>>;

    /// pending -> processing，幂等; 终态任务不会被改写
    async fn mark_processing(&self, id: i64) -> GleanResult<()>;

    /// 写入终态及 completed_at
    async fn finalize(
        &self,
        id: i64,
        status: JobStatus,
        completed_at: DateTime<Utc>,
    ) -> GleanResult<()>;
}

/// 媒体仓储
#[async_trait]
pub trait MediaRepository: Send + Sync {
    /// 批量插入，(job_id, media_url) 冲突静默跳过，返回实际插入行数
    async fn insert_many(&self, items: &[NewMedia]) -> GleanResult<u64>;

    /// 过滤 + 分页，按创建时间倒序; 同时返回过滤后的总行数
    async fn list(&self, filter: &MediaFilter) -> GleanResult<(Vec<Media>, i64)>;

    async fn get_by_id(&self, id: i64) -> GleanResult<Option<Media>>;

    async fn stats(&self) -> GleanResult<MediaStats>;
}

/// 用户仓储
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_by_username(&self, username: &str) -> GleanResult<Option<User>>;
}
