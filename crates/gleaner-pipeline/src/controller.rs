use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gleaner_domain::{
    JobRepository, JobStatus, MediaCandidate, MediaRepository, NewMedia, ScrapeTask,
};
use gleaner_errors::{GleanError, GleanResult};
use gleaner_extraction::Scraper;
use gleaner_infrastructure::cache_keys;
use gleaner_infrastructure::queue::{EnqueueOpts, JobQueue, QueueObserver, ScrapeHandler};
use gleaner_infrastructure::{RedisCacheManager, SystemSampler};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::tracker::{ProgressTracker, RecordResult};

/// 提取结果缓存 TTL
const URL_CACHE_TTL: Duration = Duration::from_secs(3600);
/// 渲染/抓取前的内存压力阈值（MB）
const MEM_PRESSURE_BEFORE_MB: usize = 350;
/// 成功落库后的内存压力阈值（MB）
const MEM_PRESSURE_AFTER_MB: usize = 400;

/// 提交回执
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SubmissionReceipt {
    pub job_id: i64,
    pub status: JobStatus,
    pub total_urls: usize,
    pub duplicates_removed: usize,
    pub created_at: DateTime<Utc>,
}

/// 抓取管线控制器
///
/// 把一次提交展开成队列条目，作为队列的 handler 执行单 URL 抓取，
/// 再作为观察者聚合每 URL 结果写任务终态。
pub struct PipelineController {
    jobs: Arc<dyn JobRepository>,
    media: Arc<dyn MediaRepository>,
    cache: Arc<RedisCacheManager>,
    queue: Arc<dyn JobQueue>,
    router: Arc<dyn Scraper>,
    tracker: ProgressTracker,
}

impl PipelineController {
    pub fn new(
        jobs: Arc<dyn JobRepository>,
        media: Arc<dyn MediaRepository>,
        cache: Arc<RedisCacheManager>,
        queue: Arc<dyn JobQueue>,
        router: Arc<dyn Scraper>,
    ) -> Self {
        Self {
            jobs,
            media,
            cache,
            queue,
            router,
            tracker: ProgressTracker::new(),
        }
    }

    pub fn tracker(&self) -> &ProgressTracker {
        &self.tracker
    }

    /// 提交一批 URL: 顺序去重、建任务行、逐个入队
    ///
    /// 最新提交携带最高优先级并以 LIFO 出队，小批量的新提交
    /// 不会被积压的大批次压在后面。
    #[instrument(skip(self, urls), fields(url_count = urls.len()))]
    pub async fn enqueue_job(
        &self,
        user_id: Option<i64>,
        urls: Vec<String>,
    ) -> GleanResult<SubmissionReceipt> {
        let original = urls.len();
        let mut seen = std::collections::HashSet::new();
        let deduped: Vec<String> = urls
            .into_iter()
            .filter(|url| seen.insert(url.clone()))
            .collect();
        let duplicates_removed = original - deduped.len();

        let job = self.jobs.create(user_id, &deduped).await?;
        info!(
            "任务 {} 已创建: {} 个 URL，去重移除 {} 个",
            job.id,
            deduped.len(),
            duplicates_removed
        );

        let priority = Utc::now().timestamp_millis();
        for url in &deduped {
            self.queue
                .enqueue(
                    ScrapeTask {
                        job_id: job.id,
                        url: url.clone(),
                        priority,
                    },
                    EnqueueOpts {
                        priority,
                        lifo: true,
                    },
                )
                .await?;
        }

        Ok(SubmissionReceipt {
            job_id: job.id,
            status: job.status,
            total_urls: deduped.len(),
            duplicates_removed,
            created_at: job.created_at,
        })
    }

    async fn persist_media(
        &self,
        job_id: i64,
        source_url: &str,
        candidates: &[MediaCandidate],
    ) -> GleanResult<u64> {
        if candidates.is_empty() {
            return Ok(0);
        }
        let rows: Vec<NewMedia> = candidates
            .iter()
            .map(|candidate| NewMedia {
                job_id,
                source_url: source_url.to_string(),
                media_url: candidate.url.clone(),
                media_type: candidate.media_type,
                title: candidate.title.clone(),
            })
            .collect();
        self.media.insert_many(&rows).await
    }

    /// 媒体集变更后失效相关结果缓存
    async fn invalidate_media_caches(&self) {
        self.cache.clear_prefix(cache_keys::MEDIA_PREFIX).await;
        self.cache.delete(cache_keys::MEDIA_STATS).await;
    }

    /// 确保任务有进度条目; 返回 false 表示任务不存在
    async fn ensure_tracked(&self, job_id: i64) -> bool {
        if self.tracker.contains(job_id).await {
            return true;
        }
        match self.jobs.get_by_id(job_id).await {
            Ok(Some(job)) => {
                self.tracker.ensure(job_id, job.urls.len() as u32).await;
                true
            }
            Ok(None) => {
                warn!("队列条目指向不存在的任务 {}", job_id);
                false
            }
            Err(e) => {
                warn!("加载任务 {} 失败: {}", job_id, e);
                false
            }
        }
    }

    /// 聚合一个终态结果，计满后写任务终态
    async fn record_outcome(&self, job_id: i64, failed: bool) {
        if !self.ensure_tracked(job_id).await {
            return;
        }

        match self.tracker.record(job_id, failed).await {
            RecordResult::Settled(progress) => {
                // 全部 URL 都失败才算任务失败
                let status = if progress.all_failed() {
                    JobStatus::Failed
                } else {
                    JobStatus::Completed
                };
                info!(
                    "任务 {} 结算: completed={}, failed={}, status={}",
                    job_id,
                    progress.completed,
                    progress.failed,
                    status.as_str()
                );
                if let Err(e) = self.jobs.finalize(job_id, status, Utc::now()).await {
                    warn!("任务 {} 终态写入失败: {}", job_id, e);
                }
            }
            RecordResult::Pending | RecordResult::Unknown => {}
        }
    }
}

#[async_trait]
impl ScrapeHandler for PipelineController {
    /// 单 URL 工作流: 缓存命中直接落库，否则路由提取后落库并回填缓存
    #[instrument(skip(self), fields(job_id = task.job_id, url = %task.url))]
    async fn handle(&self, task: &ScrapeTask) -> GleanResult<()> {
        self.jobs.mark_processing(task.job_id).await?;

        let cache_key = cache_keys::url_key(&task.url);
        if let Some(cached) = self.cache.get::<Vec<MediaCandidate>>(&cache_key).await {
            debug!("URL 缓存命中，跳过抓取: {}", task.url);
            let inserted = self.persist_media(task.job_id, &task.url, &cached).await?;
            if inserted > 0 {
                self.invalidate_media_caches().await;
            }
            return Ok(());
        }

        let rss = SystemSampler::rss_mb();
        if rss > MEM_PRESSURE_BEFORE_MB {
            warn!("抓取前内存压力: rss={}MB", rss);
        }

        let outcome = self.router.scrape(&task.url).await;
        if !outcome.success {
            return Err(GleanError::fetch_error(
                outcome
                    .error
                    .unwrap_or_else(|| "extraction failed".to_string()),
            ));
        }

        debug!(
            "提取完成: {} 个媒体，路径 {}",
            outcome.media.len(),
            outcome.scraper_used.as_str()
        );

        if !outcome.media.is_empty() {
            self.persist_media(task.job_id, &task.url, &outcome.media)
                .await?;
            self.cache.set(&cache_key, &outcome.media, URL_CACHE_TTL).await;
            self.invalidate_media_caches().await;
        }

        let rss = SystemSampler::rss_mb();
        if rss > MEM_PRESSURE_AFTER_MB {
            warn!("落库后内存压力: rss={}MB", rss);
        }

        Ok(())
    }
}

#[async_trait]
impl QueueObserver for PipelineController {
    async fn on_active(&self, task: &ScrapeTask) {
        self.ensure_tracked(task.job_id).await;
    }

    async fn on_completed(&self, task: &ScrapeTask) {
        self.record_outcome(task.job_id, false).await;
    }

    async fn on_failed(&self, task: &ScrapeTask, error: &str) {
        debug!("任务 {} 的 URL 终态失败: {}", task.job_id, error);
        self.record_outcome(task.job_id, true).await;
    }
}
