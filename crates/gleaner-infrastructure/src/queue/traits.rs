use async_trait::async_trait;
use gleaner_domain::ScrapeTask;
use gleaner_errors::GleanResult;

use super::item::{EnqueueOpts, QueueStats};
use super::scrape_queue::ScrapeQueue;

/// 队列对控制器与 API 层暴露的窄接口
///
/// 取件、租约与维护是工作池内部协议，不在这里。
#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue(&self, task: ScrapeTask, opts: EnqueueOpts) -> GleanResult<String>;

    async fn stats(&self) -> GleanResult<QueueStats>;

    /// 暂停取新件; 在途条目继续执行
    fn pause(&self, by_cpu: bool);

    fn resume(&self);

    fn is_paused(&self) -> bool;

    fn paused_by_cpu(&self) -> bool;

    async fn health_check(&self) -> bool;
}

#[async_trait]
impl JobQueue for ScrapeQueue {
    async fn enqueue(&self, task: ScrapeTask, opts: EnqueueOpts) -> GleanResult<String> {
        ScrapeQueue::enqueue(self, task, opts).await
    }

    async fn stats(&self) -> GleanResult<QueueStats> {
        ScrapeQueue::stats(self).await
    }

    fn pause(&self, by_cpu: bool) {
        ScrapeQueue::pause(self, by_cpu)
    }

    fn resume(&self) {
        ScrapeQueue::resume(self)
    }

    fn is_paused(&self) -> bool {
        ScrapeQueue::is_paused(self)
    }

    fn paused_by_cpu(&self) -> bool {
        ScrapeQueue::paused_by_cpu(self)
    }

    async fn health_check(&self) -> bool {
        ScrapeQueue::health_check(self).await
    }
}
