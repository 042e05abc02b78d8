use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use gleaner_domain::ScrapeTask;
use gleaner_errors::{GleanError, GleanResult};
use metrics::histogram;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::item::QueueItem;
use super::scrape_queue::ScrapeQueue;

/// 条目处理器: 正常返回即完成，返回错误触发重试
#[async_trait]
pub trait ScrapeHandler: Send + Sync {
    async fn handle(&self, task: &ScrapeTask) -> GleanResult<()>;
}

/// 队列事件观察者
///
/// on_failed 只在终态失败时触发; 中间重试只记日志。
#[async_trait]
pub trait QueueObserver: Send + Sync {
    async fn on_active(&self, task: &ScrapeTask);
    async fn on_completed(&self, task: &ScrapeTask);
    async fn on_failed(&self, task: &ScrapeTask, error: &str);
    async fn on_stalled(&self, _task: &ScrapeTask) {}
}

/// 工作池句柄，关闭时逐个 await 以排干在途条目
pub struct WorkerHandles {
    handles: Vec<JoinHandle<()>>,
}

impl WorkerHandles {
    pub async fn join(self) {
        for handle in self.handles {
            let _ = handle.await;
        }
    }
}

/// 启动 N 个工作循环和一个维护循环
///
/// 每个条目在 `item_deadline` 内执行完毕，超时视为一次失败尝试。
/// shutdown 广播到达后循环停止取新件，在途 handler 自然跑完。
pub fn run_workers(
    queue: Arc<ScrapeQueue>,
    handler: Arc<dyn ScrapeHandler>,
    observer: Arc<dyn QueueObserver>,
    concurrency: usize,
    item_deadline: Duration,
    shutdown: &broadcast::Sender<()>,
) -> WorkerHandles {
    let mut handles = Vec::with_capacity(concurrency + 1);

    for worker_id in 0..concurrency {
        let queue = Arc::clone(&queue);
        let handler = Arc::clone(&handler);
        let observer = Arc::clone(&observer);
        let mut shutdown_rx = shutdown.subscribe();

        handles.push(tokio::spawn(async move {
            let mut poll = interval(queue.config().poll_interval);
            poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!("工作循环 {} 启动", worker_id);

            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!("工作循环 {} 收到关闭信号", worker_id);
                        break;
                    }
                    _ = poll.tick() => {
                        match queue.pop_next().await {
                            Ok(Some(item)) => {
                                process_item(&queue, &*handler, &*observer, item, item_deadline).await;
                            }
                            Ok(None) => {}
                            Err(e) => {
                                warn!("工作循环 {} 取件失败: {}", worker_id, e);
                            }
                        }
                    }
                }
            }
        }));
    }

    // 维护循环: 延迟条目提升 + 租约回收
    {
        let queue = Arc::clone(&queue);
        let observer = Arc::clone(&observer);
        let mut shutdown_rx = shutdown.subscribe();

        handles.push(tokio::spawn(async move {
            let mut tick = interval(Duration::from_secs(1));
            tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!("队列维护循环收到关闭信号");
                        break;
                    }
                    _ = tick.tick() => {
                        match queue.maintenance().await {
                            Ok((stalled, dead)) => {
                                for item in &stalled {
                                    warn!(
                                        item_id = %item.id,
                                        job_id = item.task.job_id,
                                        url = %item.task.url,
                                        "条目租约过期，已重新投递"
                                    );
                                    observer.on_stalled(&item.task).await;
                                }
                                for item in &dead {
                                    observer
                                        .on_failed(&item.task, "lease expired repeatedly")
                                        .await;
                                }
                            }
                            Err(e) => warn!("队列维护失败: {}", e),
                        }
                    }
                }
            }
        }));
    }

    WorkerHandles { handles }
}

async fn process_item(
    queue: &ScrapeQueue,
    handler: &dyn ScrapeHandler,
    observer: &dyn QueueObserver,
    mut item: QueueItem,
    item_deadline: Duration,
) {
    observer.on_active(&item.task).await;

    let started = std::time::Instant::now();
    let result = match timeout(item_deadline, handler.handle(&item.task)).await {
        Ok(result) => result,
        Err(_) => Err(GleanError::Timeout(format!(
            "handler exceeded {}s deadline",
            item_deadline.as_secs()
        ))),
    };
    histogram!("gleaner_queue_handler_duration_ms")
        .record(started.elapsed().as_millis() as f64);

    match result {
        Ok(()) => {
            if let Err(e) = queue.complete(&item).await {
                error!("完成标记写入失败 {}: {}", item.id, e);
            }
            observer.on_completed(&item.task).await;
        }
        Err(err) => {
            item.attempts += 1;

            if err.is_retryable() && item.attempts < queue.config().attempts_max {
                warn!(
                    item_id = %item.id,
                    job_id = item.task.job_id,
                    url = %item.task.url,
                    attempts = item.attempts,
                    "条目处理失败，安排重试: {}",
                    err
                );
                if let Err(e) = queue.retry_later(&item).await {
                    error!("重试投递失败 {}: {}", item.id, e);
                }
            } else {
                let message = err.to_string();
                let stack = err.chain();
                match queue.fail(&item, &message, &stack).await {
                    Ok(dead_letter) => {
                        // 死信通道: 结构化日志记录，外加 failed 保留列表
                        error!(
                            target: "gleaner::dead_letter",
                            queue_item_id = %dead_letter.queue_item_id,
                            job_id = dead_letter.job_id,
                            url = %dead_letter.url,
                            attempts = dead_letter.attempts,
                            error_message = %dead_letter.error_message,
                            stack = %dead_letter.stack,
                            timestamp = %dead_letter.timestamp,
                            "条目终态失败"
                        );
                    }
                    Err(e) => error!("死信写入失败 {}: {}", item.id, e),
                }
                observer.on_failed(&item.task, &message).await;
            }
        }
    }

    debug!("条目 {} 处理结束，耗时 {:?}", item.id, started.elapsed());
}
