use std::time::Duration;

use chrono::{DateTime, Utc};
use gleaner_domain::ScrapeTask;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 队列行为配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// 租约时长，过期视为 stalled
    pub lease: Duration,
    /// 单条目最多执行次数
    pub attempts_max: u32,
    /// 首次重试退避
    pub backoff_base: Duration,
    /// 退避上限
    pub backoff_cap: Duration,
    /// stalled 重新投递的上限，超过即强制失败
    pub max_stalled: u32,
    /// 完成记录保留条数
    pub keep_completed: usize,
    /// 失败记录保留条数
    pub keep_failed: usize,
    /// 空轮询间隔
    pub poll_interval: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            lease: Duration::from_secs(60),
            attempts_max: 2,
            backoff_base: Duration::from_secs(2),
            backoff_cap: Duration::from_secs(60),
            max_stalled: 2,
            keep_completed: 50,
            keep_failed: 100,
            poll_interval: Duration::from_millis(500),
        }
    }
}

impl QueueConfig {
    /// 指数退避: base * 2^(attempt-1)，受 cap 约束
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.backoff_base
            .saturating_mul(factor)
            .min(self.backoff_cap)
    }
}

/// 入队选项
#[derive(Debug, Clone, Copy)]
pub struct EnqueueOpts {
    /// 数值越大越优先; 提交路径传入 now() 毫秒
    pub priority: i64,
    /// 同优先级内后进先出
    pub lifo: bool,
}

/// 队列条目记录，终态时删除
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueueItem {
    pub id: String,
    pub task: ScrapeTask,
    pub lifo: bool,
    pub attempts: u32,
    pub stalled: u32,
    pub enqueued_at: DateTime<Utc>,
}

impl QueueItem {
    pub fn new(task: ScrapeTask, opts: EnqueueOpts) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            task,
            lifo: opts.lifo,
            attempts: 0,
            stalled: 0,
            enqueued_at: Utc::now(),
        }
    }

    /// ZPOPMAX 取最高分; LIFO 用时间戳原值使最新者先出，
    /// FIFO 取负值使最旧者先出
    pub fn effective_score(&self) -> f64 {
        if self.lifo {
            self.task.priority as f64
        } else {
            -(self.task.priority as f64)
        }
    }
}

/// 死信记录，同时写入结构化日志与失败保留列表
///
/// stack 是展开的错误链; Rust 没有异常栈，用 source 链代替。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetter {
    pub queue_item_id: String,
    pub job_id: i64,
    pub url: String,
    pub attempts: u32,
    pub error_message: String,
    pub stack: String,
    pub timestamp: DateTime<Utc>,
}

impl DeadLetter {
    pub fn from_item(item: &QueueItem, error: &str, stack: &str) -> Self {
        Self {
            queue_item_id: item.id.clone(),
            job_id: item.task.job_id,
            url: item.task.url.clone(),
            attempts: item.attempts,
            error_message: error.to_string(),
            stack: stack.to_string(),
            timestamp: Utc::now(),
        }
    }
}

/// 队列状态快照
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueueStats {
    pub waiting: i64,
    pub active: i64,
    pub completed: i64,
    pub failed: i64,
    #[serde(rename = "isPaused")]
    pub is_paused: bool,
    #[serde(rename = "pausedByCpu")]
    pub paused_by_cpu: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(priority: i64) -> ScrapeTask {
        ScrapeTask {
            job_id: 1,
            url: "https://example.com".into(),
            priority,
        }
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let config = QueueConfig::default();
        assert_eq!(config.backoff_for(1), Duration::from_secs(2));
        assert_eq!(config.backoff_for(2), Duration::from_secs(4));
        assert_eq!(config.backoff_for(3), Duration::from_secs(8));
        assert_eq!(config.backoff_for(10), Duration::from_secs(60));
    }

    #[test]
    fn test_lifo_scores_newest_highest() {
        let older = QueueItem::new(task(1_000), EnqueueOpts { priority: 1_000, lifo: true });
        let newer = QueueItem::new(task(2_000), EnqueueOpts { priority: 2_000, lifo: true });
        assert!(newer.effective_score() > older.effective_score());
    }

    #[test]
    fn test_fifo_scores_oldest_highest() {
        let older = QueueItem::new(task(1_000), EnqueueOpts { priority: 1_000, lifo: false });
        let newer = QueueItem::new(task(2_000), EnqueueOpts { priority: 2_000, lifo: false });
        assert!(older.effective_score() > newer.effective_score());
    }

    #[test]
    fn test_item_record_round_trip() {
        let item = QueueItem::new(task(42), EnqueueOpts { priority: 42, lifo: true });
        let json = serde_json::to_string(&item).unwrap();
        let back: QueueItem = serde_json::from_str(&json).unwrap();
        assert_eq!(item, back);
    }

    #[test]
    fn test_dead_letter_captures_item_fields() {
        let mut item = QueueItem::new(task(1), EnqueueOpts { priority: 1, lifo: true });
        item.attempts = 2;
        let dl = DeadLetter::from_item(&item, "HTTP 500", "HTTP 500\n  caused by: dns error");
        assert_eq!(dl.job_id, 1);
        assert_eq!(dl.attempts, 2);
        assert_eq!(dl.error_message, "HTTP 500");
        assert!(dl.stack.contains("caused by: dns error"));
        assert_eq!(dl.queue_item_id, item.id);
    }

    #[test]
    fn test_queue_stats_serde_field_names() {
        let stats = QueueStats {
            waiting: 1,
            active: 2,
            completed: 3,
            failed: 4,
            is_paused: true,
            paused_by_cpu: false,
        };
        let json = serde_json::to_string(&stats).unwrap();
        assert!(json.contains("\"isPaused\":true"));
        assert!(json.contains("\"pausedByCpu\":false"));
    }
}
