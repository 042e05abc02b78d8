use std::collections::HashMap;
use std::sync::Arc;

use gleaner_domain::JobProgress;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

/// 按 job_id 维护的并发进度表
///
/// 外层 RwLock 只保护表结构，计数本身走每键互斥锁，
/// 同一任务的事件彼此串行，不同任务互不阻塞。
/// 条目在计满时被移除，终态写入因此恰好发生一次。
pub struct ProgressTracker {
    inner: RwLock<HashMap<i64, Arc<Mutex<JobProgress>>>>,
}

/// 一次计数的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordResult {
    /// 尚未计满
    Pending,
    /// 本次计数触发结算，携带最终快照
    Settled(JobProgress),
    /// 没有对应条目（重复投递的迟到事件）
    Unknown,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }

    /// 惰性建条目; 已存在时不重置计数
    pub async fn ensure(&self, job_id: i64, total: u32) -> Arc<Mutex<JobProgress>> {
        if let Some(entry) = self.inner.read().await.get(&job_id) {
            return Arc::clone(entry);
        }
        let mut table = self.inner.write().await;
        Arc::clone(
            table
                .entry(job_id)
                .or_insert_with(|| Arc::new(Mutex::new(JobProgress::new(total)))),
        )
    }

    pub async fn contains(&self, job_id: i64) -> bool {
        self.inner.read().await.contains_key(&job_id)
    }

    /// 记录一个终态结果; 计满时移除条目并返回快照
    pub async fn record(&self, job_id: i64, failed: bool) -> RecordResult {
        let entry = match self.inner.read().await.get(&job_id) {
            Some(entry) => Arc::clone(entry),
            None => return RecordResult::Unknown,
        };

        let snapshot = {
            let mut progress = entry.lock().await;
            let counted = if failed {
                progress.record_failed()
            } else {
                progress.record_completed()
            };
            if !counted {
                debug!("任务 {} 的迟到事件被忽略", job_id);
                return RecordResult::Unknown;
            }
            if progress.is_settled() {
                Some(*progress)
            } else {
                None
            }
        };

        match snapshot {
            Some(progress) => {
                self.inner.write().await.remove(&job_id);
                RecordResult::Settled(progress)
            }
            None => RecordResult::Pending,
        }
    }

    pub async fn remove(&self, job_id: i64) {
        self.inner.write().await.remove(&job_id);
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_entry_created_lazily_and_removed_on_settle() {
        let tracker = ProgressTracker::new();
        assert!(!tracker.contains(1).await);

        tracker.ensure(1, 2).await;
        assert!(tracker.contains(1).await);

        assert_eq!(tracker.record(1, false).await, RecordResult::Pending);
        let result = tracker.record(1, true).await;
        match result {
            RecordResult::Settled(progress) => {
                assert_eq!(progress.completed, 1);
                assert_eq!(progress.failed, 1);
            }
            other => panic!("expected settle, got {other:?}"),
        }
        assert!(!tracker.contains(1).await);
    }

    #[tokio::test]
    async fn test_ensure_does_not_reset_counts() {
        let tracker = ProgressTracker::new();
        tracker.ensure(1, 3).await;
        tracker.record(1, false).await;
        tracker.ensure(1, 3).await;

        let entry = tracker.ensure(1, 3).await;
        assert_eq!(entry.lock().await.completed, 1);
    }

    #[tokio::test]
    async fn test_unknown_job_events_ignored() {
        let tracker = ProgressTracker::new();
        assert_eq!(tracker.record(99, false).await, RecordResult::Unknown);
    }

    #[tokio::test]
    async fn test_settle_happens_exactly_once() {
        let tracker = ProgressTracker::new();
        tracker.ensure(1, 1).await;

        assert!(matches!(
            tracker.record(1, false).await,
            RecordResult::Settled(_)
        ));
        // 条目已移除，重复投递的结果不会再次结算
        assert_eq!(tracker.record(1, false).await, RecordResult::Unknown);
    }

    #[tokio::test]
    async fn test_concurrent_records_never_overcount() {
        let tracker = Arc::new(ProgressTracker::new());
        let total = 50u32;
        tracker.ensure(7, total).await;

        let mut handles = Vec::new();
        for i in 0..total {
            let tracker = Arc::clone(&tracker);
            handles.push(tokio::spawn(async move {
                tracker.record(7, i % 3 == 0).await
            }));
        }

        let mut settled = 0;
        for handle in handles {
            if matches!(handle.await.unwrap(), RecordResult::Settled(_)) {
                settled += 1;
            }
        }
        assert_eq!(settled, 1);
        assert!(tracker.is_empty().await);
    }
}
