use serde::{Deserialize, Serialize};

/// 单个任务的进度计数，仅存在于内存中
///
/// 不变量: completed + failed <= total，计数达到 total 时写终态并删除。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct JobProgress {
    pub total: u32,
    pub completed: u32,
    pub failed: u32,
}

impl JobProgress {
    pub fn new(total: u32) -> Self {
        Self {
            total,
            completed: 0,
            failed: 0,
        }
    }

    /// 记录一个成功结果，计数已满时返回 false
    pub fn record_completed(&mut self) -> bool {
        if self.is_settled() {
            return false;
        }
        self.completed += 1;
        true
    }

    /// 记录一个终态失败结果，计数已满时返回 false
    pub fn record_failed(&mut self) -> bool {
        if self.is_settled() {
            return false;
        }
        self.failed += 1;
        true
    }

    pub fn is_settled(&self) -> bool {
        self.completed + self.failed >= self.total
    }

    /// 所有 URL 都失败时整个任务才算失败
    pub fn all_failed(&self) -> bool {
        self.failed == self.total
    }
}
