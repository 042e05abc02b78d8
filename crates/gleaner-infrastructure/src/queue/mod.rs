//! 基于 Redis 的持久化抓取队列
//!
//! 有序集合承载等待/延迟/执行中三态，条目记录以 JSON 存储，
//! 完成与失败保留固定长度的回溯列表。租约过期由维护循环回收，
//! 超过重投上限的条目进入死信通道。

mod item;
mod scrape_queue;
mod traits;
mod worker;

pub use item::{DeadLetter, EnqueueOpts, QueueConfig, QueueItem, QueueStats};
pub use scrape_queue::ScrapeQueue;
pub use traits::JobQueue;
pub use worker::{run_workers, QueueObserver, ScrapeHandler, WorkerHandles};
