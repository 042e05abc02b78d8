pub mod cache;
pub mod database;
pub mod monitor;
pub mod queue;

pub use cache::{cache_keys, RedisCacheManager};
pub use database::postgres::{PgJobRepository, PgMediaRepository, PgUserRepository};
pub use monitor::{CpuSampler, SystemSampler};
pub use queue::{
    run_workers, JobQueue, QueueConfig, QueueObserver, QueueStats, ScrapeHandler, ScrapeQueue,
};
