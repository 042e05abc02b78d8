pub mod entities;
pub mod progress;
pub mod repositories;
pub mod scrape;

pub use entities::{
    JobStatus, JobWithCount, Media, MediaFilter, MediaStats, MediaType, NewMedia, ScrapeJob, User,
};
pub use progress::JobProgress;
pub use repositories::{JobRepository, MediaRepository, UserRepository};
pub use scrape::{MediaCandidate, ScrapeOutcome, ScrapeTask, ScraperKind};
