mod job_repository;
mod media_repository;
mod user_repository;

pub use job_repository::PgJobRepository;
pub use media_repository::PgMediaRepository;
pub use user_repository::PgUserRepository;
