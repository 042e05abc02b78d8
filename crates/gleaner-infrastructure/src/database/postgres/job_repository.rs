use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gleaner_domain::{JobRepository, JobStatus, JobWithCount, ScrapeJob};
use gleaner_errors::{GleanError, GleanResult};
use sqlx::{PgPool, Row};
use tracing::{debug, instrument};

pub struct PgJobRepository {
    pool: PgPool,
}

impl PgJobRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_job(row: &sqlx::postgres::PgRow) -> GleanResult<ScrapeJob> {
        let status_raw: String = row.try_get("status")?;
        let status = JobStatus::parse(&status_raw).ok_or_else(|| {
            GleanError::database_error(format!("unknown job status in row: {status_raw}"))
        })?;

        Ok(ScrapeJob {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            urls: row.try_get("urls")?,
            status,
            created_at: row.try_get("created_at")?,
            completed_at: row.try_get("completed_at")?,
        })
    }
}

#[async_trait]
impl JobRepository for PgJobRepository {
    #[instrument(skip(self, urls), fields(url_count = urls.len()))]
    async fn create(&self, user_id: Option<i64>, urls: &[String]) -> GleanResult<ScrapeJob> {
        let row = sqlx::query(
            r#"
            INSERT INTO scrape_jobs (user_id, urls, status)
            VALUES ($1, $2, 'pending')
            RETURNING id, user_id, urls, status, created_at, completed_at
            "#,
        )
        .bind(user_id)
        .bind(urls)
        .fetch_one(&self.pool)
        .await?;

        let job = Self::row_to_job(&row)?;
        debug!("创建抓取任务成功: id={}, urls={}", job.id, job.urls.len());
        Ok(job)
    }

    #[instrument(skip(self), fields(job_id = %id))]
    async fn get_by_id(&self, id: i64) -> GleanResult<Option<ScrapeJob>> {
        let row = sqlx::query(
            "SELECT id, user_id, urls, status, created_at, completed_at FROM scrape_jobs WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_job).transpose()
    }

    #[instrument(skip(self))]
    async fn list(&self, page: i64, limit: i64) -> GleanResult<(Vec<JobWithCount>, i64)> {
        let offset = (page.max(1) - 1) * limit;

        let rows = sqlx::query(
            r#"
            SELECT j.id, j.user_id, j.urls, j.status, j.created_at, j.completed_at,
                   COUNT(m.id) AS media_found
            FROM scrape_jobs j
            LEFT JOIN media m ON m.job_id = j.id
            GROUP BY j.id
            ORDER BY j.created_at DESC
            LIMIT $1 OFFSET $2
            "#,
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let mut jobs = Vec::with_capacity(rows.len());
        for row in &rows {
            jobs.push(JobWithCount {
                job: Self::row_to_job(row)?,
                media_found: row.try_get("media_found")?,
            });
        }

        let total: i64 = sqlx::query("SELECT COUNT(*) AS n FROM scrape_jobs")
            .fetch_one(&self.pool)
            .await?
            .try_get("n")?;

        Ok((jobs, total))
    }

    #[instrument(skip(self), fields(job_id = %id))]
    async fn get_with_count(&self, id: i64) -> GleanResult<Option<JobWithCount>> {
        let row = sqlx::query(
            r#"
            SELECT j.id, j.user_id, j.urls, j.status, j.created_at, j.completed_at,
                   COUNT(m.id) AS media_found
            FROM scrape_jobs j
            LEFT JOIN media m ON m.job_id = j.id
            WHERE j.id = $1
            GROUP BY j.id
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(JobWithCount {
                job: Self::row_to_job(&row)?,
                media_found: row.try_get("media_found")?,
            })),
            None => Ok(None),
        }
    }

    #[instrument(skip(self), fields(job_id = %id))]
    async fn mark_processing(&self, id: i64) -> GleanResult<()> {
        // 幂等: 仅 pending 时迁移; 终态不会被改写
        sqlx::query("UPDATE scrape_jobs SET status = 'processing' WHERE id = $1 AND status = 'pending'")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    #[instrument(skip(self), fields(job_id = %id, status = status.as_str()))]
    async fn finalize(
        &self,
        id: i64,
        status: JobStatus,
        completed_at: DateTime<Utc>,
    ) -> GleanResult<()> {
        if !status.is_terminal() {
            return Err(GleanError::database_error(format!(
                "finalize called with non-terminal status: {}",
                status.as_str()
            )));
        }

        let result = sqlx::query(
            r#"
            UPDATE scrape_jobs
            SET status = $2, completed_at = $3
            WHERE id = $1 AND status NOT IN ('completed', 'failed')
            "#,
        )
        .bind(id)
        .bind(status.as_str())
        .bind(completed_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            debug!("finalize 跳过: 任务 {} 已处于终态", id);
        }
        Ok(())
    }
}
