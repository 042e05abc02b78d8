use async_trait::async_trait;
use gleaner_domain::{Media, MediaFilter, MediaRepository, MediaStats, MediaType, NewMedia};
use gleaner_errors::{GleanError, GleanResult};
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use tracing::{debug, instrument};

pub struct PgMediaRepository {
    pool: PgPool,
}

impl PgMediaRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_media(row: &sqlx::postgres::PgRow) -> GleanResult<Media> {
        let type_raw: String = row.try_get("media_type")?;
        let media_type = MediaType::parse(&type_raw).ok_or_else(|| {
            GleanError::database_error(format!("unknown media type in row: {type_raw}"))
        })?;

        Ok(Media {
            id: row.try_get("id")?,
            job_id: row.try_get("job_id")?,
            source_url: row.try_get("source_url")?,
            media_url: row.try_get("media_url")?,
            media_type,
            title: row.try_get("title")?,
            created_at: row.try_get("created_at")?,
        })
    }

    /// 过滤条件拼接，list 与 count 共用
    fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, filter: &MediaFilter) {
        builder.push(" WHERE 1 = 1");
        if let Some(media_type) = filter.media_type {
            builder.push(" AND media_type = ");
            builder.push_bind(media_type.as_str());
        }
        if let Some(search) = filter.search.as_deref().filter(|s| !s.is_empty()) {
            let pattern = format!("%{}%", search.replace('%', "\\%").replace('_', "\\_"));
            builder.push(" AND (title ILIKE ");
            builder.push_bind(pattern.clone());
            builder.push(" OR source_url ILIKE ");
            builder.push_bind(pattern);
            builder.push(")");
        }
    }
}

#[async_trait]
impl MediaRepository for PgMediaRepository {
    #[instrument(skip(self, items), fields(item_count = items.len()))]
    async fn insert_many(&self, items: &[NewMedia]) -> GleanResult<u64> {
        if items.is_empty() {
            return Ok(0);
        }

        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new("INSERT INTO media (job_id, source_url, media_url, media_type, title) ");

        builder.push_values(items, |mut b, item| {
            b.push_bind(item.job_id)
                .push_bind(&item.source_url)
                .push_bind(&item.media_url)
                .push_bind(item.media_type.as_str())
                .push_bind(&item.title);
        });
        builder.push(" ON CONFLICT (job_id, media_url) DO NOTHING");

        let result = builder.build().execute(&self.pool).await?;
        debug!(
            "媒体批量写入: 提交 {} 条，实际插入 {} 条",
            items.len(),
            result.rows_affected()
        );
        Ok(result.rows_affected())
    }

    #[instrument(skip(self))]
    async fn list(&self, filter: &MediaFilter) -> GleanResult<(Vec<Media>, i64)> {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
            "SELECT id, job_id, source_url, media_url, media_type, title, created_at FROM media",
        );
        Self::push_filters(&mut builder, filter);
        builder.push(" ORDER BY created_at DESC LIMIT ");
        builder.push_bind(filter.limit);
        builder.push(" OFFSET ");
        builder.push_bind(filter.offset());

        let rows = builder.build().fetch_all(&self.pool).await?;
        let mut media = Vec::with_capacity(rows.len());
        for row in &rows {
            media.push(Self::row_to_media(row)?);
        }

        let mut count_builder: QueryBuilder<Postgres> =
            QueryBuilder::new("SELECT COUNT(*) AS n FROM media");
        Self::push_filters(&mut count_builder, filter);
        let total: i64 = count_builder
            .build()
            .fetch_one(&self.pool)
            .await?
            .try_get("n")?;

        Ok((media, total))
    }

    #[instrument(skip(self), fields(media_id = %id))]
    async fn get_by_id(&self, id: i64) -> GleanResult<Option<Media>> {
        let row = sqlx::query(
            "SELECT id, job_id, source_url, media_url, media_type, title, created_at FROM media WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_media).transpose()
    }

    #[instrument(skip(self))]
    async fn stats(&self) -> GleanResult<MediaStats> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS total,
                   COUNT(*) FILTER (WHERE media_type = 'image') AS images,
                   COUNT(*) FILTER (WHERE media_type = 'video') AS videos,
                   COUNT(*) FILTER (WHERE created_at >= NOW() - INTERVAL '24 hours') AS last24h
            FROM media
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(MediaStats {
            total: row.try_get("total")?,
            images: row.try_get("images")?,
            videos: row.try_get("videos")?,
            last24h: row.try_get("last24h")?,
        })
    }
}
