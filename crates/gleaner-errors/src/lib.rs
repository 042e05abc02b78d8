use thiserror::Error;

#[derive(Debug, Error)]
pub enum GleanError {
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),
    #[error("数据库操作错误: {0}")]
    DatabaseOperation(String),
    #[error("抓取任务未找到: {id}")]
    JobNotFound { id: i64 },
    #[error("媒体记录未找到: {id}")]
    MediaNotFound { id: i64 },
    #[error("用户未找到: {username}")]
    UserNotFound { username: String },
    #[error("队列错误: {0}")]
    Queue(String),
    #[error("缓存错误: {0}")]
    Cache(String),
    #[error("页面抓取失败: {0}")]
    Fetch(String),
    #[error("浏览器渲染失败: {0}")]
    Render(String),
    #[error("序列化错误: {0}")]
    Serialization(String),
    #[error("配置错误: {0}")]
    Configuration(String),
    #[error("数据验证失败: {0}")]
    Validation(String),
    #[error("操作超时: {0}")]
    Timeout(String),
    #[error("资源冲突: {0}")]
    Conflict(String),
    #[error("内部错误: {0}")]
    Internal(String),
}

pub type GleanResult<T> = Result<T, GleanError>;

impl GleanError {
    pub fn database_error<S: Into<String>>(msg: S) -> Self {
        Self::DatabaseOperation(msg.into())
    }
    pub fn job_not_found(id: i64) -> Self {
        Self::JobNotFound { id }
    }
    pub fn media_not_found(id: i64) -> Self {
        Self::MediaNotFound { id }
    }
    pub fn user_not_found<S: Into<String>>(username: S) -> Self {
        Self::UserNotFound {
            username: username.into(),
        }
    }
    pub fn queue_error<S: Into<String>>(msg: S) -> Self {
        Self::Queue(msg.into())
    }
    pub fn cache_error<S: Into<String>>(msg: S) -> Self {
        Self::Cache(msg.into())
    }
    pub fn fetch_error<S: Into<String>>(msg: S) -> Self {
        Self::Fetch(msg.into())
    }
    pub fn render_error<S: Into<String>>(msg: S) -> Self {
        Self::Render(msg.into())
    }
    pub fn config_error<S: Into<String>>(msg: S) -> Self {
        Self::Configuration(msg.into())
    }
    pub fn validation_error<S: Into<String>>(msg: S) -> Self {
        Self::Validation(msg.into())
    }

    /// 可重试的错误会被队列重新投递，其余直接进入死信通道
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GleanError::DatabaseOperation(_)
                | GleanError::Queue(_)
                | GleanError::Fetch(_)
                | GleanError::Render(_)
                | GleanError::Timeout(_)
        )
    }

    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            GleanError::Internal(_) | GleanError::Configuration(_)
        )
    }

    /// 完整错误链，死信记录的 stack 字段用
    pub fn chain(&self) -> String {
        use std::error::Error;

        let mut out = self.to_string();
        let mut source = self.source();
        while let Some(err) = source {
            out.push_str("\n  caused by: ");
            out.push_str(&err.to_string());
            source = err.source();
        }
        out
    }
}

impl From<serde_json::Error> for GleanError {
    fn from(err: serde_json::Error) -> Self {
        GleanError::Serialization(err.to_string())
    }
}

impl From<anyhow::Error> for GleanError {
    fn from(err: anyhow::Error) -> Self {
        GleanError::Internal(err.to_string())
    }
}

impl From<redis::RedisError> for GleanError {
    fn from(err: redis::RedisError) -> Self {
        GleanError::Queue(err.to_string())
    }
}

impl From<reqwest::Error> for GleanError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            GleanError::Timeout(err.to_string())
        } else {
            GleanError::Fetch(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(GleanError::Fetch("connection reset".into()).is_retryable());
        assert!(GleanError::Render("nav timeout".into()).is_retryable());
        assert!(GleanError::Timeout("handler deadline".into()).is_retryable());
        assert!(!GleanError::Validation("bad url".into()).is_retryable());
        assert!(!GleanError::JobNotFound { id: 1 }.is_retryable());
    }

    #[test]
    fn test_fatal_classification() {
        assert!(GleanError::Configuration("missing DATABASE_URL".into()).is_fatal());
        assert!(!GleanError::Fetch("503".into()).is_fatal());
    }

    #[test]
    fn test_reqwest_timeout_maps_to_timeout() {
        // reqwest errors cannot be constructed directly; exercise the non-timeout path
        let err = GleanError::fetch_error("HTTP 500");
        assert!(matches!(err, GleanError::Fetch(_)));
    }

    #[test]
    fn test_chain_walks_sources() {
        let flat = GleanError::fetch_error("HTTP 500");
        assert_eq!(flat.chain(), flat.to_string());

        let db = GleanError::Database(sqlx::Error::PoolTimedOut);
        let chain = db.chain();
        assert!(chain.starts_with(&db.to_string()));
        assert!(chain.contains("caused by:"));
    }

    #[test]
    fn test_helper_constructors() {
        assert!(matches!(
            GleanError::job_not_found(42),
            GleanError::JobNotFound { id: 42 }
        ));
        assert!(matches!(
            GleanError::user_not_found("admin"),
            GleanError::UserNotFound { .. }
        ));
    }
}
