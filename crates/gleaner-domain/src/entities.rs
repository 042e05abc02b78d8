use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 抓取任务状态
///
/// 状态迁移是单向的: pending -> processing -> completed | failed
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(JobStatus::Pending),
            "processing" => Some(JobStatus::Processing),
            "completed" => Some(JobStatus::Completed),
            "failed" => Some(JobStatus::Failed),
            _ => None,
        }
    }

    /// 终态任务不允许再次进入 processing
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

/// 一次用户提交的抓取批次
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScrapeJob {
    pub id: i64,
    pub user_id: Option<i64>,
    pub urls: Vec<String>,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// 媒体类型
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Image,
    Video,
}

impl MediaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::Image => "image",
            MediaType::Video => "video",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "image" => Some(MediaType::Image),
            "video" => Some(MediaType::Video),
            _ => None,
        }
    }
}

/// 从页面中提取出的单个媒体资源
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Media {
    pub id: i64,
    pub job_id: i64,
    pub source_url: String,
    pub media_url: String,
    #[serde(rename = "type")]
    pub media_type: MediaType,
    pub title: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// 待插入的媒体记录，(job_id, media_url) 冲突时静默跳过
#[derive(Debug, Clone, PartialEq)]
pub struct NewMedia {
    pub job_id: i64,
    pub source_url: String,
    pub media_url: String,
    pub media_type: MediaType,
    pub title: Option<String>,
}

/// 认证主体
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub id: i64,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

/// 任务及其已提取的媒体数量
#[derive(Debug, Clone, PartialEq)]
pub struct JobWithCount {
    pub job: ScrapeJob,
    pub media_found: i64,
}

/// 媒体列表查询条件
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MediaFilter {
    pub media_type: Option<MediaType>,
    pub search: Option<String>,
    pub page: i64,
    pub limit: i64,
}

impl MediaFilter {
    pub fn offset(&self) -> i64 {
        (self.page.max(1) - 1) * self.limit
    }
}

/// 媒体聚合统计
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MediaStats {
    pub total: i64,
    pub images: i64,
    pub videos: i64,
    pub last24h: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_status_round_trip() {
        for status in [
            JobStatus::Pending,
            JobStatus::Processing,
            JobStatus::Completed,
            JobStatus::Failed,
        ] {
            assert_eq!(JobStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(JobStatus::parse("cancelled"), None);
    }

    #[test]
    fn test_terminal_states() {
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Processing.is_terminal());
    }

    #[test]
    fn test_media_type_serde_is_lowercase() {
        assert_eq!(
            serde_json::to_string(&MediaType::Image).unwrap(),
            "\"image\""
        );
        assert_eq!(MediaType::parse("video"), Some(MediaType::Video));
        assert_eq!(MediaType::parse("gif"), None);
    }

    #[test]
    fn test_media_filter_offset() {
        let filter = MediaFilter {
            page: 3,
            limit: 20,
            ..Default::default()
        };
        assert_eq!(filter.offset(), 40);

        let first = MediaFilter {
            page: 1,
            limit: 50,
            ..Default::default()
        };
        assert_eq!(first.offset(), 0);
    }

    #[test]
    fn test_user_password_hash_not_serialized() {
        let user = User {
            id: 1,
            username: "admin".into(),
            password_hash: "$2b$12$secret".into(),
            created_at: Utc::now(),
        };
        let json = serde_json::to_string(&user).unwrap();
        assert!(!json.contains("password_hash"));
        assert!(json.contains("admin"));
    }
}
