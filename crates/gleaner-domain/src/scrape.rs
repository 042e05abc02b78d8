use serde::{Deserialize, Serialize};

use crate::entities::MediaType;

/// 队列中的单元任务载荷: 一个任务批次内的一个页面 URL
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScrapeTask {
    pub job_id: i64,
    pub url: String,
    /// now() 毫秒时间戳，配合 LIFO 使最新提交先出队
    pub priority: i64,
}

/// 本次抓取使用的提取路径
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ScraperKind {
    /// 静态 HTML 解析
    Static,
    /// 无头浏览器渲染
    Dynamic,
}

impl ScraperKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScraperKind::Static => "static",
            ScraperKind::Dynamic => "dynamic",
        }
    }
}

/// 过滤、解析完成后的候选媒体资源
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MediaCandidate {
    pub url: String,
    #[serde(rename = "type")]
    pub media_type: MediaType,
    pub title: Option<String>,
}

/// 单个 URL 的提取结果
///
/// success=false 仅表示抓取或解析抛出了错误; 成功但零媒体仍是 success=true。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScrapeOutcome {
    pub url: String,
    pub success: bool,
    pub media: Vec<MediaCandidate>,
    pub scraper_used: ScraperKind,
    pub error: Option<String>,
}

impl ScrapeOutcome {
    pub fn success(url: String, media: Vec<MediaCandidate>, scraper_used: ScraperKind) -> Self {
        Self {
            url,
            success: true,
            media,
            scraper_used,
            error: None,
        }
    }

    pub fn failure(url: String, scraper_used: ScraperKind, error: String) -> Self {
        Self {
            url,
            success: false,
            media: Vec::new(),
            scraper_used,
            error: Some(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scrape_task_serde_round_trip() {
        let task = ScrapeTask {
            job_id: 7,
            url: "https://example.com".into(),
            priority: 1_700_000_000_000,
        };
        let json = serde_json::to_string(&task).unwrap();
        let back: ScrapeTask = serde_json::from_str(&json).unwrap();
        assert_eq!(task, back);
    }

    #[test]
    fn test_scraper_kind_names() {
        assert_eq!(ScraperKind::Static.as_str(), "static");
        assert_eq!(ScraperKind::Dynamic.as_str(), "dynamic");
        assert_eq!(
            serde_json::to_string(&ScraperKind::Dynamic).unwrap(),
            "\"dynamic\""
        );
    }

    #[test]
    fn test_outcome_constructors() {
        let ok = ScrapeOutcome::success("https://a".into(), vec![], ScraperKind::Static);
        assert!(ok.success);
        assert!(ok.error.is_none());

        let err = ScrapeOutcome::failure(
            "https://a".into(),
            ScraperKind::Static,
            "HTTP 500".into(),
        );
        assert!(!err.success);
        assert!(err.media.is_empty());
        assert_eq!(err.error.as_deref(), Some("HTTP 500"));
    }
}
