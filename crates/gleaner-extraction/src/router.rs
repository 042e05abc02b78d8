use std::sync::Arc;

use async_trait::async_trait;
use gleaner_domain::ScrapeOutcome;
use tracing::{debug, instrument};

/// 单 URL 提取路径。失败编码在返回值里，不向上抛。
#[async_trait]
pub trait Scraper: Send + Sync {
    async fn scrape(&self, url: &str) -> ScrapeOutcome;
}

/// 低产出时回退到渲染器的阈值: 静态解析拿到的媒体数低于该值
/// 说明页面大概率是客户端渲染的
const FALLBACK_THRESHOLD: usize = 3;

/// 提取路由: 先走静态解析，必要时回退浏览器渲染，返回产出更好的结果
///
/// 静态解析约比渲染便宜一个数量级，能满足阈值就不再起浏览器。
pub struct ExtractionRouter {
    static_scraper: Arc<dyn Scraper>,
    renderer: Arc<dyn Scraper>,
    threshold: usize,
}

impl ExtractionRouter {
    pub fn new(static_scraper: Arc<dyn Scraper>, renderer: Arc<dyn Scraper>) -> Self {
        Self {
            static_scraper,
            renderer,
            threshold: FALLBACK_THRESHOLD,
        }
    }

    #[cfg(test)]
    fn with_threshold(mut self, threshold: usize) -> Self {
        self.threshold = threshold;
        self
    }

    #[instrument(skip(self))]
    pub async fn scrape(&self, url: &str) -> ScrapeOutcome {
        let static_result = self.static_scraper.scrape(url).await;

        if static_result.success && static_result.media.len() >= self.threshold {
            return static_result;
        }

        debug!(
            "static path yielded {} media for {}, falling back to renderer",
            static_result.media.len(),
            url
        );

        // 渲染器自身的失败被吞掉，保底返回静态结果
        let rendered = self.renderer.scrape(url).await;
        if rendered.success && rendered.media.len() > static_result.media.len() {
            return rendered;
        }

        static_result
    }
}

#[async_trait]
impl Scraper for ExtractionRouter {
    async fn scrape(&self, url: &str) -> ScrapeOutcome {
        ExtractionRouter::scrape(self, url).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gleaner_domain::{MediaCandidate, MediaType, ScraperKind};

    struct FixedScraper {
        outcome: ScrapeOutcome,
    }

    #[async_trait]
    impl Scraper for FixedScraper {
        async fn scrape(&self, _url: &str) -> ScrapeOutcome {
            self.outcome.clone()
        }
    }

    fn media(count: usize) -> Vec<MediaCandidate> {
        (0..count)
            .map(|i| MediaCandidate {
                url: format!("https://cdn.example.com/{i}.jpg"),
                media_type: MediaType::Image,
                title: None,
            })
            .collect()
    }

    fn fixed(outcome: ScrapeOutcome) -> Arc<dyn Scraper> {
        Arc::new(FixedScraper { outcome })
    }

    fn url() -> String {
        "https://example.com".to_string()
    }

    #[tokio::test]
    async fn test_static_suffices_at_threshold() {
        let router = ExtractionRouter::new(
            fixed(ScrapeOutcome::success(url(), media(3), ScraperKind::Static)),
            fixed(ScrapeOutcome::success(url(), media(10), ScraperKind::Dynamic)),
        );
        let outcome = router.scrape(&url()).await;
        assert_eq!(outcome.scraper_used, ScraperKind::Static);
        assert_eq!(outcome.media.len(), 3);
    }

    #[tokio::test]
    async fn test_renderer_wins_when_strictly_better() {
        let router = ExtractionRouter::new(
            fixed(ScrapeOutcome::success(url(), media(0), ScraperKind::Static)),
            fixed(ScrapeOutcome::success(url(), media(5), ScraperKind::Dynamic)),
        );
        let outcome = router.scrape(&url()).await;
        assert_eq!(outcome.scraper_used, ScraperKind::Dynamic);
        assert_eq!(outcome.media.len(), 5);
    }

    #[tokio::test]
    async fn test_static_kept_when_renderer_ties() {
        let router = ExtractionRouter::new(
            fixed(ScrapeOutcome::success(url(), media(2), ScraperKind::Static)),
            fixed(ScrapeOutcome::success(url(), media(2), ScraperKind::Dynamic)),
        );
        let outcome = router.scrape(&url()).await;
        assert_eq!(outcome.scraper_used, ScraperKind::Static);
    }

    #[tokio::test]
    async fn test_renderer_failure_swallowed() {
        let router = ExtractionRouter::new(
            fixed(ScrapeOutcome::success(url(), media(1), ScraperKind::Static)),
            fixed(ScrapeOutcome::failure(
                url(),
                ScraperKind::Dynamic,
                "browser crashed".into(),
            )),
        );
        let outcome = router.scrape(&url()).await;
        assert!(outcome.success);
        assert_eq!(outcome.scraper_used, ScraperKind::Static);
        assert_eq!(outcome.media.len(), 1);
    }

    #[tokio::test]
    async fn test_both_failed_returns_static_failure() {
        let router = ExtractionRouter::new(
            fixed(ScrapeOutcome::failure(
                url(),
                ScraperKind::Static,
                "HTTP 500".into(),
            )),
            fixed(ScrapeOutcome::failure(
                url(),
                ScraperKind::Dynamic,
                "nav timeout".into(),
            )),
        );
        let outcome = router.scrape(&url()).await;
        assert!(!outcome.success);
        assert_eq!(outcome.scraper_used, ScraperKind::Static);
    }

    #[tokio::test]
    async fn test_custom_threshold() {
        let router = ExtractionRouter::new(
            fixed(ScrapeOutcome::success(url(), media(1), ScraperKind::Static)),
            fixed(ScrapeOutcome::success(url(), media(4), ScraperKind::Dynamic)),
        )
        .with_threshold(1);
        // 阈值放宽到 1 后静态结果直接够用
        let outcome = router.scrape(&url()).await;
        assert_eq!(outcome.scraper_used, ScraperKind::Static);
    }
}
