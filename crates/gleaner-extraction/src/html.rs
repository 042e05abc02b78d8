use std::time::Duration;

use async_trait::async_trait;
use gleaner_domain::{MediaType, ScrapeOutcome, ScraperKind};
use gleaner_errors::GleanResult;
use scraper::{Html, Selector};
use tracing::{debug, instrument};

use crate::candidates::{self, parse_srcset, RawCandidate};
use crate::fetch::PageFetcher;
use crate::router::Scraper;

/// 静态 HTML 提取器
///
/// 不执行脚本，直接在服务端返回的标记里收集 `<img>`、`<video>`、
/// `<source>` 与 OpenGraph 标签引用的媒体。
pub struct StaticScraper {
    fetcher: PageFetcher,
}

impl StaticScraper {
    pub fn new(timeout: Duration) -> GleanResult<Self> {
        Ok(Self {
            fetcher: PageFetcher::new(timeout)?,
        })
    }

    /// 从 HTML 文本中收集原始候选，URL 留待统一解析
    pub fn collect_candidates(html: &str) -> Vec<RawCandidate> {
        let doc = Html::parse_document(html);
        let mut raw = Vec::new();

        let page_title = Selector::parse("title")
            .ok()
            .and_then(|sel| doc.select(&sel).next())
            .map(|el| el.text().collect::<String>().trim().to_string())
            .filter(|t| !t.is_empty());

        if let Ok(sel) = Selector::parse("img") {
            for img in doc.select(&sel) {
                let alt = img
                    .value()
                    .attr("alt")
                    .map(str::to_string)
                    .filter(|t| !t.trim().is_empty());

                // src 缺失或是 data: 占位时回退 data-src（懒加载页面的常见形态）
                let src = img.value().attr("src").filter(|s| !s.starts_with("data:"));
                if let Some(src) = src.or_else(|| img.value().attr("data-src")) {
                    raw.push(RawCandidate {
                        url: src.to_string(),
                        kind: MediaType::Image,
                        title: alt.clone(),
                    });
                }

                if let Some(srcset) = img.value().attr("srcset") {
                    for url in parse_srcset(srcset) {
                        raw.push(RawCandidate {
                            url,
                            kind: MediaType::Image,
                            title: alt.clone(),
                        });
                    }
                }
            }
        }

        if let Ok(sel) = Selector::parse("video") {
            for video in doc.select(&sel) {
                let title = video
                    .value()
                    .attr("title")
                    .map(str::to_string)
                    .filter(|t| !t.trim().is_empty());

                if let Some(src) = video.value().attr("src") {
                    raw.push(RawCandidate {
                        url: src.to_string(),
                        kind: MediaType::Video,
                        title: title.clone(),
                    });
                }

                if let Ok(source_sel) = Selector::parse("source") {
                    for source in video.select(&source_sel) {
                        if let Some(src) = source.value().attr("src") {
                            raw.push(RawCandidate {
                                url: src.to_string(),
                                kind: MediaType::Video,
                                title: title.clone(),
                            });
                        }
                    }
                }
            }
        }

        if let Ok(sel) = Selector::parse("meta[property]") {
            for meta in doc.select(&sel) {
                let (Some(property), Some(content)) =
                    (meta.value().attr("property"), meta.value().attr("content"))
                else {
                    continue;
                };
                let kind = match property {
                    "og:image" => MediaType::Image,
                    "og:video" => MediaType::Video,
                    _ => continue,
                };
                raw.push(RawCandidate {
                    url: content.to_string(),
                    kind,
                    title: page_title.clone(),
                });
            }
        }

        raw
    }

    #[instrument(skip(self))]
    async fn scrape_inner(&self, url: &str) -> ScrapeOutcome {
        let page = match self.fetcher.fetch(url).await {
            Ok(page) => page,
            Err(e) => {
                return ScrapeOutcome::failure(url.to_string(), ScraperKind::Static, e.to_string())
            }
        };

        let raw = Self::collect_candidates(&page.html);
        let media = candidates::finalize(raw, &page.final_url);
        debug!("static extraction found {} media on {}", media.len(), url);

        ScrapeOutcome::success(url.to_string(), media, ScraperKind::Static)
    }
}

#[async_trait]
impl Scraper for StaticScraper {
    async fn scrape(&self, url: &str) -> ScrapeOutcome {
        self.scrape_inner(url).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    fn finalize_for(html: &str, base: &str) -> Vec<gleaner_domain::MediaCandidate> {
        let base = Url::parse(base).unwrap();
        candidates::finalize(StaticScraper::collect_candidates(html), &base)
    }

    #[test]
    fn test_img_src_and_duplicate_collapse() {
        let html = r#"<html><body>
            <img src="/a.jpg"><img src="/a.jpg"><img src="b.jpg">
        </body></html>"#;
        let media = finalize_for(html, "https://example.com/");
        assert_eq!(media.len(), 2);
        assert_eq!(media[0].url, "https://example.com/a.jpg");
        assert_eq!(media[1].url, "https://example.com/b.jpg");
    }

    #[test]
    fn test_img_data_src_fallback() {
        let html = r#"<img data-src="/lazy.jpg">
                      <img src="data:image/gif;base64,R0lGOD" data-src="/real.jpg">"#;
        let media = finalize_for(html, "https://example.com/");
        let urls: Vec<_> = media.iter().map(|m| m.url.as_str()).collect();
        assert_eq!(
            urls,
            vec!["https://example.com/lazy.jpg", "https://example.com/real.jpg"]
        );
    }

    #[test]
    fn test_srcset_urls_collected() {
        let html = r#"<img src="/a.jpg" srcset="/a-320.jpg 320w, /a-640.jpg 640w">"#;
        let media = finalize_for(html, "https://example.com/");
        assert_eq!(media.len(), 3);
    }

    #[test]
    fn test_video_and_nested_sources() {
        let html = r#"<video src="/v.mp4" title="clip">
            <source src="/v.webm"><source src="/v.ogv">
        </video>"#;
        let media = finalize_for(html, "https://example.com/");
        assert_eq!(media.len(), 3);
        assert!(media.iter().all(|m| m.media_type == MediaType::Video));
        assert_eq!(media[0].title.as_deref(), Some("clip"));
    }

    #[test]
    fn test_open_graph_round_trip() {
        let html = r#"<html><head>
            <title>Page</title>
            <meta property="og:image" content="https://x/y.jpg">
            <meta property="og:description" content="ignored">
        </head></html>"#;
        let media = finalize_for(html, "https://example.com/");
        assert_eq!(media.len(), 1);
        assert_eq!(media[0].url, "https://x/y.jpg");
        assert_eq!(media[0].media_type, MediaType::Image);
        assert_eq!(media[0].title.as_deref(), Some("Page"));
    }

    #[test]
    fn test_og_video_typed_as_video() {
        let html = r#"<meta property="og:video" content="https://x/v.mp4">"#;
        let media = finalize_for(html, "https://example.com/");
        assert_eq!(media[0].media_type, MediaType::Video);
    }

    #[test]
    fn test_img_alt_becomes_title() {
        let html = r#"<img src="/a.jpg" alt="A cat">"#;
        let media = finalize_for(html, "https://example.com/");
        assert_eq!(media[0].title.as_deref(), Some("A cat"));
    }

    #[test]
    fn test_empty_page_yields_no_candidates() {
        let media = finalize_for("<html><body><p>text</p></body></html>", "https://example.com/");
        assert!(media.is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_host_is_failure_outcome() {
        let scraper = StaticScraper::new(Duration::from_millis(200)).unwrap();
        let outcome = scraper.scrape("http://127.0.0.1:1/none").await;
        assert!(!outcome.success);
        assert_eq!(outcome.scraper_used, ScraperKind::Static);
        assert!(outcome.error.is_some());
        assert!(outcome.media.is_empty());
    }
}
