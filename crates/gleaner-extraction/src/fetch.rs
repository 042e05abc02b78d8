use std::time::Duration;

use gleaner_errors::{GleanError, GleanResult};
use tracing::{debug, instrument};
use url::Url;

const USER_AGENT: &str = concat!("gleaner-scraper/", env!("CARGO_PKG_VERSION"));

/// 响应体上限，保护 1GB 内存预算
const MAX_BODY_BYTES: usize = 8 * 1024 * 1024;

/// 抓取结果: 响应体与重定向后的最终 URL
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub html: String,
    pub final_url: Url,
}

/// 静态路径使用的 HTTP 抓取器
pub struct PageFetcher {
    client: reqwest::Client,
}

impl PageFetcher {
    pub fn new(timeout: Duration) -> GleanResult<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .map_err(|e| GleanError::fetch_error(format!("http client build failed: {e}")))?;
        Ok(Self { client })
    }

    /// GET 单个页面。非 2xx、非 HTML 内容、超大响应都视为抓取失败。
    #[instrument(skip(self))]
    pub async fn fetch(&self, url: &str) -> GleanResult<FetchedPage> {
        let parsed = Url::parse(url)
            .map_err(|e| GleanError::validation_error(format!("invalid url '{url}': {e}")))?;
        match parsed.scheme() {
            "http" | "https" => {}
            other => {
                return Err(GleanError::validation_error(format!(
                    "unsupported scheme '{other}' for '{url}'"
                )))
            }
        }

        let response = self.client.get(parsed.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(GleanError::fetch_error(format!("HTTP {status} for '{url}'")));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("text/html")
            .to_string();
        if !content_type.contains("text/html") && !content_type.contains("application/xhtml") {
            return Err(GleanError::fetch_error(format!(
                "not an html page: content-type '{content_type}' for '{url}'"
            )));
        }

        if let Some(len) = response.content_length() {
            if len as usize > MAX_BODY_BYTES {
                return Err(GleanError::fetch_error(format!(
                    "response too large: {len} bytes for '{url}'"
                )));
            }
        }

        let final_url = response.url().clone();
        let bytes = response.bytes().await?;
        if bytes.len() > MAX_BODY_BYTES {
            return Err(GleanError::fetch_error(format!(
                "response too large: {} bytes for '{url}'",
                bytes.len()
            )));
        }

        debug!("fetched {} bytes from {}", bytes.len(), final_url);
        Ok(FetchedPage {
            html: String::from_utf8_lossy(&bytes).into_owned(),
            final_url,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_invalid_url_is_validation_error() {
        let fetcher = PageFetcher::new(Duration::from_secs(5)).unwrap();
        let err = fetcher.fetch("not a url").await.unwrap_err();
        assert!(matches!(err, GleanError::Validation(_)));
    }

    #[tokio::test]
    async fn test_non_http_scheme_rejected() {
        let fetcher = PageFetcher::new(Duration::from_secs(5)).unwrap();
        let err = fetcher.fetch("ftp://example.com/file").await.unwrap_err();
        assert!(matches!(err, GleanError::Validation(_)));
    }

    #[test]
    fn test_user_agent_identifies_scraper() {
        assert!(USER_AGENT.starts_with("gleaner-scraper/"));
    }
}
