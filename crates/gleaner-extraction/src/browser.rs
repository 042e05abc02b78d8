use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::fetch::{
    EnableParams as FetchEnableParams, EventRequestPaused, FailRequestParams, RequestPattern,
};
use chromiumoxide::cdp::browser_protocol::network::{ErrorReason, ResourceType};
use chromiumoxide::Page;
use futures::StreamExt;
use gleaner_domain::{ScrapeOutcome, ScraperKind};
use gleaner_errors::{GleanError, GleanResult};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::candidates::{self, RawCandidate};
use crate::router::Scraper;

/// 页面上下文里执行的收集脚本，与静态路径同一套标签规则
const COLLECT_JS: &str = r#"
() => {
    const out = [];
    const push = (url, kind, title) => {
        if (url) out.push({ url, kind, title: title || null });
    };
    for (const img of document.querySelectorAll('img')) {
        push(img.getAttribute('src') || img.getAttribute('data-src'), 'image', img.getAttribute('alt'));
        const srcset = img.getAttribute('srcset');
        if (srcset) {
            for (const entry of srcset.split(',')) {
                push(entry.trim().split(/\s+/)[0], 'image', img.getAttribute('alt'));
            }
        }
    }
    for (const video of document.querySelectorAll('video')) {
        push(video.getAttribute('src'), 'video', video.getAttribute('title'));
        for (const source of video.querySelectorAll('source')) {
            push(source.getAttribute('src'), 'video', video.getAttribute('title'));
        }
    }
    const pageTitle = document.title || null;
    for (const meta of document.querySelectorAll('meta[property^="og:"]')) {
        const property = meta.getAttribute('property');
        const content = meta.getAttribute('content');
        if (property === 'og:image') push(content, 'image', pageTitle);
        if (property === 'og:video') push(content, 'video', pageTitle);
    }
    return out;
}
"#;

/// 样式与字体对 DOM 里的媒体引用没有贡献，按资源类型拦截后中止，
/// 与 URL 形态无关。图片请求本身不拦截: 提取依赖 DOM 中的 img 元素属性。
const BLOCKED_RESOURCE_TYPES: [ResourceType; 2] = [ResourceType::Stylesheet, ResourceType::Font];

/// 渲染器配置
#[derive(Debug, Clone)]
pub struct RendererConfig {
    pub headless: bool,
    /// 屏蔽 stylesheet/font 请求
    pub block_assets: bool,
    /// 单页导航与收集的总预算
    pub timeout: Duration,
    /// 渲染这么多页后整只浏览器重启，兜住内存漂移
    pub pages_per_browser: u32,
    /// RSS 超过该值时记录内存压力
    pub low_memory_mb: usize,
    /// 懒加载内容挂载的等待时间
    pub settle_delay: Duration,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            headless: true,
            block_assets: true,
            timeout: Duration::from_secs(30),
            pages_per_browser: 10,
            low_memory_mb: 350,
            settle_delay: Duration::from_secs(2),
        }
    }
}

struct BrowserSession {
    browser: Browser,
    event_loop: JoinHandle<()>,
    pages_opened: u32,
}

impl BrowserSession {
    async fn close(mut self) {
        if let Err(e) = self.browser.close().await {
            warn!("浏览器关闭失败: {}", e);
        }
        let _ = self.browser.wait().await;
        self.event_loop.abort();
    }
}

/// 无头浏览器渲染路径
///
/// 每个进程最多持有一只存活的浏览器，懒启动; 页面计数到达阈值后
/// 重启整只浏览器。状态由互斥锁保护，并发 handler 共享同一会话。
pub struct HeadlessRenderer {
    config: RendererConfig,
    session: Mutex<Option<BrowserSession>>,
}

impl HeadlessRenderer {
    pub fn new(config: RendererConfig) -> Self {
        Self {
            config,
            session: Mutex::new(None),
        }
    }

    fn launch_config(&self) -> GleanResult<BrowserConfig> {
        // 容器内运行所需的降权参数
        let mut builder = BrowserConfig::builder()
            .no_sandbox()
            .window_size(1280, 720)
            .args(vec![
                "--disable-gpu",
                "--disable-dev-shm-usage",
                "--single-process",
                "--no-zygote",
                "--disable-extensions",
            ]);
        if !self.config.headless {
            builder = builder.with_head();
        }
        builder
            .build()
            .map_err(|e| GleanError::render_error(format!("browser config: {e}")))
    }

    async fn launch(&self) -> GleanResult<BrowserSession> {
        let (browser, mut handler) = Browser::launch(self.launch_config()?)
            .await
            .map_err(|e| GleanError::render_error(format!("browser launch failed: {e}")))?;

        let event_loop = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        info!("无头浏览器已启动");
        Ok(BrowserSession {
            browser,
            event_loop,
            pages_opened: 0,
        })
    }

    /// 取可用会话; 页面计数超限时先回收旧浏览器
    async fn ensure_session<'a>(
        &self,
        slot: &'a mut Option<BrowserSession>,
    ) -> GleanResult<&'a mut BrowserSession> {
        if let Some(session) = slot.take() {
            if session.pages_opened >= self.config.pages_per_browser {
                info!(
                    "浏览器已渲染 {} 页，重启以回收内存",
                    session.pages_opened
                );
                session.close().await;
            } else {
                *slot = Some(session);
            }
        }

        if slot.is_none() {
            *slot = Some(self.launch().await?);
        }
        slot.as_mut()
            .ok_or_else(|| GleanError::render_error("browser session unavailable"))
    }

    async fn render_page(&self, session: &mut BrowserSession, url: &str) -> GleanResult<Vec<RawCandidate>> {
        let page = session
            .browser
            .new_page("about:blank")
            .await
            .map_err(|e| GleanError::render_error(format!("new page: {e}")))?;
        session.pages_opened += 1;

        let interceptor = if self.config.block_assets {
            match self.block_asset_requests(&page).await {
                Ok(handle) => Some(handle),
                Err(e) => {
                    if let Err(close_err) = page.close().await {
                        debug!("页面关闭失败（忽略）: {}", close_err);
                    }
                    return Err(e);
                }
            }
        } else {
            None
        };

        let result = self.drive_page(&page, url).await;

        if let Some(handle) = interceptor {
            handle.abort();
        }
        if let Err(e) = page.close().await {
            debug!("页面关闭失败（忽略）: {}", e);
        }
        result
    }

    /// 按资源类型拦截请求: 命中 stylesheet/font 的请求被暂停并中止，
    /// 其余请求不进入拦截通道
    async fn block_asset_requests(&self, page: &Page) -> GleanResult<JoinHandle<()>> {
        let patterns: Vec<RequestPattern> = BLOCKED_RESOURCE_TYPES
            .iter()
            .map(|resource_type| {
                RequestPattern::builder()
                    .url_pattern("*")
                    .resource_type(resource_type.clone())
                    .build()
            })
            .collect();

        page.execute(FetchEnableParams::builder().patterns(patterns).build())
            .await
            .map_err(|e| GleanError::render_error(format!("fetch enable: {e}")))?;

        let mut paused = page
            .event_listener::<EventRequestPaused>()
            .await
            .map_err(|e| GleanError::render_error(format!("request listener: {e}")))?;

        let page = page.clone();
        Ok(tokio::spawn(async move {
            while let Some(event) = paused.next().await {
                let abort = FailRequestParams::new(
                    event.request_id.clone(),
                    ErrorReason::BlockedByClient,
                );
                if page.execute(abort).await.is_err() {
                    break;
                }
            }
        }))
    }

    async fn drive_page(&self, page: &Page, url: &str) -> GleanResult<Vec<RawCandidate>> {
        page.goto(url)
            .await
            .map_err(|e| GleanError::render_error(format!("navigation failed: {e}")))?;
        page.wait_for_navigation()
            .await
            .map_err(|e| GleanError::render_error(format!("navigation wait: {e}")))?;

        // 等懒加载内容挂载
        tokio::time::sleep(self.config.settle_delay).await;

        let candidates: Vec<RawCandidate> = page
            .evaluate_function(COLLECT_JS)
            .await
            .map_err(|e| GleanError::render_error(format!("collect script: {e}")))?
            .into_value()
            .map_err(|e| GleanError::render_error(format!("collect result decode: {e}")))?;

        Ok(candidates)
    }

    async fn scrape_inner(&self, url: &str) -> GleanResult<ScrapeOutcome> {
        let base = Url::parse(url)
            .map_err(|e| GleanError::validation_error(format!("invalid url '{url}': {e}")))?;

        let rss = rss_mb();
        if rss > self.config.low_memory_mb {
            warn!("渲染前内存压力: rss={}MB，阈值 {}MB", rss, self.config.low_memory_mb);
        }

        let mut slot = self.session.lock().await;
        let session = self.ensure_session(&mut slot).await?;

        let render_result =
            tokio::time::timeout(self.config.timeout, self.render_page(session, url)).await;
        let raw = match render_result {
            Ok(Ok(raw)) => raw,
            Ok(Err(e)) => {
                // 导航失败后会话可能已不健康，丢弃重启
                if let Some(session) = slot.take() {
                    session.close().await;
                }
                return Err(e);
            }
            Err(_) => {
                if let Some(session) = slot.take() {
                    session.close().await;
                }
                return Err(GleanError::Timeout(format!(
                    "render exceeded {}s for '{url}'",
                    self.config.timeout.as_secs()
                )));
            }
        };
        drop(slot);

        let media = candidates::finalize(raw, &base);
        debug!("rendered extraction found {} media on {}", media.len(), url);
        Ok(ScrapeOutcome::success(
            url.to_string(),
            media,
            ScraperKind::Dynamic,
        ))
    }

    /// 是否持有存活的浏览器进程
    pub async fn is_running(&self) -> bool {
        self.session.lock().await.is_some()
    }

    /// 关停浏览器进程
    pub async fn close(&self) {
        if let Some(session) = self.session.lock().await.take() {
            session.close().await;
            info!("无头浏览器已关闭");
        }
    }
}

#[async_trait]
impl Scraper for HeadlessRenderer {
    #[instrument(skip(self))]
    async fn scrape(&self, url: &str) -> ScrapeOutcome {
        match self.scrape_inner(url).await {
            Ok(outcome) => outcome,
            Err(e) => ScrapeOutcome::failure(url.to_string(), ScraperKind::Dynamic, e.to_string()),
        }
    }
}

fn rss_mb() -> usize {
    #[cfg(target_os = "linux")]
    {
        std::fs::read_to_string("/proc/self/status")
            .ok()
            .and_then(|status| {
                status.lines().find_map(|line| {
                    line.strip_prefix("VmRSS:")
                        .and_then(|rest| rest.split_whitespace().next())
                        .and_then(|kb| kb.parse::<usize>().ok())
                })
            })
            .map(|kb| kb / 1024)
            .unwrap_or(0)
    }
    #[cfg(not(target_os = "linux"))]
    {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_values() {
        let config = RendererConfig::default();
        assert_eq!(config.pages_per_browser, 10);
        assert_eq!(config.low_memory_mb, 350);
        assert_eq!(config.settle_delay, Duration::from_secs(2));
        assert!(config.headless);
        assert!(config.block_assets);
    }

    #[test]
    fn test_blocked_resource_types_never_include_images() {
        assert_eq!(BLOCKED_RESOURCE_TYPES.len(), 2);
        for resource_type in &BLOCKED_RESOURCE_TYPES {
            assert!(!matches!(resource_type, ResourceType::Image));
            assert!(!matches!(resource_type, ResourceType::Media));
            assert!(!matches!(resource_type, ResourceType::Document));
        }
    }

    #[test]
    fn test_collect_script_covers_required_selectors() {
        for selector in ["img", "video", "source", "og:image", "og:video", "srcset"] {
            assert!(COLLECT_JS.contains(selector), "missing {selector}");
        }
    }

    #[tokio::test]
    async fn test_renderer_starts_without_browser() {
        let renderer = HeadlessRenderer::new(RendererConfig::default());
        assert!(!renderer.is_running().await);
        renderer.close().await;
    }
}
