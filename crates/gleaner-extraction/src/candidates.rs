//! 候选媒体的解析、过滤与去重
//!
//! 静态解析与浏览器渲染两条路径共用同一套规则:
//! 相对地址按 RFC 3986 解析到页面 URL，剔除非 http(s) 协议、
//! 已知追踪域名与像素追踪路径，再按 media_url 稳定去重。

use gleaner_domain::{MediaCandidate, MediaType};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use url::Url;

/// 页面中收集到的原始候选，URL 尚未解析与过滤
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RawCandidate {
    pub url: String,
    pub kind: MediaType,
    pub title: Option<String>,
}

/// 追踪域名黑名单
const BLOCKED_HOSTS: &[&str] = &["google-analytics.com", "doubleclick.net"];

/// 像素追踪路径特征
const BLOCKED_PATH_FRAGMENTS: &[&str] = &["1x1", "pixel"];

/// srcset 属性拆分: 逗号分项，每项取第一个空白分隔 token
pub fn parse_srcset(srcset: &str) -> Vec<String> {
    srcset
        .split(',')
        .filter_map(|entry| entry.split_whitespace().next())
        .filter(|url| !url.is_empty())
        .map(str::to_string)
        .collect()
}

/// 把原始候选解析为绝对 URL; 无法解析或协议不允许时丢弃
fn resolve(raw_url: &str, base: &Url) -> Option<Url> {
    let trimmed = raw_url.trim();
    if trimmed.is_empty() {
        return None;
    }
    let resolved = base.join(trimmed).ok()?;
    match resolved.scheme() {
        "http" | "https" => Some(resolved),
        _ => None,
    }
}

fn is_blocked(url: &Url) -> bool {
    let host = url.host_str().unwrap_or("").to_ascii_lowercase();
    let path = url.path().to_ascii_lowercase();

    if BLOCKED_HOSTS.iter().any(|blocked| host.contains(blocked)) {
        return true;
    }
    // facebook 追踪像素挂在主域名的 /tr 路径下
    if host.contains("facebook.com") && path.starts_with("/tr") {
        return true;
    }
    BLOCKED_PATH_FRAGMENTS
        .iter()
        .any(|fragment| path.contains(fragment))
}

/// 解析 + 过滤 + 首次出现优先的稳定去重
pub fn finalize(raw: Vec<RawCandidate>, base: &Url) -> Vec<MediaCandidate> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();

    for candidate in raw {
        let Some(resolved) = resolve(&candidate.url, base) else {
            continue;
        };
        if is_blocked(&resolved) {
            continue;
        }
        let media_url = resolved.to_string();
        if !seen.insert(media_url.clone()) {
            continue;
        }
        out.push(MediaCandidate {
            url: media_url,
            media_type: candidate.kind,
            title: candidate
                .title
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty()),
        });
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://x.com/p").unwrap()
    }

    fn raw(url: &str) -> RawCandidate {
        RawCandidate {
            url: url.to_string(),
            kind: MediaType::Image,
            title: None,
        }
    }

    #[test]
    fn test_relative_resolution() {
        let out = finalize(vec![raw("/a.jpg")], &base());
        assert_eq!(out[0].url, "https://x.com/a.jpg");
    }

    #[test]
    fn test_protocol_relative_keeps_scheme() {
        let out = finalize(vec![raw("//y.com/a.jpg")], &base());
        assert_eq!(out[0].url, "https://y.com/a.jpg");
    }

    #[test]
    fn test_absolute_unchanged() {
        let out = finalize(vec![raw("https://z.example/a.jpg")], &base());
        assert_eq!(out[0].url, "https://z.example/a.jpg");
    }

    #[test]
    fn test_data_and_javascript_schemes_rejected() {
        let out = finalize(
            vec![raw("data:image/png;base64,AAAA"), raw("javascript:void(0)")],
            &base(),
        );
        assert!(out.is_empty());
    }

    #[test]
    fn test_tracking_hosts_rejected() {
        let out = finalize(
            vec![
                raw("https://www.google-analytics.com/collect.gif"),
                raw("https://stats.doubleclick.net/ad.jpg"),
                raw("https://www.facebook.com/tr?id=1"),
            ],
            &base(),
        );
        assert!(out.is_empty());
    }

    #[test]
    fn test_facebook_non_tracking_path_allowed() {
        let out = finalize(vec![raw("https://www.facebook.com/images/logo.jpg")], &base());
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn test_pixel_paths_rejected() {
        let out = finalize(
            vec![
                raw("https://cdn.example.com/1x1.gif"),
                raw("https://cdn.example.com/img/pixel.png"),
            ],
            &base(),
        );
        assert!(out.is_empty());
    }

    #[test]
    fn test_stable_dedup_keeps_first() {
        let mut first = raw("/a.jpg");
        first.title = Some("first".into());
        let mut second = raw("/a.jpg");
        second.title = Some("second".into());

        let out = finalize(vec![first, second, raw("/b.jpg")], &base());
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].url, "https://x.com/a.jpg");
        assert_eq!(out[0].title.as_deref(), Some("first"));
        assert_eq!(out[1].url, "https://x.com/b.jpg");
    }

    #[test]
    fn test_srcset_parsing() {
        let urls = parse_srcset("/a-320.jpg 320w, /a-640.jpg 640w,/a-2x.jpg 2x");
        assert_eq!(urls, vec!["/a-320.jpg", "/a-640.jpg", "/a-2x.jpg"]);
    }

    #[test]
    fn test_srcset_empty_entries_skipped() {
        let urls = parse_srcset(" , /a.jpg 1x, ");
        assert_eq!(urls, vec!["/a.jpg"]);
    }

    #[test]
    fn test_blank_titles_dropped() {
        let mut candidate = raw("/a.jpg");
        candidate.title = Some("   ".into());
        let out = finalize(vec![candidate], &base());
        assert_eq!(out[0].title, None);
    }
}
