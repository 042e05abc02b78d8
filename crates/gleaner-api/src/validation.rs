use gleaner_domain::MediaType;
use url::Url;

use crate::error::ApiError;

const DEFAULT_LIMIT: i64 = 20;
const MAX_LIMIT: i64 = 100;

/// 校验提交的 URL 列表: 数量 1..=max，逐个必须是合法 http(s) 地址
pub fn validate_urls(urls: &[String], max: usize) -> Result<(), ApiError> {
    if urls.is_empty() {
        return Err(ApiError::Validation("urls must not be empty".into()));
    }
    if urls.len() > max {
        return Err(ApiError::Validation(format!(
            "too many urls: {} (max {})",
            urls.len(),
            max
        )));
    }
    for url in urls {
        let parsed = Url::parse(url)
            .map_err(|_| ApiError::Validation(format!("invalid url: {url}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ApiError::Validation(format!(
                "unsupported scheme in url: {url}"
            )));
        }
    }
    Ok(())
}

/// 解析分页参数: page >= 1，1 <= limit <= 100
pub fn parse_page_limit(
    page: Option<&str>,
    limit: Option<&str>,
) -> Result<(i64, i64), ApiError> {
    let page = match page {
        Some(raw) => raw
            .parse::<i64>()
            .ok()
            .filter(|p| *p >= 1)
            .ok_or_else(|| ApiError::Validation(format!("invalid page: {raw}")))?,
        None => 1,
    };
    let limit = match limit {
        Some(raw) => raw
            .parse::<i64>()
            .ok()
            .filter(|l| (1..=MAX_LIMIT).contains(l))
            .ok_or_else(|| ApiError::Validation(format!("invalid limit: {raw}")))?,
        None => DEFAULT_LIMIT,
    };
    Ok((page, limit))
}

/// 解析媒体类型过滤参数
pub fn parse_media_type(raw: Option<&str>) -> Result<Option<MediaType>, ApiError> {
    match raw {
        None | Some("") => Ok(None),
        Some(raw) => MediaType::parse(raw)
            .map(Some)
            .ok_or_else(|| ApiError::Validation(format!("invalid media type: {raw}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_urls_must_be_nonempty() {
        assert!(validate_urls(&[], 100).is_err());
    }

    #[test]
    fn test_urls_count_capped() {
        let urls: Vec<String> = (0..101).map(|i| format!("https://a.com/{i}")).collect();
        assert!(validate_urls(&urls, 100).is_err());
        assert!(validate_urls(&urls[..100], 100).is_ok());
    }

    #[test]
    fn test_malformed_url_rejected() {
        assert!(validate_urls(&["not a url".into()], 100).is_err());
        assert!(validate_urls(&["ftp://a.com/f".into()], 100).is_err());
        assert!(validate_urls(&["https://a.com".into()], 100).is_ok());
    }

    #[test]
    fn test_page_limit_defaults() {
        assert_eq!(parse_page_limit(None, None).unwrap(), (1, 20));
    }

    #[test]
    fn test_page_limit_bounds() {
        assert!(parse_page_limit(Some("0"), None).is_err());
        assert!(parse_page_limit(Some("-3"), None).is_err());
        assert!(parse_page_limit(Some("abc"), None).is_err());
        assert!(parse_page_limit(None, Some("0")).is_err());
        assert!(parse_page_limit(None, Some("101")).is_err());
        assert_eq!(parse_page_limit(Some("2"), Some("100")).unwrap(), (2, 100));
    }

    #[test]
    fn test_media_type_parsing() {
        assert_eq!(parse_media_type(None).unwrap(), None);
        assert_eq!(
            parse_media_type(Some("image")).unwrap(),
            Some(MediaType::Image)
        );
        assert!(parse_media_type(Some("audio")).is_err());
    }
}
