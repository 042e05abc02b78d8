use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::error::ApiError;
use crate::routes::AppState;

/// 通过 Basic 认证的主体，塞进请求扩展供 handler 读取
#[derive(Debug, Clone)]
pub struct AuthPrincipal {
    pub username: String,
}

/// Basic 认证中间件，/health* 之外的所有路由都挂载
///
/// 凭据与环境配置比对; 失败统一返回 401 加质询头。
pub async fn require_basic_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let header = request
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(ApiError::Authentication)?;

    let (username, password) = parse_basic(header).ok_or(ApiError::Authentication)?;

    if username != state.config.auth.username || password != state.config.auth.password {
        tracing::warn!("basic auth failed for user '{}'", username);
        return Err(ApiError::Authentication);
    }

    request
        .extensions_mut()
        .insert(AuthPrincipal { username });
    Ok(next.run(request).await)
}

fn parse_basic(header: &str) -> Option<(String, String)> {
    let encoded = header.strip_prefix("Basic ")?;
    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (username, password) = decoded.split_once(':')?;
    Some((username.to_string(), password.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(credentials: &str) -> String {
        format!("Basic {}", STANDARD.encode(credentials))
    }

    #[test]
    fn test_parse_basic_round_trip() {
        let header = encode("admin:admin123");
        assert_eq!(
            parse_basic(&header),
            Some(("admin".to_string(), "admin123".to_string()))
        );
    }

    #[test]
    fn test_parse_basic_password_may_contain_colon() {
        let header = encode("admin:pa:ss");
        assert_eq!(
            parse_basic(&header),
            Some(("admin".to_string(), "pa:ss".to_string()))
        );
    }

    #[test]
    fn test_parse_basic_rejects_other_schemes() {
        assert_eq!(parse_basic("Bearer token"), None);
        assert_eq!(parse_basic("Basic not-base64!!"), None);
    }

    #[test]
    fn test_parse_basic_rejects_missing_separator() {
        let header = encode("no-colon-here");
        assert_eq!(parse_basic(&header), None);
    }
}
