use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use gleaner_errors::GleanError;

use crate::response::ApiResponse;

/// API 错误分类，按类别映射状态码，不把原始错误串透给客户端
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("请求参数错误: {0}")]
    Validation(String),

    #[error("认证失败")]
    Authentication,

    #[error("资源未找到: {0}")]
    NotFound(String),

    #[error("资源冲突: {0}")]
    Conflict(String),

    #[error("依赖服务不可用: {0}")]
    Unavailable(String),

    #[error("内部服务器错误: {0}")]
    Internal(String),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl From<GleanError> for ApiError {
    fn from(err: GleanError) -> Self {
        match err {
            GleanError::Validation(msg) => ApiError::Validation(msg),
            GleanError::JobNotFound { id } => ApiError::NotFound(format!("job {id}")),
            GleanError::MediaNotFound { id } => ApiError::NotFound(format!("media {id}")),
            GleanError::UserNotFound { username } => {
                ApiError::NotFound(format!("user {username}"))
            }
            GleanError::Conflict(msg) => ApiError::Conflict(msg),
            // 其余一律按内部错误处理，细节只进日志
            other => {
                tracing::error!("internal error surfaced to api: {}", other);
                ApiError::Internal(other.to_string())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            ApiError::Validation(msg) => {
                (StatusCode::BAD_REQUEST, "validation_error", msg.clone())
            }
            ApiError::Authentication => (
                StatusCode::UNAUTHORIZED,
                "authentication_error",
                "invalid credentials".to_string(),
            ),
            ApiError::NotFound(what) => {
                (StatusCode::NOT_FOUND, "not_found", format!("{what} not found"))
            }
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg.clone()),
            ApiError::Unavailable(msg) => {
                (StatusCode::SERVICE_UNAVAILABLE, "unavailable", msg.clone())
            }
            // 生产环境屏蔽内部细节
            ApiError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "internal server error".to_string(),
            ),
        };

        let body = ApiResponse::error(code, message);
        let mut response = (status, body).into_response();
        if status == StatusCode::UNAUTHORIZED {
            response.headers_mut().insert(
                header::WWW_AUTHENTICATE,
                header::HeaderValue::from_static("Basic realm=\"gleaner\""),
            );
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_glean_error_mapping() {
        assert!(matches!(
            ApiError::from(GleanError::job_not_found(9)),
            ApiError::NotFound(_)
        ));
        assert!(matches!(
            ApiError::from(GleanError::validation_error("bad page")),
            ApiError::Validation(_)
        ));
        assert!(matches!(
            ApiError::from(GleanError::Conflict("username taken".into())),
            ApiError::Conflict(_)
        ));
        assert!(matches!(
            ApiError::from(GleanError::queue_error("redis down")),
            ApiError::Internal(_)
        ));
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(
            ApiError::Validation("x".into()).into_response().status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::Authentication.into_response().status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::NotFound("job 1".into()).into_response().status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::Internal("boom".into()).into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_unauthorized_carries_challenge_header() {
        let response = ApiError::Authentication.into_response();
        assert!(response.headers().contains_key(header::WWW_AUTHENTICATE));
    }
}
