use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};

/// 统一响应封套
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pagination: Option<Pagination>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// 分页信息
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Pagination {
    pub total: i64,
    pub page: i64,
    pub limit: i64,
    #[serde(rename = "totalPages")]
    pub total_pages: i64,
}

impl Pagination {
    pub fn new(total: i64, page: i64, limit: i64) -> Self {
        let total_pages = if limit > 0 {
            (total + limit - 1) / limit
        } else {
            0
        };
        Self {
            total,
            page,
            limit,
            total_pages,
        }
    }
}

impl<T> ApiResponse<T>
where
    T: Serialize,
{
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            pagination: None,
            error: None,
            message: None,
        }
    }

    pub fn success_paginated(data: T, pagination: Pagination) -> Self {
        Self {
            success: true,
            data: Some(data),
            pagination: Some(pagination),
            error: None,
            message: None,
        }
    }
}

impl ApiResponse<()> {
    pub fn error(code: &str, message: String) -> Self {
        Self {
            success: false,
            data: None,
            pagination: None,
            error: Some(code.to_string()),
            message: Some(message),
        }
    }
}

impl<T> IntoResponse for ApiResponse<T>
where
    T: Serialize,
{
    fn into_response(self) -> axum::response::Response {
        Json(self).into_response()
    }
}

/// 201 Created 包装
pub struct Created<T>(pub ApiResponse<T>);

impl<T> IntoResponse for Created<T>
where
    T: Serialize,
{
    fn into_response(self) -> axum::response::Response {
        (StatusCode::CREATED, Json(self.0)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pagination_rounds_up() {
        assert_eq!(Pagination::new(0, 1, 20).total_pages, 0);
        assert_eq!(Pagination::new(20, 1, 20).total_pages, 1);
        assert_eq!(Pagination::new(21, 1, 20).total_pages, 2);
        assert_eq!(Pagination::new(101, 2, 50).total_pages, 3);
    }

    #[test]
    fn test_success_envelope_omits_error_fields() {
        let json = serde_json::to_string(&ApiResponse::success(vec![1, 2])).unwrap();
        assert!(json.contains("\"success\":true"));
        assert!(!json.contains("error"));
        assert!(!json.contains("pagination"));
    }

    #[test]
    fn test_error_envelope_carries_code_and_message() {
        let json =
            serde_json::to_string(&ApiResponse::error("validation_error", "bad url".into()))
                .unwrap();
        assert!(json.contains("\"success\":false"));
        assert!(json.contains("validation_error"));
        assert!(json.contains("bad url"));
    }

    #[test]
    fn test_total_pages_uses_camel_case() {
        let json = serde_json::to_string(&Pagination::new(5, 1, 2)).unwrap();
        assert!(json.contains("totalPages"));
    }
}
