use axum::{extract::State, Extension, Json};
use chrono::{DateTime, Utc};
use gleaner_domain::User;
use serde::{Deserialize, Serialize};

use crate::auth::AuthPrincipal;
use crate::error::{ApiError, ApiResult};
use crate::response::ApiResponse;
use crate::routes::AppState;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// 认证响应里的用户视图
#[derive(Debug, Serialize)]
pub struct UserView {
    pub id: i64,
    pub username: String,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserView {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            created_at: user.created_at,
        }
    }
}

/// POST /api/auth/login: 用数据库里的 bcrypt 哈希校验请求体凭据
pub async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> ApiResult<ApiResponse<UserView>> {
    let user = state
        .users
        .find_by_username(&body.username)
        .await?
        .ok_or(ApiError::Authentication)?;

    let verified = bcrypt::verify(&body.password, &user.password_hash).unwrap_or(false);
    if !verified {
        tracing::warn!("login failed for user '{}'", body.username);
        return Err(ApiError::Authentication);
    }

    Ok(ApiResponse::success(user.into()))
}

/// GET /api/auth/me: 返回 Basic 主体对应的用户记录
pub async fn me(
    State(state): State<AppState>,
    Extension(principal): Extension<AuthPrincipal>,
) -> ApiResult<ApiResponse<UserView>> {
    let user = state
        .users
        .find_by_username(&principal.username)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("user {}", principal.username)))?;

    Ok(ApiResponse::success(user.into()))
}
