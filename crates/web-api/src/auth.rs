//! 令牌认证
//!
//! HTTP 请求从 `X-TOKEN` 头读取令牌，WebSocket 升级请求从 `token` 查询参数读取。
//! 任何令牌失败（包括无法解析的令牌）在这里都表现为 401。

use axum::{extract::FromRequestParts, http::request::Parts};
use domain::User;

use crate::error::ApiError;
use crate::state::AppState;

pub const TOKEN_HEADER: &str = "X-TOKEN";

/// 已通过令牌校验的当前用户
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(TOKEN_HEADER)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| ApiError::unauthorized("missing token"))?;

        authenticate(state, token).await.map(CurrentUser)
    }
}

pub async fn authenticate(state: &AppState, token: &str) -> Result<User, ApiError> {
    if token.is_empty() {
        return Err(ApiError::unauthorized("missing token"));
    }

    state
        .account_service
        .validate_token(token)
        .await
        .map_err(|err| {
            tracing::info!(error = %err, kind = ?err.kind(), "token rejected");
            ApiError::unauthorized("invalid token")
        })
}
