//! # 账户认证处理器

use axum::{Json, extract::State, extract::rejection::JsonRejection, response::Response};

use super::parse_json;
use crate::auth::{LoginRequest, RegisterRequest};
use crate::error::Result;
use crate::management::middleware::CurrentUser;
use crate::management::response;
use crate::management::server::AppState;

/// 注册
pub async fn register(
    State(state): State<AppState>,
    payload: std::result::Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<Response> {
    let profile = state.auth.register(parse_json(payload)?).await?;
    Ok(response::created(profile))
}

/// 登录
pub async fn login(
    State(state): State<AppState>,
    payload: std::result::Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Response> {
    let login = state.auth.login(parse_json(payload)?).await?;
    Ok(response::success(login))
}

/// 当前账户
pub async fn me(State(state): State<AppState>, CurrentUser(user): CurrentUser) -> Result<Response> {
    Ok(response::success(state.auth.me(user.user_id).await?))
}
