//! # 密码重置处理器

use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    response::Response,
};
use serde::Deserialize;

use super::parse_json;
use crate::error::Result;
use crate::management::response;
use crate::management::server::AppState;

#[derive(Deserialize)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    pub token: String,
    pub new_password: String,
}

/// 申请重置邮件
pub async fn forgot(
    State(state): State<AppState>,
    payload: std::result::Result<Json<ForgotPasswordRequest>, JsonRejection>,
) -> Result<Response> {
    let request = parse_json(payload)?;
    state.password_reset.forgot(&request.email).await?;
    Ok(response::success_without_data("重置邮件已发送"))
}

/// 检查重置链接
pub async fn validate_token(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Response> {
    state.password_reset.validate(&token).await?;
    Ok(response::success(serde_json::json!({ "valid": true })))
}

/// 设置新密码
pub async fn reset(
    State(state): State<AppState>,
    payload: std::result::Result<Json<ResetPasswordRequest>, JsonRejection>,
) -> Result<Response> {
    let request = parse_json(payload)?;
    state
        .password_reset
        .reset(&request.token, &request.new_password)
        .await?;
    Ok(response::success_without_data("密码已重置"))
}
