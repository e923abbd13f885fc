//! # 管理API处理器

pub mod auth;
pub mod model_providers;
pub mod password;
pub mod system;

use axum::{Json, extract::rejection::JsonRejection};

use crate::error::Result;
use crate::validation_error;

/// 请求体解析失败按校验错误返回
pub(crate) fn parse_json<T>(payload: std::result::Result<Json<T>, JsonRejection>) -> Result<T> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| validation_error!("请求体无效: {}", rejection.body_text()))
}

/// 可省略的请求体：未声明 JSON 内容类型时取默认值，格式错误仍按校验错误返回
pub(crate) fn parse_optional_json<T: Default>(
    payload: std::result::Result<Json<T>, JsonRejection>,
) -> Result<T> {
    match payload {
        Err(JsonRejection::MissingJsonContentType(_)) => Ok(T::default()),
        other => parse_json(other),
    }
}
