//! # 认证中间件
//!
//! 从请求头中提取JWT，验证并将其解析的用户信息注入到请求扩展中。
//! 管理员权限通过 [`AdminContext`] 提取器在处理器上声明。

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header::AUTHORIZATION, request::Parts},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::auth::AuthContext;
use crate::error::HubError;
use crate::logging::{LogComponent, LogStage};
use crate::lwarn;
use crate::management::server::AppState;

/// 提取 `Authorization: Bearer <token>` 中的令牌
pub fn extract_bearer_token(header: &str) -> Option<&str> {
    let (scheme, token) = header.trim().split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

/// Axum认证中间件
pub async fn require_auth(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    let token = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|header| header.to_str().ok())
        .and_then(extract_bearer_token);

    let Some(token) = token else {
        return HubError::auth("缺少认证令牌").into_response();
    };

    match state.auth.authenticate(token) {
        Ok(context) => {
            request.extensions_mut().insert(context);
            next.run(request).await
        }
        Err(err) => {
            lwarn!(
                "system",
                LogStage::Authentication,
                LogComponent::Auth,
                "token_rejected",
                "认证令牌校验失败",
                path = %request.uri().path(),
                error = %err
            );
            err.into_response()
        }
    }
}

/// 已认证的调用者
#[derive(Debug, Clone)]
pub struct CurrentUser(pub AuthContext);

/// 已认证且为管理员的调用者
#[derive(Debug, Clone)]
pub struct AdminContext(pub AuthContext);

fn auth_context(parts: &Parts) -> Result<AuthContext, HubError> {
    parts
        .extensions
        .get::<AuthContext>()
        .cloned()
        .ok_or_else(|| HubError::auth("缺少认证令牌"))
}

impl<S: Send + Sync> FromRequestParts<S> for CurrentUser {
    type Rejection = HubError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        auth_context(parts).map(Self)
    }
}

impl<S: Send + Sync> FromRequestParts<S> for AdminContext {
    type Rejection = HubError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let context = auth_context(parts)?;
        if context.is_admin() {
            Ok(Self(context))
        } else {
            Err(HubError::forbidden("需要管理员权限"))
        }
    }
}
