//! # API 响应结构
//!
//! 统一的 JSON 响应外壳。错误统一从 [`HubError`] 转换，内部错误只返回通用消息，
//! 开发环境由 [`expose_internal_errors`] 把详细信息写回响应体。

use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::{ErrorCategory, FieldError, HubError};
use crate::logging::{LogComponent, LogStage};
use crate::management::server::AppState;
use crate::{ldebug, lerror};

const GENERIC_INTERNAL_MESSAGE: &str = "服务器内部错误";

/// 内部错误的详细信息，通过响应扩展传给 [`expose_internal_errors`]
#[derive(Debug, Clone)]
struct InternalErrorDetail {
    code: &'static str,
    message: String,
}

/// # 标准成功响应
#[derive(Debug, Serialize)]
pub struct SuccessResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// # 标准错误信息
#[derive(Debug, Serialize)]
pub struct ErrorInfo {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<FieldError>>,
}

/// # 标准错误响应
///
/// `data` 只在失败结果本身带诊断信息时出现（例如连接测试）
#[derive(Debug, Serialize)]
pub struct ErrorResponse<T: Serialize = ()> {
    pub success: bool,
    pub error: ErrorInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    pub timestamp: DateTime<Utc>,
}

/// # API响应枚举
#[derive(Debug)]
pub enum ApiResponse<T: Serialize> {
    Success(T),
    Created(T),
    SuccessWithMessage(T, String),
    SuccessWithoutData(String),
    /// 失败但仍携带数据的响应
    Failure {
        status: StatusCode,
        code: String,
        message: String,
        data: T,
    },
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        let success = |status: StatusCode, data: Option<T>, message: Option<String>| {
            (
                status,
                Json(SuccessResponse {
                    success: true,
                    data,
                    message,
                    timestamp: Utc::now(),
                }),
            )
                .into_response()
        };

        match self {
            Self::Success(data) => success(StatusCode::OK, Some(data), None),
            Self::Created(data) => success(StatusCode::CREATED, Some(data), None),
            Self::SuccessWithMessage(data, message) => {
                success(StatusCode::OK, Some(data), Some(message))
            }
            Self::SuccessWithoutData(message) => success(StatusCode::OK, None, Some(message)),
            Self::Failure {
                status,
                code,
                message,
                data,
            } => (
                status,
                Json(ErrorResponse {
                    success: false,
                    error: ErrorInfo {
                        code,
                        message,
                        details: None,
                    },
                    data: Some(data),
                    timestamp: Utc::now(),
                }),
            )
                .into_response(),
        }
    }
}

impl IntoResponse for HubError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        match self.category() {
            ErrorCategory::Server => lerror!(
                "system",
                LogStage::Error,
                LogComponent::ServerSetup,
                "request_failed",
                "请求处理失败",
                code = code,
                error = ?self
            ),
            ErrorCategory::Client => ldebug!(
                "system",
                LogStage::Error,
                LogComponent::ServerSetup,
                "request_rejected",
                "请求被拒绝",
                code = code,
                error = %self
            ),
        }

        let internal = self.is_internal();
        let message = if internal {
            GENERIC_INTERNAL_MESSAGE.to_string()
        } else {
            self.to_string()
        };

        let error_response = ErrorResponse::<()> {
            success: false,
            error: ErrorInfo {
                code: code.to_string(),
                message,
                details: self.details().map(<[FieldError]>::to_vec),
            },
            data: None,
            timestamp: Utc::now(),
        };
        let mut response = (status, Json(error_response)).into_response();
        if internal {
            response.extensions_mut().insert(InternalErrorDetail {
                code,
                message: self.to_string(),
            });
        }
        response
    }
}

/// 开发环境下用详细信息替换内部错误的通用消息
pub async fn expose_internal_errors(State(state): State<AppState>, response: Response) -> Response {
    if !state.expose_internal_errors() {
        return response;
    }
    let Some(detail) = response.extensions().get::<InternalErrorDetail>().cloned() else {
        return response;
    };

    let error_response = ErrorResponse::<()> {
        success: false,
        error: ErrorInfo {
            code: detail.code.to_string(),
            message: detail.message,
            details: None,
        },
        data: None,
        timestamp: Utc::now(),
    };
    (response.status(), Json(error_response)).into_response()
}

/// # 便捷函数：成功响应
pub fn success<T: Serialize>(data: T) -> Response {
    ApiResponse::Success(data).into_response()
}

/// # 便捷函数：创建成功
pub fn created<T: Serialize>(data: T) -> Response {
    ApiResponse::Created(data).into_response()
}

/// # 便捷函数：无数据体的成功响应
pub fn success_without_data(message: &str) -> Response {
    ApiResponse::<()>::SuccessWithoutData(message.to_string()).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::AppContext;
    use crate::config::Environment;
    use crate::testing::helpers::{create_test_db, test_app_config, test_vault};
    use crate::testing::mocks::RecordingMailer;
    use axum::Router;
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use axum::middleware::map_response_with_state;
    use axum::routing::get;
    use serde_json::Value;
    use std::sync::Arc;
    use tower::ServiceExt;

    async fn body_json(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_validation_error_envelope() {
        let response = HubError::validation_with_details(
            "缺少必填字段",
            vec![FieldError::new("name", "必填字段")],
        )
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = body_json(response).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
        assert_eq!(body["error"]["details"][0]["field"], "name");
        assert!(body["timestamp"].is_string());
    }

    #[tokio::test]
    async fn test_decryption_error_is_generic() {
        let response = HubError::Decryption.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert_eq!(body["error"]["code"], "DECRYPTION_ERROR");
        assert!(body["error"].get("details").is_none());
    }

    async fn failing_router(environment: Environment) -> Router {
        let mut config = test_app_config();
        config.environment = environment;
        let context = AppContext::with_vault(
            Arc::new(config),
            Arc::new(create_test_db().await),
            Arc::new(RecordingMailer::default()),
            Arc::new(test_vault()),
        )
        .unwrap();
        let state = AppState::new(Arc::new(context));

        Router::new()
            .route(
                "/boom",
                get(|| async { Err::<(), _>(HubError::internal("vault offline")) }),
            )
            .route(
                "/missing",
                get(|| async { Err::<(), _>(HubError::not_found("provider", "x")) }),
            )
            .layer(map_response_with_state(state, expose_internal_errors))
    }

    async fn call(router: Router, uri: &str) -> (StatusCode, Value) {
        let response = router
            .oneshot(Request::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        (response.status(), body_json(response).await)
    }

    #[tokio::test]
    async fn test_internal_detail_depends_on_router_environment() {
        // 两个环境的路由器同时存在，互不影响
        let production = failing_router(Environment::Production).await;
        let development = failing_router(Environment::Development).await;

        let (status, body) = call(production.clone(), "/boom").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"]["message"], GENERIC_INTERNAL_MESSAGE);
        assert_eq!(body["error"]["code"], "INTERNAL_ERROR");

        let (status, body) = call(development.clone(), "/boom").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body["error"]["message"].as_str().unwrap().contains("vault offline"));
        assert_eq!(body["error"]["code"], "INTERNAL_ERROR");

        let (_, body) = call(production, "/boom").await;
        assert_eq!(body["error"]["message"], GENERIC_INTERNAL_MESSAGE);

        // 非内部错误不受环境影响
        let (status, body) = call(development, "/missing").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], "RESOURCE_NOT_FOUND");
    }

    #[tokio::test]
    async fn test_success_envelope() {
        let body = body_json(created(serde_json::json!({"id": "x"}))).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["id"], "x");
    }
}
