//! # 路由配置
//!
//! 定义所有API路由和路由组织

use crate::management::handlers::{auth, model_providers, password, system};
use crate::management::middleware::require_auth;
use crate::management::server::AppState;
use axum::Router;
use axum::middleware::from_fn_with_state;
use axum::routing::{get, patch, post};

/// 创建所有路由
pub fn create_routes(state: AppState) -> Router {
    Router::new()
        // 账户认证路由
        .nest("/auth", auth_routes(state.clone()))
        // 密码重置路由
        .nest("/password", password_routes())
        // 模型服务商管理路由
        .nest("/model-providers", model_provider_routes(state.clone()))
        // 系统信息路由
        .nest("/system", system_routes())
        .with_state(state)
}

fn auth_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/me", get(auth::me))
        .route_layer(from_fn_with_state(state, require_auth))
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
}

fn password_routes() -> Router<AppState> {
    Router::new()
        .route("/forgot", post(password::forgot))
        .route("/reset", post(password::reset))
        .route("/reset/{token}", get(password::validate_token))
}

/// 全部需要登录，管理员权限由处理器的提取器检查
fn model_provider_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(model_providers::list_providers).post(model_providers::create_provider),
        )
        .route("/presets", get(model_providers::list_presets))
        .route(
            "/{id}",
            get(model_providers::get_provider)
                .put(model_providers::update_provider)
                .delete(model_providers::delete_provider),
        )
        .route("/{id}/status", patch(model_providers::update_status))
        .route(
            "/{id}/models",
            get(model_providers::list_models).put(model_providers::replace_models),
        )
        .route(
            "/{id}/models/{model_code}",
            patch(model_providers::update_model_status),
        )
        .route("/{id}/test", post(model_providers::test_provider))
        .route("/{id}/chat", post(model_providers::chat))
        .route_layer(from_fn_with_state(state, require_auth))
}

fn system_routes() -> Router<AppState> {
    Router::new()
        .route("/info", get(system::get_system_info))
        .route("/health", get(system::health_check))
}

#[cfg(test)]
mod tests {
    use crate::management::{AppState, build_router};
    use crate::testing::helpers::create_test_context;
    use crate::testing::mocks::RecordingMailer;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use std::sync::Arc;
    use tower::ServiceExt;

    async fn router() -> axum::Router {
        let context = create_test_context(Arc::new(RecordingMailer::default())).await;
        let config = context.config.server.clone();
        build_router(AppState::new(Arc::new(context)), &config)
    }

    async fn status_of(uri: &str) -> StatusCode {
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        router().await.oneshot(request).await.unwrap().status()
    }

    #[tokio::test]
    async fn test_provider_routes_require_login() {
        assert_eq!(status_of("/api/model-providers").await, StatusCode::UNAUTHORIZED);
        assert_eq!(
            status_of("/api/model-providers/presets").await,
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(status_of("/api/auth/me").await, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_public_routes() {
        assert_eq!(status_of("/api/system/health").await, StatusCode::OK);
        assert_eq!(status_of("/ping").await, StatusCode::OK);
        assert_eq!(
            status_of("/api/password/reset/not-a-token").await,
            StatusCode::BAD_REQUEST
        );
        assert_eq!(status_of("/api/unknown").await, StatusCode::NOT_FOUND);
    }
}
