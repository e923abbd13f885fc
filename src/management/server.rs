//! # 管理服务器
//!
//! Axum HTTP服务器，对外提供 `/api` 下的管理接口

use crate::app::AppContext;
use crate::config::ServerConfig;
use crate::error::{HubError, Result};
use crate::logging::{LogComponent, LogStage};
use crate::{linfo, lwarn};
use axum::Router;
use axum::http::{HeaderValue, Method, header};
use axum::middleware::map_response_with_state;
use axum::routing::get;
use std::net::SocketAddr;
use std::ops::Deref;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

/// 管理服务器应用状态
#[derive(Clone)]
pub struct AppState {
    context: Arc<AppContext>,
    /// 开发环境返回内部错误的详细信息
    expose_internal_errors: bool,
}

impl AppState {
    #[must_use]
    pub fn new(context: Arc<AppContext>) -> Self {
        let expose_internal_errors = context.config.environment.is_development();
        Self {
            context,
            expose_internal_errors,
        }
    }

    #[must_use]
    pub const fn expose_internal_errors(&self) -> bool {
        self.expose_internal_errors
    }

    #[must_use]
    pub const fn context_arc(&self) -> &Arc<AppContext> {
        &self.context
    }
}

impl Deref for AppState {
    type Target = AppContext;

    fn deref(&self) -> &Self::Target {
        &self.context
    }
}

/// 管理服务器
pub struct ManagementServer {
    config: ServerConfig,
    router: Router,
}

impl ManagementServer {
    /// 创建新的管理服务器
    pub fn new(context: Arc<AppContext>) -> Self {
        let config = context.config.server.clone();
        let router = build_router(AppState::new(context), &config);
        Self { config, router }
    }

    /// 完整的路由器，测试中直接驱动
    #[must_use]
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// 启动服务器，收到 Ctrl-C 后优雅退出
    pub async fn serve(self) -> Result<()> {
        let bind_address = format!("{}:{}", self.config.host, self.config.port);
        let addr: SocketAddr = bind_address.parse().map_err(|e| {
            HubError::config(format!("无效的监听地址 '{bind_address}': {e}"))
        })?;

        linfo!(
            "system",
            LogStage::Startup,
            LogComponent::ServerSetup,
            "server_start",
            &format!("Starting management server on {addr}")
        );

        let listener = TcpListener::bind(&addr).await?;
        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        linfo!(
            "system",
            LogStage::Shutdown,
            LogComponent::ServerSetup,
            "server_stopped",
            "管理服务器已停止"
        );
        Ok(())
    }
}

/// 创建路由器
pub fn build_router(state: AppState, config: &ServerConfig) -> Router {
    let api_routes = super::routes::create_routes(state.clone());

    Router::new()
        .nest(&config.api_prefix, api_routes)
        .route(
            "/ping",
            get(crate::management::handlers::system::ping_handler),
        )
        .route("/", get(crate::management::handlers::system::root_handler))
        .layer(map_response_with_state(
            state,
            super::response::expose_internal_errors,
        ))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors_layer(&config.cors_origins))
                .layer(TimeoutLayer::new(Duration::from_secs(
                    config.request_timeout.max(1),
                ))),
        )
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let cors_layer = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::PATCH,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            header::ACCEPT,
            header::ORIGIN,
        ]);

    if origins.iter().any(|origin| origin == "*") {
        return cors_layer.allow_origin(Any);
    }

    let parsed = origins
        .iter()
        .map(|origin| origin.parse::<HeaderValue>())
        .collect::<std::result::Result<Vec<_>, _>>();
    match parsed {
        Ok(origins) => cors_layer.allow_origin(origins),
        Err(e) => {
            lwarn!(
                "system",
                LogStage::Startup,
                LogComponent::ServerSetup,
                "cors_config_fail",
                &format!("Invalid CORS origin configuration: {e}, falling back to allow any")
            );
            cors_layer.allow_origin(Any)
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        lwarn!(
            "system",
            LogStage::Shutdown,
            LogComponent::ServerSetup,
            "signal_listen_fail",
            &format!("Failed to listen for shutdown signal: {e}")
        );
    }
}
