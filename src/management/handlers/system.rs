//! # 系统信息处理器

use crate::error::{HubError, Result};
use crate::management::response;
use crate::management::server::AppState;
use axum::extract::State;
use axum::response::Response;
use serde::Serialize;
use std::sync::OnceLock;
use std::time::Instant;

/// 全局启动时间
static START_TIME: OnceLock<Instant> = OnceLock::new();

/// 初始化启动时间
pub fn init_start_time() {
    START_TIME.set(Instant::now()).ok();
}

#[derive(Serialize)]
struct SystemInfo {
    name: &'static str,
    version: &'static str,
    environment: &'static str,
    uptime_seconds: u64,
    uptime: String,
    database_url: String,
    provider_count: usize,
}

/// 获取系统信息
pub async fn get_system_info(State(state): State<AppState>) -> Result<Response> {
    let uptime_seconds = get_uptime_seconds();
    let system_info = SystemInfo {
        name: "Model Hub",
        version: env!("CARGO_PKG_VERSION"),
        environment: if state.config.environment.is_development() {
            "development"
        } else {
            "production"
        },
        uptime_seconds,
        uptime: format_uptime(uptime_seconds),
        database_url: mask_sensitive_info(&state.config.database.url),
        provider_count: state.registry.list().await?.len(),
    };

    Ok(response::success(system_info))
}

/// 数据库连通性检查
pub async fn health_check(State(state): State<AppState>) -> Result<Response> {
    state
        .db
        .ping()
        .await
        .map_err(|e| HubError::database_with_source("数据库不可用", e))?;
    Ok(response::success(serde_json::json!({
        "status": "healthy",
        "uptimeSeconds": get_uptime_seconds(),
    })))
}

/// 根路径信息
pub async fn root_handler() -> Response {
    response::success(serde_json::json!({
        "message": "Model Hub Management API",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Ping 处理器
pub async fn ping_handler() -> &'static str {
    "pong"
}

/// 获取程序运行时间（秒）- 自动初始化
fn get_uptime_seconds() -> u64 {
    let start_time = START_TIME.get_or_init(Instant::now);
    start_time.elapsed().as_secs()
}

/// 格式化运行时间为可读字符串
fn format_uptime(uptime_seconds: u64) -> String {
    let days = uptime_seconds / 86_400;
    let hours = (uptime_seconds % 86_400) / 3_600;
    let minutes = (uptime_seconds % 3_600) / 60;
    let seconds = uptime_seconds % 60;

    if days > 0 {
        format!("{days}天 {hours}小时 {minutes}分钟")
    } else if hours > 0 {
        format!("{hours}小时 {minutes}分钟")
    } else {
        format!("{minutes}分钟 {seconds}秒")
    }
}

/// 隐藏数据库地址中的账号密码
fn mask_sensitive_info(url: &str) -> String {
    match (url.find("://"), url.rfind('@')) {
        (Some(scheme_end), Some(at_pos)) if at_pos > scheme_end => {
            format!("{}***:***@{}", &url[..scheme_end + 3], &url[at_pos + 1..])
        }
        _ => url.to_string(),
    }
}
