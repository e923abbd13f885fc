//! # 日志配置模块
//!
//! 日志系统初始化，以及带阶段/组件标记的结构化日志宏。
//!
//! ```ignore
//! linfo!(request_id, LogStage::Db, LogComponent::Registry, "create", "服务商创建成功", provider_id = %id);
//! ```

use std::env;
use std::fmt;
use tracing_subscriber::{EnvFilter, fmt as tracing_fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// 请求处理所处的阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogStage {
    Startup,
    Shutdown,
    Authentication,
    RequestStart,
    UpstreamRequest,
    Response,
    Error,
    Db,
    Internal,
}

impl LogStage {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Startup => "startup",
            Self::Shutdown => "shutdown",
            Self::Authentication => "authentication",
            Self::RequestStart => "request_start",
            Self::UpstreamRequest => "upstream_request",
            Self::Response => "response",
            Self::Error => "error",
            Self::Db => "db",
            Self::Internal => "internal",
        }
    }
}

impl fmt::Display for LogStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 产生日志的组件
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogComponent {
    Main,
    Config,
    Database,
    ServerSetup,
    Auth,
    Registry,
    Vault,
    Mapper,
    Dispatcher,
    Tester,
    Chat,
    PasswordReset,
    Mailer,
}

impl LogComponent {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Main => "main",
            Self::Config => "config",
            Self::Database => "database",
            Self::ServerSetup => "server_setup",
            Self::Auth => "auth",
            Self::Registry => "registry",
            Self::Vault => "vault",
            Self::Mapper => "mapper",
            Self::Dispatcher => "dispatcher",
            Self::Tester => "tester",
            Self::Chat => "chat",
            Self::PasswordReset => "password_reset",
            Self::Mailer => "mailer",
        }
    }
}

impl fmt::Display for LogComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 结构化日志的公共实现，其余宏都委托到这里
#[macro_export]
#[doc(hidden)]
macro_rules! __hub_log {
    ($level:expr, $request_id:expr, $stage:expr, $component:expr, $operation:expr, $message:expr $(, $($field:tt)+)?) => {
        ::tracing::event!(
            $level,
            request_id = %$request_id,
            stage = %$stage,
            component = %$component,
            operation = $operation,
            $($($field)+ ,)?
            "{}",
            $message
        )
    };
}

#[macro_export]
macro_rules! linfo {
    ($($args:tt)+) => {
        $crate::__hub_log!(::tracing::Level::INFO, $($args)+)
    };
}

#[macro_export]
macro_rules! lwarn {
    ($($args:tt)+) => {
        $crate::__hub_log!(::tracing::Level::WARN, $($args)+)
    };
}

#[macro_export]
macro_rules! lerror {
    ($($args:tt)+) => {
        $crate::__hub_log!(::tracing::Level::ERROR, $($args)+)
    };
}

#[macro_export]
macro_rules! ldebug {
    ($($args:tt)+) => {
        $crate::__hub_log!(::tracing::Level::DEBUG, $($args)+)
    };
}

/// 默认过滤规则：应用自身 debug，屏蔽逐条 SQL 日志
pub fn default_filter(level: &str) -> String {
    format!("{level},model_hub=debug,sqlx::query=off,sea_orm::query=warn")
}

/// 初始化优化的日志系统
pub fn init_optimized_logging(log_level: Option<&String>) {
    let level = log_level.map_or("info", String::as_str);
    let log_filter = env::var("RUST_LOG").unwrap_or_else(|_| default_filter(level));

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| log_filter.into()))
        .with(
            tracing_fmt::layer()
                .with_target(true)
                .with_level(true)
                .with_thread_ids(false)
                .with_thread_names(false)
                .with_file(false)
                .with_line_number(false)
                .compact(),
        )
        .init();
}
