//! # Model Hub Library
//!
//! 模型服务商管理后端核心库：凭据加密存储、数据驱动的请求/响应字段映射与连通性测试

pub mod app;
pub mod auth;
pub mod config;
pub mod crypto;
pub mod database;
pub mod error;
pub mod logging;
pub mod management;
pub mod providers;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

// Re-export commonly used types
pub use config::AppConfig;
pub use error::{HubError, Result};
