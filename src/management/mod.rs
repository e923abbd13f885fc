//! # 管理API模块
//!
//! 提供RESTful API接口用于账户与模型服务商管理

pub mod handlers;
pub mod middleware;
pub mod response;
pub mod routes;
pub mod server;

pub use routes::create_routes;
pub use server::{AppState, ManagementServer, build_router};
