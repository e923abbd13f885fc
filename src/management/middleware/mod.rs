//! # 管理服务器中间件

pub mod auth;

pub use auth::{AdminContext, CurrentUser, extract_bearer_token, require_auth};
