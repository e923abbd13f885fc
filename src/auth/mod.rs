//! # 认证授权模块
//!
//! 账户注册登录、JWT 令牌、角色以及密码重置。

pub mod jwt;
pub mod mailer;
pub mod password;
pub mod reset;
pub mod service;
pub mod types;

pub use jwt::JwtManager;
pub use mailer::{LogMailer, ResetMailer, ResetMessage};
pub use reset::PasswordResetService;
pub use service::AuthService;
pub use types::{AuthContext, JwtClaims, LoginRequest, LoginResponse, RegisterRequest, UserProfile, UserRole};
