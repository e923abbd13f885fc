//! # 认证类型定义
//!
//! 角色、JWT 载荷、请求上下文以及账户相关的请求/响应结构

use chrono::{DateTime, Utc};
use entity::users;
use serde::{Deserialize, Serialize};

use crate::error::{HubError, Result};

/// 用户角色
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Admin,
    #[default]
    User,
}

impl UserRole {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::User => "user",
        }
    }

    /// 从字符串解析角色
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "admin" => Some(Self::Admin),
            "user" => Some(Self::User),
            _ => None,
        }
    }

    #[must_use]
    pub const fn is_admin(self) -> bool {
        matches!(self, Self::Admin)
    }
}

/// JWT 载荷
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtClaims {
    /// 用户ID
    pub sub: String,
    pub username: String,
    pub role: UserRole,
    /// 签发时间
    pub iat: i64,
    /// 过期时间
    pub exp: i64,
    /// 签发者
    pub iss: String,
    /// 受众
    pub aud: String,
    /// JWT ID
    pub jti: String,
}

impl JwtClaims {
    pub fn new(
        user_id: i32,
        username: impl Into<String>,
        role: UserRole,
        expires_in_seconds: i64,
        issuer: impl Into<String>,
        audience: impl Into<String>,
    ) -> Self {
        let now = Utc::now().timestamp();
        Self {
            sub: user_id.to_string(),
            username: username.into(),
            role,
            iat: now,
            exp: now + expires_in_seconds,
            iss: issuer.into(),
            aud: audience.into(),
            jti: uuid::Uuid::new_v4().to_string(),
        }
    }

    pub fn is_expired(&self) -> bool {
        Utc::now().timestamp() > self.exp
    }

    pub fn user_id(&self) -> Result<i32> {
        self.sub
            .parse()
            .map_err(|_| HubError::auth("认证令牌中的用户ID无效"))
    }
}

/// 已认证请求的调用者，由认证中间件放入请求扩展
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthContext {
    pub user_id: i32,
    pub username: String,
    pub role: UserRole,
}

impl AuthContext {
    pub const fn is_admin(&self) -> bool {
        self.role.is_admin()
    }
}

impl TryFrom<JwtClaims> for AuthContext {
    type Error = HubError;

    fn try_from(claims: JwtClaims) -> Result<Self> {
        Ok(Self {
            user_id: claims.user_id()?,
            username: claims.username,
            role: claims.role,
        })
    }
}

/// 对外返回的账户信息，不含密码摘要与重置令牌
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: i32,
    pub username: String,
    pub email: String,
    pub role: UserRole,
    pub created_at: DateTime<Utc>,
}

impl From<users::Model> for UserProfile {
    fn from(user: users::Model) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            role: UserRole::parse(&user.role).unwrap_or_default(),
            created_at: user.created_at.and_utc(),
        }
    }
}

/// 注册请求
#[derive(Clone, Default, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

/// 登录请求，`username` 可以是用户名或邮箱
#[derive(Clone, Default, Deserialize)]
pub struct LoginRequest {
    #[serde(alias = "email")]
    pub username: String,
    pub password: String,
}

/// 登录响应
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub token: String,
    pub token_type: String,
    pub expires_in: i64,
    pub user: UserProfile,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_parse() {
        assert_eq!(UserRole::parse("admin"), Some(UserRole::Admin));
        assert_eq!(UserRole::parse("user"), Some(UserRole::User));
        assert_eq!(UserRole::parse("root"), None);
        assert!(UserRole::Admin.is_admin());
        assert!(!UserRole::default().is_admin());
    }

    #[test]
    fn test_claims_to_context() {
        let claims = JwtClaims::new(7, "alice", UserRole::Admin, 60, "iss", "aud");
        assert!(!claims.is_expired());

        let context = AuthContext::try_from(claims).unwrap();
        assert_eq!(context.user_id, 7);
        assert!(context.is_admin());

        let mut broken = JwtClaims::new(1, "bob", UserRole::User, 60, "iss", "aud");
        broken.sub = "not-a-number".to_string();
        assert!(AuthContext::try_from(broken).is_err());
    }
}
