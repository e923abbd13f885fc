//! # 应用配置结构定义

use serde::{Deserialize, Serialize};

use crate::ensure_config;
use crate::error::Result;

/// 上游调用超时的硬上限（秒）
pub const MAX_DISPATCH_TIMEOUT_SECS: u64 = 30;

/// 应用主配置结构
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// 运行环境
    pub environment: Environment,
    /// 管理 API 服务器配置
    pub server: ServerConfig,
    /// 数据库配置
    pub database: super::DatabaseConfig,
    /// 密钥与令牌配置
    pub security: SecurityConfig,
    /// 上游调用配置
    pub dispatch: DispatchConfig,
    /// 密码重置配置
    pub password_reset: PasswordResetConfig,
    /// 启动时创建的管理员账户
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admin: Option<AdminBootstrapConfig>,
}

/// 运行环境，决定错误详情是否对外暴露
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Production,
}

impl Environment {
    pub const fn is_development(self) -> bool {
        matches!(self, Self::Development)
    }
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Self::Development),
            "production" | "prod" => Ok(Self::Production),
            other => Err(format!("未知的运行环境: {other}")),
        }
    }
}

/// 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// 监听地址
    pub host: String,
    /// 监听端口
    pub port: u16,
    /// API 路由前缀
    pub api_prefix: String,
    /// 允许的跨域来源，`*` 表示任意
    pub cors_origins: Vec<String>,
    /// 单个请求处理超时（秒）
    pub request_timeout: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            api_prefix: "/api".to_string(),
            cors_origins: vec!["*".to_string()],
            request_timeout: 60,
        }
    }
}

/// 安全配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// 凭据保险库的长期密钥
    pub encryption_key: String,
    /// JWT 签名密钥
    pub jwt_secret: String,
    /// JWT 有效期（秒）
    pub jwt_expires_in: i64,
    pub jwt_issuer: String,
    pub jwt_audience: String,
    /// bcrypt 计算成本
    pub bcrypt_cost: u32,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            encryption_key: String::new(),
            jwt_secret: String::new(),
            jwt_expires_in: 24 * 3600,
            jwt_issuer: "model-hub".to_string(),
            jwt_audience: "model-hub-api".to_string(),
            bcrypt_cost: 10,
        }
    }
}

/// 上游调用配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// 上游调用超时（秒），不超过 30
    pub timeout_seconds: u64,
    /// 连接测试未提供消息时使用的默认内容
    pub default_test_message: String,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: MAX_DISPATCH_TIMEOUT_SECS,
            default_test_message: "你好".to_string(),
        }
    }
}

impl DispatchConfig {
    /// 实际生效的超时时间
    pub fn effective_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.timeout_seconds.min(MAX_DISPATCH_TIMEOUT_SECS))
    }
}

/// 密码重置配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PasswordResetConfig {
    /// 重置令牌有效期（小时）
    pub token_ttl_hours: i64,
    /// 前端重置页面地址，令牌拼接在其后
    pub frontend_url: String,
}

impl Default for PasswordResetConfig {
    fn default() -> Self {
        Self {
            token_ttl_hours: 24,
            frontend_url: "http://localhost:5173/reset-password".to_string(),
        }
    }
}

/// 启动时确保存在的管理员账户
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminBootstrapConfig {
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password: String,
}

impl AppConfig {
    /// 验证配置的有效性
    pub fn validate(&self) -> Result<()> {
        ensure_config!(!self.database.url.is_empty(), "数据库URL不能为空");
        ensure_config!(
            self.database.max_connections > 0,
            "数据库最大连接数必须大于0"
        );
        ensure_config!(self.server.port > 0, "无效的服务器端口: {}", self.server.port);
        ensure_config!(
            self.server.api_prefix.starts_with('/'),
            "API 前缀必须以 / 开头: {}",
            self.server.api_prefix
        );
        ensure_config!(
            !self.security.encryption_key.is_empty(),
            "加密密钥不能为空，请设置 MODEL_HUB_ENCRYPTION_KEY"
        );
        ensure_config!(
            !self.security.jwt_secret.is_empty(),
            "JWT 密钥不能为空，请设置 MODEL_HUB_JWT_SECRET"
        );
        if self.environment == Environment::Production {
            ensure_config!(
                self.security.jwt_secret.len() >= 32,
                "生产环境的 JWT 密钥长度至少 32 字节"
            );
        }
        ensure_config!(self.security.jwt_expires_in > 0, "JWT 有效期必须大于0");
        ensure_config!(self.dispatch.timeout_seconds > 0, "上游调用超时必须大于0");
        ensure_config!(
            self.password_reset.token_ttl_hours > 0,
            "重置令牌有效期必须大于0"
        );
        if let Some(admin) = &self.admin {
            ensure_config!(
                !admin.username.trim().is_empty() && admin.password.len() >= 6,
                "管理员账户配置无效：用户名不能为空，密码至少 6 位"
            );
        }
        Ok(())
    }

    /// 监听地址
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
