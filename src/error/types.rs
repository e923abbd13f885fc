//! # 错误类型定义

use axum::http::StatusCode;
use serde::Serialize;
use thiserror::Error;

use crate::providers::field_mapper::MappingError;

/// 单个字段的校验失败详情
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// 应用主要错误类型
#[derive(Debug, Error)]
pub enum HubError {
    /// 配置相关错误
    #[error("配置错误: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    /// 数据库相关错误
    #[error("数据库错误: {message}")]
    Database {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    /// 输入校验错误，附带逐字段详情
    #[error("参数校验失败: {message}")]
    Validation {
        message: String,
        details: Vec<FieldError>,
    },

    /// 资源冲突（重复标识、删除启用中的服务商等）
    #[error("资源冲突: {message}")]
    Conflict { resource: String, message: String },

    /// 资源不存在
    #[error("资源不存在: {resource} {identifier}")]
    NotFound {
        resource: String,
        identifier: String,
    },

    /// 凭据解密失败，不暴露具体原因
    #[error("凭据解密失败")]
    Decryption,

    /// 上游服务商返回非 2xx 响应
    #[error("上游服务错误 ({status}): {message}")]
    Upstream { status: u16, message: String },

    /// 上游无响应（连接失败、超时）
    #[error("上游服务不可达: {message}")]
    Transport {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    /// 缺失、无效或过期的会话令牌
    #[error("认证错误: {message}")]
    Auth {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    /// 已认证但权限不足
    #[error("权限不足: {message}")]
    Forbidden { message: String },

    /// 字段映射错误（路径不存在、未知转换等）
    #[error("字段映射错误: {0}")]
    Mapping(#[from] MappingError),

    /// 系统内部错误
    #[error("内部错误: {message}")]
    Internal {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    /// 序列化/反序列化错误
    #[error("序列化错误: {message}")]
    Serialization {
        message: String,
        #[source]
        source: anyhow::Error,
    },

    /// IO相关错误
    #[error("IO错误: {message}")]
    Io {
        message: String,
        #[source]
        source: std::io::Error,
    },

    /// 附加了上下文说明的错误
    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<HubError>,
    },
}

impl HubError {
    /// 将错误转换为HTTP状态码和错误代码
    pub fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            Self::Config { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "CONFIG_ERROR"),
            Self::Database { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "DATABASE_ERROR"),
            Self::Validation { .. } => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            Self::Conflict { .. } => (StatusCode::CONFLICT, "RESOURCE_CONFLICT"),
            Self::NotFound { .. } => (StatusCode::NOT_FOUND, "RESOURCE_NOT_FOUND"),
            Self::Decryption => (StatusCode::INTERNAL_SERVER_ERROR, "DECRYPTION_ERROR"),
            Self::Upstream { status, .. } => (upstream_status(*status), "UPSTREAM_ERROR"),
            Self::Transport { .. } => (StatusCode::SERVICE_UNAVAILABLE, "TRANSPORT_ERROR"),
            Self::Auth { .. } => (StatusCode::UNAUTHORIZED, "AUTH_ERROR"),
            Self::Forbidden { .. } => (StatusCode::FORBIDDEN, "PERMISSION_ERROR"),
            Self::Mapping(_) => (StatusCode::BAD_REQUEST, "MAPPING_ERROR"),
            Self::Internal { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
            Self::Serialization { .. } => (StatusCode::BAD_REQUEST, "SERIALIZATION_ERROR"),
            Self::Io { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "IO_ERROR"),
            Self::Context { source, .. } => source.status_and_code(),
        }
    }

    /// 是否属于不应向调用方暴露细节的服务端错误
    pub fn is_internal(&self) -> bool {
        match self {
            Self::Config { .. }
            | Self::Database { .. }
            | Self::Decryption
            | Self::Internal { .. }
            | Self::Io { .. } => true,
            Self::Context { source, .. } => source.is_internal(),
            _ => false,
        }
    }

    /// 校验错误的逐字段详情
    pub fn details(&self) -> Option<&[FieldError]> {
        match self {
            Self::Validation { details, .. } if !details.is_empty() => Some(details),
            Self::Context { source, .. } => source.details(),
            _ => None,
        }
    }

    /// 去掉上下文包装后的根错误
    pub fn root(&self) -> &Self {
        match self {
            Self::Context { source, .. } => source.root(),
            other => other,
        }
    }

    /// 创建配置错误
    pub fn config<T: Into<String>>(message: T) -> Self {
        Self::Config {
            message: message.into(),
            source: None,
        }
    }

    /// 创建带源错误的配置错误
    pub fn config_with_source<T: Into<String>, E: Into<anyhow::Error>>(
        message: T,
        source: E,
    ) -> Self {
        Self::Config {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// 创建数据库错误
    pub fn database<T: Into<String>>(message: T) -> Self {
        Self::Database {
            message: message.into(),
            source: None,
        }
    }

    /// 创建带源错误的数据库错误
    pub fn database_with_source<T: Into<String>, E: Into<anyhow::Error>>(
        message: T,
        source: E,
    ) -> Self {
        Self::Database {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// 创建不带字段详情的校验错误
    pub fn validation<T: Into<String>>(message: T) -> Self {
        Self::Validation {
            message: message.into(),
            details: Vec::new(),
        }
    }

    /// 创建带字段详情的校验错误
    pub fn validation_with_details<T: Into<String>>(message: T, details: Vec<FieldError>) -> Self {
        Self::Validation {
            message: message.into(),
            details,
        }
    }

    pub fn conflict<R: Into<String>, T: Into<String>>(resource: R, message: T) -> Self {
        Self::Conflict {
            resource: resource.into(),
            message: message.into(),
        }
    }

    pub fn not_found<R: Into<String>, I: Into<String>>(resource: R, identifier: I) -> Self {
        Self::NotFound {
            resource: resource.into(),
            identifier: identifier.into(),
        }
    }

    pub fn upstream<T: Into<String>>(status: u16, message: T) -> Self {
        Self::Upstream {
            status,
            message: message.into(),
        }
    }

    pub fn transport<T: Into<String>>(message: T) -> Self {
        Self::Transport {
            message: message.into(),
            source: None,
        }
    }

    pub fn transport_with_source<T: Into<String>, E: Into<anyhow::Error>>(
        message: T,
        source: E,
    ) -> Self {
        Self::Transport {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// 创建认证错误
    pub fn auth<T: Into<String>>(message: T) -> Self {
        Self::Auth {
            message: message.into(),
            source: None,
        }
    }

    pub fn auth_with_source<T: Into<String>, E: Into<anyhow::Error>>(
        message: T,
        source: E,
    ) -> Self {
        Self::Auth {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    pub fn forbidden<T: Into<String>>(message: T) -> Self {
        Self::Forbidden {
            message: message.into(),
        }
    }

    /// 创建内部错误
    pub fn internal<T: Into<String>>(message: T) -> Self {
        Self::Internal {
            message: message.into(),
            source: None,
        }
    }

    /// 创建带源错误的内部错误
    pub fn internal_with_source<T: Into<String>, E: Into<anyhow::Error>>(
        message: T,
        source: E,
    ) -> Self {
        Self::Internal {
            message: message.into(),
            source: Some(source.into()),
        }
    }
}

/// 上游状态码映射：鉴权类失败不透传为 401/403，避免与本服务的会话认证混淆
fn upstream_status(status: u16) -> StatusCode {
    match status {
        401 | 403 => StatusCode::BAD_GATEWAY,
        400..=599 => StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY),
        _ => StatusCode::BAD_GATEWAY,
    }
}

// 自动转换常见错误类型
impl From<std::io::Error> for HubError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: "文件操作失败".to_string(),
            source: err,
        }
    }
}

impl From<toml::de::Error> for HubError {
    fn from(err: toml::de::Error) -> Self {
        Self::config_with_source("TOML解析失败", err)
    }
}

impl From<serde_json::Error> for HubError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            message: "JSON处理失败".to_string(),
            source: err.into(),
        }
    }
}

impl From<sea_orm::error::DbErr> for HubError {
    fn from(err: sea_orm::error::DbErr) -> Self {
        Self::database_with_source("数据库操作失败", err)
    }
}

// Bcrypt错误转换
impl From<bcrypt::BcryptError> for HubError {
    fn from(err: bcrypt::BcryptError) -> Self {
        Self::internal_with_source("密码处理失败", err)
    }
}

// JWT错误转换
impl From<jsonwebtoken::errors::Error> for HubError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        Self::auth_with_source("JWT处理失败", err)
    }
}
