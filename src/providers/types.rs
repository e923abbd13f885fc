//! # 模型服务商领域类型
//!
//! 服务商、模型、参数、能力与字段映射。对外序列化统一使用 camelCase。

use chrono::{DateTime, Utc};
use entity::model_providers;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

pub use super::field_mapper::MappingEntry;
use crate::error::{HubError, Result};

/// 逻辑字段名 -> 映射条目
pub type FieldMappings = BTreeMap<String, MappingEntry>;

/// 请求映射中的保留逻辑字段
pub mod request_fields {
    pub const MODEL: &str = "model";
    pub const MESSAGES: &str = "messages";
    pub const PROMPT: &str = "prompt";
}

/// 响应映射中的逻辑字段
pub mod response_fields {
    pub const CONTENT: &str = "content";
    pub const USAGE: &str = "usage";
    pub const PROMPT_TOKENS: &str = "promptTokens";
    pub const COMPLETION_TOKENS: &str = "completionTokens";
}

/// 认证方式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthType {
    None,
    Basic,
    #[default]
    Bearer,
    #[serde(rename = "apikey")]
    ApiKey,
}

impl AuthType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Basic => "basic",
            Self::Bearer => "bearer",
            Self::ApiKey => "apikey",
        }
    }

    /// 未配置 `authKeyName` 时使用的默认名称
    pub const fn default_key_name(self) -> &'static str {
        match self {
            Self::ApiKey => "x-api-key",
            _ => "Authorization",
        }
    }
}

impl std::str::FromStr for AuthType {
    type Err = HubError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "none" => Ok(Self::None),
            "basic" => Ok(Self::Basic),
            "bearer" => Ok(Self::Bearer),
            "apikey" => Ok(Self::ApiKey),
            other => Err(HubError::database(format!("未知的认证方式: {other}"))),
        }
    }
}

/// 凭据放置位置
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthLocation {
    #[default]
    Header,
    Query,
    Body,
}

impl AuthLocation {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Header => "header",
            Self::Query => "query",
            Self::Body => "body",
        }
    }
}

impl std::str::FromStr for AuthLocation {
    type Err = HubError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "header" => Ok(Self::Header),
            "query" => Ok(Self::Query),
            "body" => Ok(Self::Body),
            other => Err(HubError::database(format!("未知的凭据位置: {other}"))),
        }
    }
}

/// 参数类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterType {
    String,
    Number,
    Boolean,
    Enum,
}

/// 模型可调参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Parameter {
    pub name: String,
    #[serde(rename = "type")]
    pub param_type: ParameterType,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Parameter {
    /// 校验参数定义本身，返回问题描述
    pub fn definition_problem(&self) -> Option<String> {
        if self.name.trim().is_empty() {
            return Some("参数名不能为空".to_string());
        }
        if let (Some(min), Some(max)) = (self.min, self.max) {
            if min > max {
                return Some(format!("参数 {} 的 min 不能大于 max", self.name));
            }
        }
        if self.param_type == ParameterType::Enum && self.options.is_empty() {
            return Some(format!("枚举参数 {} 必须提供 options", self.name));
        }
        match &self.default {
            Some(default) => self
                .value_problem(default)
                .map(|problem| format!("默认值无效: {problem}")),
            None => None,
        }
    }

    /// 校验一个取值是否符合该参数的约束
    pub fn value_problem(&self, value: &Value) -> Option<String> {
        match self.param_type {
            ParameterType::String if !value.is_string() => {
                Some(format!("参数 {} 必须是字符串", self.name))
            }
            ParameterType::Boolean if !value.is_boolean() => {
                Some(format!("参数 {} 必须是布尔值", self.name))
            }
            ParameterType::Number => {
                let Some(number) = value.as_f64() else {
                    return Some(format!("参数 {} 必须是数值", self.name));
                };
                if self.min.is_some_and(|min| number < min) || self.max.is_some_and(|max| number > max) {
                    return Some(format!(
                        "参数 {} 超出范围 [{}, {}]",
                        self.name,
                        self.min.map_or_else(|| "-∞".to_string(), |v| v.to_string()),
                        self.max.map_or_else(|| "+∞".to_string(), |v| v.to_string()),
                    ));
                }
                None
            }
            ParameterType::Enum if !self.options.contains(value) => {
                Some(format!("参数 {} 的取值不在可选项中", self.name))
            }
            _ => None,
        }
    }
}

/// 能力类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CapabilityType {
    Text,
    Image,
    Audio,
    Embedding,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Capability {
    #[serde(rename = "type")]
    pub capability_type: CapabilityType,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub parameters: Vec<Parameter>,
}

const fn enabled_by_default() -> bool {
    true
}

/// 服务商提供的单个模型
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Model {
    pub code: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default = "enabled_by_default")]
    pub is_enabled: bool,
    #[serde(default)]
    pub parameters: Vec<Parameter>,
    #[serde(default)]
    pub capabilities: Vec<Capability>,
}

impl Model {
    pub fn parameter(&self, name: &str) -> Option<&Parameter> {
        self.parameters.iter().find(|p| p.name == name)
    }
}

/// 不含凭据的服务商视图，所有常规读取都返回该类型
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderSummary {
    pub id: String,
    pub identifier: String,
    pub name: String,
    pub base_url: String,
    pub is_active: bool,
    pub auth_type: AuthType,
    pub auth_location: AuthLocation,
    pub auth_key_name: String,
    pub custom_headers: BTreeMap<String, String>,
    pub request_mapping: FieldMappings,
    pub response_mapping: FieldMappings,
    pub models: Vec<Model>,
    pub token_usage: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProviderSummary {
    pub fn model(&self, code: &str) -> Option<&Model> {
        self.models.iter().find(|m| m.code == code)
    }

    /// 第一个启用的模型
    pub fn first_enabled_model(&self) -> Option<&Model> {
        self.models.iter().find(|m| m.is_enabled)
    }
}

/// 含解密后凭据的服务商，只由显式的提权读取产生
pub struct ProviderWithSecret {
    pub provider: ProviderSummary,
    api_key: SecretString,
}

impl ProviderWithSecret {
    pub fn new(provider: ProviderSummary, api_key: impl Into<String>) -> Self {
        Self {
            provider,
            api_key: SecretString::from(api_key.into()),
        }
    }

    pub fn api_key(&self) -> &SecretString {
        &self.api_key
    }
}

impl std::fmt::Debug for ProviderWithSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderWithSecret")
            .field("provider", &self.provider)
            .field("api_key", &"********")
            .finish()
    }
}

impl std::ops::Deref for ProviderWithSecret {
    type Target = ProviderSummary;

    fn deref(&self) -> &Self::Target {
        &self.provider
    }
}

impl TryFrom<model_providers::Model> for ProviderSummary {
    type Error = HubError;

    fn try_from(row: model_providers::Model) -> Result<Self> {
        let corrupt = |column: &str, err: serde_json::Error| {
            HubError::database_with_source(format!("服务商 {} 的 {column} 字段损坏", row.id), err)
        };

        let auth_type: AuthType = row.auth_type.parse()?;
        Ok(Self {
            custom_headers: serde_json::from_str(&row.custom_headers_json)
                .map_err(|e| corrupt("custom_headers", e))?,
            request_mapping: serde_json::from_str(&row.request_mapping_json)
                .map_err(|e| corrupt("request_mapping", e))?,
            response_mapping: serde_json::from_str(&row.response_mapping_json)
                .map_err(|e| corrupt("response_mapping", e))?,
            models: serde_json::from_str(&row.models_json).map_err(|e| corrupt("models", e))?,
            auth_location: row.auth_location.parse()?,
            auth_key_name: row
                .auth_key_name
                .clone()
                .filter(|name| !name.trim().is_empty())
                .unwrap_or_else(|| auth_type.default_key_name().to_string()),
            auth_type,
            id: row.id,
            identifier: row.identifier,
            name: row.name,
            base_url: row.base_url,
            is_active: row.is_active,
            token_usage: row.token_usage,
            created_at: row.created_at.and_utc(),
            updated_at: row.updated_at.and_utc(),
        })
    }
}

/// 创建服务商请求。字段均为可选，以便按字段报告缺失
#[derive(Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProviderRequest {
    pub name: Option<String>,
    pub identifier: Option<String>,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub is_active: Option<bool>,
    pub auth_type: Option<AuthType>,
    pub auth_location: Option<AuthLocation>,
    pub auth_key_name: Option<String>,
    pub custom_headers: Option<BTreeMap<String, String>>,
    pub request_mapping: Option<FieldMappings>,
    pub response_mapping: Option<FieldMappings>,
    pub models: Option<Vec<Model>>,
    /// 显式选择的映射预设
    pub preset: Option<String>,
}

/// 部分更新请求，缺省字段保持不变
#[derive(Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProviderRequest {
    pub name: Option<String>,
    pub identifier: Option<String>,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub is_active: Option<bool>,
    pub auth_type: Option<AuthType>,
    pub auth_location: Option<AuthLocation>,
    pub auth_key_name: Option<String>,
    pub custom_headers: Option<BTreeMap<String, String>>,
    pub request_mapping: Option<FieldMappings>,
    pub response_mapping: Option<FieldMappings>,
    pub models: Option<Vec<Model>>,
}
