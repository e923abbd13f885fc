//! # 测试数据 Fixtures
//!
//! 服务商与模型的测试数据构建器

use chrono::Utc;
use serde_json::json;
use std::collections::BTreeMap;

use crate::providers::types::{
    AuthLocation, AuthType, CreateProviderRequest, FieldMappings, MappingEntry, Model, Parameter,
    ParameterType, ProviderSummary, ProviderWithSecret,
};

pub const TEST_API_KEY: &str = "sk-test-key";

/// 带 temperature 参数的模型
pub fn model(code: &str, enabled: bool) -> Model {
    Model {
        code: code.to_string(),
        name: code.to_uppercase(),
        description: None,
        is_enabled: enabled,
        parameters: vec![Parameter {
            name: "temperature".to_string(),
            param_type: ParameterType::Number,
            required: false,
            default: Some(json!(0.7)),
            min: Some(0.0),
            max: Some(2.0),
            options: Vec::new(),
            description: None,
        }],
        capabilities: Vec::new(),
    }
}

/// OpenAI 风格的请求映射
pub fn openai_request_mapping() -> FieldMappings {
    FieldMappings::from([
        ("model".to_string(), MappingEntry::new("model")),
        ("messages".to_string(), MappingEntry::new("messages")),
        ("temperature".to_string(), MappingEntry::new("temperature")),
    ])
}

/// OpenAI 风格的响应映射
pub fn openai_response_mapping() -> FieldMappings {
    FieldMappings::from([
        (
            "content".to_string(),
            MappingEntry::new("choices[0].message.content"),
        ),
        ("usage".to_string(), MappingEntry::new("usage.total_tokens")),
    ])
}

/// 服务商创建请求构建器
pub struct ProviderFixture {
    request: CreateProviderRequest,
}

impl ProviderFixture {
    pub fn openai() -> Self {
        Self {
            request: CreateProviderRequest {
                name: Some("OpenAI".to_string()),
                identifier: Some("openai".to_string()),
                base_url: Some("https://api.openai.com/v1/chat/completions".to_string()),
                api_key: Some(TEST_API_KEY.to_string()),
                models: Some(vec![model("gpt-4", true), model("gpt-3.5", true)]),
                request_mapping: Some(openai_request_mapping()),
                response_mapping: Some(openai_response_mapping()),
                ..CreateProviderRequest::default()
            },
        }
    }

    #[must_use]
    pub fn identifier(mut self, identifier: &str) -> Self {
        self.request.identifier = Some(identifier.to_string());
        self
    }

    #[must_use]
    pub fn base_url(mut self, base_url: &str) -> Self {
        self.request.base_url = Some(base_url.to_string());
        self
    }

    #[must_use]
    pub fn models(mut self, models: Vec<Model>) -> Self {
        self.request.models = Some(models);
        self
    }

    #[must_use]
    pub fn active(mut self, active: bool) -> Self {
        self.request.is_active = Some(active);
        self
    }

    pub fn build(self) -> CreateProviderRequest {
        self.request
    }
}

/// 不经数据库的含凭据服务商，只有一个 gpt-4 模型
pub fn provider_with_secret(base_url: &str) -> ProviderWithSecret {
    let summary = ProviderSummary {
        id: "test-provider".to_string(),
        identifier: "openai".to_string(),
        name: "OpenAI".to_string(),
        base_url: base_url.to_string(),
        is_active: true,
        auth_type: AuthType::Bearer,
        auth_location: AuthLocation::Header,
        auth_key_name: "Authorization".to_string(),
        custom_headers: BTreeMap::new(),
        request_mapping: openai_request_mapping(),
        response_mapping: openai_response_mapping(),
        models: vec![model("gpt-4", true)],
        token_usage: 0,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    };
    ProviderWithSecret::new(summary, TEST_API_KEY)
}
