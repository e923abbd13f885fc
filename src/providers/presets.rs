//! # 厂商映射预设
//!
//! 常见厂商的请求/响应映射与认证放置。预设只在创建请求显式指定 `preset` 时生效。

use serde::Serialize;
use std::collections::BTreeMap;

use super::types::{
    AuthLocation, AuthType, FieldMappings, MappingEntry, request_fields, response_fields,
};

/// 一个厂商预设
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MappingPreset {
    pub name: &'static str,
    pub display_name: &'static str,
    pub default_base_url: &'static str,
    pub auth_type: AuthType,
    pub auth_location: AuthLocation,
    pub auth_key_name: &'static str,
    pub custom_headers: BTreeMap<String, String>,
    pub request_mapping: FieldMappings,
    pub response_mapping: FieldMappings,
}

fn mappings(entries: &[(&str, &str)]) -> FieldMappings {
    entries
        .iter()
        .map(|(field, path)| ((*field).to_string(), MappingEntry::new(*path)))
        .collect()
}

fn openai() -> MappingPreset {
    MappingPreset {
        name: "openai",
        display_name: "OpenAI",
        default_base_url: "https://api.openai.com/v1/chat/completions",
        auth_type: AuthType::Bearer,
        auth_location: AuthLocation::Header,
        auth_key_name: "Authorization",
        custom_headers: BTreeMap::new(),
        request_mapping: mappings(&[
            (request_fields::MODEL, "model"),
            (request_fields::MESSAGES, "messages"),
            ("temperature", "temperature"),
            ("maxTokens", "max_tokens"),
        ]),
        response_mapping: mappings(&[
            (response_fields::CONTENT, "choices[0].message.content"),
            (response_fields::USAGE, "usage.total_tokens"),
        ]),
    }
}

fn anthropic() -> MappingPreset {
    MappingPreset {
        name: "anthropic",
        display_name: "Anthropic",
        default_base_url: "https://api.anthropic.com/v1/messages",
        auth_type: AuthType::ApiKey,
        auth_location: AuthLocation::Header,
        auth_key_name: "x-api-key",
        custom_headers: BTreeMap::from([(
            "anthropic-version".to_string(),
            "2023-06-01".to_string(),
        )]),
        request_mapping: mappings(&[
            (request_fields::MODEL, "model"),
            (request_fields::MESSAGES, "messages"),
            ("temperature", "temperature"),
            ("maxTokens", "max_tokens"),
        ]),
        response_mapping: mappings(&[
            (response_fields::CONTENT, "content[0].text"),
            (response_fields::PROMPT_TOKENS, "usage.input_tokens"),
            (response_fields::COMPLETION_TOKENS, "usage.output_tokens"),
        ]),
    }
}

fn zhipu() -> MappingPreset {
    MappingPreset {
        name: "zhipu",
        display_name: "智谱 AI",
        default_base_url: "https://open.bigmodel.cn/api/paas/v4/chat/completions",
        auth_type: AuthType::Bearer,
        auth_location: AuthLocation::Header,
        auth_key_name: "Authorization",
        custom_headers: BTreeMap::new(),
        request_mapping: mappings(&[
            (request_fields::MODEL, "model"),
            (request_fields::MESSAGES, "messages"),
            ("temperature", "temperature"),
            ("maxTokens", "max_tokens"),
        ]),
        response_mapping: mappings(&[
            (response_fields::CONTENT, "data.choices[0].content"),
            (response_fields::USAGE, "data.usage.total_tokens"),
        ]),
    }
}

/// 所有内置预设
pub fn all() -> Vec<MappingPreset> {
    vec![openai(), anthropic(), zhipu()]
}

/// 按名称查找预设（大小写不敏感）
pub fn find(name: &str) -> Option<MappingPreset> {
    let name = name.trim().to_ascii_lowercase();
    all().into_iter().find(|preset| preset.name == name)
}
