//! # 模型服务商注册表
//!
//! 服务商文档的存储操作。每个服务商是一行记录，模型列表与映射以 JSON 列保存。
//! 整文档更新通过 `revision` 列做比较并交换，单模型开关使用只作用于该数组元素的 UPDATE。

use chrono::Utc;
use entity::{ModelProviders, model_providers};
use reqwest::header::{HeaderName, HeaderValue};
use sea_orm::{
    ActiveModelTrait, ActiveValue::NotSet, ColumnTrait, DatabaseConnection, DbErr, EntityTrait,
    QueryFilter, QueryOrder, Set, SqlErr, Unchanged,
    sea_query::Expr,
};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use super::presets;
use super::types::{
    CreateProviderRequest, FieldMappings, Model, ProviderSummary, ProviderWithSecret,
    UpdateProviderRequest, response_fields,
};
use crate::crypto::CredentialVault;
use crate::error::{FieldError, HubError, Result};
use crate::logging::{LogComponent, LogStage};
use crate::{internal_error, ldebug, linfo, lwarn};

/// 比较并交换失败后的最大重试次数
const MAX_UPDATE_ATTEMPTS: usize = 5;

const RESOURCE: &str = "model_provider";

/// 服务商注册表
#[derive(Clone)]
pub struct ProviderRegistry {
    db: Arc<DatabaseConnection>,
    vault: Arc<CredentialVault>,
}

/// 更新过程中的可变文档：服务商视图 + 凭据密文
struct Document {
    provider: ProviderSummary,
    api_key_cipher: String,
}

impl ProviderRegistry {
    pub fn new(db: Arc<DatabaseConnection>, vault: Arc<CredentialVault>) -> Self {
        Self { db, vault }
    }

    /// 列出全部服务商（不含凭据）
    pub async fn list(&self) -> Result<Vec<ProviderSummary>> {
        ModelProviders::find()
            .order_by_asc(model_providers::Column::CreatedAt)
            .order_by_asc(model_providers::Column::Identifier)
            .all(self.db.as_ref())
            .await?
            .into_iter()
            .map(ProviderSummary::try_from)
            .collect()
    }

    /// 按 ID 读取（不含凭据）
    pub async fn get_by_id(&self, id: &str) -> Result<ProviderSummary> {
        ProviderSummary::try_from(self.find_row(id).await?)
    }

    /// 按 ID 读取并解密凭据。仅供连接测试使用
    pub async fn get_with_secret(&self, id: &str) -> Result<ProviderWithSecret> {
        let row = self.find_row(id).await?;
        let api_key = self.vault.decrypt(&row.api_key).map_err(|err| {
            lwarn!(
                "system",
                LogStage::Internal,
                LogComponent::Vault,
                "decrypt_failed",
                "服务商凭据解密失败",
                provider_id = %id
            );
            err
        })?;
        Ok(ProviderWithSecret::new(ProviderSummary::try_from(row)?, api_key))
    }

    /// 服务商的模型列表
    pub async fn list_models(&self, id: &str) -> Result<Vec<Model>> {
        Ok(self.get_by_id(id).await?.models)
    }

    /// 创建服务商
    ///
    /// 校验顺序：必填字段 -> 标识符重复 -> 映射配置 -> 归一化 -> 加密 -> 持久化。
    pub async fn create(&self, request: CreateProviderRequest) -> Result<ProviderSummary> {
        // 1. 必填字段
        let mut details = Vec::new();
        let name = required(&mut details, "name", request.name.as_deref());
        let identifier = required(&mut details, "identifier", request.identifier.as_deref());
        let base_url = required(&mut details, "baseUrl", request.base_url.as_deref());
        let api_key = required(&mut details, "apiKey", request.api_key.as_deref());
        if !details.is_empty() {
            return Err(HubError::validation_with_details("缺少必填字段", details));
        }
        let (name, identifier, base_url, api_key) = (
            name.unwrap_or_default(),
            normalize_identifier(&identifier.unwrap_or_default()),
            base_url.unwrap_or_default(),
            api_key.unwrap_or_default(),
        );

        // 2. 标识符唯一
        if self.find_by_identifier(&identifier).await?.is_some() {
            return Err(duplicate_identifier(&identifier));
        }

        // 3. 映射配置：缺省时只能来自显式指定的预设
        let preset = match request.preset.as_deref() {
            Some(name) => Some(presets::find(name).ok_or_else(|| {
                HubError::validation_with_details(
                    "未知的映射预设",
                    vec![FieldError::new("preset", format!("不存在名为 {name} 的预设"))],
                )
            })?),
            None => None,
        };
        let request_mapping = non_empty(request.request_mapping)
            .or_else(|| preset.as_ref().map(|p| p.request_mapping.clone()));
        let response_mapping = non_empty(request.response_mapping)
            .or_else(|| preset.as_ref().map(|p| p.response_mapping.clone()));

        let mut details = Vec::new();
        if request_mapping.is_none() {
            details.push(FieldError::new("requestMapping", "缺少请求映射配置"));
        }
        if response_mapping.is_none() {
            details.push(FieldError::new("responseMapping", "缺少响应映射配置"));
        }
        if !details.is_empty() {
            return Err(HubError::validation_with_details(
                "缺少映射配置，可显式指定 preset 使用厂商预设",
                details,
            ));
        }
        let request_mapping = request_mapping.unwrap_or_default();
        let response_mapping = response_mapping.unwrap_or_default();

        let auth_type = request
            .auth_type
            .or_else(|| preset.as_ref().map(|p| p.auth_type))
            .unwrap_or_default();
        let auth_location = request
            .auth_location
            .or_else(|| preset.as_ref().map(|p| p.auth_location))
            .unwrap_or_default();
        let auth_key_name = request
            .auth_key_name
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
            .or_else(|| preset.as_ref().map(|p| p.auth_key_name.to_string()))
            .unwrap_or_else(|| auth_type.default_key_name().to_string());
        let mut custom_headers = preset
            .as_ref()
            .map(|p| p.custom_headers.clone())
            .unwrap_or_default();
        custom_headers.extend(request.custom_headers.unwrap_or_default());
        let models = request.models.unwrap_or_default();

        // 字段格式
        let mut details = Vec::new();
        validate_base_url(&mut details, &base_url);
        validate_headers(&mut details, &custom_headers);
        validate_mappings(&mut details, "requestMapping", &request_mapping, false);
        validate_mappings(&mut details, "responseMapping", &response_mapping, true);
        validate_models(&mut details, &models);
        if !details.is_empty() {
            return Err(HubError::validation_with_details("服务商配置无效", details));
        }

        // 4-5. 加密后持久化
        let api_key_cipher = self.vault.encrypt(&api_key)?;
        let now = Utc::now().naive_utc();
        let id = uuid::Uuid::new_v4().to_string();

        let row = model_providers::ActiveModel {
            id: Set(id.clone()),
            identifier: Set(identifier.clone()),
            name: Set(name),
            base_url: Set(base_url),
            api_key: Set(api_key_cipher),
            is_active: Set(request.is_active.unwrap_or(false)),
            auth_type: Set(auth_type.as_str().to_string()),
            auth_location: Set(auth_location.as_str().to_string()),
            auth_key_name: Set(Some(auth_key_name)),
            custom_headers_json: Set(serde_json::to_string(&custom_headers)?),
            request_mapping_json: Set(serde_json::to_string(&request_mapping)?),
            response_mapping_json: Set(serde_json::to_string(&response_mapping)?),
            models_json: Set(serde_json::to_string(&models)?),
            token_usage: Set(0),
            revision: Set(0),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(self.db.as_ref())
        .await
        .map_err(|err| map_write_error(err, &identifier))?;

        linfo!(
            "system",
            LogStage::Db,
            LogComponent::Registry,
            "create_provider",
            "服务商创建成功",
            provider_id = %id,
            identifier = %identifier
        );

        ProviderSummary::try_from(row)
    }

    /// 部分更新
    pub async fn update(&self, id: &str, request: UpdateProviderRequest) -> Result<ProviderSummary> {
        let mut details = Vec::new();
        for (field, value) in [
            ("name", request.name.as_deref()),
            ("identifier", request.identifier.as_deref()),
            ("baseUrl", request.base_url.as_deref()),
            ("apiKey", request.api_key.as_deref()),
        ] {
            if value.is_some_and(|v| v.trim().is_empty()) {
                details.push(FieldError::new(field, "不能为空"));
            }
        }
        if let Some(base_url) = &request.base_url {
            validate_base_url(&mut details, base_url.trim());
        }
        if let Some(headers) = &request.custom_headers {
            validate_headers(&mut details, headers);
        }
        if let Some(mapping) = &request.request_mapping {
            validate_mappings(&mut details, "requestMapping", mapping, false);
        }
        if let Some(mapping) = &request.response_mapping {
            validate_mappings(&mut details, "responseMapping", mapping, true);
        }
        if let Some(models) = &request.models {
            validate_models(&mut details, models);
        }
        if !details.is_empty() {
            return Err(HubError::validation_with_details("服务商配置无效", details));
        }

        let identifier = request.identifier.as_deref().map(normalize_identifier);
        if let Some(identifier) = &identifier {
            if let Some(existing) = self.find_by_identifier(identifier).await? {
                if existing.id != id {
                    return Err(duplicate_identifier(identifier));
                }
            }
        }

        // 仍需确认文档存在，避免为不存在的服务商做无用的加密
        self.find_row(id).await?;
        let api_key_cipher = match request.api_key.as_deref() {
            Some(api_key) => Some(self.vault.encrypt(api_key)?),
            None => None,
        };

        let updated = self
            .update_document(id, |doc| {
                let provider = &mut doc.provider;
                if let Some(name) = &request.name {
                    provider.name = name.trim().to_string();
                }
                if let Some(identifier) = &identifier {
                    provider.identifier.clone_from(identifier);
                }
                if let Some(base_url) = &request.base_url {
                    provider.base_url = base_url.trim().to_string();
                }
                if let Some(cipher) = &api_key_cipher {
                    doc.api_key_cipher.clone_from(cipher);
                }
                if let Some(auth_type) = request.auth_type {
                    // 切换认证方式且未指定名称时，沿用新方式的默认名称
                    if request.auth_key_name.is_none()
                        && provider.auth_key_name == provider.auth_type.default_key_name()
                    {
                        provider.auth_key_name = auth_type.default_key_name().to_string();
                    }
                    provider.auth_type = auth_type;
                }
                if let Some(auth_location) = request.auth_location {
                    provider.auth_location = auth_location;
                }
                if let Some(key_name) = &request.auth_key_name {
                    let key_name = key_name.trim();
                    provider.auth_key_name = if key_name.is_empty() {
                        provider.auth_type.default_key_name().to_string()
                    } else {
                        key_name.to_string()
                    };
                }
                if let Some(headers) = &request.custom_headers {
                    provider.custom_headers.clone_from(headers);
                }
                if let Some(mapping) = &request.request_mapping {
                    provider.request_mapping.clone_from(mapping);
                }
                if let Some(mapping) = &request.response_mapping {
                    provider.response_mapping.clone_from(mapping);
                }
                if let Some(models) = &request.models {
                    provider.models.clone_from(models);
                }
                if let Some(is_active) = request.is_active {
                    apply_global_flag(provider, is_active);
                }
                Ok(())
            })
            .await?;

        linfo!(
            "system",
            LogStage::Db,
            LogComponent::Registry,
            "update_provider",
            "服务商更新成功",
            provider_id = %id
        );
        Ok(updated)
    }

    /// 删除服务商。启用中的服务商不可删除
    pub async fn delete(&self, id: &str) -> Result<()> {
        let row = self.find_row(id).await?;
        if row.is_active {
            return Err(active_delete_conflict());
        }

        let result = ModelProviders::delete_many()
            .filter(model_providers::Column::Id.eq(id))
            .filter(model_providers::Column::IsActive.eq(false))
            .exec(self.db.as_ref())
            .await?;

        if result.rows_affected == 0 {
            // 读取与删除之间状态发生了变化
            let row = self.find_row(id).await?;
            if row.is_active {
                return Err(active_delete_conflict());
            }
            return Err(internal_error!("删除服务商失败: {id}"));
        }

        linfo!(
            "system",
            LogStage::Db,
            LogComponent::Registry,
            "delete_provider",
            "服务商已删除",
            provider_id = %id
        );
        Ok(())
    }

    /// 切换单个模型的启用状态，只修改该模型条目
    pub async fn set_model_enabled(
        &self,
        id: &str,
        model_code: &str,
        enabled: bool,
    ) -> Result<ProviderSummary> {
        for attempt in 1..=MAX_UPDATE_ATTEMPTS {
            let provider = self.get_by_id(id).await?;
            let index = provider
                .models
                .iter()
                .position(|m| m.code == model_code)
                .ok_or_else(|| HubError::not_found("model", model_code))?;

            let result = ModelProviders::update_many()
                .col_expr(
                    model_providers::Column::ModelsJson,
                    Expr::cust_with_values(
                        "json_set(models_json, ?, json(?))",
                        [format!("$[{index}].isEnabled"), enabled.to_string()],
                    ),
                )
                .col_expr(
                    model_providers::Column::Revision,
                    Expr::col(model_providers::Column::Revision).add(1),
                )
                .col_expr(
                    model_providers::Column::UpdatedAt,
                    Expr::value(Utc::now().naive_utc()),
                )
                .filter(model_providers::Column::Id.eq(id))
                // 条目位置在读取后被并发替换时不命中，重新定位
                .filter(Expr::cust_with_values(
                    "json_extract(models_json, ?) = ?",
                    [format!("$[{index}].code"), model_code.to_string()],
                ))
                .exec(self.db.as_ref())
                .await?;

            if result.rows_affected > 0 {
                ldebug!(
                    "system",
                    LogStage::Db,
                    LogComponent::Registry,
                    "set_model_enabled",
                    "模型状态已更新",
                    provider_id = %id,
                    model_code = %model_code,
                    enabled = enabled
                );
                return self.get_by_id(id).await;
            }

            ldebug!(
                "system",
                LogStage::Db,
                LogComponent::Registry,
                "set_model_enabled_retry",
                "模型列表已被并发修改，重新定位",
                provider_id = %id,
                attempt = attempt
            );
        }

        Err(concurrent_modification())
    }

    /// 切换服务商全局启用状态。停用时所有模型一并停用，启用不会反向启用模型
    pub async fn set_global_enabled(&self, id: &str, enabled: bool) -> Result<ProviderSummary> {
        let updated = self
            .update_document(id, |doc| {
                apply_global_flag(&mut doc.provider, enabled);
                Ok(())
            })
            .await?;

        linfo!(
            "system",
            LogStage::Db,
            LogComponent::Registry,
            "set_global_enabled",
            if enabled { "服务商已启用" } else { "服务商及其全部模型已停用" },
            provider_id = %id
        );
        Ok(updated)
    }

    /// 替换模型列表
    pub async fn replace_models(&self, id: &str, models: Vec<Model>) -> Result<ProviderSummary> {
        let mut details = Vec::new();
        validate_models(&mut details, &models);
        if !details.is_empty() {
            return Err(HubError::validation_with_details("模型配置无效", details));
        }

        self.update_document(id, |doc| {
            doc.provider.models.clone_from(&models);
            Ok(())
        })
        .await
    }

    /// 累加服务商的 token 用量，计数在 `i64::MAX` 处封顶
    pub async fn record_token_usage(&self, id: &str, tokens: i64) -> Result<()> {
        if tokens <= 0 {
            return Ok(());
        }
        let result = ModelProviders::update_many()
            .col_expr(
                model_providers::Column::TokenUsage,
                Expr::cust_with_values(
                    "CASE WHEN token_usage > ? THEN ? ELSE token_usage + ? END",
                    [i64::MAX - tokens, i64::MAX, tokens],
                ),
            )
            .filter(model_providers::Column::Id.eq(id))
            .exec(self.db.as_ref())
            .await?;

        if result.rows_affected == 0 {
            return Err(HubError::not_found(RESOURCE, id));
        }
        Ok(())
    }

    async fn find_row(&self, id: &str) -> Result<model_providers::Model> {
        ModelProviders::find_by_id(id.to_string())
            .one(self.db.as_ref())
            .await?
            .ok_or_else(|| HubError::not_found(RESOURCE, id))
    }

    async fn find_by_identifier(&self, identifier: &str) -> Result<Option<model_providers::Model>> {
        Ok(ModelProviders::find()
            .filter(model_providers::Column::Identifier.eq(identifier))
            .one(self.db.as_ref())
            .await?)
    }

    /// 读取-修改-写回整个文档，写回以读取时的 revision 为条件，冲突时重试
    async fn update_document<F>(&self, id: &str, mut apply: F) -> Result<ProviderSummary>
    where
        F: FnMut(&mut Document) -> Result<()>,
    {
        for attempt in 1..=MAX_UPDATE_ATTEMPTS {
            let row = self.find_row(id).await?;
            let revision = row.revision;
            let api_key_cipher = row.api_key.clone();
            let mut doc = Document {
                provider: ProviderSummary::try_from(row)?,
                api_key_cipher,
            };
            apply(&mut doc)?;

            let identifier = doc.provider.identifier.clone();
            let active = to_active_model(&doc, revision)?;
            match ModelProviders::update(active)
                .filter(model_providers::Column::Revision.eq(revision))
                .exec(self.db.as_ref())
                .await
            {
                Ok(updated) => return ProviderSummary::try_from(updated),
                Err(DbErr::RecordNotUpdated) => {
                    ldebug!(
                        "system",
                        LogStage::Db,
                        LogComponent::Registry,
                        "update_conflict_retry",
                        "检测到并发修改，重新读取文档",
                        provider_id = %id,
                        attempt = attempt
                    );
                }
                Err(err) => return Err(map_write_error(err, &identifier)),
            }
        }

        Err(concurrent_modification())
    }
}

/// 写回时不包含 `token_usage`，计数器只通过原子自增修改
fn to_active_model(doc: &Document, revision: i32) -> Result<model_providers::ActiveModel> {
    let provider = &doc.provider;
    Ok(model_providers::ActiveModel {
        id: Unchanged(provider.id.clone()),
        identifier: Set(provider.identifier.clone()),
        name: Set(provider.name.clone()),
        base_url: Set(provider.base_url.clone()),
        api_key: Set(doc.api_key_cipher.clone()),
        is_active: Set(provider.is_active),
        auth_type: Set(provider.auth_type.as_str().to_string()),
        auth_location: Set(provider.auth_location.as_str().to_string()),
        auth_key_name: Set(Some(provider.auth_key_name.clone())),
        custom_headers_json: Set(serde_json::to_string(&provider.custom_headers)?),
        request_mapping_json: Set(serde_json::to_string(&provider.request_mapping)?),
        response_mapping_json: Set(serde_json::to_string(&provider.response_mapping)?),
        models_json: Set(serde_json::to_string(&provider.models)?),
        token_usage: NotSet,
        revision: Set(revision + 1),
        created_at: NotSet,
        updated_at: Set(Utc::now().naive_utc()),
    })
}

/// 全局开关。关闭时级联停用全部模型
fn apply_global_flag(provider: &mut ProviderSummary, enabled: bool) {
    provider.is_active = enabled;
    if !enabled {
        for model in &mut provider.models {
            model.is_enabled = false;
        }
    }
}

pub(crate) fn normalize_identifier(identifier: &str) -> String {
    identifier.trim().to_lowercase()
}

fn required(details: &mut Vec<FieldError>, field: &str, value: Option<&str>) -> Option<String> {
    match value.map(str::trim) {
        Some(value) if !value.is_empty() => Some(value.to_string()),
        _ => {
            details.push(FieldError::new(field, "必填字段"));
            None
        }
    }
}

fn non_empty(mapping: Option<FieldMappings>) -> Option<FieldMappings> {
    mapping.filter(|m| !m.is_empty())
}

fn validate_base_url(details: &mut Vec<FieldError>, base_url: &str) {
    match url::Url::parse(base_url) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => {}
        _ => details.push(FieldError::new("baseUrl", "必须是有效的 http(s) 地址")),
    }
}

fn validate_headers(details: &mut Vec<FieldError>, headers: &BTreeMap<String, String>) {
    for (name, value) in headers {
        if HeaderName::from_bytes(name.as_bytes()).is_err()
            || HeaderValue::from_str(value).is_err()
        {
            details.push(FieldError::new(
                format!("customHeaders.{name}"),
                "无效的请求头",
            ));
        }
    }
}

fn validate_mappings(
    details: &mut Vec<FieldError>,
    field: &str,
    mapping: &FieldMappings,
    require_content: bool,
) {
    if mapping.is_empty() {
        details.push(FieldError::new(field, "映射配置不能为空"));
        return;
    }
    for (name, entry) in mapping {
        if let Err(err) = entry.validate() {
            details.push(FieldError::new(format!("{field}.{name}"), err.to_string()));
        }
    }
    if require_content && !mapping.contains_key(response_fields::CONTENT) {
        details.push(FieldError::new(
            format!("{field}.{}", response_fields::CONTENT),
            "响应映射必须包含 content",
        ));
    }
}

fn validate_models(details: &mut Vec<FieldError>, models: &[Model]) {
    let mut seen = HashSet::new();
    for (index, model) in models.iter().enumerate() {
        let field = format!("models[{index}]");
        if model.code.trim().is_empty() {
            details.push(FieldError::new(format!("{field}.code"), "模型代码不能为空"));
        } else if !seen.insert(model.code.as_str()) {
            details.push(FieldError::new(
                format!("{field}.code"),
                format!("模型代码 {} 重复", model.code),
            ));
        }
        if model.name.trim().is_empty() {
            details.push(FieldError::new(format!("{field}.name"), "模型名称不能为空"));
        }
        let parameters = model
            .parameters
            .iter()
            .chain(model.capabilities.iter().flat_map(|c| c.parameters.iter()));
        for parameter in parameters {
            if let Some(problem) = parameter.definition_problem() {
                details.push(FieldError::new(format!("{field}.parameters"), problem));
            }
        }
    }
}

fn duplicate_identifier(identifier: &str) -> HubError {
    HubError::conflict(RESOURCE, format!("标识符 {identifier} 已存在"))
}

fn active_delete_conflict() -> HubError {
    HubError::conflict(RESOURCE, "服务商处于启用状态，请先停用再删除")
}

fn concurrent_modification() -> HubError {
    HubError::conflict(RESOURCE, "服务商被并发修改，请稍后重试")
}

fn map_write_error(err: DbErr, identifier: &str) -> HubError {
    match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(_)) => duplicate_identifier(identifier),
        _ => err.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::types::{AuthLocation, AuthType, MappingEntry};
    use crate::testing::fixtures::{ProviderFixture, model};
    use crate::testing::helpers::{create_test_db, test_vault};

    async fn registry() -> ProviderRegistry {
        ProviderRegistry::new(Arc::new(create_test_db().await), Arc::new(test_vault()))
    }

    #[tokio::test]
    async fn test_create_normalizes_and_encrypts() {
        let registry = registry().await;
        let created = registry
            .create(ProviderFixture::openai().identifier("  OpenAI ").build())
            .await
            .unwrap();

        assert_eq!(created.identifier, "openai");
        assert!(!created.is_active);
        assert_eq!(created.auth_key_name, "Authorization");

        let row = registry.find_row(&created.id).await.unwrap();
        assert_ne!(row.api_key, "sk-test-key");
        assert!(!row.api_key.contains("sk-test-key"));

        let with_secret = registry.get_with_secret(&created.id).await.unwrap();
        assert_eq!(
            secrecy::ExposeSecret::expose_secret(with_secret.api_key()),
            "sk-test-key"
        );
    }

    #[tokio::test]
    async fn test_create_reports_missing_fields() {
        let registry = registry().await;
        let err = registry
            .create(CreateProviderRequest {
                name: Some("OpenAI".to_string()),
                api_key: Some("   ".to_string()),
                ..CreateProviderRequest::default()
            })
            .await
            .unwrap_err();

        let fields: Vec<&str> = err
            .details()
            .unwrap()
            .iter()
            .map(|d| d.field.as_str())
            .collect();
        assert_eq!(fields, vec!["identifier", "baseUrl", "apiKey"]);
    }

    #[tokio::test]
    async fn test_missing_mapping_requires_explicit_preset() {
        let registry = registry().await;
        let mut request = ProviderFixture::openai().build();
        request.request_mapping = None;
        request.response_mapping = None;

        let err = registry.create(request.clone()).await.unwrap_err();
        assert!(matches!(err, HubError::Validation { .. }));

        request.preset = Some("anthropic".to_string());
        let created = registry.create(request).await.unwrap();
        assert_eq!(created.auth_type, AuthType::ApiKey);
        assert_eq!(created.auth_key_name, "x-api-key");
        assert_eq!(created.custom_headers["anthropic-version"], "2023-06-01");
        assert_eq!(
            created.response_mapping["content"],
            MappingEntry::new("content[0].text")
        );
    }

    #[tokio::test]
    async fn test_invalid_mapping_and_models_rejected() {
        let registry = registry().await;

        let mut bad_path = ProviderFixture::openai().build();
        bad_path.response_mapping = Some(FieldMappings::from([(
            "content".to_string(),
            MappingEntry::new("choices[abc]"),
        )]));
        assert!(matches!(
            registry.create(bad_path).await,
            Err(HubError::Validation { .. })
        ));

        let duplicate_models = ProviderFixture::openai()
            .models(vec![model("gpt-4", true), model("gpt-4", false)])
            .build();
        assert!(matches!(
            registry.create(duplicate_models).await,
            Err(HubError::Validation { .. })
        ));
    }

    #[tokio::test]
    async fn test_update_partial_fields() {
        let registry = registry().await;
        let created = registry
            .create(ProviderFixture::openai().build())
            .await
            .unwrap();

        let updated = registry
            .update(
                &created.id,
                UpdateProviderRequest {
                    name: Some("OpenAI 官方".to_string()),
                    api_key: Some("sk-rotated".to_string()),
                    auth_type: Some(AuthType::ApiKey),
                    auth_location: Some(AuthLocation::Query),
                    ..UpdateProviderRequest::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.name, "OpenAI 官方");
        assert_eq!(updated.base_url, created.base_url);
        assert_eq!(updated.auth_key_name, "x-api-key");
        assert_eq!(updated.models, created.models);

        let with_secret = registry.get_with_secret(&created.id).await.unwrap();
        assert_eq!(
            secrecy::ExposeSecret::expose_secret(with_secret.api_key()),
            "sk-rotated"
        );
    }

    #[tokio::test]
    async fn test_unknown_ids() {
        let registry = registry().await;
        assert!(matches!(
            registry.get_by_id("missing").await,
            Err(HubError::NotFound { .. })
        ));
        assert!(matches!(
            registry.delete("missing").await,
            Err(HubError::NotFound { .. })
        ));
        assert!(matches!(
            registry.record_token_usage("missing", 5).await,
            Err(HubError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_record_token_usage_accumulates() {
        let registry = registry().await;
        let created = registry
            .create(ProviderFixture::openai().build())
            .await
            .unwrap();

        registry.record_token_usage(&created.id, 10).await.unwrap();
        registry.record_token_usage(&created.id, 32).await.unwrap();
        registry
            .set_model_enabled(&created.id, "gpt-4", false)
            .await
            .unwrap();

        assert_eq!(registry.get_by_id(&created.id).await.unwrap().token_usage, 42);
    }

    #[tokio::test]
    async fn test_record_token_usage_saturates() {
        let registry = registry().await;
        let created = registry
            .create(ProviderFixture::openai().build())
            .await
            .unwrap();

        registry.record_token_usage(&created.id, i64::MAX - 1).await.unwrap();
        registry.record_token_usage(&created.id, 10).await.unwrap();
        registry.record_token_usage(&created.id, i64::MAX).await.unwrap();

        assert_eq!(
            registry.get_by_id(&created.id).await.unwrap().token_usage,
            i64::MAX
        );
    }

    #[tokio::test]
    async fn test_delete_requires_inactive_and_disable_cascades() {
        let registry = registry().await;
        let created = registry
            .create(ProviderFixture::openai().active(true).build())
            .await
            .unwrap();
        assert!(created.models.iter().all(|m| m.is_enabled));

        assert!(matches!(
            registry.delete(&created.id).await,
            Err(HubError::Conflict { .. })
        ));

        let disabled = registry
            .set_global_enabled(&created.id, false)
            .await
            .unwrap();
        assert!(!disabled.is_active);
        assert!(disabled.models.iter().all(|m| !m.is_enabled));

        registry.delete(&created.id).await.unwrap();
        assert!(matches!(
            registry.get_by_id(&created.id).await,
            Err(HubError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_identifier_conflict_on_create_and_update() {
        let registry = registry().await;
        registry
            .create(ProviderFixture::openai().identifier("Zhipu").build())
            .await
            .unwrap();
        assert!(matches!(
            registry
                .create(ProviderFixture::openai().identifier("zhipu ").build())
                .await,
            Err(HubError::Conflict { .. })
        ));

        let other = registry
            .create(ProviderFixture::openai().identifier("other").build())
            .await
            .unwrap();
        let err = registry
            .update(
                &other.id,
                UpdateProviderRequest {
                    identifier: Some("ZHIPU".to_string()),
                    ..UpdateProviderRequest::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, HubError::Conflict { .. }));

        // 保持自身标识符不算冲突
        registry
            .update(
                &other.id,
                UpdateProviderRequest {
                    identifier: Some(" Other".to_string()),
                    ..UpdateProviderRequest::default()
                },
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_replace_models() {
        let registry = registry().await;
        let created = registry
            .create(ProviderFixture::openai().build())
            .await
            .unwrap();

        let updated = registry
            .replace_models(&created.id, vec![model("gpt-4o", true)])
            .await
            .unwrap();
        assert_eq!(updated.models.len(), 1);
        assert_eq!(
            registry.list_models(&created.id).await.unwrap()[0].code,
            "gpt-4o"
        );

        let err = registry
            .replace_models(&created.id, vec![model("", true)])
            .await
            .unwrap_err();
        assert!(matches!(err, HubError::Validation { .. }));
    }
}
