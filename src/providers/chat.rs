//! # 对话调用
//!
//! 通过已启用的服务商发送一条用户消息，返回统一的 [`NormalizedResult`]。

use serde::Deserialize;
use serde_json::{Map, Value};
use std::sync::Arc;

use super::dispatcher::{AdapterDispatcher, DispatchRequest, NormalizedResult};
use super::registry::ProviderRegistry;
use super::tester::{record_usage, select_model};
use crate::error::{FieldError, HubError, Result};
use crate::logging::{LogComponent, LogStage};
use crate::{ensure_valid, linfo};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ChatRequest {
    pub message: String,
    pub model: Option<String>,
    /// 覆盖模型参数默认值，按逻辑字段名
    pub parameters: Map<String, Value>,
}

#[derive(Clone)]
pub struct ChatService {
    registry: ProviderRegistry,
    dispatcher: Arc<AdapterDispatcher>,
}

impl ChatService {
    pub const fn new(registry: ProviderRegistry, dispatcher: Arc<AdapterDispatcher>) -> Self {
        Self {
            registry,
            dispatcher,
        }
    }

    /// 只有参数校验、服务商或模型不存在时返回 `Err`，上游失败体现在结果中
    pub async fn chat(&self, provider_id: &str, request: ChatRequest) -> Result<NormalizedResult> {
        let message = request.message.trim();
        if message.is_empty() {
            return Err(HubError::validation_with_details(
                "消息不能为空",
                vec![FieldError::new("message", "必填字段")],
            ));
        }

        let provider = self.registry.get_with_secret(provider_id).await?;
        ensure_valid!(provider.is_active, "服务商 {} 未启用", provider.identifier);
        let model_code = select_model(&provider, request.model.as_deref())?;

        let result = self
            .dispatcher
            .dispatch_request(
                &provider,
                &DispatchRequest {
                    model_code: model_code.clone(),
                    message: message.to_string(),
                    parameters: request.parameters,
                },
            )
            .await?;

        record_usage(&self.registry, provider_id, &result, LogComponent::Chat).await;

        linfo!(
            "system",
            LogStage::Response,
            LogComponent::Chat,
            "chat",
            "对话调用完成",
            provider_id = %provider_id,
            model = %model_code,
            success = result.success,
            token_usage = ?result.token_usage
        );

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fixtures::{ProviderFixture, model};
    use crate::testing::helpers::{create_test_db, test_vault};
    use crate::testing::mocks::MockUpstream;
    use crate::providers::types::CreateProviderRequest;
    use serde_json::json;
    use std::time::Duration;

    async fn setup(request: CreateProviderRequest) -> (ChatService, String) {
        let registry =
            ProviderRegistry::new(Arc::new(create_test_db().await), Arc::new(test_vault()));
        let created = registry.create(request).await.unwrap();
        let dispatcher = Arc::new(AdapterDispatcher::new(Duration::from_secs(5)).unwrap());
        (ChatService::new(registry, dispatcher), created.id)
    }

    fn ask(message: &str) -> ChatRequest {
        ChatRequest {
            message: message.to_string(),
            ..ChatRequest::default()
        }
    }

    #[tokio::test]
    async fn test_chat_sends_message_and_parameters() {
        let upstream = MockUpstream::start().await;
        upstream
            .respond_json(
                200,
                json!({"choices": [{"message": {"content": "四"}}], "usage": {"total_tokens": 15}}),
            )
            .await;
        let (chat, id) = setup(
            ProviderFixture::openai()
                .base_url(&upstream.url())
                .active(true)
                .build(),
        )
        .await;

        let mut parameters = Map::new();
        parameters.insert("temperature".to_string(), json!(1.2));
        let result = chat
            .chat(
                &id,
                ChatRequest {
                    message: " 二加二等于几？ ".to_string(),
                    model: Some("gpt-3.5".to_string()),
                    parameters,
                },
            )
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(result.content.as_deref(), Some("四"));
        let sent = &upstream.received_bodies().await[0];
        assert_eq!(sent["model"], json!("gpt-3.5"));
        assert_eq!(sent["messages"][0]["content"], json!("二加二等于几？"));
        assert_eq!(sent["temperature"], json!(1.2));
        assert_eq!(chat.registry.get_by_id(&id).await.unwrap().token_usage, 15);
    }

    #[tokio::test]
    async fn test_chat_rejects_empty_message_and_inactive_provider() {
        let (chat, id) = setup(
            ProviderFixture::openai()
                .base_url("http://127.0.0.1:9")
                .active(false)
                .build(),
        )
        .await;

        let err = chat.chat(&id, ask("   ")).await.unwrap_err();
        assert_eq!(err.details().map(<[FieldError]>::len), Some(1));

        let err = chat.chat(&id, ask("hi")).await.unwrap_err();
        assert!(matches!(err, HubError::Validation { .. }));
        assert!(err.to_string().contains("openai"));
    }

    #[tokio::test]
    async fn test_chat_with_disabled_model() {
        let (chat, id) = setup(
            ProviderFixture::openai()
                .base_url("http://127.0.0.1:9")
                .models(vec![model("gpt-4", true), model("gpt-3.5", false)])
                .active(true)
                .build(),
        )
        .await;

        let err = chat
            .chat(
                &id,
                ChatRequest {
                    model: Some("gpt-3.5".to_string()),
                    ..ask("hi")
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, HubError::NotFound { .. }));
    }
}
