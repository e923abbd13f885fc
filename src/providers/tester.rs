//! # 连接测试
//!
//! 读取含凭据的服务商，选定模型后交给分发器，原样返回结果。

use serde::Deserialize;
use serde_json::{Map, Value};
use std::sync::Arc;

use super::dispatcher::{AdapterDispatcher, DispatchRequest, NormalizedResult};
use super::registry::ProviderRegistry;
use super::types::ProviderWithSecret;
use crate::error::Result;
use crate::logging::{LogComponent, LogStage};
use crate::{ensure_valid, linfo, lwarn, validation_error};

/// 连接测试请求
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TestRequest {
    pub message: Option<String>,
    /// 指定模型代码，缺省时使用第一个启用的模型
    pub model: Option<String>,
    pub parameters: Map<String, Value>,
}

/// 连接测试器
#[derive(Clone)]
pub struct ConnectionTester {
    registry: ProviderRegistry,
    dispatcher: Arc<AdapterDispatcher>,
    default_message: String,
}

impl ConnectionTester {
    pub fn new(
        registry: ProviderRegistry,
        dispatcher: Arc<AdapterDispatcher>,
        default_message: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            dispatcher,
            default_message: default_message.into(),
        }
    }

    pub async fn test(&self, provider_id: &str, request: TestRequest) -> Result<NormalizedResult> {
        let provider = self.registry.get_with_secret(provider_id).await?;
        let model_code = select_model(&provider, request.model.as_deref())?;
        let message = request
            .message
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| self.default_message.clone());

        let result = self
            .dispatcher
            .dispatch_request(
                &provider,
                &DispatchRequest {
                    model_code: model_code.clone(),
                    message,
                    parameters: request.parameters,
                },
            )
            .await?;

        record_usage(&self.registry, provider_id, &result, LogComponent::Tester).await;

        linfo!(
            "system",
            LogStage::Response,
            LogComponent::Tester,
            "connection_test",
            "连接测试完成",
            provider_id = %provider_id,
            model = %model_code,
            success = result.success,
            latency_ms = result.latency_ms
        );

        Ok(result)
    }
}

/// 显式指定的模型，缺省为第一个启用的模型
pub(super) fn select_model(provider: &ProviderWithSecret, requested: Option<&str>) -> Result<String> {
    ensure_valid!(!provider.models.is_empty(), "没有可用的模型");
    match requested.map(str::trim) {
        Some(code) if !code.is_empty() => Ok(code.to_string()),
        _ => provider
            .first_enabled_model()
            .map(|m| m.code.clone())
            .ok_or_else(|| validation_error!("没有可用的模型")),
    }
}

/// 成功结果的用量计入服务商。计数失败只记日志，不影响结果
pub(super) async fn record_usage(
    registry: &ProviderRegistry,
    provider_id: &str,
    result: &NormalizedResult,
    component: LogComponent,
) {
    let Some(tokens) = result.token_usage.filter(|t| result.success && *t > 0) else {
        return;
    };
    if let Err(err) = registry.record_token_usage(provider_id, tokens).await {
        lwarn!(
            "system",
            LogStage::Db,
            component,
            "record_usage_failed",
            "记录 token 用量失败",
            provider_id = %provider_id,
            error = %err
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HubError;
    use crate::providers::dispatcher::ErrorKind;
    use crate::providers::types::CreateProviderRequest;
    use crate::testing::fixtures::{ProviderFixture, model};
    use crate::testing::helpers::{create_test_db, test_vault};
    use crate::testing::mocks::MockUpstream;
    use serde_json::json;
    use std::time::Duration;

    async fn setup(base_url: &str, request: Option<CreateProviderRequest>) -> (ConnectionTester, String) {
        let registry = ProviderRegistry::new(Arc::new(create_test_db().await), Arc::new(test_vault()));
        let created = registry
            .create(request.unwrap_or_else(|| ProviderFixture::openai().base_url(base_url).build()))
            .await
            .unwrap();
        let dispatcher = Arc::new(AdapterDispatcher::new(Duration::from_secs(5)).unwrap());
        (ConnectionTester::new(registry, dispatcher, "你好"), created.id)
    }

    #[tokio::test]
    async fn test_success_records_token_usage() {
        let upstream = MockUpstream::start().await;
        upstream
            .respond_json(
                200,
                json!({"choices": [{"message": {"content": "pong"}}], "usage": {"total_tokens": 9}}),
            )
            .await;
        let (tester, id) = setup(&upstream.url(), None).await;

        let result = tester.test(&id, TestRequest::default()).await.unwrap();
        assert!(result.success);
        assert_eq!(result.content.as_deref(), Some("pong"));

        let received = upstream.received_bodies().await;
        assert_eq!(received[0]["messages"][0]["content"], json!("你好"));
        assert_eq!(tester.registry.get_by_id(&id).await.unwrap().token_usage, 9);
    }

    #[tokio::test]
    async fn test_explicit_model_is_used() {
        let upstream = MockUpstream::start().await;
        upstream
            .respond_json(200, json!({"choices": [{"message": {"content": "ok"}}]}))
            .await;
        let request = ProviderFixture::openai()
            .base_url(&upstream.url())
            .models(vec![model("gpt-4", true), model("gpt-3.5", true)])
            .build();
        let (tester, id) = setup(&upstream.url(), Some(request)).await;

        tester
            .test(
                &id,
                TestRequest {
                    model: Some("gpt-3.5".to_string()),
                    message: Some("ping".to_string()),
                    ..TestRequest::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(upstream.received_bodies().await[0]["model"], json!("gpt-3.5"));
    }

    #[tokio::test]
    async fn test_no_usable_model() {
        let request = ProviderFixture::openai().models(Vec::new()).build();
        let (tester, id) = setup("http://127.0.0.1:9", Some(request)).await;
        let err = tester.test(&id, TestRequest::default()).await.unwrap_err();
        assert!(matches!(err, HubError::Validation { .. }));

        let request = ProviderFixture::openai()
            .identifier("disabled")
            .models(vec![model("gpt-4", false)])
            .build();
        let (tester, id) = setup("http://127.0.0.1:9", Some(request)).await;
        let err = tester.test(&id, TestRequest::default()).await.unwrap_err();
        assert!(matches!(err, HubError::Validation { .. }));
    }

    #[tokio::test]
    async fn test_upstream_failure_does_not_record_usage() {
        let upstream = MockUpstream::start().await;
        upstream
            .respond_json(500, json!({"error": {"message": "boom"}, "usage": {"total_tokens": 3}}))
            .await;
        let (tester, id) = setup(&upstream.url(), None).await;

        let result = tester.test(&id, TestRequest::default()).await.unwrap();
        assert_eq!(result.error_kind(), Some(ErrorKind::UpstreamError));
        assert_eq!(tester.registry.get_by_id(&id).await.unwrap().token_usage, 0);
    }
}
