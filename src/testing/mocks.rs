//! # 测试 Mock 对象
//!
//! 模拟上游厂商的 HTTP 服务与重置邮件投递

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Mutex;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::auth::{ResetMailer, ResetMessage};
use crate::error::{HubError, Result};

/// 模拟的上游厂商
pub struct MockUpstream {
    server: MockServer,
}

impl MockUpstream {
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    /// 作为服务商 baseUrl 的完整地址
    pub fn url(&self) -> String {
        format!("{}/v1/chat/completions", self.server.uri())
    }

    /// 所有 POST 请求返回给定的 JSON
    pub async fn respond_json(&self, status: u16, body: Value) {
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(status).set_body_json(body))
            .mount(&self.server)
            .await;
    }

    /// 返回非 JSON 文本
    pub async fn respond_text(&self, status: u16, body: &str) {
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(status).set_body_string(body))
            .mount(&self.server)
            .await;
    }

    /// 按到达顺序返回收到的请求体
    pub async fn received_bodies(&self) -> Vec<Value> {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .map(|request| request.body_json::<Value>().unwrap_or(Value::Null))
            .collect()
    }

    /// 最后一个请求中指定请求头的值
    pub async fn received_header(&self, name: &str) -> Option<String> {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .last()
            .and_then(|request| request.headers.get(name))
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
    }
}

/// 记录投递内容的邮件实现
#[derive(Default)]
pub struct RecordingMailer {
    messages: Mutex<Vec<ResetMessage>>,
}

impl RecordingMailer {
    pub fn messages(&self) -> Vec<ResetMessage> {
        self.messages.lock().map(|m| m.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ResetMailer for RecordingMailer {
    async fn send_reset(&self, message: &ResetMessage) -> Result<()> {
        if let Ok(mut messages) = self.messages.lock() {
            messages.push(message.clone());
        }
        Ok(())
    }
}

/// 总是投递失败的邮件实现
pub struct FailingMailer;

#[async_trait]
impl ResetMailer for FailingMailer {
    async fn send_reset(&self, _message: &ResetMessage) -> Result<()> {
        Err(HubError::internal("SMTP 服务不可用"))
    }
}
