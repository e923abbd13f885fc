//! # 适配器分发器
//!
//! 按服务商存储的映射配置组装上游请求、放置凭据、发起单次 POST，并把结果统一为
//! [`NormalizedResult`]。上游错误与网络错误作为数据返回，不向调用方抛出。

use axum::http::StatusCode;
use base64::{Engine, engine::general_purpose::STANDARD};
use reqwest::{
    Client,
    header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue},
};
use secrecy::ExposeSecret;
use serde::Serialize;
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use super::field_mapper::{MappingError, inject};
use super::types::{AuthLocation, AuthType, Model, ProviderWithSecret, request_fields, response_fields};
use crate::config::{DispatchConfig, MAX_DISPATCH_TIMEOUT_SECS};
use crate::error::{HubError, Result};
use crate::logging::{LogComponent, LogStage};
use crate::{ldebug, linfo, lwarn};

/// 凭据在所有对外可见副本中的占位符
pub const REDACTED: &str = "********";

/// 失败分类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// 上游返回了非 2xx 响应
    UpstreamError,
    /// 没有收到响应（连接失败、超时）
    TransportError,
    /// 发起请求前的本地映射或参数校验失败
    RequestMappingError,
    /// 2xx 响应无法按响应映射解析
    ResponseMappingError,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatchFailure {
    pub kind: ErrorKind,
    pub message: String,
}

/// 已脱敏的出站请求副本
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RawRequest {
    pub url: String,
    pub method: String,
    pub headers: BTreeMap<String, String>,
    pub body: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RawResponse {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: Value,
}

/// 统一的分发结果
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_usage: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    pub latency_ms: u64,
    pub raw_request: RawRequest,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_response: Option<RawResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<DispatchFailure>,
}

impl NormalizedResult {
    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error.as_ref().map(|e| e.kind)
    }

    /// 管理接口返回该结果时使用的 HTTP 状态码
    pub fn http_status(&self) -> StatusCode {
        let Some(error) = &self.error else {
            return StatusCode::OK;
        };
        match error.kind {
            ErrorKind::UpstreamError => {
                HubError::upstream(self.status_code.unwrap_or(502), "")
                    .status_and_code()
                    .0
            }
            ErrorKind::TransportError => StatusCode::SERVICE_UNAVAILABLE,
            ErrorKind::RequestMappingError => StatusCode::BAD_REQUEST,
            ErrorKind::ResponseMappingError => StatusCode::BAD_GATEWAY,
        }
    }
}

/// 一次分发的输入
#[derive(Debug, Clone, Default)]
pub struct DispatchRequest {
    pub model_code: String,
    pub message: String,
    /// 逻辑字段名 -> 调用方提供的参数值，未提供时使用参数默认值
    pub parameters: Map<String, Value>,
}

impl DispatchRequest {
    pub fn new(model_code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            model_code: model_code.into(),
            message: message.into(),
            parameters: Map::new(),
        }
    }

    #[must_use]
    pub fn with_parameter(mut self, name: impl Into<String>, value: Value) -> Self {
        self.parameters.insert(name.into(), value);
        self
    }
}

/// 组装完成、尚未发送的请求
struct PreparedRequest {
    url: url::Url,
    headers: HeaderMap,
    body: Value,
    redacted: RawRequest,
}

/// 本次调用中需要从对外副本里抹掉的字符串
struct Redactor {
    auth_key_name: String,
    auth_placeholder: &'static str,
    secrets: Vec<String>,
}

impl Redactor {
    fn new(provider: &ProviderWithSecret, credential: Option<&str>) -> Self {
        let key = provider.api_key().expose_secret();
        let mut secrets: Vec<String> = [Some(key), credential]
            .into_iter()
            .flatten()
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        if provider.auth_type == AuthType::Basic && !key.is_empty() {
            secrets.push(STANDARD.encode(key));
        }
        // 先替换较长的串，避免只抹掉其中一部分
        secrets.sort_by_key(|s| std::cmp::Reverse(s.len()));
        secrets.dedup();

        Self {
            auth_key_name: provider.auth_key_name.clone(),
            auth_placeholder: match provider.auth_type {
                AuthType::Bearer => "Bearer ********",
                AuthType::Basic => "Basic ********",
                _ => REDACTED,
            },
            secrets,
        }
    }

    fn text(&self, text: &str) -> String {
        self.secrets
            .iter()
            .fold(text.to_string(), |acc, secret| acc.replace(secret.as_str(), REDACTED))
    }

    fn value(&self, value: &Value) -> Value {
        match value {
            Value::String(s) => Value::String(self.text(s)),
            Value::Array(items) => Value::Array(items.iter().map(|v| self.value(v)).collect()),
            Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), self.value(v)))
                    .collect(),
            ),
            other => other.clone(),
        }
    }

    fn headers(&self, headers: &HeaderMap) -> BTreeMap<String, String> {
        headers
            .iter()
            .map(|(name, value)| {
                let rendered = if name.as_str().eq_ignore_ascii_case(&self.auth_key_name) {
                    self.auth_placeholder.to_string()
                } else {
                    self.text(&String::from_utf8_lossy(value.as_bytes()))
                };
                (name.as_str().to_string(), rendered)
            })
            .collect()
    }
}

/// 适配器分发器
#[derive(Debug, Clone)]
pub struct AdapterDispatcher {
    client: Client,
    timeout: Duration,
}

impl AdapterDispatcher {
    /// 创建分发器，超时上限为 30 秒
    pub fn new(timeout: Duration) -> Result<Self> {
        let timeout = timeout.min(Duration::from_secs(MAX_DISPATCH_TIMEOUT_SECS));
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout.min(Duration::from_secs(10)))
            .build()
            .map_err(|e| HubError::internal_with_source("创建HTTP客户端失败", e))?;
        Ok(Self { client, timeout })
    }

    pub fn from_config(config: &DispatchConfig) -> Result<Self> {
        Self::new(config.effective_timeout())
    }

    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// 以用户消息调用指定模型
    pub async fn dispatch(
        &self,
        provider: &ProviderWithSecret,
        model_code: &str,
        message: &str,
    ) -> Result<NormalizedResult> {
        self.dispatch_request(provider, &DispatchRequest::new(model_code, message))
            .await
    }

    /// 只有模型不存在或已停用会返回 `Err`，其余失败都体现在结果的 `error` 中
    pub async fn dispatch_request(
        &self,
        provider: &ProviderWithSecret,
        request: &DispatchRequest,
    ) -> Result<NormalizedResult> {
        let model = provider
            .model(&request.model_code)
            .filter(|m| m.is_enabled)
            .ok_or_else(|| HubError::not_found("model", request.model_code.as_str()))?;

        let credential = credential_for(provider);
        let redactor = Redactor::new(provider, credential.as_deref());

        let prepared = match prepare(provider, model, request, credential.as_deref(), &redactor) {
            Ok(prepared) => prepared,
            Err(message) => {
                lwarn!(
                    "system",
                    LogStage::UpstreamRequest,
                    LogComponent::Dispatcher,
                    "request_mapping_failed",
                    "请求映射失败，未发起上游调用",
                    provider = %provider.identifier,
                    model = %model.code,
                    error = %redactor.text(&message)
                );
                return Ok(NormalizedResult {
                    success: false,
                    content: None,
                    token_usage: None,
                    status_code: None,
                    latency_ms: 0,
                    raw_request: RawRequest {
                        url: redactor.text(&provider.base_url),
                        method: "POST".to_string(),
                        headers: BTreeMap::new(),
                        body: Value::Null,
                    },
                    raw_response: None,
                    error: Some(DispatchFailure {
                        kind: ErrorKind::RequestMappingError,
                        message: redactor.text(&message),
                    }),
                });
            }
        };

        ldebug!(
            "system",
            LogStage::UpstreamRequest,
            LogComponent::Dispatcher,
            "send_request",
            "发送上游请求",
            provider = %provider.identifier,
            model = %model.code,
            url = %prepared.redacted.url
        );

        let started = Instant::now();
        let sent = self
            .client
            .post(prepared.url)
            .headers(prepared.headers)
            .body(prepared.body.to_string())
            .send()
            .await;

        let response = match sent {
            Ok(response) => response,
            Err(err) => {
                let latency_ms = elapsed_ms(started);
                let message = if err.is_timeout() {
                    format!("上游请求超时（{}秒）", self.timeout.as_secs())
                } else {
                    format!("无法连接上游服务: {}", err.without_url())
                };
                lwarn!(
                    "system",
                    LogStage::UpstreamRequest,
                    LogComponent::Dispatcher,
                    "transport_failed",
                    "上游无响应",
                    provider = %provider.identifier,
                    latency_ms = latency_ms,
                    error = %redactor.text(&message)
                );
                return Ok(NormalizedResult {
                    success: false,
                    content: None,
                    token_usage: None,
                    status_code: None,
                    latency_ms,
                    raw_request: prepared.redacted,
                    raw_response: None,
                    error: Some(DispatchFailure {
                        kind: ErrorKind::TransportError,
                        message: redactor.text(&message),
                    }),
                });
            }
        };

        let status = response.status();
        let response_headers = redactor.headers(response.headers());
        let text = match response.text().await {
            Ok(text) => text,
            Err(err) => {
                let message = format!("读取上游响应失败: {}", err.without_url());
                return Ok(NormalizedResult {
                    success: false,
                    content: None,
                    token_usage: None,
                    status_code: Some(status.as_u16()),
                    latency_ms: elapsed_ms(started),
                    raw_request: prepared.redacted,
                    raw_response: None,
                    error: Some(DispatchFailure {
                        kind: ErrorKind::TransportError,
                        message: redactor.text(&message),
                    }),
                });
            }
        };
        let latency_ms = elapsed_ms(started);
        let parsed = serde_json::from_str::<Value>(&text).ok();
        let raw_response = RawResponse {
            status: status.as_u16(),
            headers: response_headers,
            body: redactor.value(parsed.as_ref().unwrap_or(&Value::String(text.clone()))),
        };

        let mut result = NormalizedResult {
            success: false,
            content: None,
            token_usage: None,
            status_code: Some(status.as_u16()),
            latency_ms,
            raw_request: prepared.redacted,
            raw_response: Some(raw_response),
            error: None,
        };

        if !status.is_success() {
            let message = parsed
                .as_ref()
                .and_then(upstream_error_message)
                .unwrap_or_else(|| format!("上游返回状态码 {}", status.as_u16()));
            result.error = Some(DispatchFailure {
                kind: ErrorKind::UpstreamError,
                message: redactor.text(&message),
            });
        } else {
            match parsed.as_ref().map(|body| read_response(provider, body)) {
                Some(Ok((content, usage))) => {
                    result.success = true;
                    result.content = content;
                    result.token_usage = usage;
                }
                Some(Err(message)) => {
                    result.error = Some(DispatchFailure {
                        kind: ErrorKind::ResponseMappingError,
                        message,
                    });
                }
                None => {
                    result.error = Some(DispatchFailure {
                        kind: ErrorKind::ResponseMappingError,
                        message: "上游响应不是有效的 JSON".to_string(),
                    });
                }
            }
        }

        linfo!(
            "system",
            LogStage::Response,
            LogComponent::Dispatcher,
            "dispatch_complete",
            if result.success { "上游调用成功" } else { "上游调用失败" },
            provider = %provider.identifier,
            model = %model.code,
            status = status.as_u16(),
            latency_ms = latency_ms,
            error_kind = ?result.error_kind()
        );

        Ok(result)
    }
}

/// 按认证方式得到凭据值。header 中带认证方案前缀，query/body 中为原始密钥
fn credential_for(provider: &ProviderWithSecret) -> Option<String> {
    let key = provider.api_key().expose_secret();
    match (provider.auth_type, provider.auth_location) {
        (AuthType::None, _) => None,
        (AuthType::Bearer, AuthLocation::Header) => Some(format!("Bearer {key}")),
        (AuthType::Basic, AuthLocation::Header) => Some(format!("Basic {}", STANDARD.encode(key))),
        _ => Some(key.to_string()),
    }
}

fn prepare(
    provider: &ProviderWithSecret,
    model: &Model,
    request: &DispatchRequest,
    credential: Option<&str>,
    redactor: &Redactor,
) -> std::result::Result<PreparedRequest, String> {
    let mut url =
        url::Url::parse(&provider.base_url).map_err(|e| format!("baseUrl 无效: {e}"))?;
    let mut body = build_payload(provider, model, request)?;

    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    for (name, value) in &provider.custom_headers {
        headers.insert(
            header_name(name)?,
            HeaderValue::from_str(value).map_err(|_| format!("请求头 {name} 的值无效"))?,
        );
    }

    // 只复制请求体的可见部分，凭据写入 body 时在副本中以占位符出现
    let mut visible_body = body.clone();
    if let Some(credential) = credential {
        match provider.auth_location {
            AuthLocation::Header => {
                let mut value = HeaderValue::from_str(credential)
                    .map_err(|_| "凭据包含无法放入请求头的字符".to_string())?;
                value.set_sensitive(true);
                headers.insert(header_name(&provider.auth_key_name)?, value);
            }
            AuthLocation::Query => {
                url.query_pairs_mut()
                    .append_pair(&provider.auth_key_name, credential);
            }
            AuthLocation::Body => {
                inject(&mut body, &provider.auth_key_name, json!(credential))
                    .map_err(|e| format!("凭据写入请求体失败: {e}"))?;
                inject(&mut visible_body, &provider.auth_key_name, json!(REDACTED))
                    .map_err(|e| format!("凭据写入请求体失败: {e}"))?;
            }
        }
    }

    let redacted = RawRequest {
        url: redactor.text(url.as_str()),
        method: "POST".to_string(),
        headers: redactor.headers(&headers),
        body: redactor.value(&visible_body),
    };

    Ok(PreparedRequest {
        url,
        headers,
        body,
        redacted,
    })
}

/// 按请求映射把逻辑字段写入空白的请求体骨架
fn build_payload(
    provider: &ProviderWithSecret,
    model: &Model,
    request: &DispatchRequest,
) -> std::result::Result<Value, String> {
    let mut payload = json!({});
    for (field, entry) in &provider.request_mapping {
        let value = match field.as_str() {
            request_fields::MODEL => Some(json!(model.code)),
            request_fields::MESSAGES => Some(json!([{"role": "user", "content": request.message}])),
            request_fields::PROMPT => Some(json!(request.message)),
            other => {
                let parameter = model.parameter(other);
                let value = request
                    .parameters
                    .get(other)
                    .cloned()
                    .or_else(|| parameter.and_then(|p| p.default.clone()));
                if let (Some(parameter), Some(value)) = (parameter, &value) {
                    if let Some(problem) = parameter.value_problem(value) {
                        return Err(problem);
                    }
                }
                if value.is_none() && parameter.is_some_and(|p| p.required) {
                    return Err(format!("缺少必填参数 {other}"));
                }
                value
            }
        };

        if let Some(value) = value {
            entry
                .inject_into(&mut payload, value)
                .map_err(|e| format!("字段 {field} 映射失败: {e}"))?;
        }
    }
    Ok(payload)
}

/// 从 2xx 响应中读取 content 与用量
fn read_response(
    provider: &ProviderWithSecret,
    body: &Value,
) -> std::result::Result<(Option<String>, Option<i64>), String> {
    let entry = provider
        .response_mapping
        .get(response_fields::CONTENT)
        .ok_or_else(|| "响应映射缺少 content".to_string())?;
    let content = match entry
        .extract_from(body)
        .map_err(|e| format!("content 提取失败: {e}"))?
    {
        Value::Null => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    };

    let usage = match read_usage(provider, body, response_fields::USAGE)? {
        Some(total) => Some(total),
        None => match (
            read_usage(provider, body, response_fields::PROMPT_TOKENS)?,
            read_usage(provider, body, response_fields::COMPLETION_TOKENS)?,
        ) {
            (None, None) => None,
            (prompt, completion) => {
                Some(prompt.unwrap_or(0).saturating_add(completion.unwrap_or(0)))
            }
        },
    };

    Ok((content, usage))
}

/// 读取单个用量字段。字段未配置或路径缺失视为无用量，转换失败则整体失败
fn read_usage(
    provider: &ProviderWithSecret,
    body: &Value,
    field: &str,
) -> std::result::Result<Option<i64>, String> {
    let Some(entry) = provider.response_mapping.get(field) else {
        return Ok(None);
    };
    let value = match entry.extract_from(body) {
        Ok(value) => value,
        Err(MappingError::PathNotFound { .. }) => return Ok(None),
        Err(e) => return Err(format!("{field} 提取失败: {e}")),
    };
    let count = token_count(&value);
    if count.is_none() && !value.is_null() {
        lwarn!(
            "system",
            LogStage::Response,
            LogComponent::Dispatcher,
            "usage_not_numeric",
            "用量字段不是数值，已忽略",
            provider = %provider.identifier,
            field = field
        );
    }
    Ok(count.map(|n| n.max(0)))
}

#[allow(clippy::cast_possible_truncation)]
fn token_count(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.round() as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// 常见厂商错误体中的错误信息
fn upstream_error_message(body: &Value) -> Option<String> {
    ["/error/message", "/message", "/error", "/msg"]
        .iter()
        .filter_map(|pointer| body.pointer(pointer))
        .find_map(|value| value.as_str().map(str::to_string))
}

fn header_name(name: &str) -> std::result::Result<HeaderName, String> {
    HeaderName::from_bytes(name.as_bytes()).map_err(|_| format!("无效的请求头名称 {name}"))
}

#[allow(clippy::cast_possible_truncation)]
fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}
