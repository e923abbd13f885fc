//! # 集成测试公共设施
//!
//! 内存数据库上的完整路由器，以及发送请求、登录等辅助函数

#![allow(dead_code)]

use async_trait::async_trait;
use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Method, Request, StatusCode, header};
use serde_json::{Value, json};
use std::sync::{Arc, Mutex};
use tower::ServiceExt;

use model_hub::app::AppContext;
use model_hub::auth::{RegisterRequest, ResetMailer, ResetMessage};
use model_hub::config::{AdminBootstrapConfig, AppConfig, DatabaseConfig};
use model_hub::crypto::CredentialVault;
use model_hub::management::{AppState, build_router};
use model_hub::{Result, database};

pub const ADMIN_USERNAME: &str = "admin";
pub const ADMIN_PASSWORD: &str = "admin123";
pub const USER_USERNAME: &str = "alice";
pub const USER_PASSWORD: &str = "alice123";

/// 记录重置邮件的投递实现
#[derive(Default)]
pub struct CapturingMailer {
    sent: Mutex<Vec<ResetMessage>>,
}

impl CapturingMailer {
    pub fn last_link(&self) -> Option<String> {
        self.sent
            .lock()
            .unwrap()
            .last()
            .map(|message| message.reset_link.clone())
    }
}

#[async_trait]
impl ResetMailer for CapturingMailer {
    async fn send_reset(&self, message: &ResetMessage) -> Result<()> {
        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }
}

pub struct TestApp {
    pub router: Router,
    pub context: Arc<AppContext>,
    pub mailer: Arc<CapturingMailer>,
}

fn test_config() -> AppConfig {
    let mut config = AppConfig {
        database: DatabaseConfig {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
            ..DatabaseConfig::default()
        },
        ..AppConfig::default()
    };
    config.security.encryption_key = "integration-encryption-key".to_string();
    config.security.jwt_secret = "integration-jwt-secret-0123456789abcdef".to_string();
    config.security.bcrypt_cost = 4;
    config.dispatch.timeout_seconds = 5;
    config.password_reset.frontend_url = "http://localhost/reset".to_string();
    config
}

/// 启动一个带管理员和普通用户的应用
pub async fn spawn_app() -> TestApp {
    let config = Arc::new(test_config());
    let db = database::init_database(&config.database).await.unwrap();
    database::run_migrations(&db).await.unwrap();

    let mailer = Arc::new(CapturingMailer::default());
    let vault = Arc::new(CredentialVault::with_iterations("integration-encryption-key", 10).unwrap());
    let context = Arc::new(
        AppContext::with_vault(config.clone(), Arc::new(db), mailer.clone(), vault).unwrap(),
    );

    context
        .auth
        .ensure_admin(&AdminBootstrapConfig {
            username: ADMIN_USERNAME.to_string(),
            email: "admin@example.com".to_string(),
            password: ADMIN_PASSWORD.to_string(),
        })
        .await
        .unwrap();
    context
        .auth
        .register(RegisterRequest {
            username: USER_USERNAME.to_string(),
            email: "alice@example.com".to_string(),
            password: USER_PASSWORD.to_string(),
        })
        .await
        .unwrap();

    let router = build_router(AppState::new(context.clone()), &config.server);
    TestApp {
        router,
        context,
        mailer,
    }
}

impl TestApp {
    /// 发送请求并解析 JSON 响应体
    pub async fn send(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| {
                Value::String(String::from_utf8_lossy(&bytes).into_owned())
            })
        };
        (status, value)
    }

    /// 发送原样的 JSON 请求体，用于构造格式错误的请求
    pub async fn send_raw(&self, uri: &str, token: &str, body: &str) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    pub async fn login(&self, username: &str, password: &str) -> String {
        let (status, body) = self
            .send(
                Method::POST,
                "/api/auth/login",
                None,
                Some(json!({ "username": username, "password": password })),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "login failed: {body}");
        body["data"]["token"].as_str().unwrap().to_string()
    }

    pub async fn admin_token(&self) -> String {
        self.login(ADMIN_USERNAME, ADMIN_PASSWORD).await
    }

    pub async fn user_token(&self) -> String {
        self.login(USER_USERNAME, USER_PASSWORD).await
    }

    /// 以管理员身份创建服务商，返回响应中的数据
    pub async fn create_provider(&self, token: &str, body: Value) -> Value {
        let (status, response) = self
            .send(Method::POST, "/api/model-providers", Some(token), Some(body))
            .await;
        assert_eq!(status, StatusCode::CREATED, "create failed: {response}");
        response["data"].clone()
    }
}

/// OpenAI 风格的服务商创建请求体
pub fn openai_provider(identifier: &str, base_url: &str) -> Value {
    json!({
        "name": "OpenAI",
        "identifier": identifier,
        "baseUrl": base_url,
        "apiKey": "sk-integration-secret",
        "authType": "bearer",
        "authLocation": "header",
        "authKeyName": "Authorization",
        "requestMapping": {
            "model": { "path": "model" },
            "messages": { "path": "messages" },
            "temperature": { "path": "temperature" }
        },
        "responseMapping": {
            "content": { "path": "choices[0].message.content" },
            "usage": { "path": "usage.total_tokens" }
        },
        "models": [
            {
                "code": "gpt-4",
                "name": "GPT-4",
                "isEnabled": true,
                "parameters": [
                    { "name": "temperature", "type": "number", "default": 0.7, "min": 0, "max": 2 }
                ]
            },
            { "code": "gpt-3.5", "name": "GPT-3.5", "isEnabled": true }
        ]
    })
}
