//! # 管理 API 端到端测试
//!
//! 通过完整路由器验证认证、权限与服务商管理流程

mod common;

use axum::http::{Method, StatusCode};
use pretty_assertions::assert_eq;
use serde_json::json;

use common::{openai_provider, spawn_app};

#[tokio::test]
async fn test_register_login_and_me() {
    let app = spawn_app().await;

    let (status, body) = app
        .send(
            Method::POST,
            "/api/auth/register",
            None,
            Some(json!({ "username": "bob", "email": "Bob@Example.com", "password": "secret1" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["role"], "user");
    assert!(body["data"].get("passwordHash").is_none());

    // 邮箱同样可以登录
    let token = app.login("bob@example.com", "secret1").await;
    let (status, body) = app.send(Method::GET, "/api/auth/me", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["username"], "bob");

    let (status, body) = app
        .send(
            Method::POST,
            "/api/auth/login",
            None,
            Some(json!({ "username": "bob", "password": "wrong-password" })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "AUTH_ERROR");
}

#[tokio::test]
async fn test_duplicate_registration_conflicts() {
    let app = spawn_app().await;
    let (status, _) = app
        .send(
            Method::POST,
            "/api/auth/register",
            None,
            Some(json!({ "username": "alice", "email": "other@example.com", "password": "secret1" })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_protected_routes_require_token() {
    let app = spawn_app().await;

    let (status, _) = app.send(Method::GET, "/api/auth/me", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app
        .send(Method::GET, "/api/model-providers", Some("not-a-jwt"), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_non_admin_can_read_but_not_write() {
    let app = spawn_app().await;
    let token = app.user_token().await;

    let (status, body) = app
        .send(Method::GET, "/api/model-providers", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], json!([]));

    let (status, body) = app
        .send(
            Method::POST,
            "/api/model-providers",
            Some(&token),
            Some(openai_provider("openai", "https://api.openai.com/v1/chat/completions")),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], "PERMISSION_ERROR");
}

#[tokio::test]
async fn test_provider_crud_never_leaks_api_key() {
    let app = spawn_app().await;
    let token = app.admin_token().await;

    let created = app
        .create_provider(
            &token,
            openai_provider("openai", "https://api.openai.com/v1/chat/completions"),
        )
        .await;
    let id = created["id"].as_str().unwrap().to_string();
    assert_eq!(created["identifier"], "openai");
    assert_eq!(created["isActive"], false);
    assert_eq!(created["tokenUsage"], 0);
    assert!(!created.to_string().contains("sk-integration-secret"));

    let (status, body) = app
        .send(Method::GET, &format!("/api/model-providers/{id}"), Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(!body.to_string().contains("sk-integration-secret"));

    let (status, body) = app
        .send(
            Method::PUT,
            &format!("/api/model-providers/{id}"),
            Some(&token),
            Some(json!({ "name": "OpenAI Official" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["name"], "OpenAI Official");
    assert_eq!(body["data"]["identifier"], "openai");

    let (status, body) = app
        .send(Method::GET, &format!("/api/model-providers/{id}/models"), Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 2);

    let (status, _) = app
        .send(Method::DELETE, &format!("/api/model-providers/{id}"), Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app
        .send(Method::GET, &format!("/api/model-providers/{id}"), Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "RESOURCE_NOT_FOUND");
}

#[tokio::test]
async fn test_create_reports_missing_fields() {
    let app = spawn_app().await;
    let token = app.admin_token().await;

    let (status, body) = app
        .send(
            Method::POST,
            "/api/model-providers",
            Some(&token),
            Some(json!({ "name": "Incomplete" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    let fields: Vec<&str> = body["error"]["details"]
        .as_array()
        .unwrap()
        .iter()
        .map(|detail| detail["field"].as_str().unwrap())
        .collect();
    assert!(fields.contains(&"identifier"));
    assert!(fields.contains(&"apiKey"));
}

#[tokio::test]
async fn test_identifier_is_unique_after_normalization() {
    let app = spawn_app().await;
    let token = app.admin_token().await;

    app.create_provider(&token, openai_provider("Zhipu", "https://open.bigmodel.cn/api"))
        .await;

    let (status, body) = app
        .send(
            Method::POST,
            "/api/model-providers",
            Some(&token),
            Some(openai_provider("zhipu ", "https://open.bigmodel.cn/api")),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "RESOURCE_CONFLICT");
}

#[tokio::test]
async fn test_active_provider_cannot_be_deleted() {
    let app = spawn_app().await;
    let token = app.admin_token().await;

    let mut request = openai_provider("openai", "https://api.openai.com/v1/chat/completions");
    request["isActive"] = json!(true);
    let created = app.create_provider(&token, request).await;
    let id = created["id"].as_str().unwrap().to_string();

    let (status, _) = app
        .send(Method::DELETE, &format!("/api/model-providers/{id}"), Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = app
        .send(
            Method::PATCH,
            &format!("/api/model-providers/{id}/status"),
            Some(&token),
            Some(json!({ "isActive": false })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["isActive"], false);

    let (status, _) = app
        .send(Method::DELETE, &format!("/api/model-providers/{id}"), Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_global_disable_cascades_to_models() {
    let app = spawn_app().await;
    let token = app.admin_token().await;

    let mut request = openai_provider("openai", "https://api.openai.com/v1/chat/completions");
    request["isActive"] = json!(true);
    let created = app.create_provider(&token, request).await;
    let id = created["id"].as_str().unwrap().to_string();

    let (status, body) = app
        .send(
            Method::PATCH,
            &format!("/api/model-providers/{id}/status"),
            Some(&token),
            Some(json!({ "isActive": false })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    for model in body["data"]["models"].as_array().unwrap() {
        assert_eq!(model["isEnabled"], false);
    }

    // 重新启用服务商不会自动恢复模型
    let (_, body) = app
        .send(
            Method::PATCH,
            &format!("/api/model-providers/{id}/status"),
            Some(&token),
            Some(json!({ "isActive": true })),
        )
        .await;
    assert_eq!(body["data"]["isActive"], true);
    assert_eq!(body["data"]["models"][0]["isEnabled"], false);
}

#[tokio::test]
async fn test_model_toggle_and_unknown_model() {
    let app = spawn_app().await;
    let token = app.admin_token().await;

    let created = app
        .create_provider(
            &token,
            openai_provider("openai", "https://api.openai.com/v1/chat/completions"),
        )
        .await;
    let id = created["id"].as_str().unwrap().to_string();

    let (status, body) = app
        .send(
            Method::PATCH,
            &format!("/api/model-providers/{id}/models/gpt-4"),
            Some(&token),
            Some(json!({ "isEnabled": false })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let models = body["data"]["models"].as_array().unwrap();
    assert_eq!(models[0]["isEnabled"], false);
    assert_eq!(models[1]["isEnabled"], true);

    let (status, _) = app
        .send(
            Method::PATCH,
            &format!("/api/model-providers/{id}/models/does-not-exist"),
            Some(&token),
            Some(json!({ "isEnabled": false })),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_concurrent_model_toggles_are_not_lost() {
    let app = spawn_app().await;
    let token = app.admin_token().await;

    let codes: Vec<String> = (0..8).map(|i| format!("model-{i}")).collect();
    let mut request = openai_provider("bulk", "https://api.example.com/v1/chat");
    request["models"] = json!(
        codes
            .iter()
            .map(|code| json!({ "code": code, "name": code, "isEnabled": true }))
            .collect::<Vec<_>>()
    );
    let created = app.create_provider(&token, request).await;
    let id = created["id"].as_str().unwrap().to_string();

    let handles: Vec<_> = codes
        .iter()
        .cloned()
        .map(|code| {
            let registry = app.context.registry.clone();
            let id = id.clone();
            tokio::spawn(async move { registry.set_model_enabled(&id, &code, false).await })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let models = app.context.registry.list_models(&id).await.unwrap();
    assert_eq!(models.len(), codes.len());
    assert!(models.iter().all(|model| !model.is_enabled));
}

#[tokio::test]
async fn test_presets_and_system_endpoints() {
    let app = spawn_app().await;
    let token = app.user_token().await;

    let (status, body) = app
        .send(Method::GET, "/api/model-providers/presets", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(!body["data"].as_array().unwrap().is_empty());

    let (status, _) = app.send(Method::GET, "/api/system/health", None, None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app.send(Method::GET, "/ping", None, None).await;
    assert_eq!(status, StatusCode::OK);
}
