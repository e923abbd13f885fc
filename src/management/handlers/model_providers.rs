//! # 模型服务商管理处理器
//!
//! 读取接口与对话调用需要登录，写操作与连接测试需要管理员权限。

use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    response::{IntoResponse, Response},
};
use serde::Deserialize;

use super::{parse_json, parse_optional_json};
use crate::error::Result;
use crate::logging::{LogComponent, LogStage};
use crate::linfo;
use crate::management::middleware::{AdminContext, CurrentUser};
use crate::management::response::{self, ApiResponse};
use crate::management::server::AppState;
use crate::providers::dispatcher::ErrorKind;
use crate::providers::{
    ChatRequest, CreateProviderRequest, Model, NormalizedResult, TestRequest, UpdateProviderRequest,
    presets,
};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusRequest {
    pub is_active: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelStatusRequest {
    pub is_enabled: bool,
}

/// 服务商列表（不含凭据）
pub async fn list_providers(State(state): State<AppState>, _user: CurrentUser) -> Result<Response> {
    Ok(response::success(state.registry.list().await?))
}

/// 可选的映射预设
pub async fn list_presets(_user: CurrentUser) -> Response {
    response::success(presets::all())
}

pub async fn get_provider(
    State(state): State<AppState>,
    _user: CurrentUser,
    Path(id): Path<String>,
) -> Result<Response> {
    Ok(response::success(state.registry.get_by_id(&id).await?))
}

pub async fn create_provider(
    State(state): State<AppState>,
    AdminContext(admin): AdminContext,
    payload: std::result::Result<Json<CreateProviderRequest>, JsonRejection>,
) -> Result<Response> {
    let created = state.registry.create(parse_json(payload)?).await?;
    linfo!(
        "system",
        LogStage::Response,
        LogComponent::Registry,
        "api_create_provider",
        "管理员创建服务商",
        admin = %admin.username,
        provider_id = %created.id
    );
    Ok(response::created(created))
}

pub async fn update_provider(
    State(state): State<AppState>,
    _admin: AdminContext,
    Path(id): Path<String>,
    payload: std::result::Result<Json<UpdateProviderRequest>, JsonRejection>,
) -> Result<Response> {
    let updated = state.registry.update(&id, parse_json(payload)?).await?;
    Ok(response::success(updated))
}

pub async fn delete_provider(
    State(state): State<AppState>,
    _admin: AdminContext,
    Path(id): Path<String>,
) -> Result<Response> {
    state.registry.delete(&id).await?;
    Ok(response::success_without_data("服务商已删除"))
}

/// 全局启用/停用，停用时级联停用全部模型
pub async fn update_status(
    State(state): State<AppState>,
    _admin: AdminContext,
    Path(id): Path<String>,
    payload: std::result::Result<Json<StatusRequest>, JsonRejection>,
) -> Result<Response> {
    let request = parse_json(payload)?;
    let updated = state
        .registry
        .set_global_enabled(&id, request.is_active)
        .await?;
    Ok(response::success(updated))
}

pub async fn list_models(
    State(state): State<AppState>,
    _user: CurrentUser,
    Path(id): Path<String>,
) -> Result<Response> {
    Ok(response::success(state.registry.list_models(&id).await?))
}

pub async fn replace_models(
    State(state): State<AppState>,
    _admin: AdminContext,
    Path(id): Path<String>,
    payload: std::result::Result<Json<Vec<Model>>, JsonRejection>,
) -> Result<Response> {
    let updated = state.registry.replace_models(&id, parse_json(payload)?).await?;
    Ok(response::success(updated))
}

/// 单个模型开关
pub async fn update_model_status(
    State(state): State<AppState>,
    _admin: AdminContext,
    Path((provider_id, model_code)): Path<(String, String)>,
    payload: std::result::Result<Json<ModelStatusRequest>, JsonRejection>,
) -> Result<Response> {
    let request = parse_json(payload)?;
    let updated = state
        .registry
        .set_model_enabled(&provider_id, &model_code, request.is_enabled)
        .await?;
    Ok(response::success(updated))
}

/// 连接测试。失败结果同样返回已脱敏的请求/响应诊断
pub async fn test_provider(
    State(state): State<AppState>,
    _admin: AdminContext,
    Path(id): Path<String>,
    payload: std::result::Result<Json<TestRequest>, JsonRejection>,
) -> Result<Response> {
    let result = state.tester.test(&id, parse_optional_json(payload)?).await?;
    Ok(dispatch_response(result))
}

/// 通过服务商发送一条消息
pub async fn chat(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
    payload: std::result::Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Response> {
    let result = state.chat.chat(&id, parse_json(payload)?).await?;
    linfo!(
        "system",
        LogStage::Response,
        LogComponent::Chat,
        "api_chat",
        "用户调用服务商",
        user = %user.username,
        provider_id = %id,
        success = result.success
    );
    Ok(dispatch_response(result))
}

/// 成功结果按数据返回，失败结果连同诊断信息一起放入错误外壳
fn dispatch_response(result: NormalizedResult) -> Response {
    if result.success {
        return response::success(result);
    }

    let status = result.http_status();
    let code = match result.error_kind() {
        Some(ErrorKind::UpstreamError) => "UPSTREAM_ERROR",
        Some(ErrorKind::TransportError) => "TRANSPORT_ERROR",
        Some(ErrorKind::RequestMappingError) => "REQUEST_MAPPING_ERROR",
        Some(ErrorKind::ResponseMappingError) | None => "RESPONSE_MAPPING_ERROR",
    };
    let message = result
        .error
        .as_ref()
        .map_or_else(|| "连接测试失败".to_string(), |e| e.message.clone());

    ApiResponse::Failure {
        status,
        code: code.to_string(),
        message,
        data: result,
    }
    .into_response()
}
