//! # 模型服务商实体定义
//!
//! 模型服务商表的 Sea-ORM 实体模型。嵌套结构（模型列表、字段映射、自定义请求头）
//! 以 JSON 文本保存。

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// 模型服务商实体
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "model_providers")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    #[sea_orm(unique)]
    pub identifier: String,
    pub name: String,
    pub base_url: String,
    // 凭据密文（hex），明文永不落库
    #[serde(skip_serializing)]
    pub api_key: String,
    pub is_active: bool,
    pub auth_type: String,     // none | basic | bearer | apikey
    pub auth_location: String, // header | query | body
    pub auth_key_name: Option<String>,
    pub custom_headers_json: String,   // {"X-Org": "..."}
    pub request_mapping_json: String,  // {"model": {"path": "model"}, ...}
    pub response_mapping_json: String, // {"content": {"path": "..."}, ...}
    pub models_json: String,           // [{"code": "...", "isEnabled": true, ...}]
    pub token_usage: i64,
    // 乐观并发控制版本号
    pub revision: i32,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
