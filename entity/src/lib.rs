//! # Entity 模块
//!
//! 包含所有 Sea-ORM 实体定义

pub mod model_providers;
pub mod users;

pub use model_providers::Entity as ModelProviders;
pub use users::Entity as Users;
