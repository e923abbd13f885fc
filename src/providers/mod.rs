//! # 模型服务商模块
//!
//! 基于数据库配置的服务商管理：厂商差异全部以映射配置表达，由同一个分发器解释执行。

pub mod chat;
pub mod dispatcher;
pub mod field_mapper;
pub mod presets;
pub mod registry;
pub mod tester;
pub mod types;

pub use chat::{ChatRequest, ChatService};
pub use dispatcher::{AdapterDispatcher, DispatchRequest, ErrorKind, NormalizedResult};
pub use field_mapper::{MappingError, PathExpr, TransformRegistry, apply_transform, extract, inject};
pub use registry::ProviderRegistry;
pub use tester::{ConnectionTester, TestRequest};
pub use types::{
    AuthLocation, AuthType, Capability, CapabilityType, CreateProviderRequest, FieldMappings,
    MappingEntry, Model, Parameter, ParameterType, ProviderSummary, ProviderWithSecret,
    UpdateProviderRequest,
};
