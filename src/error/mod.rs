//! # 错误处理
//!
//! 全局统一的 [`HubError`]，以及为错误附加上下文的 [`Context`]

// 1. Core Types
pub use types::{FieldError, HubError};

/// 全局统一的 Result
pub type Result<T> = std::result::Result<T, HubError>;

// 2. Module declarations
pub mod macros;
pub mod types;

// 3. 为错误附加上下文，保留原错误的状态码
pub trait Context<T, E> {
    #[track_caller]
    fn context<C>(self, context: C) -> Result<T>
    where
        C: std::fmt::Display;

    #[track_caller]
    fn with_context<C, F>(self, context: F) -> Result<T>
    where
        F: FnOnce() -> C,
        C: std::fmt::Display;
}

impl<T, E> Context<T, E> for std::result::Result<T, E>
where
    E: Into<HubError>,
{
    #[track_caller]
    fn context<C>(self, context: C) -> Result<T>
    where
        C: std::fmt::Display,
    {
        self.with_context(|| context)
    }

    #[track_caller]
    fn with_context<C, F>(self, context: F) -> Result<T>
    where
        F: FnOnce() -> C,
        C: std::fmt::Display,
    {
        match self {
            Ok(value) => Ok(value),
            Err(error) => {
                let context_message = context().to_string();
                Err(HubError::Context {
                    context: context_message,
                    source: Box::new(error.into()),
                })
            }
        }
    }
}

// 4. 错误分类，决定日志级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// 4xx
    Client,
    /// 5xx，包括上游与网络失败
    Server,
}

impl HubError {
    pub fn category(&self) -> ErrorCategory {
        if self.status_and_code().0.is_server_error() {
            ErrorCategory::Server
        } else {
            ErrorCategory::Client
        }
    }
}
