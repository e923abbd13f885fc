//! # 错误处理宏

/// 快速创建校验错误的宏
#[macro_export]
macro_rules! validation_error {
    ($msg:expr) => {
        $crate::error::HubError::validation($msg)
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::error::HubError::validation(format!($fmt, $($arg)*))
    };
}

/// 快速创建内部错误的宏
#[macro_export]
macro_rules! internal_error {
    ($msg:expr) => {
        $crate::error::HubError::internal($msg)
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::error::HubError::internal(format!($fmt, $($arg)*))
    };
}

/// 确保条件成立，否则返回配置错误
#[macro_export]
macro_rules! ensure_config {
    ($cond:expr, $msg:expr) => {
        if !($cond) {
            return Err($crate::error::HubError::config($msg));
        }
    };
    ($cond:expr, $fmt:expr, $($arg:tt)*) => {
        if !($cond) {
            return Err($crate::error::HubError::config(format!($fmt, $($arg)*)));
        }
    };
}

/// 确保条件成立，否则返回校验错误
#[macro_export]
macro_rules! ensure_valid {
    ($cond:expr, $msg:expr) => {
        if !($cond) {
            return Err($crate::validation_error!($msg));
        }
    };
    ($cond:expr, $fmt:expr, $($arg:tt)*) => {
        if !($cond) {
            return Err($crate::validation_error!($fmt, $($arg)*));
        }
    };
}
