//! 密码摘要

use crate::error::{HubError, Result};

/// 密码最小长度
pub const MIN_PASSWORD_LEN: usize = 6;

pub fn hash_password(password: &str, cost: u32) -> Result<String> {
    Ok(bcrypt::hash(password, cost)?)
}

/// 摘要格式损坏视为校验失败
pub fn verify_password(password: &str, hash: &str) -> bool {
    bcrypt::verify(password, hash).unwrap_or(false)
}

pub fn ensure_password_strength(field: &str, password: &str) -> Result<()> {
    if password.chars().count() >= MIN_PASSWORD_LEN {
        Ok(())
    } else {
        Err(HubError::validation_with_details(
            "密码长度不足",
            vec![crate::error::FieldError::new(
                field,
                format!("密码长度至少{MIN_PASSWORD_LEN}个字符"),
            )],
        ))
    }
}
