//! 密码重置邮件投递能力

use async_trait::async_trait;

use crate::error::Result;
use crate::logging::{LogComponent, LogStage};
use crate::ldebug;
use crate::providers::dispatcher::REDACTED;

/// 一封待投递的重置邮件
#[derive(Clone, PartialEq, Eq)]
pub struct ResetMessage {
    pub email: String,
    pub username: String,
    /// 含明文令牌的重置链接
    pub reset_link: String,
}

impl ResetMessage {
    /// 令牌段被替换为占位符的链接
    pub fn redacted_link(&self) -> String {
        match self.reset_link.rsplit_once('/') {
            Some((base, _)) => format!("{base}/{REDACTED}"),
            None => REDACTED.to_string(),
        }
    }
}

impl std::fmt::Debug for ResetMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResetMessage")
            .field("email", &self.email)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

#[async_trait]
pub trait ResetMailer: Send + Sync {
    async fn send_reset(&self, message: &ResetMessage) -> Result<()>;
}

/// 只把收件人与脱敏后的链接写入 debug 日志
#[derive(Debug, Default, Clone, Copy)]
pub struct LogMailer;

#[async_trait]
impl ResetMailer for LogMailer {
    async fn send_reset(&self, message: &ResetMessage) -> Result<()> {
        ldebug!(
            "system",
            LogStage::Internal,
            LogComponent::Mailer,
            "send_reset",
            "密码重置邮件（日志投递）",
            email = %message.email,
            username = %message.username,
            reset_link = %message.redacted_link()
        );
        Ok(())
    }
}
