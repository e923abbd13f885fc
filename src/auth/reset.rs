//! # 密码重置
//!
//! 令牌只以 SHA-256 摘要落库，明文仅出现在投递给用户的链接中。

use chrono::{Duration, NaiveDateTime, Utc};
use entity::{Users, users};
use rand::RngCore;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, IntoActiveModel, QueryFilter,
    Set, sea_query::Expr,
};
use sha2::{Digest, Sha256};
use std::sync::Arc;

use super::mailer::{ResetMailer, ResetMessage};
use super::password::{ensure_password_strength, hash_password};
use super::service::is_valid_email;
use crate::config::PasswordResetConfig;
use crate::error::{FieldError, HubError, Result};
use crate::logging::{LogComponent, LogStage};
use crate::{ensure_valid, lerror, linfo, validation_error};

const TOKEN_BYTES: usize = 32;

const INVALID_LINK: &str = "重置链接无效或已过期";

/// 密码重置服务
#[derive(Clone)]
pub struct PasswordResetService {
    db: Arc<DatabaseConnection>,
    mailer: Arc<dyn ResetMailer>,
    ttl: Duration,
    frontend_url: String,
    bcrypt_cost: u32,
}

impl PasswordResetService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        mailer: Arc<dyn ResetMailer>,
        config: &PasswordResetConfig,
        bcrypt_cost: u32,
    ) -> Self {
        Self {
            db,
            mailer,
            ttl: Duration::hours(config.token_ttl_hours),
            frontend_url: config.frontend_url.trim_end_matches('/').to_string(),
            bcrypt_cost,
        }
    }

    /// 生成重置令牌并投递。投递失败时清除令牌
    pub async fn forgot(&self, email: &str) -> Result<()> {
        let email = email.trim().to_lowercase();
        if !is_valid_email(&email) {
            return Err(HubError::validation_with_details(
                "邮箱格式无效",
                vec![FieldError::new("email", "邮箱格式无效")],
            ));
        }

        let user = Users::find()
            .filter(users::Column::Email.eq(email.as_str()))
            .one(self.db.as_ref())
            .await?
            .ok_or_else(|| HubError::not_found("user", email.as_str()))?;

        let token = generate_token();
        let message = ResetMessage {
            email: user.email.clone(),
            username: user.username.clone(),
            reset_link: format!("{}/{token}", self.frontend_url),
        };
        let user_id = user.id;

        let mut active = user.into_active_model();
        active.reset_token_hash = Set(Some(digest(&token)));
        active.reset_token_expires_at = Set(Some((Utc::now() + self.ttl).naive_utc()));
        active.updated_at = Set(Utc::now().naive_utc());
        let user = active.update(self.db.as_ref()).await?;

        if let Err(err) = self.mailer.send_reset(&message).await {
            lerror!(
                "system",
                LogStage::Error,
                LogComponent::PasswordReset,
                "send_reset_failed",
                "重置邮件投递失败，已撤销令牌",
                user_id = user_id,
                error = %err
            );
            let mut active = user.into_active_model();
            active.reset_token_hash = Set(None);
            active.reset_token_expires_at = Set(None);
            active.update(self.db.as_ref()).await?;
            return Err(HubError::internal_with_source(
                "重置邮件发送失败",
                anyhow::anyhow!("{err}"),
            ));
        }

        linfo!(
            "system",
            LogStage::Internal,
            LogComponent::PasswordReset,
            "forgot",
            "已生成密码重置令牌",
            user_id = user_id
        );
        Ok(())
    }

    /// 检查令牌是否可用
    pub async fn validate(&self, token: &str) -> Result<()> {
        self.find_by_token(token).await.map(|_| ())
    }

    /// 使用令牌设置新密码，令牌随即失效
    ///
    /// 写入以令牌摘要仍在库中为条件，同一令牌的并发重置只有一个成功。
    pub async fn reset(&self, token: &str, new_password: &str) -> Result<()> {
        ensure_password_strength("newPassword", new_password)?;
        let user = self.find_by_token(token).await?;
        let user_id = user.id;
        let password_hash = hash_password(new_password, self.bcrypt_cost)?;
        let now = Utc::now().naive_utc();

        let result = Users::update_many()
            .col_expr(users::Column::PasswordHash, Expr::value(password_hash))
            .col_expr(users::Column::ResetTokenHash, Expr::value(Option::<String>::None))
            .col_expr(
                users::Column::ResetTokenExpiresAt,
                Expr::value(Option::<NaiveDateTime>::None),
            )
            .col_expr(users::Column::UpdatedAt, Expr::value(now))
            .filter(users::Column::Id.eq(user_id))
            .filter(users::Column::ResetTokenHash.eq(digest(token.trim())))
            .filter(users::Column::ResetTokenExpiresAt.gt(now))
            .exec(self.db.as_ref())
            .await?;

        if result.rows_affected == 0 {
            return Err(validation_error!(INVALID_LINK));
        }

        linfo!(
            "system",
            LogStage::Internal,
            LogComponent::PasswordReset,
            "reset",
            "密码已重置",
            user_id = user_id
        );
        Ok(())
    }

    async fn find_by_token(&self, token: &str) -> Result<users::Model> {
        let token = token.trim();
        ensure_valid!(!token.is_empty(), INVALID_LINK);
        Users::find()
            .filter(users::Column::ResetTokenHash.eq(digest(token)))
            .filter(users::Column::ResetTokenExpiresAt.gt(Utc::now().naive_utc()))
            .one(self.db.as_ref())
            .await?
            .ok_or_else(|| validation_error!(INVALID_LINK))
    }
}

fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

fn digest(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}
