//! # 测试辅助函数
//!
//! 内存数据库、低成本的保险库与配置

use chrono::Utc;
use entity::users;
use sea_orm::{ActiveModelTrait, ConnectOptions, Database, DatabaseConnection, Set};
use sea_orm_migration::MigratorTrait;
use std::sync::Arc;

use crate::app::AppContext;
use crate::auth::ResetMailer;
use crate::config::{AppConfig, SecurityConfig};
use crate::crypto::CredentialVault;

/// 测试中使用的 bcrypt 成本（最低值）
pub const TEST_BCRYPT_COST: u32 = 4;

/// 创建已迁移的内存数据库。内存库按连接隔离，因此只保留一个连接
pub async fn create_test_db() -> DatabaseConnection {
    let mut options = ConnectOptions::new("sqlite::memory:");
    options.max_connections(1).min_connections(1).sqlx_logging(false);

    let db = Database::connect(options)
        .await
        .expect("connect in-memory sqlite");
    migration::Migrator::up(&db, None)
        .await
        .expect("run migrations");
    db
}

/// 低迭代次数的保险库
pub fn test_vault() -> CredentialVault {
    CredentialVault::with_iterations("test-encryption-key", 10).expect("test vault")
}

pub fn test_security_config() -> SecurityConfig {
    SecurityConfig {
        encryption_key: "test-encryption-key".to_string(),
        jwt_secret: "test-jwt-secret-0123456789abcdef0123456789".to_string(),
        bcrypt_cost: TEST_BCRYPT_COST,
        ..SecurityConfig::default()
    }
}

pub fn test_app_config() -> AppConfig {
    let mut config = AppConfig {
        security: test_security_config(),
        ..AppConfig::default()
    };
    config.dispatch.timeout_seconds = 5;
    config
}

/// 组装使用内存数据库的完整上下文
pub async fn create_test_context(mailer: Arc<dyn ResetMailer>) -> AppContext {
    AppContext::with_vault(
        Arc::new(test_app_config()),
        Arc::new(create_test_db().await),
        mailer,
        Arc::new(test_vault()),
    )
    .expect("build test context")
}

/// 直接写入一个普通用户
pub async fn insert_user(
    db: &DatabaseConnection,
    username: &str,
    email: &str,
    password: &str,
) -> users::Model {
    let now = Utc::now().naive_utc();
    users::ActiveModel {
        username: Set(username.to_string()),
        email: Set(email.to_string()),
        password_hash: Set(bcrypt::hash(password, TEST_BCRYPT_COST).expect("hash password")),
        role: Set("user".to_string()),
        reset_token_hash: Set(None),
        reset_token_expires_at: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(db)
    .await
    .expect("insert user")
}
