//! 应用上下文（DI 容器）
//!
//! 统一持有跨模块共享的服务实例，便于在测试中注入替身实现。

use std::sync::Arc;

use crate::auth::{AuthService, JwtManager, PasswordResetService, ResetMailer};
use crate::config::AppConfig;
use crate::crypto::CredentialVault;
use crate::error::Result;
use crate::providers::{AdapterDispatcher, ChatService, ConnectionTester, ProviderRegistry};
use sea_orm::DatabaseConnection;

#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<AppConfig>,
    pub db: Arc<DatabaseConnection>,
    pub registry: ProviderRegistry,
    pub tester: ConnectionTester,
    pub chat: ChatService,
    pub auth: AuthService,
    pub password_reset: PasswordResetService,
}

impl AppContext {
    /// 按配置组装全部服务
    pub fn build(
        config: Arc<AppConfig>,
        db: Arc<DatabaseConnection>,
        mailer: Arc<dyn ResetMailer>,
    ) -> Result<Self> {
        let vault = Arc::new(CredentialVault::new(config.security.encryption_key.as_str())?);
        Self::with_vault(config, db, mailer, vault)
    }

    /// 使用给定的保险库组装，测试中可传入低迭代次数的实例
    pub fn with_vault(
        config: Arc<AppConfig>,
        db: Arc<DatabaseConnection>,
        mailer: Arc<dyn ResetMailer>,
        vault: Arc<CredentialVault>,
    ) -> Result<Self> {
        let registry = ProviderRegistry::new(db.clone(), vault);
        let dispatcher = Arc::new(AdapterDispatcher::from_config(&config.dispatch)?);
        let tester = ConnectionTester::new(
            registry.clone(),
            dispatcher.clone(),
            config.dispatch.default_test_message.as_str(),
        );
        let chat = ChatService::new(registry.clone(), dispatcher);

        let jwt = Arc::new(JwtManager::new(&config.security)?);
        let auth = AuthService::new(db.clone(), jwt, config.security.bcrypt_cost);
        let password_reset = PasswordResetService::new(
            db.clone(),
            mailer,
            &config.password_reset,
            config.security.bcrypt_cost,
        );

        Ok(Self {
            config,
            db,
            registry,
            tester,
            chat,
            auth,
            password_reset,
        })
    }
}
