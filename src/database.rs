//! # 数据库模块
//!
//! 数据库连接和迁移管理

use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use sea_orm_migration::MigratorTrait;
use std::time::Duration;

use crate::config::DatabaseConfig;
use crate::error::{Context, Result};
use crate::logging::{LogComponent, LogStage};
use crate::{lerror, linfo};

/// 初始化数据库连接
pub async fn init_database(config: &DatabaseConfig) -> Result<DatabaseConnection> {
    config.ensure_database_path()?;

    linfo!(
        "system",
        LogStage::Startup,
        LogComponent::Database,
        "connect",
        "正在连接数据库",
        backend = config.url.split(':').next().unwrap_or("unknown")
    );

    let mut options = ConnectOptions::new(config.url.clone());
    options
        .max_connections(config.max_connections)
        .connect_timeout(Duration::from_secs(config.connect_timeout))
        .sqlx_logging(false);

    let db = Database::connect(options)
        .await
        .context("数据库连接失败")?;

    linfo!(
        "system",
        LogStage::Startup,
        LogComponent::Database,
        "connected",
        "数据库连接成功"
    );
    Ok(db)
}

/// 运行数据库迁移
pub async fn run_migrations(db: &DatabaseConnection) -> Result<()> {
    linfo!(
        "system",
        LogStage::Startup,
        LogComponent::Database,
        "migrate",
        "开始运行数据库迁移"
    );

    ::migration::Migrator::up(db, None)
        .await
        .inspect_err(|e| {
            lerror!(
                "system",
                LogStage::Startup,
                LogComponent::Database,
                "migrate_failed",
                "数据库迁移失败",
                error = %e
            );
        })
        .context("数据库迁移失败")?;

    linfo!(
        "system",
        LogStage::Startup,
        LogComponent::Database,
        "migrated",
        "数据库迁移完成"
    );
    Ok(())
}
