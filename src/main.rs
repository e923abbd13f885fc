//! # Model Hub 主程序
//!
//! 模型服务商管理后端

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

use model_hub::{
    app::AppContext,
    auth::LogMailer,
    config::ConfigManager,
    database, lerror, linfo,
    logging::{self, LogComponent, LogStage},
    management::ManagementServer,
};

#[derive(Parser, Debug)]
#[command(name = "model-hub", version, about = "Model provider management backend")]
struct Cli {
    /// 配置文件路径，默认 config/config.{RUST_ENV}.toml
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// 日志级别
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init_optimized_logging(cli.log_level.as_ref());

    // 在进程启动时记录，供 /api/system/info 计算运行时长
    model_hub::management::handlers::system::init_start_time();

    if let Err(e) = run(cli).await {
        lerror!(
            "system",
            LogStage::Startup,
            LogComponent::Main,
            "service_start_failed",
            "服务启动失败",
            error = ?e
        );
        return Err(e);
    }

    linfo!(
        "system",
        LogStage::Shutdown,
        LogComponent::Main,
        "service_shutdown",
        "服务正常关闭"
    );
    Ok(())
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = ConfigManager::new(cli.config.as_deref())
        .context("配置管理器初始化失败")?
        .config();

    let db = database::init_database(&config.database)
        .await
        .context("数据库连接失败")?;
    database::run_migrations(&db)
        .await
        .context("数据库迁移失败")?;

    let context = AppContext::build(config.clone(), Arc::new(db), Arc::new(LogMailer))
        .context("服务组装失败")?;

    if let Some(admin) = &config.admin {
        context
            .auth
            .ensure_admin(admin)
            .await
            .context("管理员账户初始化失败")?;
    }

    linfo!(
        "system",
        LogStage::Startup,
        LogComponent::Main,
        "service_starting",
        "服务启动",
        address = %config.bind_address()
    );
    ManagementServer::new(Arc::new(context))
        .serve()
        .await
        .context("管理服务器异常退出")?;
    Ok(())
}
