//! # 数据库配置

use crate::error::{Context, Result};
use crate::{linfo, logging::{LogComponent, LogStage}};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// 数据库配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// 数据库URL
    pub url: String,
    /// 最大连接数
    pub max_connections: u32,
    /// 连接超时时间（秒）
    pub connect_timeout: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://./data/model_hub.db?mode=rwc".to_string(),
            max_connections: 10,
            connect_timeout: 30,
        }
    }
}

impl DatabaseConfig {
    /// 确保数据库路径存在（仅对SQLite文件数据库）
    pub fn ensure_database_path(&self) -> Result<()> {
        if let Some(db_path) = self.sqlite_file_path() {
            let db_path = Path::new(db_path);

            let missing_parent = db_path
                .parent()
                .filter(|parent| !parent.as_os_str().is_empty() && !parent.exists());
            if let Some(parent) = missing_parent {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("无法创建数据库目录: {}", parent.display()))?;

                linfo!(
                    "system",
                    LogStage::Startup,
                    LogComponent::Database,
                    "create_db_dir",
                    &format!("创建数据库目录: {}", parent.display())
                );
            }
        }

        Ok(())
    }

    /// SQLite 文件数据库的文件路径，内存库或其他数据库返回 None
    fn sqlite_file_path(&self) -> Option<&str> {
        if self.is_memory_database() {
            return None;
        }
        let rest = self
            .url
            .strip_prefix("sqlite://")
            .or_else(|| self.url.strip_prefix("sqlite:"))?;
        Some(rest.split('?').next().unwrap_or(rest))
    }

    /// 检查是否为内存数据库
    pub fn is_memory_database(&self) -> bool {
        self.url.contains(":memory:")
    }
}
