//! # 配置管理器
//!
//! 加载 TOML 配置文件并应用环境变量覆盖。配置在启动时加载一次，之后只读共享。

use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::AppConfig;
use crate::error::{Context, HubError, Result};

/// 支持的环境变量覆盖
const ENV_OVERRIDES: &[&str] = &[
    "MODEL_HUB_ENCRYPTION_KEY",
    "MODEL_HUB_JWT_SECRET",
    "DATABASE_URL",
    "MODEL_HUB_PORT",
    "MODEL_HUB_ENV",
];

/// 配置管理器
pub struct ConfigManager {
    /// 当前配置
    config: Arc<AppConfig>,
    /// 实际读取的配置文件（不存在时为 None）
    source: Option<PathBuf>,
}

impl ConfigManager {
    /// 按约定路径创建配置管理器
    ///
    /// 优先级：显式路径 > `MODEL_HUB_CONFIG_PATH` > `config/config.{RUST_ENV}.toml`
    pub fn new(explicit_path: Option<&Path>) -> Result<Self> {
        let config_file = match explicit_path {
            Some(path) => path.to_path_buf(),
            None => Self::default_config_path(),
        };

        Self::from_file(&config_file)
    }

    /// 从指定文件创建配置管理器，文件不存在时使用内置默认值
    pub fn from_file(config_path: impl AsRef<Path>) -> Result<Self> {
        let config_path = config_path.as_ref();

        let (mut config, source) = if config_path.exists() {
            (Self::load_config_file(config_path)?, Some(config_path.to_path_buf()))
        } else {
            warn!("配置文件不存在: {}，使用内置默认配置", config_path.display());
            (AppConfig::default(), None)
        };

        let applied = Self::apply_env_overrides(&mut config, |key| env::var(key).ok())?;
        config.validate()?;

        info!("配置管理器初始化完成");
        info!("- 运行环境: {:?}", config.environment);
        info!("- 环境变量覆盖: {} 个", applied);

        Ok(Self {
            config: Arc::new(config),
            source,
        })
    }

    /// 直接包装一个已构建的配置（测试与嵌入场景）
    pub fn from_config(config: AppConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config: Arc::new(config),
            source: None,
        })
    }

    /// 获取当前配置
    pub fn config(&self) -> Arc<AppConfig> {
        Arc::clone(&self.config)
    }

    /// 实际读取的配置文件
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    fn default_config_path() -> PathBuf {
        if let Ok(path) = env::var("MODEL_HUB_CONFIG_PATH") {
            return PathBuf::from(path);
        }
        let env = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());
        PathBuf::from(format!("config/config.{env}.toml"))
    }

    /// 加载配置文件
    fn load_config_file(path: &Path) -> Result<AppConfig> {
        let config_content = std::fs::read_to_string(path)
            .with_context(|| format!("读取配置文件失败: {}", path.display()))?;

        toml::from_str(&config_content)
            .with_context(|| format!("配置文件: {}", path.display()))
    }

    /// 应用环境变量覆盖，返回生效的覆盖个数
    pub(crate) fn apply_env_overrides<F>(config: &mut AppConfig, lookup: F) -> Result<usize>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut applied = 0;
        for key in ENV_OVERRIDES {
            let Some(value) = lookup(key) else {
                continue;
            };
            debug!(
                "应用环境变量覆盖: {} = {}",
                key,
                if key.contains("KEY") || key.contains("SECRET") {
                    "***"
                } else {
                    value.as_str()
                }
            );
            Self::apply_override_to_config(config, key, &value)?;
            applied += 1;
        }
        Ok(applied)
    }

    /// 将环境变量覆盖应用到配置对象
    fn apply_override_to_config(config: &mut AppConfig, key: &str, value: &str) -> Result<()> {
        match key {
            "MODEL_HUB_ENCRYPTION_KEY" => config.security.encryption_key = value.to_string(),
            "MODEL_HUB_JWT_SECRET" => config.security.jwt_secret = value.to_string(),
            "DATABASE_URL" => config.database.url = value.to_string(),
            "MODEL_HUB_PORT" => {
                config.server.port = value.parse().map_err(|e| {
                    HubError::config_with_source(format!("无效的端口号: {value}"), e)
                })?;
            }
            "MODEL_HUB_ENV" => {
                config.environment = value.parse().map_err(HubError::config)?;
            }
            _ => warn!("未知的环境变量覆盖，已忽略: {}", key),
        }
        Ok(())
    }
}
