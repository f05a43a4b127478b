//! 配置管理模块
//! 支持从环境变量和配置文件加载配置

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// 应用配置结构体
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub storage: StorageConfig,
    pub vault: VaultKeyConfig,
    pub bridge: BridgeConfig,
    pub logging: LoggingConfig,
}

/// 存储配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub database_url: String,
    pub max_connections: u32,
}

/// 库主密钥配置
///
/// `key` 直接给出密钥（hex/原始/长口令均可），`passphrase` 走
/// Argon2id + 库盐派生。两者至少设置一个。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultKeyConfig {
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub passphrase: Option<String>,
}

/// 请求桥配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    pub scheme_prefix: String,
    pub redirect_base: String,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String, // "json" or "text"
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_url: std::env::var("COREVAULT_DB")
                .unwrap_or_else(|_| "sqlite://corevault.db".into()),
            max_connections: std::env::var("COREVAULT_DB_MAX_CONNS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(4),
        }
    }
}

impl Default for VaultKeyConfig {
    fn default() -> Self {
        Self {
            key: std::env::var("COREVAULT_KEY").ok(),
            passphrase: std::env::var("COREVAULT_PASSPHRASE").ok(),
        }
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            scheme_prefix: std::env::var("COREVAULT_SCHEME_PREFIX")
                .unwrap_or_else(|_| "corevault://request?".into()),
            redirect_base: std::env::var("COREVAULT_REDIRECT_BASE")
                .unwrap_or_else(|_| "https://corevault.app/callback".into()),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".into()),
            format: std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".into()),
        }
    }
}

impl Config {
    /// 从环境变量加载配置
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            storage: StorageConfig::default(),
            vault: VaultKeyConfig::default(),
            bridge: BridgeConfig::default(),
            logging: LoggingConfig::default(),
        })
    }

    /// 从配置文件加载配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

        let config: Config =
            toml::from_str(&content).with_context(|| "Failed to parse config file as TOML")?;

        Ok(config)
    }

    /// 从环境变量和配置文件合并加载（配置文件优先级更高）
    pub fn from_env_and_file<P: AsRef<Path>>(path: Option<P>) -> Result<Self> {
        let mut config = Self::from_env()?;

        if let Some(path) = path {
            if path.as_ref().exists() {
                config = Self::from_file(path)?;
            }
        }

        Ok(config)
    }

    /// 验证配置有效性
    pub fn validate(&self) -> Result<()> {
        if !self.storage.database_url.starts_with("sqlite:") {
            anyhow::bail!("COREVAULT_DB must be a sqlite:// URL");
        }

        if self.vault.key.is_none() && self.vault.passphrase.is_none() {
            anyhow::bail!("Either COREVAULT_KEY or COREVAULT_PASSPHRASE must be set");
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            anyhow::bail!("LOG_LEVEL must be one of: {:?}", valid_levels);
        }

        if self.logging.format != "json" && self.logging.format != "text" {
            anyhow::bail!("LOG_FORMAT must be 'json' or 'text'");
        }

        if !self.bridge.scheme_prefix.contains("://") {
            anyhow::bail!("Scheme prefix must contain ://");
        }

        Ok(())
    }
}
