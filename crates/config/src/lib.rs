//! 统一配置中心
//!
//! 加载顺序：内置默认值 -> 可选 YAML 文件（`CHAT_CONFIG`，默认 `config/chat.yaml`）
//! -> 环境变量（`CHAT_` 前缀，`__` 表示嵌套，如 `CHAT_AUTH__TOKEN_SECRET`）。

use std::path::{Path, PathBuf};

use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};

pub const CONFIG_PATH_ENV: &str = "CHAT_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "config/chat.yaml";
pub const ENV_PREFIX: &str = "CHAT_";

const MIN_SECRET_LENGTH: usize = 32;
const DEV_SECRET: &str = "dev-secret-key-not-for-production-use-minimum-32-chars";

/// 全局应用配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub hub: HubConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// 未配置 `url` 时使用内存存储
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub url: Option<String>,
    pub max_connections: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthConfig {
    pub token_secret: String,
    #[serde(default)]
    pub bcrypt_cost: Option<u32>,
    /// 允许使用内置的开发密钥，仅限本地开发
    #[serde(default)]
    pub allow_dev_secret: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HubConfig {
    /// 历史回放时广播消息和私聊消息各取的最大条数
    pub history_limit: usize,
    /// 每个连接的出站队列容量
    pub outbound_buffer: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
            },
            database: DatabaseConfig {
                url: None,
                max_connections: 5,
            },
            auth: AuthConfig {
                token_secret: DEV_SECRET.to_string(),
                bcrypt_cost: None,
                allow_dev_secret: false,
            },
            hub: HubConfig {
                history_limit: 100,
                outbound_buffer: 256,
            },
        }
    }
}

impl AppConfig {
    /// 按默认顺序加载并校验配置
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));
        Self::from_figment(Self::figment(&path))
    }

    /// 默认值、YAML 文件和环境变量叠加后的配置源。文件不存在时跳过。
    pub fn figment(path: &Path) -> Figment {
        Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Yaml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    pub fn from_figment(figment: Figment) -> Result<Self, ConfigError> {
        let config: AppConfig = figment.extract().map_err(Box::new)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.auth.token_secret.chars().count() < MIN_SECRET_LENGTH {
            return Err(ConfigError::InvalidTokenSecret(format!(
                "token secret must be at least {MIN_SECRET_LENGTH} characters long"
            )));
        }

        if self.auth.token_secret == DEV_SECRET && !self.auth.allow_dev_secret {
            return Err(ConfigError::InvalidTokenSecret(
                "the built-in development secret requires auth.allow_dev_secret".to_string(),
            ));
        }

        if let Some(cost) = self.auth.bcrypt_cost {
            if !(10..=14).contains(&cost) {
                return Err(ConfigError::InvalidAuthConfig(
                    "bcrypt cost should be between 10-14".to_string(),
                ));
            }
        }

        if self.database.max_connections == 0 {
            return Err(ConfigError::InvalidDatabaseConfig(
                "max connections must be greater than 0".to_string(),
            ));
        }

        if self.hub.history_limit == 0 {
            return Err(ConfigError::InvalidHubConfig(
                "history limit must be greater than 0".to_string(),
            ));
        }

        if self.hub.outbound_buffer == 0 {
            return Err(ConfigError::InvalidHubConfig(
                "outbound buffer must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// 用于日志输出，隐去数据库地址和令牌密钥
    pub fn sanitize(&self) -> String {
        let mut redacted = self.clone();
        if redacted.database.url.is_some() {
            redacted.database.url = Some("[REDACTED]".to_string());
        }
        redacted.auth.token_secret = "[REDACTED]".to_string();
        format!("{redacted:?}")
    }
}

/// 配置错误类型
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),
    #[error("invalid token secret: {0}")]
    InvalidTokenSecret(String),
    #[error("invalid auth configuration: {0}")]
    InvalidAuthConfig(String),
    #[error("invalid database configuration: {0}")]
    InvalidDatabaseConfig(String),
    #[error("invalid hub configuration: {0}")]
    InvalidHubConfig(String),
}
