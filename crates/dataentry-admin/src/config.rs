//! 配置管理
//!
//! 从配置文件和环境变量加载数据录入配置，校验后提供异步读取和更新

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use dataentry_core::Settings;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, info};

/// 环境变量前缀，例如 `DATAENTRY__SETTINGS__LOCALE`
pub const ENV_PREFIX: &str = "DATAENTRY";

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];
const LOG_FORMATS: [&str; 2] = ["compact", "full"];

/// 配置管理器
#[derive(Debug)]
pub struct ConfigManager {
    /// 配置数据
    config: Arc<RwLock<DataEntryConfig>>,
    /// 配置文件路径
    config_path: Option<String>,
    /// 配置验证器
    validator: ConfigValidator,
}

/// 数据录入完整配置
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DataEntryConfig {
    /// 用户设置
    pub settings: SettingsConfig,
    /// 运行环境开关
    pub environment: EnvironmentConfig,
    /// 日志配置
    pub logging: LoggingConfig,
}

/// 用户设置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SettingsConfig {
    /// 界面语言
    pub locale: String,
    /// 是否要求采集位置
    pub track_location: bool,
    /// 跳过全部校验 (仅调试)
    pub dev_skip_validation: bool,
}

/// 运行环境开关
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EnvironmentConfig {
    /// 下一步直接跳到最后一页
    pub go_to_last_page_on_next: bool,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// 日志级别
    pub level: String,
    /// 输出格式 (compact / full)
    pub format: String,
}

impl Default for SettingsConfig {
    fn default() -> Self {
        Self {
            locale: "en".to_string(),
            track_location: false,
            dev_skip_validation: false,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "compact".to_string(),
        }
    }
}

impl DataEntryConfig {
    /// 转换为状态机使用的运行时设置
    pub fn to_settings(&self) -> Settings {
        Settings {
            locale: self.settings.locale.clone(),
            track_location: self.settings.track_location,
            dev_skip_validation: self.settings.dev_skip_validation,
            go_to_last_page_on_next: self.environment.go_to_last_page_on_next,
        }
    }
}

/// 配置验证器
#[derive(Debug)]
pub struct ConfigValidator {
    /// 验证规则
    validation_rules: Vec<ValidationRule>,
}

/// 验证规则
#[derive(Debug)]
struct ValidationRule {
    /// 字段路径
    field_path: &'static str,
    /// 验证函数
    validator: fn(&DataEntryConfig) -> Result<()>,
    /// 错误信息
    error_message: &'static str,
}

impl ConfigManager {
    /// 创建配置管理器
    ///
    /// 配置文件不存在时只使用默认值和环境变量。
    pub fn new(config_path: Option<&str>) -> Result<Self> {
        let validator = ConfigValidator::new();
        let config = Self::load_config(config_path)?;
        validator.validate(&config)?;

        Ok(Self {
            config: Arc::new(RwLock::new(config)),
            config_path: config_path.map(str::to_string),
            validator,
        })
    }

    /// 使用给定配置创建，不读取文件和环境变量
    pub fn with_config(config: DataEntryConfig) -> Result<Self> {
        let validator = ConfigValidator::new();
        validator.validate(&config)?;
        Ok(Self {
            config: Arc::new(RwLock::new(config)),
            config_path: None,
            validator,
        })
    }

    /// 加载配置
    fn load_config(config_path: Option<&str>) -> Result<DataEntryConfig> {
        let mut builder = Config::builder();
        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path).required(false));
        }
        let settings = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?;

        let config: DataEntryConfig = settings
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        info!(
            "Configuration loaded successfully from: {}",
            config_path.unwrap_or("<defaults>")
        );
        Ok(config)
    }

    /// 获取当前配置
    pub async fn get_config(&self) -> DataEntryConfig {
        let config = self.config.read().await;
        config.clone()
    }

    /// 获取运行时设置
    pub async fn settings(&self) -> Settings {
        self.config.read().await.to_settings()
    }

    /// 更新配置
    pub async fn update_config(&self, new_config: DataEntryConfig) -> Result<()> {
        // 验证新配置
        self.validator.validate(&new_config)?;

        {
            let mut config = self.config.write().await;
            *config = new_config;
        }

        info!("Configuration updated successfully");
        Ok(())
    }

    /// 重新加载配置
    pub async fn reload_config(&self) -> Result<()> {
        let new_config = Self::load_config(self.config_path.as_deref())?;
        self.update_config(new_config).await
    }

    /// 验证当前配置
    pub async fn validate_config(&self) -> Result<()> {
        let config = self.config.read().await;
        self.validator.validate(&config)
    }
}

impl ConfigValidator {
    /// 创建配置验证器
    pub fn new() -> Self {
        let validation_rules = vec![
            ValidationRule {
                field_path: "settings.locale",
                validator: |config| {
                    if config.settings.locale.trim().is_empty() {
                        Err(anyhow::anyhow!("Locale cannot be empty"))
                    } else {
                        Ok(())
                    }
                },
                error_message: "Invalid locale",
            },
            ValidationRule {
                field_path: "logging.level",
                validator: |config| {
                    let level = config.logging.level.to_lowercase();
                    if LOG_LEVELS.contains(&level.as_str()) {
                        Ok(())
                    } else {
                        Err(anyhow::anyhow!("Unknown log level: {}", config.logging.level))
                    }
                },
                error_message: "Invalid log level",
            },
            ValidationRule {
                field_path: "logging.format",
                validator: |config| {
                    if LOG_FORMATS.contains(&config.logging.format.as_str()) {
                        Ok(())
                    } else {
                        Err(anyhow::anyhow!("Unknown log format: {}", config.logging.format))
                    }
                },
                error_message: "Invalid log format",
            },
        ];

        Self { validation_rules }
    }

    /// 验证配置
    pub fn validate(&self, config: &DataEntryConfig) -> Result<()> {
        for rule in &self.validation_rules {
            if let Err(e) = (rule.validator)(config) {
                error!("Configuration validation failed for {}: {}", rule.field_path, e);
                return Err(anyhow::anyhow!("{}: {}", rule.error_message, e));
            }
        }

        info!("Configuration validation passed");
        Ok(())
    }
}

impl Default for ConfigValidator {
    fn default() -> Self {
        Self::new()
    }
}
