//! # 数据录入管理模块
//!
//! 负责运行配置的加载、校验、热更新以及日志初始化。

pub mod config;
pub mod logging;

pub use config::{
    ConfigManager, ConfigValidator, DataEntryConfig, EnvironmentConfig, LoggingConfig,
    SettingsConfig,
};
pub use logging::init_logging;
