//! 日志初始化

use crate::config::LoggingConfig;
use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

/// 构建日志过滤器，`RUST_LOG` 优先于配置
pub fn build_filter(config: &LoggingConfig) -> Result<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(&config.level)
            .with_context(|| format!("Invalid log level: {}", config.level)),
    }
}

/// 安装全局日志订阅者
///
/// 已经安装过时保留原有订阅者。
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let filter = build_filter(config)?;
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    let installed = match config.format.as_str() {
        "full" => builder.try_init(),
        _ => builder.compact().try_init(),
    };
    if let Err(e) = installed {
        tracing::debug!("Logging already initialised: {}", e);
    }
    Ok(())
}
