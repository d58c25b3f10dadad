//! 错误定义模块

use thiserror::Error;

/// 数据录入系统统一错误类型
///
/// 表单校验失败不属于错误，它们以 `ValidationResult` 的形式返回给调用方。
/// 这里只包含配置、数据格式以及调用方使用不当等问题。
#[derive(Error, Debug)]
pub enum DataEntryError {
    #[error("配置错误: {0}")]
    Config(String),

    #[error("序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("资源未找到: {0}")]
    NotFound(String),

    #[error("规则执行错误: {0}")]
    RuleEvaluation(String),

    #[error("未知操作: {0}")]
    UnknownAction(String),

    #[error("操作 {action} 的参数不匹配, 期望 {expected}")]
    ActionPayloadMismatch { action: String, expected: String },

    #[error("无效状态转换: 从 {from} 到 {event}")]
    InvalidStateTransition { from: String, event: String },
}

/// 数据录入系统统一结果类型
pub type Result<T> = std::result::Result<T, DataEntryError>;
