//! # 数据录入核心
//!
//! 数据录入系统的核心模块，提供表单与实体模型、观察值容器、校验结果、
//! 声明式条件和错误定义。

pub mod condition;
pub mod error;
pub mod models;
pub mod observations;
pub mod utils;
pub mod validation;

pub use condition::Condition;
pub use error::{DataEntryError, Result};
pub use models::*;
pub use observations::{Observation, ObservationValue, ObservationsHolder};
pub use validation::{ValidationResult, ValidationResults, ValidationType};
