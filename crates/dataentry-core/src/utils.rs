//! 通用工具函数

use chrono::NaiveDate;
use uuid::Uuid;

/// 生成新的实体标识
pub fn random_uuid() -> String {
    Uuid::new_v4().to_string()
}

/// 日期是否落在 [earliest, max] 内
pub fn is_within_window(day: NaiveDate, earliest: NaiveDate, max: NaiveDate) -> bool {
    earliest <= day && day <= max
}
