//! 计时页状态
//!
//! 计时页要求用户在页面上停留最短时间后才能返回上一页。

use chrono::{DateTime, Utc};
use dataentry_core::FormElementGroup;
use serde::{Deserialize, Serialize};

/// 计时状态
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimerState {
    /// 进入页面后多少秒显示问题
    pub start_time: Option<u64>,
    /// 最短停留秒数
    pub stay_time: Option<u64>,
    pub disabled: bool,
    pub entered_at: DateTime<Utc>,
}

impl TimerState {
    pub fn new(group: &FormElementGroup, now: DateTime<Utc>) -> Self {
        Self {
            start_time: group.start_time,
            stay_time: group.stay_time,
            disabled: !group.timed,
            entered_at: now,
        }
    }

    /// 前进到新页面时按新页面重置
    pub fn reset_for_next_page(&mut self, group: &FormElementGroup, now: DateTime<Utc>) {
        *self = Self::new(group, now);
    }

    /// 返回到已经停留过的页面，不再限制
    pub fn reset_for_previous(&mut self, group: &FormElementGroup, now: DateTime<Utc>) {
        *self = Self {
            disabled: true,
            ..Self::new(group, now)
        };
    }

    fn elapsed_seconds(&self, now: DateTime<Utc>) -> i64 {
        (now - self.entered_at).num_seconds()
    }

    /// 停留时间未满时禁止返回
    pub fn is_previous_not_allowed(&self, now: DateTime<Utc>) -> bool {
        if self.disabled {
            return false;
        }
        self.stay_time
            .is_some_and(|stay| self.elapsed_seconds(now) < stay as i64)
    }

    /// 是否已到显示问题的时间
    pub fn display_questions(&self, now: DateTime<Utc>) -> bool {
        self.disabled || self.elapsed_seconds(now) >= self.start_time.unwrap_or(0) as i64
    }

    pub fn remaining_stay_seconds(&self, now: DateTime<Utc>) -> u64 {
        if self.disabled {
            return 0;
        }
        let remaining = self.stay_time.unwrap_or(0) as i64 - self.elapsed_seconds(now);
        remaining.max(0) as u64
    }
}
