//! 转换回调
//!
//! 状态机通过监听器通知界面层：校验失败、需要验证手机号、换页和完成。

use crate::state_machine::{Completion, DataEntryFlow, DataEntryState};
use dataentry_core::{Observation, ValidationResult};
use serde::Serialize;

/// 转换监听器，默认实现全部为空操作
pub trait TransitionListener<F: DataEntryFlow> {
    fn validation_failed(&mut self, _state: &DataEntryState<F>) {}

    fn verify_phone_number(&mut self, _observation: &Observation) {}

    fn pop_verification_view(&mut self) {}

    fn moved_next(&mut self, _state: &DataEntryState<F>) {}

    fn moved_previous(&mut self, _state: &DataEntryState<F>) {}

    /// 计时页停留时间未满
    fn previous_blocked(&mut self, _state: &DataEntryState<F>, _remaining_seconds: u64) {}

    fn completed(&mut self, _state: &DataEntryState<F>, _completion: &Completion) {}
}

/// 不关心任何回调
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopListener;

impl<F: DataEntryFlow> TransitionListener<F> for NoopListener {}

/// 记录下的转换事件
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum TransitionEvent {
    ValidationFailed {
        page: usize,
        failures: Vec<ValidationResult>,
    },
    VerifyPhoneNumber {
        concept: String,
    },
    VerificationViewClosed,
    MovedNext {
        page: usize,
    },
    MovedPrevious {
        page: usize,
    },
    PreviousBlocked {
        page: usize,
        remaining_seconds: u64,
    },
    Completed {
        completion: Completion,
    },
}

/// 按顺序记录所有回调
#[derive(Debug, Clone, Default)]
pub struct RecordingListener {
    events: Vec<TransitionEvent>,
}

impl RecordingListener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> &[TransitionEvent] {
        &self.events
    }

    pub fn take_events(&mut self) -> Vec<TransitionEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn completions(&self) -> Vec<&Completion> {
        self.events
            .iter()
            .filter_map(|event| match event {
                TransitionEvent::Completed { completion } => Some(completion),
                _ => None,
            })
            .collect()
    }

    pub fn last(&self) -> Option<&TransitionEvent> {
        self.events.last()
    }
}

impl<F: DataEntryFlow> TransitionListener<F> for RecordingListener {
    fn validation_failed(&mut self, state: &DataEntryState<F>) {
        self.events.push(TransitionEvent::ValidationFailed {
            page: state.wizard().current_page(),
            failures: state.validation_results().to_vec(),
        });
    }

    fn verify_phone_number(&mut self, observation: &Observation) {
        self.events.push(TransitionEvent::VerifyPhoneNumber {
            concept: observation.concept.clone(),
        });
    }

    fn pop_verification_view(&mut self) {
        self.events.push(TransitionEvent::VerificationViewClosed);
    }

    fn moved_next(&mut self, state: &DataEntryState<F>) {
        self.events.push(TransitionEvent::MovedNext {
            page: state.wizard().current_page(),
        });
    }

    fn moved_previous(&mut self, state: &DataEntryState<F>) {
        self.events.push(TransitionEvent::MovedPrevious {
            page: state.wizard().current_page(),
        });
    }

    fn previous_blocked(&mut self, state: &DataEntryState<F>, remaining_seconds: u64) {
        self.events.push(TransitionEvent::PreviousBlocked {
            page: state.wizard().current_page(),
            remaining_seconds,
        });
    }

    fn completed(&mut self, _state: &DataEntryState<F>, completion: &Completion) {
        self.events.push(TransitionEvent::Completed {
            completion: completion.clone(),
        });
    }
}
