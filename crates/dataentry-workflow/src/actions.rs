//! 动作分发
//!
//! 每个流程有一张以 `前缀.动作名` 为键的处理函数表，界面层按名称分发动作。

use crate::listener::TransitionListener;
use crate::services::DataEntryContext;
use crate::state_machine::{AnswerChange, DataEntryFlow, DataEntryState, NavigationAction};
use dataentry_core::{DataEntryError, Observation, ObservationValue, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const NEXT: &str = "NEXT";
pub const PREVIOUS: &str = "PREVIOUS";
pub const SUMMARY_PAGE: &str = "SUMMARY_PAGE";
pub const PRIMITIVE_VALUE_CHANGE: &str = "PRIMITIVE_VALUE_CHANGE";
pub const TOGGLE_MULTISELECT_ANSWER: &str = "TOGGLE_MULTISELECT_ANSWER";
pub const TOGGLE_SINGLESELECT_ANSWER: &str = "TOGGLE_SINGLESELECT_ANSWER";

/// 动作参数
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ActionPayload {
    #[serde(rename_all = "camelCase")]
    Navigation {
        #[serde(default)]
        phone_number_observation: Option<Observation>,
        #[serde(default)]
        pop_verification_view: bool,
    },
    #[serde(rename_all = "camelCase")]
    PrimitiveValue {
        form_element_uuid: String,
        /// 空表示清除答案
        #[serde(default)]
        value: Option<ObservationValue>,
    },
    #[serde(rename_all = "camelCase")]
    ToggleAnswer {
        form_element_uuid: String,
        answer: String,
    },
}

impl ActionPayload {
    pub fn navigation() -> Self {
        ActionPayload::Navigation {
            phone_number_observation: None,
            pop_verification_view: false,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            ActionPayload::Navigation { .. } => "navigation",
            ActionPayload::PrimitiveValue { .. } => "primitiveValue",
            ActionPayload::ToggleAnswer { .. } => "toggleAnswer",
        }
    }
}

/// 动作处理函数
pub type ActionHandler<F> = fn(
    &DataEntryState<F>,
    ActionPayload,
    &mut dyn TransitionListener<F>,
    &DataEntryContext<'_>,
) -> Result<DataEntryState<F>>;

fn mismatch(action: &str, expected: &str) -> DataEntryError {
    DataEntryError::ActionPayloadMismatch {
        action: action.to_string(),
        expected: expected.to_string(),
    }
}

fn navigation<'a, F: DataEntryFlow>(
    action: &str,
    payload: ActionPayload,
    listener: &'a mut dyn TransitionListener<F>,
) -> Result<NavigationAction<'a, F>> {
    let ActionPayload::Navigation {
        phone_number_observation,
        pop_verification_view,
    } = payload
    else {
        return Err(mismatch(action, "navigation"));
    };
    let mut navigation = NavigationAction::new(listener);
    navigation.phone_number_observation = phone_number_observation;
    navigation.pop_verification_view = pop_verification_view;
    Ok(navigation)
}

fn on_next<F: DataEntryFlow>(
    state: &DataEntryState<F>,
    payload: ActionPayload,
    listener: &mut dyn TransitionListener<F>,
    ctx: &DataEntryContext<'_>,
) -> Result<DataEntryState<F>> {
    state.handle_next(&mut navigation(NEXT, payload, listener)?, ctx)
}

fn on_previous<F: DataEntryFlow>(
    state: &DataEntryState<F>,
    payload: ActionPayload,
    listener: &mut dyn TransitionListener<F>,
    ctx: &DataEntryContext<'_>,
) -> Result<DataEntryState<F>> {
    state.handle_previous(&mut navigation(PREVIOUS, payload, listener)?, ctx)
}

fn on_summary_page<F: DataEntryFlow>(
    state: &DataEntryState<F>,
    payload: ActionPayload,
    listener: &mut dyn TransitionListener<F>,
    ctx: &DataEntryContext<'_>,
) -> Result<DataEntryState<F>> {
    state.handle_summary_page(&mut navigation(SUMMARY_PAGE, payload, listener)?, ctx)
}

fn on_primitive_value_change<F: DataEntryFlow>(
    state: &DataEntryState<F>,
    payload: ActionPayload,
    _listener: &mut dyn TransitionListener<F>,
    ctx: &DataEntryContext<'_>,
) -> Result<DataEntryState<F>> {
    let ActionPayload::PrimitiveValue {
        form_element_uuid,
        value,
    } = payload
    else {
        return Err(mismatch(PRIMITIVE_VALUE_CHANGE, "primitiveValue"));
    };
    let change = value.map_or(AnswerChange::Clear, AnswerChange::Value);
    state.apply_answer(&form_element_uuid, change, ctx)
}

fn on_toggle_multiselect<F: DataEntryFlow>(
    state: &DataEntryState<F>,
    payload: ActionPayload,
    _listener: &mut dyn TransitionListener<F>,
    ctx: &DataEntryContext<'_>,
) -> Result<DataEntryState<F>> {
    let ActionPayload::ToggleAnswer {
        form_element_uuid,
        answer,
    } = payload
    else {
        return Err(mismatch(TOGGLE_MULTISELECT_ANSWER, "toggleAnswer"));
    };
    state.apply_answer(&form_element_uuid, AnswerChange::ToggleMultiSelect(answer), ctx)
}

fn on_toggle_singleselect<F: DataEntryFlow>(
    state: &DataEntryState<F>,
    payload: ActionPayload,
    _listener: &mut dyn TransitionListener<F>,
    ctx: &DataEntryContext<'_>,
) -> Result<DataEntryState<F>> {
    let ActionPayload::ToggleAnswer {
        form_element_uuid,
        answer,
    } = payload
    else {
        return Err(mismatch(TOGGLE_SINGLESELECT_ANSWER, "toggleAnswer"));
    };
    state.apply_answer(&form_element_uuid, AnswerChange::ToggleSingleSelect(answer), ctx)
}

/// 流程的动作表
pub struct ActionMap<F: DataEntryFlow> {
    handlers: HashMap<String, ActionHandler<F>>,
}

impl<F: DataEntryFlow> ActionMap<F> {
    /// 注册流程前缀下的全部标准动作
    pub fn standard() -> Self {
        let mut map = Self {
            handlers: HashMap::new(),
        };
        map.register(NEXT, on_next::<F>);
        map.register(PREVIOUS, on_previous::<F>);
        map.register(SUMMARY_PAGE, on_summary_page::<F>);
        map.register(PRIMITIVE_VALUE_CHANGE, on_primitive_value_change::<F>);
        map.register(TOGGLE_MULTISELECT_ANSWER, on_toggle_multiselect::<F>);
        map.register(TOGGLE_SINGLESELECT_ANSWER, on_toggle_singleselect::<F>);
        map
    }

    pub fn action_name(action: &str) -> String {
        format!("{}.{}", F::ACTION_PREFIX, action)
    }

    pub fn register(&mut self, action: &str, handler: ActionHandler<F>) {
        self.handlers.insert(Self::action_name(action), handler);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// 按完整动作名分发
    pub fn dispatch(
        &self,
        name: &str,
        state: &DataEntryState<F>,
        payload: ActionPayload,
        listener: &mut dyn TransitionListener<F>,
        ctx: &DataEntryContext<'_>,
    ) -> Result<DataEntryState<F>> {
        let handler = self
            .handlers
            .get(name)
            .ok_or_else(|| DataEntryError::UnknownAction(name.to_string()))?;
        tracing::debug!("Dispatching {} with {} payload", name, payload.kind());
        handler(state, payload, listener, ctx)
    }
}

impl<F: DataEntryFlow> Default for ActionMap<F> {
    fn default() -> Self {
        Self::standard()
    }
}
