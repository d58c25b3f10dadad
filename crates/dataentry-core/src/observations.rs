//! 观察值容器
//!
//! 保存正在编辑的实体上的问答对，并根据可见性规则增删答案。

use crate::models::{FormElement, FormElementStatus};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// 观察值
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "value", rename_all = "camelCase")]
pub enum ObservationValue {
    Text(String),
    Numeric(f64),
    Date(NaiveDate),
    Coded(Vec<String>), // 已选答案
}

impl ObservationValue {
    pub fn as_numeric(&self) -> Option<f64> {
        match self {
            ObservationValue::Numeric(value) => Some(*value),
            ObservationValue::Text(text) => text.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn coded_answers(&self) -> &[String] {
        match self {
            ObservationValue::Coded(answers) => answers,
            _ => &[],
        }
    }

    /// 空文本或空选择视为未作答
    pub fn is_empty(&self) -> bool {
        match self {
            ObservationValue::Text(text) => text.trim().is_empty(),
            ObservationValue::Coded(answers) => answers.is_empty(),
            ObservationValue::Numeric(value) => value.is_nan(),
            ObservationValue::Date(_) => false,
        }
    }
}

/// 单个观察 (概念, 值)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Observation {
    pub concept: String,
    pub value: ObservationValue,
}

impl Observation {
    pub fn new(concept: impl Into<String>, value: ObservationValue) -> Self {
        Self {
            concept: concept.into(),
            value,
        }
    }
}

/// 观察值容器
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct ObservationsHolder {
    observations: Vec<Observation>,
}

impl ObservationsHolder {
    pub fn new(observations: Vec<Observation>) -> Self {
        Self { observations }
    }

    pub fn find(&self, concept: &str) -> Option<&Observation> {
        self.observations.iter().find(|obs| obs.concept == concept)
    }

    pub fn value(&self, concept: &str) -> Option<&ObservationValue> {
        self.find(concept).map(|obs| &obs.value)
    }

    pub fn has_answer(&self, concept: &str) -> bool {
        self.value(concept).is_some_and(|value| !value.is_empty())
    }

    /// 添加或更新答案，空值等同于删除
    pub fn set_value(&mut self, concept: &str, value: ObservationValue) {
        if value.is_empty() {
            self.remove(concept);
            return;
        }
        match self.observations.iter_mut().find(|obs| obs.concept == concept) {
            Some(existing) => existing.value = value,
            None => self.observations.push(Observation::new(concept, value)),
        }
    }

    pub fn remove(&mut self, concept: &str) -> Option<Observation> {
        let position = self.observations.iter().position(|obs| obs.concept == concept)?;
        Some(self.observations.remove(position))
    }

    /// 多选题切换某个答案
    pub fn toggle_multi_select_answer(&mut self, concept: &str, answer: &str) {
        let mut answers = self
            .value(concept)
            .map(|value| value.coded_answers().to_vec())
            .unwrap_or_default();
        match answers.iter().position(|existing| existing == answer) {
            Some(position) => {
                answers.remove(position);
            }
            None => answers.push(answer.to_string()),
        }
        self.set_value(concept, ObservationValue::Coded(answers));
    }

    /// 单选题切换答案，再次选择同一答案即取消
    pub fn toggle_single_select_answer(&mut self, concept: &str, answer: &str) {
        let already_selected = self
            .value(concept)
            .is_some_and(|value| value.coded_answers() == [answer.to_string()]);
        if already_selected {
            self.remove(concept);
        } else {
            self.set_value(concept, ObservationValue::Coded(vec![answer.to_string()]));
        }
    }

    /// 删除已不可见元素的答案，以及不在可选范围内的编码答案
    pub fn remove_non_applicable_obs(
        &mut self,
        all_elements: &[FormElement],
        applicable: &[FormElement],
    ) -> Vec<Observation> {
        let mut removed = Vec::new();
        for element in all_elements {
            match applicable.iter().find(|visible| visible.uuid == element.uuid) {
                None => {
                    if let Some(obs) = self.remove(&element.concept) {
                        removed.push(obs);
                    }
                }
                Some(visible) if !visible.answers_to_show.is_empty() => {
                    let Some(ObservationValue::Coded(answers)) = self.value(&visible.concept)
                    else {
                        continue;
                    };
                    let kept: Vec<String> = answers
                        .iter()
                        .filter(|answer| visible.answers_to_show.contains(answer))
                        .cloned()
                        .collect();
                    if kept.len() != answers.len() {
                        let previous = Observation::new(
                            visible.concept.clone(),
                            ObservationValue::Coded(answers.clone()),
                        );
                        self.set_value(&visible.concept, ObservationValue::Coded(kept));
                        removed.push(previous);
                    }
                }
                Some(_) => {}
            }
        }
        removed
    }

    /// 写入规则计算出的值
    pub fn update_primitive_coded_obs(
        &mut self,
        applicable: &[FormElement],
        statuses: &[FormElementStatus],
    ) {
        for status in statuses {
            let Some(value) = &status.value else { continue };
            if let Some(element) = applicable.iter().find(|e| e.uuid == status.uuid) {
                self.set_value(&element.concept, value.clone());
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Observation> {
        self.observations.iter()
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }
}
