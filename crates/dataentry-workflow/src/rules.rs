//! 声明式规则
//!
//! 用 JSON 描述元素可见性、规则校验、决策、清单和随访计划，
//! 条件统一用 [`Condition`] 表达。

use crate::services::{EntityView, RuleEvaluationService, ScheduledVisitOutcome};
use chrono::{Duration, NaiveDate};
use dataentry_core::{
    Checklist, Condition, DataEntryError, Decision, Decisions, EntityType, FormElementGroup,
    FormElementStatus, ObservationValue, Result, RuleFailure, ScheduledVisit, ValidationResult,
};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// 元素状态规则
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FormElementRule {
    pub form_element_uuid: String,
    #[serde(default)]
    pub visible_when: Option<Condition>,
    #[serde(default)]
    pub mandatory_when: Option<Condition>,
    #[serde(default)]
    pub answers_to_show: Vec<String>,
    /// 规则计算值
    #[serde(default)]
    pub value: Option<ObservationValue>,
    #[serde(default)]
    pub fail_when: Option<Condition>,
    #[serde(default)]
    pub message_key: Option<String>,
}

/// 实体级校验规则，条件成立时失败
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ValidationRule {
    pub when: Condition,
    pub message_key: String,
    /// 适用的实体类型，空为全部
    #[serde(default)]
    pub entity_types: Vec<EntityType>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum DecisionScope {
    Registration,
    Enrolment,
    #[default]
    Encounter,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DecisionRule {
    pub name: String,
    pub value: Vec<String>,
    #[serde(default)]
    pub when: Option<Condition>,
    #[serde(default)]
    pub scope: DecisionScope,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChecklistRule {
    pub name: String,
    pub items: Vec<String>,
    #[serde(default)]
    pub when: Option<Condition>,
}

/// 随访计划规则，日期窗口相对于参考日期
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VisitScheduleRule {
    pub name: String,
    pub encounter_type: String,
    #[serde(default)]
    pub earliest_offset_days: i64,
    #[serde(default)]
    pub max_offset_days: i64,
    #[serde(default)]
    pub when: Option<Condition>,
    #[serde(default)]
    pub program_name: Option<String>,
    /// 为其他对象安排时的对象标识
    #[serde(default)]
    pub subject_uuid: Option<String>,
    /// 模拟规则执行失败
    #[serde(default)]
    pub failure: Option<String>,
}

/// 全部规则
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct RuleSet {
    pub form_elements: Vec<FormElementRule>,
    pub validations: Vec<ValidationRule>,
    pub decisions: Vec<DecisionRule>,
    pub checklists: Vec<ChecklistRule>,
    pub visit_schedules: Vec<VisitScheduleRule>,
}

impl RuleSet {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&content)
    }
}

fn holds(condition: Option<&Condition>, entity: &EntityView<'_>) -> bool {
    condition.map_or(true, |c| c.evaluate(entity.observations))
}

/// 声明式规则执行器
#[derive(Debug, Clone, Default)]
pub struct DeclarativeRuleEvaluator {
    rules: RuleSet,
}

impl DeclarativeRuleEvaluator {
    pub fn new(rules: RuleSet) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    fn schedule(
        &self,
        rule: &VisitScheduleRule,
        entity: &EntityView<'_>,
        base: NaiveDate,
    ) -> ScheduledVisitOutcome {
        if let Some(message) = &rule.failure {
            return Err(RuleFailure {
                subject_uuid: Some(
                    rule.subject_uuid
                        .clone()
                        .unwrap_or_else(|| entity.subject_uuid.to_string()),
                ),
                rule: rule.name.clone(),
                message: message.clone(),
            });
        }
        Ok(ScheduledVisit {
            name: rule.name.clone(),
            encounter_type: rule.encounter_type.clone(),
            earliest_date: base + Duration::days(rule.earliest_offset_days),
            max_date: base + Duration::days(rule.max_offset_days),
            program_enrolment_uuid: entity.program_enrolment_uuid.map(str::to_string),
            program_name: rule.program_name.clone(),
            subject_uuid: rule.subject_uuid.clone(),
        })
    }
}

impl RuleEvaluationService for DeclarativeRuleEvaluator {
    fn form_element_statuses(
        &self,
        entity: &EntityView<'_>,
        group: &FormElementGroup,
    ) -> Vec<FormElementStatus> {
        group
            .form_elements
            .iter()
            .map(|element| {
                let rule = self
                    .rules
                    .form_elements
                    .iter()
                    .find(|rule| rule.form_element_uuid == element.uuid);

                let visible = holds(element.show_when.as_ref(), entity)
                    && holds(rule.and_then(|r| r.visible_when.as_ref()), entity);
                if !visible {
                    return FormElementStatus::hidden(&element.uuid);
                }

                let mut status = FormElementStatus::visible(&element.uuid);
                let Some(rule) = rule else {
                    return status;
                };
                if let Some(condition) = &rule.mandatory_when {
                    status = status.with_mandatory(condition.evaluate(entity.observations));
                }
                if !rule.answers_to_show.is_empty() {
                    status = status.with_answers_to_show(rule.answers_to_show.clone());
                }
                if let Some(value) = &rule.value {
                    status = status.with_value(value.clone());
                }
                if let (Some(condition), Some(message_key)) = (&rule.fail_when, &rule.message_key) {
                    if condition.evaluate(entity.observations) {
                        status = status.with_validation_error(message_key.clone());
                    }
                }
                status
            })
            .collect()
    }

    fn validate(&self, entity: &EntityView<'_>) -> Vec<ValidationResult> {
        self.rules
            .validations
            .iter()
            .filter(|rule| rule.entity_types.is_empty() || rule.entity_types.contains(&entity.entity_type))
            .filter(|rule| rule.when.evaluate(entity.observations))
            .map(|rule| ValidationResult::rule_failure(rule.message_key.clone()))
            .collect()
    }

    fn decisions(&self, entity: &EntityView<'_>) -> Decisions {
        let mut decisions = Decisions::default();
        for rule in self
            .rules
            .decisions
            .iter()
            .filter(|rule| holds(rule.when.as_ref(), entity))
        {
            let decision = Decision {
                name: rule.name.clone(),
                value: rule.value.clone(),
            };
            match rule.scope {
                DecisionScope::Registration => decisions.registration_decisions.push(decision),
                DecisionScope::Enrolment => decisions.enrolment_decisions.push(decision),
                DecisionScope::Encounter => decisions.encounter_decisions.push(decision),
            }
        }
        decisions
    }

    fn checklists(&self, entity: &EntityView<'_>, today: NaiveDate) -> Vec<Checklist> {
        self.rules
            .checklists
            .iter()
            .filter(|rule| holds(rule.when.as_ref(), entity))
            .map(|rule| Checklist {
                name: rule.name.clone(),
                base_date: today,
                items: rule.items.clone(),
            })
            .collect()
    }

    fn next_scheduled_visits(
        &self,
        entity: &EntityView<'_>,
        today: NaiveDate,
    ) -> Vec<ScheduledVisitOutcome> {
        self.rules
            .visit_schedules
            .iter()
            .filter(|rule| holds(rule.when.as_ref(), entity))
            .map(|rule| self.schedule(rule, entity, today))
            .collect()
    }
}

/// 校验规则集合中引用的元素是否都存在于表单中
pub fn check_form_element_references(rules: &RuleSet, groups: &[FormElementGroup]) -> Result<()> {
    for rule in &rules.form_elements {
        let known = groups
            .iter()
            .flat_map(|group| group.form_elements.iter())
            .any(|element| element.uuid == rule.form_element_uuid);
        if !known {
            return Err(DataEntryError::Config(format!(
                "Form element {} referenced by rule is not in the form",
                rule.form_element_uuid
            )));
        }
    }
    Ok(())
}
