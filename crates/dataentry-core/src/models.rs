//! 核心数据模型定义

use crate::condition::Condition;
use crate::observations::{ObservationValue, ObservationsHolder};
use crate::validation::ValidationResult;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// 必填项未作答
pub const EMPTY_VALIDATION_MESSAGE: &str = "emptyValidationMessage";
/// 数值超出范围
pub const NUMERIC_OUT_OF_RANGE: &str = "numericValueOutOfRange";

/// 表单元素 (一个问题)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FormElement {
    pub uuid: String,
    pub name: String,
    pub concept: String,
    #[serde(default)]
    pub mandatory: bool,
    #[serde(default)]
    pub display_order: i32,
    /// 可选答案范围，空表示不限制
    #[serde(default)]
    pub answers_to_show: Vec<String>,
    #[serde(default)]
    pub low_absolute: Option<f64>,
    #[serde(default)]
    pub high_absolute: Option<f64>,
    #[serde(default)]
    pub question_group: bool,
    /// 可见性条件，缺省为始终可见
    #[serde(default)]
    pub show_when: Option<Condition>,
}

impl FormElement {
    pub fn new(uuid: impl Into<String>, name: impl Into<String>, concept: impl Into<String>) -> Self {
        Self {
            uuid: uuid.into(),
            name: name.into(),
            concept: concept.into(),
            mandatory: false,
            display_order: 0,
            answers_to_show: Vec::new(),
            low_absolute: None,
            high_absolute: None,
            question_group: false,
            show_when: None,
        }
    }

    pub fn mandatory(mut self) -> Self {
        self.mandatory = true;
        self
    }

    pub fn with_range(mut self, low: Option<f64>, high: Option<f64>) -> Self {
        self.low_absolute = low;
        self.high_absolute = high;
        self
    }

    pub fn shown_when(mut self, condition: Condition) -> Self {
        self.show_when = Some(condition);
        self
    }

    /// 校验本元素的答案
    pub fn validate(&self, observations: &ObservationsHolder) -> ValidationResult {
        let value = observations.value(&self.concept).filter(|v| !v.is_empty());
        let Some(value) = value else {
            return if self.mandatory {
                ValidationResult::failure(&self.uuid, EMPTY_VALIDATION_MESSAGE)
            } else {
                ValidationResult::successful(&self.uuid)
            };
        };

        if let Some(number) = value.as_numeric() {
            let too_low = self.low_absolute.is_some_and(|low| number < low);
            let too_high = self.high_absolute.is_some_and(|high| number > high);
            if too_low || too_high {
                return ValidationResult::failure(&self.uuid, NUMERIC_OUT_OF_RANGE);
            }
        }
        ValidationResult::successful(&self.uuid)
    }
}

/// 规则计算出的元素状态
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FormElementStatus {
    pub uuid: String,
    pub visible: bool,
    #[serde(default)]
    pub mandatory: Option<bool>,
    #[serde(default)]
    pub answers_to_show: Vec<String>,
    /// 规则计算出的答案
    #[serde(default)]
    pub value: Option<ObservationValue>,
    #[serde(default)]
    pub validation_errors: Vec<String>,
    #[serde(default)]
    pub question_group_index: Option<usize>,
}

impl FormElementStatus {
    pub fn visible(uuid: impl Into<String>) -> Self {
        Self {
            uuid: uuid.into(),
            visible: true,
            mandatory: None,
            answers_to_show: Vec::new(),
            value: None,
            validation_errors: Vec::new(),
            question_group_index: None,
        }
    }

    pub fn hidden(uuid: impl Into<String>) -> Self {
        Self {
            visible: false,
            ..Self::visible(uuid)
        }
    }

    pub fn with_value(mut self, value: ObservationValue) -> Self {
        self.value = Some(value);
        self
    }

    pub fn with_mandatory(mut self, mandatory: bool) -> Self {
        self.mandatory = Some(mandatory);
        self
    }

    pub fn with_answers_to_show(mut self, answers: Vec<String>) -> Self {
        self.answers_to_show = answers;
        self
    }

    pub fn with_validation_error(mut self, message_key: impl Into<String>) -> Self {
        self.validation_errors.push(message_key.into());
        self
    }
}

/// 表单页 (表单元素组)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FormElementGroup {
    pub uuid: String,
    pub name: String,
    pub display_order: i32,
    #[serde(default)]
    pub form_elements: Vec<FormElement>,
    #[serde(default)]
    pub voided: bool,
    /// 是否为计时页
    #[serde(default)]
    pub timed: bool,
    /// 进入页面后多少秒显示问题
    #[serde(default)]
    pub start_time: Option<u64>,
    /// 最短停留秒数
    #[serde(default)]
    pub stay_time: Option<u64>,
}

impl FormElementGroup {
    pub fn new(uuid: impl Into<String>, name: impl Into<String>, display_order: i32) -> Self {
        Self {
            uuid: uuid.into(),
            name: name.into(),
            display_order,
            form_elements: Vec::new(),
            voided: false,
            timed: false,
            start_time: None,
            stay_time: None,
        }
    }

    /// 空表单使用的占位页
    pub fn placeholder() -> Self {
        Self::new("", "", 0)
    }

    pub fn with_element(mut self, element: FormElement) -> Self {
        self.form_elements.push(element);
        self
    }

    pub fn with_timer(mut self, start_time: Option<u64>, stay_time: Option<u64>) -> Self {
        self.timed = true;
        self.start_time = start_time;
        self.stay_time = stay_time;
        self
    }

    pub fn form_element_ids(&self) -> Vec<String> {
        self.form_elements.iter().map(|e| e.uuid.clone()).collect()
    }

    /// 按规则状态过滤出可见元素，并应用必填与可选答案覆盖
    ///
    /// 没有状态的元素视为可见。
    pub fn filter_elements(&self, statuses: &[FormElementStatus]) -> Vec<FormElement> {
        let mut elements: Vec<&FormElement> = self.form_elements.iter().collect();
        elements.sort_by_key(|e| e.display_order);

        elements
            .into_iter()
            .filter_map(|element| {
                let Some(status) = statuses.iter().find(|s| s.uuid == element.uuid) else {
                    return Some(element.clone());
                };
                if !status.visible {
                    return None;
                }
                let mut filtered = element.clone();
                if let Some(mandatory) = status.mandatory {
                    filtered.mandatory = mandatory;
                }
                if !status.answers_to_show.is_empty() {
                    filtered.answers_to_show = status.answers_to_show.clone();
                }
                Some(filtered)
            })
            .collect()
    }

    /// 校验可见元素
    pub fn validate(
        &self,
        observations: &ObservationsHolder,
        filtered: &[FormElement],
    ) -> Vec<ValidationResult> {
        filtered.iter().map(|e| e.validate(observations)).collect()
    }
}

/// 表单
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Form {
    pub uuid: String,
    pub name: String,
    #[serde(default)]
    pub form_element_groups: Vec<FormElementGroup>,
}

impl Form {
    pub fn new(uuid: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            uuid: uuid.into(),
            name: name.into(),
            form_element_groups: Vec::new(),
        }
    }

    pub fn with_group(mut self, group: FormElementGroup) -> Self {
        self.form_element_groups.push(group);
        self
    }

    /// 按显示顺序排列的未作废页面
    pub fn pages(&self) -> Vec<FormElementGroup> {
        let mut pages: Vec<FormElementGroup> = self
            .form_element_groups
            .iter()
            .filter(|g| !g.voided)
            .cloned()
            .collect();
        pages.sort_by_key(|g| g.display_order);
        pages
    }
}

/// 实体类型
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum EntityType {
    Individual,
    ProgramEnrolment,
    ProgramEncounter,
    Encounter,
    ChecklistItem,
}

impl EntityType {
    pub fn schema_name(&self) -> &'static str {
        match self {
            EntityType::Individual => "Individual",
            EntityType::ProgramEnrolment => "ProgramEnrolment",
            EntityType::ProgramEncounter => "ProgramEncounter",
            EntityType::Encounter => "Encounter",
            EntityType::ChecklistItem => "ChecklistItem",
        }
    }
}

/// 运行时设置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Settings {
    pub locale: String,
    /// 是否要求采集位置
    pub track_location: bool,
    /// 忽略所有校验失败，仅用于调试
    pub dev_skip_validation: bool,
    /// 每次下一步都直接跳到最后一页
    pub go_to_last_page_on_next: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            locale: "en".to_string(),
            track_location: false,
            dev_skip_validation: false,
            go_to_last_page_on_next: false,
        }
    }
}

/// 地理位置
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

/// 定位失败代码
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum LocationErrorCode {
    PermissionDenied,
    PermissionNeverAskAgain,
    SettingsNotSatisfied,
    PositionUnavailable,
    Timeout,
    PlayServiceNotAvailable,
    InternalError,
}

/// 最近一次定位失败
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LocationError {
    pub code: LocationErrorCode,
    pub message: Option<String>,
}

impl LocationError {
    pub fn new(code: LocationErrorCode) -> Self {
        Self { code, message: None }
    }
}

/// 对象类型
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SubjectType {
    pub uuid: String,
    pub name: String,
    /// 是否为家庭类型
    #[serde(default)]
    pub household: bool,
}

/// 随访类型
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EncounterType {
    pub uuid: String,
    pub name: String,
}

/// 项目
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Program {
    pub uuid: String,
    pub name: String,
}

/// 已持久化的项目登记
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EnrolmentRecord {
    pub uuid: String,
    pub program_uuid: String,
}

/// 实体上已经安排过的随访
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledEncounter {
    pub name: String,
    pub encounter_type: String,
    pub earliest_date: NaiveDate,
    pub max_date: NaiveDate,
}

/// 个体 (登记对象)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Individual {
    pub uuid: String,
    pub subject_type_name: String,
    pub first_name: String,
    #[serde(default)]
    pub registration_date: Option<NaiveDate>,
    #[serde(default)]
    pub registration_location: Option<GeoPoint>,
    #[serde(default)]
    pub observations: ObservationsHolder,
    #[serde(default)]
    pub scheduled_encounters: Vec<ScheduledEncounter>,
}

impl Individual {
    pub fn new(subject_type_name: impl Into<String>) -> Self {
        Self {
            uuid: crate::utils::random_uuid(),
            subject_type_name: subject_type_name.into(),
            first_name: String::new(),
            registration_date: None,
            registration_location: None,
            observations: ObservationsHolder::default(),
            scheduled_encounters: Vec::new(),
        }
    }
}

/// 项目登记
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProgramEnrolment {
    pub uuid: String,
    pub individual_uuid: String,
    pub program_name: String,
    #[serde(default)]
    pub individual_registration_date: Option<NaiveDate>,
    #[serde(default)]
    pub enrolment_date: Option<NaiveDate>,
    #[serde(default)]
    pub enrolment_location: Option<GeoPoint>,
    #[serde(default)]
    pub observations: ObservationsHolder,
    #[serde(default)]
    pub scheduled_encounters: Vec<ScheduledEncounter>,
}

/// 随访 (普通随访或项目随访)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Encounter {
    pub uuid: String,
    pub individual_uuid: String,
    pub encounter_type: String,
    #[serde(default)]
    pub program_enrolment_uuid: Option<String>,
    #[serde(default)]
    pub program_name: Option<String>,
    #[serde(default)]
    pub encounter_date: Option<NaiveDate>,
    #[serde(default)]
    pub cancel_date: Option<NaiveDate>,
    #[serde(default)]
    pub encounter_location: Option<GeoPoint>,
    #[serde(default)]
    pub observations: ObservationsHolder,
    #[serde(default)]
    pub cancel_observations: ObservationsHolder,
}

impl Encounter {
    pub fn entity_type(&self) -> EntityType {
        if self.program_enrolment_uuid.is_some() {
            EntityType::ProgramEncounter
        } else {
            EntityType::Encounter
        }
    }
}

/// 清单项
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChecklistItem {
    pub uuid: String,
    pub name: String,
    #[serde(default)]
    pub completion_date: Option<NaiveDate>,
    #[serde(default)]
    pub observations: ObservationsHolder,
}

/// 规则安排的下一次随访
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledVisit {
    pub name: String,
    pub encounter_type: String,
    pub earliest_date: NaiveDate,
    pub max_date: NaiveDate,
    #[serde(default)]
    pub program_enrolment_uuid: Option<String>,
    #[serde(default)]
    pub program_name: Option<String>,
    /// 为其他对象安排的随访
    #[serde(default)]
    pub subject_uuid: Option<String>,
}

impl ScheduledVisit {
    /// 按天比较，两端包含
    pub fn is_due_on(&self, day: NaiveDate) -> bool {
        crate::utils::is_within_window(day, self.earliest_date, self.max_date)
    }
}

/// 单条决策
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Decision {
    pub name: String,
    pub value: Vec<String>,
}

/// 规则给出的决策
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Decisions {
    pub registration_decisions: Vec<Decision>,
    pub enrolment_decisions: Vec<Decision>,
    pub encounter_decisions: Vec<Decision>,
}

impl Decisions {
    pub fn is_empty(&self) -> bool {
        self.registration_decisions.is_empty()
            && self.enrolment_decisions.is_empty()
            && self.encounter_decisions.is_empty()
    }
}

/// 规则生成的清单
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Checklist {
    pub name: String,
    pub base_date: NaiveDate,
    pub items: Vec<String>,
}

/// 规则执行失败记录
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RuleFailure {
    pub subject_uuid: Option<String>,
    pub rule: String,
    pub message: String,
}
