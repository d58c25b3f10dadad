//! 具体录入流程
//!
//! 个体登记、项目登记、随访、取消随访和清单项各自提供实体字段校验、
//! 规则调用以及工作上下文。

use crate::scheduling::{is_already_scheduled, retain_scheduled_visits};
use crate::services::{Clock, DataEntryContext};
use crate::state_machine::{validate_location, DataEntryFlow};
use crate::worklist::{
    WorkContext, ENCOUNTER_TYPE, PROGRAM_ENROLMENT_UUID, PROGRAM_NAME, SUBJECT_TYPE_NAME,
    SUBJECT_UUID, TOTAL_MEMBERS,
};
use chrono::NaiveDate;
use dataentry_core::{
    Checklist, ChecklistItem, Decisions, Encounter, EntityType, Individual, LocationError,
    ObservationValue, ObservationsHolder, ProgramEnrolment, Result, ScheduledEncounter,
    ScheduledVisit, ValidationResult, EMPTY_VALIDATION_MESSAGE,
};

pub const REGISTRATION_DATE: &str = "registrationDate";
pub const REGISTRATION_LOCATION: &str = "registrationLocation";
pub const ENROLMENT_DATE: &str = "enrolmentDateTime";
pub const ENROLMENT_LOCATION: &str = "enrolmentLocation";
pub const ENCOUNTER_DATE: &str = "encounterDateTime";
pub const ENCOUNTER_LOCATION: &str = "encounterLocation";
pub const CANCEL_DATE: &str = "cancelDateTime";
pub const COMPLETION_DATE: &str = "completionDate";

/// 家庭成员数量对应的概念
pub const TOTAL_MEMBERS_CONCEPT: &str = "Total members";

const DATE_IN_FUTURE: &str = "dateInFuture";
const ENROLMENT_BEFORE_REGISTRATION: &str = "enrolmentDateBeforeIndividualRegistrationDate";

/// 必填且不晚于今天的日期
fn validate_date(key: &str, date: Option<NaiveDate>, today: NaiveDate) -> ValidationResult {
    match date {
        None => ValidationResult::failure(key, EMPTY_VALIDATION_MESSAGE),
        Some(date) if date > today => ValidationResult::failure(key, DATE_IN_FUTURE),
        Some(_) => ValidationResult::successful(key),
    }
}

/// 规则给出的随访计划，去掉规则失败和已安排过的
fn scheduled_visits(
    ctx: &DataEntryContext<'_>,
    flow: &impl DataEntryFlow,
    existing: &[ScheduledEncounter],
) -> Result<Vec<ScheduledVisit>> {
    let outcomes = ctx.rules.next_scheduled_visits(&flow.entity(), ctx.clock.today());
    let visits = retain_scheduled_visits(outcomes, flow.subject_uuid(), ctx.rule_failures)?;
    Ok(visits
        .into_iter()
        .filter(|visit| !is_already_scheduled(existing, visit))
        .collect())
}

/// 个体登记
#[derive(Debug, Clone)]
pub struct SubjectRegistration {
    pub individual: Individual,
}

impl SubjectRegistration {
    pub fn new(individual: Individual) -> Self {
        Self { individual }
    }
}

impl DataEntryFlow for SubjectRegistration {
    const ACTION_PREFIX: &'static str = "IRA";

    fn entity_type(&self) -> EntityType {
        EntityType::Individual
    }

    fn entity_uuid(&self) -> &str {
        &self.individual.uuid
    }

    fn subject_uuid(&self) -> &str {
        &self.individual.uuid
    }

    fn observations(&self) -> &ObservationsHolder {
        &self.individual.observations
    }

    fn observations_mut(&mut self) -> &mut ObservationsHolder {
        &mut self.individual.observations
    }

    fn validate_entity(
        &self,
        ctx: &DataEntryContext<'_>,
        location_error: Option<&LocationError>,
    ) -> Vec<ValidationResult> {
        vec![
            validate_date(REGISTRATION_DATE, self.individual.registration_date, ctx.clock.today()),
            validate_location(
                self.individual.registration_location.as_ref(),
                REGISTRATION_LOCATION,
                location_error,
                ctx.settings,
            ),
        ]
    }

    fn static_form_element_ids(&self) -> Vec<String> {
        vec![REGISTRATION_DATE.to_string(), REGISTRATION_LOCATION.to_string()]
    }

    fn validate_against_rules(&self, ctx: &DataEntryContext<'_>) -> Vec<ValidationResult> {
        ctx.rules.validate(&self.entity())
    }

    fn execute_rules(&self, ctx: &DataEntryContext<'_>) -> Decisions {
        ctx.rules.decisions(&self.entity())
    }

    fn next_scheduled_visits(&self, ctx: &DataEntryContext<'_>) -> Result<Vec<ScheduledVisit>> {
        scheduled_visits(ctx, self, &self.individual.scheduled_encounters)
    }

    fn work_context(&self) -> WorkContext {
        let total_members = self
            .individual
            .observations
            .value(TOTAL_MEMBERS_CONCEPT)
            .and_then(ObservationValue::as_numeric)
            .filter(|members| *members > 0.0)
            .map(|members| members as u64)
            .unwrap_or(0);
        WorkContext::new()
            .with(SUBJECT_UUID, self.individual.uuid.clone())
            .with(SUBJECT_TYPE_NAME, self.individual.subject_type_name.clone())
            .with(TOTAL_MEMBERS, total_members)
    }
}

/// 项目登记
#[derive(Debug, Clone)]
pub struct ProgramEnrolmentFlow {
    pub enrolment: ProgramEnrolment,
}

impl ProgramEnrolmentFlow {
    pub fn new(enrolment: ProgramEnrolment) -> Self {
        Self { enrolment }
    }
}

impl DataEntryFlow for ProgramEnrolmentFlow {
    const ACTION_PREFIX: &'static str = "PEA";

    fn entity_type(&self) -> EntityType {
        EntityType::ProgramEnrolment
    }

    fn entity_uuid(&self) -> &str {
        &self.enrolment.uuid
    }

    fn subject_uuid(&self) -> &str {
        &self.enrolment.individual_uuid
    }

    fn program_enrolment_uuid(&self) -> Option<&str> {
        Some(&self.enrolment.uuid)
    }

    fn observations(&self) -> &ObservationsHolder {
        &self.enrolment.observations
    }

    fn observations_mut(&mut self) -> &mut ObservationsHolder {
        &mut self.enrolment.observations
    }

    fn validate_entity(
        &self,
        ctx: &DataEntryContext<'_>,
        location_error: Option<&LocationError>,
    ) -> Vec<ValidationResult> {
        let mut date = validate_date(ENROLMENT_DATE, self.enrolment.enrolment_date, ctx.clock.today());
        let before_registration = matches!(
            (self.enrolment.enrolment_date, self.enrolment.individual_registration_date),
            (Some(enrolled), Some(registered)) if enrolled < registered
        );
        if date.success && before_registration {
            date = ValidationResult::failure(ENROLMENT_DATE, ENROLMENT_BEFORE_REGISTRATION);
        }
        vec![
            date,
            validate_location(
                self.enrolment.enrolment_location.as_ref(),
                ENROLMENT_LOCATION,
                location_error,
                ctx.settings,
            ),
        ]
    }

    fn static_form_element_ids(&self) -> Vec<String> {
        vec![ENROLMENT_DATE.to_string(), ENROLMENT_LOCATION.to_string()]
    }

    fn validate_against_rules(&self, ctx: &DataEntryContext<'_>) -> Vec<ValidationResult> {
        ctx.rules.validate(&self.entity())
    }

    fn execute_rules(&self, ctx: &DataEntryContext<'_>) -> Decisions {
        ctx.rules.decisions(&self.entity())
    }

    fn checklists(&self, ctx: &DataEntryContext<'_>) -> Vec<Checklist> {
        ctx.rules.checklists(&self.entity(), ctx.clock.today())
    }

    fn next_scheduled_visits(&self, ctx: &DataEntryContext<'_>) -> Result<Vec<ScheduledVisit>> {
        scheduled_visits(ctx, self, &self.enrolment.scheduled_encounters)
    }

    fn work_context(&self) -> WorkContext {
        WorkContext::new()
            .with(SUBJECT_UUID, self.enrolment.individual_uuid.clone())
            .with(PROGRAM_ENROLMENT_UUID, self.enrolment.uuid.clone())
            .with(PROGRAM_NAME, self.enrolment.program_name.clone())
    }
}

/// 随访 (普通随访或项目随访)
#[derive(Debug, Clone)]
pub struct EncounterFlow {
    pub encounter: Encounter,
    /// 已安排过的随访
    pub scheduled_encounters: Vec<ScheduledEncounter>,
}

impl EncounterFlow {
    pub fn new(encounter: Encounter) -> Self {
        Self {
            encounter,
            scheduled_encounters: Vec::new(),
        }
    }

    pub fn with_scheduled_encounters(mut self, scheduled: Vec<ScheduledEncounter>) -> Self {
        self.scheduled_encounters = scheduled;
        self
    }
}

fn encounter_work_context(encounter: &Encounter) -> WorkContext {
    let mut context = WorkContext::new()
        .with(SUBJECT_UUID, encounter.individual_uuid.clone())
        .with(ENCOUNTER_TYPE, encounter.encounter_type.clone());
    if let Some(enrolment_uuid) = &encounter.program_enrolment_uuid {
        context = context.with(PROGRAM_ENROLMENT_UUID, enrolment_uuid.clone());
    }
    if let Some(program_name) = &encounter.program_name {
        context = context.with(PROGRAM_NAME, program_name.clone());
    }
    context
}

impl DataEntryFlow for EncounterFlow {
    const ACTION_PREFIX: &'static str = "EA";

    fn entity_type(&self) -> EntityType {
        self.encounter.entity_type()
    }

    fn entity_uuid(&self) -> &str {
        &self.encounter.uuid
    }

    fn subject_uuid(&self) -> &str {
        &self.encounter.individual_uuid
    }

    fn program_enrolment_uuid(&self) -> Option<&str> {
        self.encounter.program_enrolment_uuid.as_deref()
    }

    fn observations(&self) -> &ObservationsHolder {
        &self.encounter.observations
    }

    fn observations_mut(&mut self) -> &mut ObservationsHolder {
        &mut self.encounter.observations
    }

    fn validate_entity(
        &self,
        ctx: &DataEntryContext<'_>,
        location_error: Option<&LocationError>,
    ) -> Vec<ValidationResult> {
        vec![
            validate_date(ENCOUNTER_DATE, self.encounter.encounter_date, ctx.clock.today()),
            validate_location(
                self.encounter.encounter_location.as_ref(),
                ENCOUNTER_LOCATION,
                location_error,
                ctx.settings,
            ),
        ]
    }

    fn static_form_element_ids(&self) -> Vec<String> {
        vec![ENCOUNTER_DATE.to_string(), ENCOUNTER_LOCATION.to_string()]
    }

    fn validate_against_rules(&self, ctx: &DataEntryContext<'_>) -> Vec<ValidationResult> {
        ctx.rules.validate(&self.entity())
    }

    fn execute_rules(&self, ctx: &DataEntryContext<'_>) -> Decisions {
        ctx.rules.decisions(&self.entity())
    }

    fn next_scheduled_visits(&self, ctx: &DataEntryContext<'_>) -> Result<Vec<ScheduledVisit>> {
        scheduled_visits(ctx, self, &self.scheduled_encounters)
    }

    fn work_context(&self) -> WorkContext {
        encounter_work_context(&self.encounter)
    }
}

/// 取消随访，编辑的是取消原因等答案
#[derive(Debug, Clone)]
pub struct EncounterCancelFlow {
    pub encounter: Encounter,
}

impl EncounterCancelFlow {
    pub fn new(encounter: Encounter) -> Self {
        Self { encounter }
    }
}

impl DataEntryFlow for EncounterCancelFlow {
    const ACTION_PREFIX: &'static str = "ECA";

    fn entity_type(&self) -> EntityType {
        self.encounter.entity_type()
    }

    fn entity_uuid(&self) -> &str {
        &self.encounter.uuid
    }

    fn subject_uuid(&self) -> &str {
        &self.encounter.individual_uuid
    }

    fn program_enrolment_uuid(&self) -> Option<&str> {
        self.encounter.program_enrolment_uuid.as_deref()
    }

    fn observations(&self) -> &ObservationsHolder {
        &self.encounter.cancel_observations
    }

    fn observations_mut(&mut self) -> &mut ObservationsHolder {
        &mut self.encounter.cancel_observations
    }

    fn validate_entity(
        &self,
        ctx: &DataEntryContext<'_>,
        _location_error: Option<&LocationError>,
    ) -> Vec<ValidationResult> {
        vec![validate_date(CANCEL_DATE, self.encounter.cancel_date, ctx.clock.today())]
    }

    fn static_form_element_ids(&self) -> Vec<String> {
        vec![CANCEL_DATE.to_string()]
    }

    fn next_scheduled_visits(&self, ctx: &DataEntryContext<'_>) -> Result<Vec<ScheduledVisit>> {
        scheduled_visits(ctx, self, &[])
    }

    fn work_context(&self) -> WorkContext {
        encounter_work_context(&self.encounter)
    }
}

/// 清单项完成
#[derive(Debug, Clone)]
pub struct ChecklistItemFlow {
    pub item: ChecklistItem,
    pub subject_uuid: String,
}

impl ChecklistItemFlow {
    pub fn new(item: ChecklistItem, subject_uuid: impl Into<String>) -> Self {
        Self {
            item,
            subject_uuid: subject_uuid.into(),
        }
    }
}

impl DataEntryFlow for ChecklistItemFlow {
    const ACTION_PREFIX: &'static str = "ci";

    fn entity_type(&self) -> EntityType {
        EntityType::ChecklistItem
    }

    fn entity_uuid(&self) -> &str {
        &self.item.uuid
    }

    fn subject_uuid(&self) -> &str {
        &self.subject_uuid
    }

    fn observations(&self) -> &ObservationsHolder {
        &self.item.observations
    }

    fn observations_mut(&mut self) -> &mut ObservationsHolder {
        &mut self.item.observations
    }

    fn validate_entity(
        &self,
        ctx: &DataEntryContext<'_>,
        _location_error: Option<&LocationError>,
    ) -> Vec<ValidationResult> {
        vec![validate_date(COMPLETION_DATE, self.item.completion_date, ctx.clock.today())]
    }

    fn static_form_element_ids(&self) -> Vec<String> {
        vec![COMPLETION_DATE.to_string()]
    }

    fn work_context(&self) -> WorkContext {
        WorkContext::new().with(SUBJECT_UUID, self.subject_uuid.clone())
    }
}
