//! 测试夹具

use crate::flows::SubjectRegistration;
use crate::memory::{InMemoryEntityStore, InMemoryPrivileges, ManualClock, RuleFailureLog, VisitGrant};
use crate::rules::{DeclarativeRuleEvaluator, RuleSet};
use crate::services::{Clock, DataEntryContext};
use chrono::{NaiveDate, TimeZone, Utc};
use dataentry_core::{
    EncounterType, Form, FormElement, FormElementGroup, Individual, Program, ScheduledVisit,
    Settings, SubjectType,
};

pub struct Fixture {
    pub clock: ManualClock,
    pub settings: Settings,
    pub rules: DeclarativeRuleEvaluator,
    pub privileges: InMemoryPrivileges,
    pub entities: InMemoryEntityStore,
    pub rule_failures: RuleFailureLog,
}

impl Fixture {
    pub fn new() -> Self {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
        Self {
            clock: ManualClock::new(now),
            settings: Settings::default(),
            rules: DeclarativeRuleEvaluator::new(RuleSet::default()),
            privileges: InMemoryPrivileges::new(),
            entities: InMemoryEntityStore::new(),
            rule_failures: RuleFailureLog::default(),
        }
    }

    pub fn with_settings(mut self, update: impl FnOnce(&mut Settings)) -> Self {
        update(&mut self.settings);
        self
    }

    pub fn with_rules(mut self, rules: RuleSet) -> Self {
        self.rules = DeclarativeRuleEvaluator::new(rules);
        self
    }

    pub fn context(&self) -> DataEntryContext<'_> {
        DataEntryContext {
            rules: &self.rules,
            privileges: &self.privileges,
            entities: &self.entities,
            rule_failures: &self.rule_failures,
            settings: &self.settings,
            clock: &self.clock,
        }
    }

    pub fn register_encounter_type(&self, name: &str) -> String {
        let uuid = format!("et-{}", name);
        self.entities.add_encounter_type(EncounterType {
            uuid: uuid.clone(),
            name: name.to_string(),
        });
        uuid
    }

    pub fn register_subject_type(&self, name: &str, household: bool) {
        self.entities.add_subject_type(SubjectType {
            uuid: format!("st-{}", name),
            name: name.to_string(),
            household,
        });
    }

    pub fn grant_general_visit(&self, encounter_type: &str) {
        let encounter_type_uuid = self.register_encounter_type(encounter_type);
        self.privileges.grant_visit(VisitGrant {
            encounter_type_uuid,
            program_uuid: None,
        });
    }

    pub fn grant_program_visit(&self, program: &str, encounter_type: &str) {
        let program_uuid = format!("p-{}", program);
        self.entities.add_program(Program {
            uuid: program_uuid.clone(),
            name: program.to_string(),
        });
        let encounter_type_uuid = self.register_encounter_type(encounter_type);
        self.privileges.grant_visit(VisitGrant {
            encounter_type_uuid,
            program_uuid: Some(program_uuid),
        });
    }
}

pub fn visit(encounter_type: &str, earliest: NaiveDate, max: NaiveDate) -> ScheduledVisit {
    ScheduledVisit {
        name: format!("{} visit", encounter_type),
        encounter_type: encounter_type.to_string(),
        earliest_date: earliest,
        max_date: max,
        program_enrolment_uuid: None,
        program_name: None,
        subject_uuid: None,
    }
}

/// 登记日期为夹具当天的个体登记
pub fn registration(fixture: &Fixture) -> SubjectRegistration {
    let mut individual = Individual::new("Individual");
    individual.uuid = "subject-1".to_string();
    individual.registration_date = Some(fixture.clock.today());
    SubjectRegistration::new(individual)
}

pub fn page(uuid: &str, display_order: i32, elements: Vec<FormElement>) -> FormElementGroup {
    elements
        .into_iter()
        .fold(FormElementGroup::new(uuid, uuid, display_order), FormElementGroup::with_element)
}

pub fn form(pages: Vec<FormElementGroup>) -> Form {
    pages
        .into_iter()
        .fold(Form::new("form-1", "Registration"), Form::with_group)
}

/// 只有一个必填数值问题的表单
pub fn single_question_form() -> Form {
    form(vec![page(
        "vitals",
        1,
        vec![FormElement::new("weight", "Weight", "Weight").mandatory()],
    )])
}
