//! 内存实现的协作者
//!
//! 供场景运行器和测试使用，数据来自 JSON 参考数据或直接注册。

use crate::scheduling::PerformVisitCriteria;
use crate::services::{Clock, EntityLookup, PrivilegeService, RuleFailureTracker};
use chrono::{DateTime, Duration, Utc};
use dataentry_core::{EncounterType, EnrolmentRecord, Program, RuleFailure, SubjectType};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError, RwLock};

/// 参考数据
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReferenceData {
    pub subject_types: Vec<SubjectType>,
    pub encounter_types: Vec<EncounterType>,
    pub programs: Vec<Program>,
    pub enrolments: Vec<EnrolmentRecord>,
}

/// 按名称索引的参考数据
#[derive(Debug, Default)]
pub struct InMemoryEntityStore {
    subject_types: RwLock<HashMap<String, SubjectType>>,
    encounter_types: RwLock<HashMap<String, EncounterType>>,
    programs: RwLock<HashMap<String, Program>>,
    enrolments: RwLock<HashMap<String, EnrolmentRecord>>,
}

impl InMemoryEntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_reference_data(data: ReferenceData) -> Self {
        let store = Self::new();
        data.subject_types
            .into_iter()
            .for_each(|t| store.add_subject_type(t));
        data.encounter_types
            .into_iter()
            .for_each(|t| store.add_encounter_type(t));
        data.programs.into_iter().for_each(|p| store.add_program(p));
        data.enrolments
            .into_iter()
            .for_each(|e| store.add_enrolment(e));
        store
    }

    pub fn add_subject_type(&self, subject_type: SubjectType) {
        self.subject_types
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(subject_type.name.clone(), subject_type);
    }

    pub fn add_encounter_type(&self, encounter_type: EncounterType) {
        self.encounter_types
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(encounter_type.name.clone(), encounter_type);
    }

    pub fn add_program(&self, program: Program) {
        self.programs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(program.name.clone(), program);
    }

    pub fn add_enrolment(&self, enrolment: EnrolmentRecord) {
        self.enrolments
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(enrolment.uuid.clone(), enrolment);
    }
}

fn lookup<T: Clone>(map: &RwLock<HashMap<String, T>>, key: &str) -> Option<T> {
    map.read()
        .unwrap_or_else(PoisonError::into_inner)
        .get(key)
        .cloned()
}

impl EntityLookup for InMemoryEntityStore {
    fn subject_type_by_name(&self, name: &str) -> Option<SubjectType> {
        lookup(&self.subject_types, name)
    }

    fn encounter_type_by_name(&self, name: &str) -> Option<EncounterType> {
        lookup(&self.encounter_types, name)
    }

    fn program_by_name(&self, name: &str) -> Option<Program> {
        lookup(&self.programs, name)
    }

    fn program_enrolment(&self, uuid: &str) -> Option<EnrolmentRecord> {
        lookup(&self.enrolments, uuid)
    }
}

/// 一条 "执行随访" 授权
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VisitGrant {
    pub encounter_type_uuid: String,
    /// 项目随访授权，空为普通随访
    #[serde(default)]
    pub program_uuid: Option<String>,
}

/// 按查询条件文本匹配的权限表
#[derive(Debug, Default)]
pub struct InMemoryPrivileges {
    grants: RwLock<HashMap<(String, String), Vec<String>>>,
}

impl InMemoryPrivileges {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_grants(grants: Vec<VisitGrant>) -> Self {
        let privileges = Self::new();
        for grant in grants {
            privileges.grant_visit(grant);
        }
        privileges
    }

    pub fn grant_visit(&self, grant: VisitGrant) {
        let criteria = match grant.program_uuid {
            Some(program_uuid) => PerformVisitCriteria::for_program(program_uuid),
            None => PerformVisitCriteria::general(),
        };
        self.grant(&criteria.to_string(), criteria.result_field(), grant.encounter_type_uuid);
    }

    pub fn grant(&self, criteria: &str, result_field: &str, uuid: impl Into<String>) {
        self.grants
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry((criteria.to_string(), result_field.to_string()))
            .or_default()
            .push(uuid.into());
    }
}

impl PrivilegeService for InMemoryPrivileges {
    fn allowed_entity_type_uuids_for_criteria(&self, criteria: &str, result_field: &str) -> Vec<String> {
        self.grants
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(criteria.to_string(), result_field.to_string()))
            .cloned()
            .unwrap_or_default()
    }
}

/// 保存上报的规则失败
#[derive(Debug, Default)]
pub struct RuleFailureLog {
    failures: Mutex<Vec<RuleFailure>>,
}

impl RuleFailureLog {
    pub fn failures(&self) -> Vec<RuleFailure> {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl RuleFailureTracker for RuleFailureLog {
    fn report(&self, failure: &RuleFailure) {
        tracing::warn!("Rule failure recorded: {} ({})", failure.rule, failure.message);
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(failure.clone());
    }
}

/// 手动推进的时钟
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn advance(&self, duration: Duration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += duration;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
