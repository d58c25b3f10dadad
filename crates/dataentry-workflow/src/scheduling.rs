//! 工作列表扩展
//!
//! 家庭成员登记展开、到期随访加入工作列表以及对应的权限检查。

use crate::services::{Clock, DataEntryContext, RuleFailureTracker, ScheduledVisitOutcome};
use crate::worklist::{
    WorkContext, WorkItem, WorkItemParameters, WorkItemType, WorkLists, ENCOUNTER_TYPE,
    PROGRAM_ENROLMENT_UUID, PROGRAM_NAME, SAVE_AND_PROCEED_LABEL, SUBJECT_UUID, TOTAL_MEMBERS,
};
use dataentry_core::{DataEntryError, Result, ScheduledEncounter, ScheduledVisit};
use serde_json::Value;
use std::fmt;

pub const PERFORM_VISIT_PRIVILEGE: &str = "Perform Visit";
pub const ENCOUNTER_PRIVILEGE_ENTITY: &str = "Encounter";

/// "执行随访" 权限查询条件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PerformVisitCriteria {
    /// 项目随访时为项目标识，普通随访为空
    pub program_uuid: Option<String>,
}

impl PerformVisitCriteria {
    pub fn general() -> Self {
        Self { program_uuid: None }
    }

    pub fn for_program(program_uuid: impl Into<String>) -> Self {
        Self {
            program_uuid: Some(program_uuid.into()),
        }
    }

    /// 查询结果字段
    pub fn result_field(&self) -> &'static str {
        if self.program_uuid.is_some() {
            "programEncounterTypeUuid"
        } else {
            "encounterTypeUuid"
        }
    }
}

impl fmt::Display for PerformVisitCriteria {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "privilege.name = '{}' AND privilege.entityType = '{}' AND ",
            PERFORM_VISIT_PRIVILEGE, ENCOUNTER_PRIVILEGE_ENTITY
        )?;
        match &self.program_uuid {
            Some(uuid) => write!(f, "programUuid = '{}'", uuid),
            None => write!(f, "programUuid = null"),
        }
    }
}

/// 为家庭剩余成员追加登记工作项，返回追加数量
///
/// 户主本身就是当前这条登记，所以从第二位成员开始。
pub fn add_household_members(work_lists: &mut WorkLists, context: &WorkContext) -> usize {
    let total_members = context.total_members();
    let group_subject_uuid = context.subject_uuid().map(str::to_string);

    let items: Vec<WorkItem> = (2..=total_members)
        .map(|member| {
            let mut parameters = WorkItemParameters::new();
            parameters.insert(SAVE_AND_PROCEED_LABEL.into(), Value::from("saveAndAddMember"));
            parameters.insert("household".into(), Value::from(format!("{} of {}", member, total_members)));
            parameters.insert("headOfHousehold".into(), Value::from(false));
            parameters.insert("currentMember".into(), Value::from(member));
            parameters.insert("groupSubjectUUID".into(), Value::from(group_subject_uuid.clone()));
            parameters.insert("message".into(), Value::from("newMemberAddedMsg"));
            parameters.insert(TOTAL_MEMBERS.into(), Value::from(total_members));
            WorkItem::new(WorkItemType::Household, parameters)
        })
        .collect();

    let added = items.len();
    work_lists.add_items_to_current_work_list(items);
    added
}

fn scheduled_visit_parameters(visit: &ScheduledVisit, context: &WorkContext) -> WorkItemParameters {
    let mut parameters = context.to_parameters();
    parameters.insert("name".into(), Value::from(visit.name.clone()));
    parameters.insert(ENCOUNTER_TYPE.into(), Value::from(visit.encounter_type.clone()));
    parameters.insert("earliestDate".into(), Value::from(visit.earliest_date.to_string()));
    parameters.insert("maxDate".into(), Value::from(visit.max_date.to_string()));
    if let Some(program_name) = &visit.program_name {
        parameters.insert(PROGRAM_NAME.into(), Value::from(program_name.clone()));
    }
    if let Some(subject_uuid) = &visit.subject_uuid {
        parameters.insert(SUBJECT_UUID.into(), Value::from(subject_uuid.clone()));
    }
    parameters.insert(
        PROGRAM_ENROLMENT_UUID.into(),
        Value::from(visit.program_enrolment_uuid.clone()),
    );
    parameters
}

/// 把今天到期的随访加入当前工作列表
///
/// 同一项目登记下同一随访类型只加入一次，用户没有执行权限的随访不加入。
pub fn add_next_scheduled_visits(
    work_lists: &mut WorkLists,
    visits: &[ScheduledVisit],
    context: &WorkContext,
    ctx: &DataEntryContext<'_>,
) -> usize {
    let today = ctx.clock.today();
    let mut added = 0;

    for visit in visits.iter().filter(|visit| visit.is_due_on(today)) {
        let enrolment_uuid = visit.program_enrolment_uuid.as_deref();
        let same_visit_type_exists = work_lists
            .current_work_list()
            .map(|list| {
                list.items.iter().any(|item| {
                    item.parameter_str(PROGRAM_ENROLMENT_UUID) == enrolment_uuid
                        && item.parameter_str(ENCOUNTER_TYPE) == Some(visit.encounter_type.as_str())
                })
            })
            .unwrap_or(false);
        if same_visit_type_exists {
            continue;
        }

        if !has_perform_visit_privilege(visit, ctx) {
            tracing::debug!(
                "Not adding {} to work list as user does not have required privilege",
                visit.encounter_type
            );
            continue;
        }

        let item_type = if enrolment_uuid.is_some() {
            WorkItemType::ProgramEncounter
        } else {
            WorkItemType::Encounter
        };
        work_lists.add_items_to_current_work_list(vec![WorkItem::new(
            item_type,
            scheduled_visit_parameters(visit, context),
        )]);
        added += 1;
    }
    added
}

/// 用户是否有执行该随访的权限
///
/// 找不到随访类型时记录警告并视为无权限。
pub fn has_perform_visit_privilege(visit: &ScheduledVisit, ctx: &DataEntryContext<'_>) -> bool {
    let Some(encounter_type) = ctx.entities.encounter_type_by_name(&visit.encounter_type) else {
        tracing::warn!("EncounterType with name {} not found", visit.encounter_type);
        return false;
    };

    let criteria = match &visit.program_enrolment_uuid {
        Some(enrolment_uuid) => {
            // 登记尚未保存时按随访所属项目查找
            let program_uuid = match ctx.entities.program_enrolment(enrolment_uuid) {
                Some(enrolment) => Some(enrolment.program_uuid),
                None => visit
                    .program_name
                    .as_deref()
                    .and_then(|name| ctx.entities.program_by_name(name))
                    .map(|program| program.uuid),
            };
            let Some(program_uuid) = program_uuid else {
                tracing::warn!(
                    "Program for enrolment {} not found, skipping {}",
                    enrolment_uuid,
                    visit.encounter_type
                );
                return false;
            };
            PerformVisitCriteria::for_program(program_uuid)
        }
        None => PerformVisitCriteria::general(),
    };

    ctx.privileges
        .allowed_entity_type_uuids_for_criteria(&criteria.to_string(), criteria.result_field())
        .contains(&encounter_type.uuid)
}

/// 过滤规则给出的随访计划
///
/// 为其他对象计算随访时的规则失败只上报并丢弃该条，当前对象的失败作为错误返回。
pub fn retain_scheduled_visits(
    outcomes: Vec<ScheduledVisitOutcome>,
    current_subject_uuid: &str,
    tracker: &dyn RuleFailureTracker,
) -> Result<Vec<ScheduledVisit>> {
    let mut visits = Vec::with_capacity(outcomes.len());
    for outcome in outcomes {
        match outcome {
            Ok(visit) => visits.push(visit),
            Err(failure) => match failure.subject_uuid.as_deref() {
                Some(subject) if subject != current_subject_uuid => {
                    tracing::error!(
                        "Dropping scheduled visit for subject {}: rule {} failed: {}",
                        subject,
                        failure.rule,
                        failure.message
                    );
                    tracker.report(&failure);
                }
                _ => {
                    return Err(DataEntryError::RuleEvaluation(format!(
                        "{}: {}",
                        failure.rule, failure.message
                    )))
                }
            },
        }
    }
    Ok(visits)
}

/// 实体上是否已安排过相同的随访 (同类型、同名、同日期窗口)
pub fn is_already_scheduled(existing: &[ScheduledEncounter], visit: &ScheduledVisit) -> bool {
    existing.iter().any(|scheduled| {
        scheduled.encounter_type == visit.encounter_type
            && scheduled.name == visit.name
            && scheduled.earliest_date == visit.earliest_date
            && scheduled.max_date == visit.max_date
    })
}
