//! 外部协作者
//!
//! 状态机本身不做任何 I/O，规则执行、权限查询、实体查询和失败上报都通过这里的 trait 完成。

use crate::worklist::WorkLists;
use chrono::{DateTime, NaiveDate, Utc};
use dataentry_core::{
    Checklist, Decisions, EncounterType, EnrolmentRecord, EntityType, FormElementGroup,
    FormElementStatus, ObservationsHolder, Program, RuleFailure, ScheduledVisit, Settings,
    SubjectType, ValidationResult,
};

/// 时钟
pub trait Clock {
    fn now(&self) -> DateTime<Utc>;

    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }
}

/// 系统时钟
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// 交给规则执行的实体只读视图
#[derive(Debug, Clone, Copy)]
pub struct EntityView<'a> {
    pub uuid: &'a str,
    pub entity_type: EntityType,
    /// 所属对象
    pub subject_uuid: &'a str,
    pub program_enrolment_uuid: Option<&'a str>,
    pub observations: &'a ObservationsHolder,
}

/// 单条随访计划的执行结果
pub type ScheduledVisitOutcome = std::result::Result<ScheduledVisit, RuleFailure>;

/// 规则执行服务
pub trait RuleEvaluationService {
    /// 计算页面上每个元素的可见性、必填和校验状态
    fn form_element_statuses(
        &self,
        entity: &EntityView<'_>,
        group: &FormElementGroup,
    ) -> Vec<FormElementStatus>;

    /// 实体级规则校验
    fn validate(&self, _entity: &EntityView<'_>) -> Vec<ValidationResult> {
        Vec::new()
    }

    fn decisions(&self, _entity: &EntityView<'_>) -> Decisions {
        Decisions::default()
    }

    /// 清单的基准日期取 `today`
    fn checklists(&self, _entity: &EntityView<'_>, _today: NaiveDate) -> Vec<Checklist> {
        Vec::new()
    }

    /// 随访日期窗口相对于 `today` 计算
    fn next_scheduled_visits(
        &self,
        _entity: &EntityView<'_>,
        _today: NaiveDate,
    ) -> Vec<ScheduledVisitOutcome> {
        Vec::new()
    }

    /// 领域相关的工作列表调整
    fn update_work_lists(&self, work_lists: WorkLists, _entity: &EntityView<'_>) -> WorkLists {
        work_lists
    }
}

/// 权限服务
pub trait PrivilegeService {
    /// 按权限条件查询允许的实体类型标识
    fn allowed_entity_type_uuids_for_criteria(&self, criteria: &str, result_field: &str) -> Vec<String>;
}

/// 参考数据查询
pub trait EntityLookup {
    fn subject_type_by_name(&self, name: &str) -> Option<SubjectType>;
    fn encounter_type_by_name(&self, name: &str) -> Option<EncounterType>;
    fn program_by_name(&self, name: &str) -> Option<Program>;
    fn program_enrolment(&self, uuid: &str) -> Option<EnrolmentRecord>;
}

/// 规则失败上报
pub trait RuleFailureTracker {
    fn report(&self, failure: &RuleFailure);
}

/// 只记录日志的失败上报
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingRuleFailureTracker;

impl RuleFailureTracker for LoggingRuleFailureTracker {
    fn report(&self, failure: &RuleFailure) {
        tracing::error!(
            "Rule {} failed for subject {:?}: {}",
            failure.rule,
            failure.subject_uuid,
            failure.message
        );
    }
}

/// 一次状态转换所需的全部协作者
#[derive(Clone, Copy)]
pub struct DataEntryContext<'a> {
    pub rules: &'a dyn RuleEvaluationService,
    pub privileges: &'a dyn PrivilegeService,
    pub entities: &'a dyn EntityLookup,
    pub rule_failures: &'a dyn RuleFailureTracker,
    pub settings: &'a Settings,
    pub clock: &'a dyn Clock,
}
