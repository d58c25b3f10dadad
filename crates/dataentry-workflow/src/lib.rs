//! # 数据录入工作流模块
//!
//! 提供多页表单录入的完整流程管理，包括：
//! - 录入状态机：页面切换、校验汇总、完成时执行规则
//! - 计时页：最短停留时间内禁止返回
//! - 工作列表：家庭成员登记展开、到期随访自动加入
//! - 动作分发：按名称把界面动作路由到状态转换
//! - 声明式规则与内存协作者：供场景运行和测试使用

pub mod actions;
pub mod flows;
pub mod listener;
pub mod memory;
pub mod rules;
pub mod scheduling;
pub mod services;
pub mod state_machine;
pub mod timer;
pub mod wizard;
pub mod worklist;

#[cfg(test)]
mod test_support;

// 重新导出主要类型
pub use actions::{ActionMap, ActionPayload};
pub use flows::{
    ChecklistItemFlow, EncounterCancelFlow, EncounterFlow, ProgramEnrolmentFlow,
    SubjectRegistration,
};
pub use listener::{NoopListener, RecordingListener, TransitionEvent, TransitionListener};
pub use memory::{
    InMemoryEntityStore, InMemoryPrivileges, ManualClock, ReferenceData, RuleFailureLog,
    VisitGrant,
};
pub use rules::{DeclarativeRuleEvaluator, RuleSet};
pub use services::{
    Clock, DataEntryContext, EntityLookup, EntityView, LoggingRuleFailureTracker,
    PrivilegeService, RuleEvaluationService, RuleFailureTracker, SystemClock,
};
pub use state_machine::{
    AnswerChange, Completion, DataEntryFlow, DataEntryState, DataEntryStatus, FlowOptions,
    NavigationAction,
};
pub use timer::TimerState;
pub use wizard::Wizard;
pub use worklist::{WorkContext, WorkItem, WorkItemType, WorkList, WorkListState, WorkLists};
