//! 场景文件与执行

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use dataentry_core::{Form, Individual, ObservationsHolder, RuleFailure, Settings};
use dataentry_workflow::actions::NEXT;
use dataentry_workflow::rules::check_form_element_references;
use dataentry_workflow::{
    ActionMap, ActionPayload, DataEntryContext, DataEntryState, DataEntryStatus,
    DeclarativeRuleEvaluator, FlowOptions, InMemoryEntityStore, InMemoryPrivileges, ManualClock,
    RecordingListener, ReferenceData, RuleFailureLog, RuleSet, SubjectRegistration,
    TransitionEvent, VisitGrant, WorkLists,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info, warn};

/// 登记场景
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scenario {
    pub individual: Individual,
    pub form: Form,
    #[serde(default)]
    pub rules: RuleSet,
    #[serde(default)]
    pub reference_data: ReferenceData,
    #[serde(default)]
    pub grants: Vec<VisitGrant>,
    #[serde(default)]
    pub work_lists: Option<WorkLists>,
    /// 场景时钟起点，缺省为当前时间
    #[serde(default)]
    pub now: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_draft: bool,
    /// 为空时一直下一步直到完成或校验失败
    #[serde(default)]
    pub steps: Vec<Step>,
}

/// 一个界面动作
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    /// 动作名，可省略流程前缀
    pub action: String,
    #[serde(default = "ActionPayload::navigation")]
    pub payload: ActionPayload,
    /// 执行前推进时钟的秒数
    #[serde(default)]
    pub advance_seconds: Option<i64>,
}

/// 执行结果
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub status: DataEntryStatus,
    pub page: usize,
    pub events: Vec<TransitionEvent>,
    pub observations: ObservationsHolder,
    pub work_lists: Option<WorkLists>,
    pub rule_failures: Vec<RuleFailure>,
}

impl Scenario {
    pub async fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read scenario {}", path.display()))?;
        Self::from_json(&content)
    }

    /// 用单独的规则文件替换场景内的规则
    pub fn with_rules_file<P: AsRef<Path>>(mut self, path: P) -> Result<Self> {
        let path = path.as_ref();
        self.rules = RuleSet::from_file(path)
            .with_context(|| format!("Failed to load rules {}", path.display()))?;
        check_form_element_references(&self.rules, &self.form.pages())?;
        Ok(self)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let scenario: Scenario =
            serde_json::from_str(json).context("Failed to parse scenario")?;
        check_form_element_references(&scenario.rules, &scenario.form.pages())?;
        Ok(scenario)
    }

    /// 按步骤运行登记流程
    pub fn run(self, settings: &Settings) -> Result<Report> {
        let clock = ManualClock::new(self.now.unwrap_or_else(Utc::now));
        let rules = DeclarativeRuleEvaluator::new(self.rules);
        let entities = InMemoryEntityStore::from_reference_data(self.reference_data);
        let privileges = InMemoryPrivileges::from_grants(self.grants);
        let rule_failures = RuleFailureLog::default();
        let ctx = DataEntryContext {
            rules: &rules,
            privileges: &privileges,
            entities: &entities,
            rule_failures: &rule_failures,
            settings,
            clock: &clock,
        };

        let options = FlowOptions {
            work_lists: self.work_lists,
            is_draft: self.is_draft,
            ..FlowOptions::default()
        };
        let page_count = self.form.pages().len();
        let mut state = DataEntryState::create_on_load(
            SubjectRegistration::new(self.individual),
            &self.form,
            options,
            &ctx,
        );
        let actions = ActionMap::<SubjectRegistration>::standard();
        let mut listener = RecordingListener::new();

        if self.steps.is_empty() {
            let next = qualified_action(NEXT);
            for _ in 0..=page_count {
                if state.status() != DataEntryStatus::OnPage {
                    break;
                }
                state =
                    actions.dispatch(&next, &state, ActionPayload::navigation(), &mut listener, &ctx)?;
            }
        }

        for (index, step) in self.steps.into_iter().enumerate() {
            if let Some(seconds) = step.advance_seconds {
                clock.advance(Duration::seconds(seconds));
            }
            let name = qualified_action(&step.action);
            debug!("Step {}: {}", index + 1, name);
            state = actions
                .dispatch(&name, &state, step.payload, &mut listener, &ctx)
                .with_context(|| format!("Step {} ({}) failed", index + 1, name))?;
        }

        if state.status() != DataEntryStatus::Completed {
            warn!("Scenario ended with status {:?}", state.status());
        }
        info!("场景结束, 当前页: {}", state.wizard().current_page());

        Ok(Report {
            status: state.status(),
            page: state.wizard().current_page(),
            events: listener.take_events(),
            observations: state.flow().individual.observations.clone(),
            work_lists: state.work_list_state().work_lists().cloned(),
            rule_failures: rule_failures.failures(),
        })
    }
}

fn qualified_action(action: &str) -> String {
    if action.contains('.') {
        action.to_string()
    } else {
        ActionMap::<SubjectRegistration>::action_name(action)
    }
}
