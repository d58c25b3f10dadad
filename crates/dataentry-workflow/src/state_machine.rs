//! 数据录入状态机
//!
//! 驱动多页表单的录入流程：页面切换、校验汇总、规则执行以及工作列表的扩展。
//! 每次转换都在克隆出的新状态上进行，旧状态保持不变。

use crate::listener::TransitionListener;
use crate::scheduling::{add_household_members, add_next_scheduled_visits};
use crate::services::{Clock, DataEntryContext, EntityView};
use crate::timer::TimerState;
use crate::wizard::Wizard;
use crate::worklist::{
    WorkContext, WorkItem, WorkItemParameters, WorkItemType, WorkListState, WorkLists,
    SUBJECT_TYPE_NAME,
};
use chrono::{DateTime, Utc};
use dataentry_core::{
    Checklist, DataEntryError, Decisions, EntityType, Form, FormElement, FormElementGroup,
    FormElementStatus, GeoPoint, LocationError, LocationErrorCode, Observation, ObservationValue,
    ObservationsHolder, Result, ScheduledVisit, Settings, ValidationResult, ValidationResults,
    ValidationType,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// 各类实体录入流程需要提供的能力
///
/// 登记、项目登记、随访、取消随访和清单项都实现这个 trait，
/// 状态机只通过它访问实体。
pub trait DataEntryFlow: Clone + fmt::Debug {
    /// 动作名前缀，例如 `IRA.NEXT`
    const ACTION_PREFIX: &'static str;

    fn entity_type(&self) -> EntityType;
    fn entity_uuid(&self) -> &str;
    fn subject_uuid(&self) -> &str;

    fn program_enrolment_uuid(&self) -> Option<&str> {
        None
    }

    fn observations(&self) -> &ObservationsHolder;
    fn observations_mut(&mut self) -> &mut ObservationsHolder;

    fn entity(&self) -> EntityView<'_> {
        EntityView {
            uuid: self.entity_uuid(),
            entity_type: self.entity_type(),
            subject_uuid: self.subject_uuid(),
            program_enrolment_uuid: self.program_enrolment_uuid(),
            observations: self.observations(),
        }
    }

    /// 实体字段校验 (日期、位置等)
    fn validate_entity(
        &self,
        ctx: &DataEntryContext<'_>,
        location_error: Option<&LocationError>,
    ) -> Vec<ValidationResult>;

    /// 不属于任何页面但始终需要检查的字段标识
    fn static_form_element_ids(&self) -> Vec<String> {
        Vec::new()
    }

    fn validate_against_rules(&self, _ctx: &DataEntryContext<'_>) -> Vec<ValidationResult> {
        Vec::new()
    }

    fn execute_rules(&self, _ctx: &DataEntryContext<'_>) -> Decisions {
        Decisions::default()
    }

    fn checklists(&self, _ctx: &DataEntryContext<'_>) -> Vec<Checklist> {
        Vec::new()
    }

    fn next_scheduled_visits(&self, _ctx: &DataEntryContext<'_>) -> Result<Vec<ScheduledVisit>> {
        Ok(Vec::new())
    }

    fn work_context(&self) -> WorkContext {
        WorkContext::new()
    }
}

/// 流程所处阶段
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum DataEntryStatus {
    OnPage,
    ValidationFailed,
    AwaitingVerification,
    Completed,
}

/// 创建状态时的选项
#[derive(Debug, Clone)]
pub struct FlowOptions {
    pub is_new_entity: bool,
    pub work_lists: Option<WorkLists>,
    /// 本次工作会话中的第一个录入流程，决定是否启用计时
    pub is_first_flow: bool,
    /// 草稿保存不启用计时和工作列表扩展
    pub is_draft: bool,
}

impl Default for FlowOptions {
    fn default() -> Self {
        Self {
            is_new_entity: true,
            work_lists: None,
            is_first_flow: true,
            is_draft: false,
        }
    }
}

/// 下一步 / 上一步操作的参数
pub struct NavigationAction<'a, F: DataEntryFlow> {
    /// 待验证的手机号答案
    pub phone_number_observation: Option<Observation>,
    /// 手机号验证界面已完成，需要关闭
    pub pop_verification_view: bool,
    pub listener: &'a mut dyn TransitionListener<F>,
}

impl<'a, F: DataEntryFlow> NavigationAction<'a, F> {
    pub fn new(listener: &'a mut dyn TransitionListener<F>) -> Self {
        Self {
            phone_number_observation: None,
            pop_verification_view: false,
            listener,
        }
    }

    pub fn with_phone_number(mut self, observation: Observation) -> Self {
        self.phone_number_observation = Some(observation);
        self
    }

    pub fn verified(mut self) -> Self {
        self.pop_verification_view = true;
        self
    }
}

/// 完成时交给调用方的结果
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Completion {
    pub decisions: Decisions,
    pub validation_results: Vec<ValidationResult>,
    pub checklists: Vec<Checklist>,
    pub next_scheduled_visits: Vec<ScheduledVisit>,
}

/// 答案修改
#[derive(Debug, Clone, PartialEq)]
pub enum AnswerChange {
    Value(ObservationValue),
    Clear,
    ToggleMultiSelect(String),
    ToggleSingleSelect(String),
}

/// 位置校验
///
/// 未要求采集位置、已有位置或没有定位失败时通过；权限类失败映射到对应提示，
/// 其他失败代码不阻塞流程。
pub fn validate_location(
    location: Option<&GeoPoint>,
    validation_key: &str,
    location_error: Option<&LocationError>,
    settings: &Settings,
) -> ValidationResult {
    let Some(error) = location_error else {
        return ValidationResult::successful(validation_key);
    };
    if !settings.track_location || location.is_some() {
        return ValidationResult::successful(validation_key);
    }
    match error.code {
        LocationErrorCode::SettingsNotSatisfied | LocationErrorCode::PermissionDenied => {
            ValidationResult::failure(validation_key, "giveLocationPermissions")
        }
        LocationErrorCode::PermissionNeverAskAgain => {
            ValidationResult::failure(validation_key, "giveLocationPermissionFromSettings")
        }
        _ => ValidationResult::successful(validation_key),
    }
}

fn rule_validation_errors(statuses: &[FormElementStatus]) -> Vec<ValidationResult> {
    statuses
        .iter()
        .filter_map(|status| {
            let message = status.validation_errors.first()?;
            let mut result = ValidationResult::failure(&status.uuid, message.clone())
                .with_type(ValidationType::Rule);
            result.question_group_index = status.question_group_index;
            Some(result)
        })
        .collect()
}

/// 数据录入状态
#[derive(Debug, Clone)]
pub struct DataEntryState<F: DataEntryFlow> {
    flow: F,
    pages: Arc<[FormElementGroup]>,
    wizard: Wizard,
    validation_results: ValidationResults,
    filtered_form_elements: Arc<[FormElement]>,
    is_new_entity: bool,
    work_list_state: WorkListState,
    timer_state: Option<TimerState>,
    is_first_flow: bool,
    is_draft: bool,
    location_error: Option<LocationError>,
    status: DataEntryStatus,
}

impl<F: DataEntryFlow> DataEntryState<F> {
    /// 加载表单，从第一个有可见元素的页面开始
    pub fn create_on_load(
        flow: F,
        form: &Form,
        options: FlowOptions,
        ctx: &DataEntryContext<'_>,
    ) -> Self {
        let pages = form.pages();
        let first_visible = {
            let entity = flow.entity();
            pages.iter().position(|page| {
                let statuses = ctx.rules.form_element_statuses(&entity, page);
                !page.filter_elements(&statuses).is_empty()
            })
        };

        let Some(first_visible) = first_visible else {
            return Self::create_on_load_for_empty_form(flow, form, options, ctx);
        };

        let wizard = Wizard::starting_at(pages.len(), first_visible);
        let mut state = Self::assemble(flow, pages.into(), wizard, options, ctx);
        state.refresh_form_elements(ctx);
        state
    }

    /// 没有任何可见元素的表单，只有一页，下一步即完成
    pub fn create_on_load_for_empty_form(
        flow: F,
        form: &Form,
        options: FlowOptions,
        ctx: &DataEntryContext<'_>,
    ) -> Self {
        let page = form
            .pages()
            .into_iter()
            .next()
            .unwrap_or_else(FormElementGroup::placeholder);
        tracing::debug!("Form {} has no visible form elements", form.name);
        Self::assemble(flow, Arc::from(vec![page]), Wizard::new(1), options, ctx)
    }

    fn assemble(
        flow: F,
        pages: Arc<[FormElementGroup]>,
        wizard: Wizard,
        options: FlowOptions,
        ctx: &DataEntryContext<'_>,
    ) -> Self {
        let timer_state = (options.is_first_flow && !options.is_draft)
            .then(|| TimerState::new(&pages[wizard.current_page()], ctx.clock.now()));
        Self {
            flow,
            pages,
            wizard,
            validation_results: ValidationResults::new(),
            filtered_form_elements: Arc::from(Vec::new()),
            is_new_entity: options.is_new_entity,
            work_list_state: WorkListState::new(options.work_lists),
            timer_state,
            is_first_flow: options.is_first_flow,
            is_draft: options.is_draft,
            location_error: None,
            status: DataEntryStatus::OnPage,
        }
    }

    pub fn flow(&self) -> &F {
        &self.flow
    }

    pub fn flow_mut(&mut self) -> &mut F {
        &mut self.flow
    }

    pub fn form_element_group(&self) -> &FormElementGroup {
        &self.pages[self.wizard.current_page()]
    }

    pub fn filtered_form_elements(&self) -> &[FormElement] {
        &self.filtered_form_elements
    }

    pub fn validation_results(&self) -> &ValidationResults {
        &self.validation_results
    }

    pub fn wizard(&self) -> &Wizard {
        &self.wizard
    }

    pub fn timer_state(&self) -> Option<&TimerState> {
        self.timer_state.as_ref()
    }

    pub fn work_list_state(&self) -> &WorkListState {
        &self.work_list_state
    }

    pub fn status(&self) -> DataEntryStatus {
        self.status
    }

    pub fn is_new_entity(&self) -> bool {
        self.is_new_entity
    }

    pub fn is_first_flow(&self) -> bool {
        self.is_first_flow
    }

    pub fn is_draft(&self) -> bool {
        self.is_draft
    }

    pub fn location_error(&self) -> Option<&LocationError> {
        self.location_error.as_ref()
    }

    pub fn with_location_error(&self, error: Option<LocationError>) -> Self {
        let mut state = self.clone();
        state.location_error = error;
        state
    }

    /// 记录持久化层返回的校验失败
    pub fn with_database_validation(&self, result: ValidationResult) -> Self {
        let mut state = self.clone();
        state
            .validation_results
            .insert(result.with_type(ValidationType::Database));
        state
    }

    pub fn has_validation_error(&self) -> bool {
        self.validation_results.has_failure()
    }

    pub fn has_no_form_elements(&self) -> bool {
        self.filtered_form_elements.is_empty()
    }

    pub fn validate_location(
        &self,
        location: Option<&GeoPoint>,
        validation_key: &str,
        settings: &Settings,
    ) -> ValidationResult {
        validate_location(location, validation_key, self.location_error.as_ref(), settings)
    }

    /// 当前页元素及静态字段中是否存在失败
    pub fn any_failed_result_for_current_page(&self) -> bool {
        let mut identifiers = self.form_element_group().form_element_ids();
        identifiers.extend(self.flow.static_form_element_ids());
        self.validation_results.any_failure_for(&identifiers)
    }

    fn handle_validation_results(&mut self, results: Vec<ValidationResult>, settings: &Settings) {
        if settings.dev_skip_validation {
            return;
        }
        self.validation_results.extend(results);
    }

    /// 替换上一轮的表单校验结果，保留数据库和规则来源的结果
    fn update_old_form_element_group_validations(
        &mut self,
        all_results: Vec<ValidationResult>,
        settings: &Settings,
    ) {
        self.validation_results.remove_type(ValidationType::Form);
        let merged =
            ValidationResults::union_by_key(vec![self.validation_results.to_vec(), all_results]);
        self.handle_validation_results(merged, settings);
    }

    /// 重新计算当前页可见元素，并移除隐藏元素的校验结果
    fn refresh_form_elements(&mut self, ctx: &DataEntryContext<'_>) -> Vec<FormElementStatus> {
        let page = &self.pages[self.wizard.current_page()];
        let statuses = ctx.rules.form_element_statuses(&self.flow.entity(), page);
        self.filtered_form_elements = page.filter_elements(&statuses).into();

        let hidden: Vec<(String, Option<usize>)> = statuses
            .iter()
            .filter(|status| !status.visible)
            .map(|status| (status.uuid.clone(), status.question_group_index))
            .collect();
        self.validation_results.remove_keys(&hidden);
        statuses
    }

    fn prune_observations(&mut self) {
        let page = &self.pages[self.wizard.current_page()];
        let removed = self
            .flow
            .observations_mut()
            .remove_non_applicable_obs(&page.form_elements, &self.filtered_form_elements);
        if !removed.is_empty() {
            tracing::debug!("Removed {} non applicable observations", removed.len());
        }
    }

    /// 换页后刷新元素、清理答案并写入规则计算值
    fn settle_on_page(&mut self, ctx: &DataEntryContext<'_>) -> Vec<FormElementStatus> {
        let statuses = self.refresh_form_elements(ctx);
        self.prune_observations();
        let filtered = Arc::clone(&self.filtered_form_elements);
        self.flow
            .observations_mut()
            .update_primitive_coded_obs(&filtered, &statuses);

        let page = &self.pages[self.wizard.current_page()];
        let question_group_computed = statuses.iter().any(|status| {
            status.value.is_some()
                && page
                    .form_elements
                    .iter()
                    .any(|e| e.uuid == status.uuid && e.question_group)
        });
        if question_group_computed {
            return self.refresh_form_elements(ctx);
        }
        statuses
    }

    fn uses_timer(&self) -> bool {
        self.is_first_flow && !self.is_draft
    }

    /// 前进一页 (最后一页时不动)
    pub fn move_next(&mut self, now: DateTime<Utc>) {
        self.wizard.move_next();
        if !self.uses_timer() {
            return;
        }
        let page = &self.pages[self.wizard.current_page()];
        let timer = match self.timer_state.take() {
            Some(mut timer) => {
                timer.reset_for_next_page(page, now);
                timer
            }
            None => TimerState::new(page, now),
        };
        self.timer_state = Some(timer);
    }

    /// 后退一页，计时未满或已在第一页时返回 false
    pub fn move_previous(&mut self, now: DateTime<Utc>) -> bool {
        if self.is_previous_blocked(now) || self.wizard.is_first_page() {
            return false;
        }
        self.wizard.move_previous();
        if self.uses_timer() {
            let page = &self.pages[self.wizard.current_page()];
            if let Some(timer) = &mut self.timer_state {
                timer.reset_for_previous(page, now);
            }
        }
        true
    }

    fn is_previous_blocked(&self, now: DateTime<Utc>) -> bool {
        self.uses_timer()
            && self
                .timer_state
                .as_ref()
                .is_some_and(|timer| timer.is_previous_not_allowed(now))
    }

    /// 下一步
    ///
    /// 当前页校验失败时停留并通知 `validation_failed`；需要验证手机号时通知
    /// `verify_phone_number`；最后一页执行规则并完成；否则前进并自动跳过没有可见元素的页面。
    pub fn handle_next(
        &self,
        action: &mut NavigationAction<'_, F>,
        ctx: &DataEntryContext<'_>,
    ) -> Result<Self> {
        if self.status == DataEntryStatus::Completed {
            return Err(DataEntryError::InvalidStateTransition {
                from: format!("{:?}", self.status),
                event: "next".to_string(),
            });
        }

        let settings = ctx.settings;
        let now = ctx.clock.now();
        let mut state = self.clone();
        let mut verification_view_open = action.pop_verification_view;

        loop {
            let entity_validations = state
                .flow
                .validate_entity(ctx, state.location_error.as_ref());
            let page_validations = state
                .form_element_group()
                .validate(state.flow.observations(), &state.filtered_form_elements);
            let database_validations = state.validation_results.of_type(ValidationType::Database);
            let all_results = ValidationResults::union_by_key(vec![
                entity_validations,
                page_validations,
                database_validations,
            ]);
            state.update_old_form_element_group_validations(all_results, settings);

            if settings.go_to_last_page_on_next && !state.wizard.is_last_page() {
                while !state.wizard.is_last_page() {
                    state.move_next(now);
                }
                state.settle_on_page(ctx);
            }

            if state.any_failed_result_for_current_page() {
                state.status = DataEntryStatus::ValidationFailed;
                action.listener.validation_failed(&state);
                return Ok(state);
            }

            if !action.pop_verification_view {
                if let Some(observation) = &action.phone_number_observation {
                    state.status = DataEntryStatus::AwaitingVerification;
                    action.listener.verify_phone_number(observation);
                    return Ok(state);
                }
            }

            if state.wizard.is_last_page() {
                state.complete(action, ctx)?;
                return Ok(state);
            }

            if verification_view_open {
                action.listener.pop_verification_view();
                verification_view_open = false;
            }
            state.move_next(now);
            let statuses = state.settle_on_page(ctx);
            if state.has_no_form_elements() {
                tracing::debug!("No form elements here. Moving to next screen");
                continue;
            }

            state.handle_validation_results(rule_validation_errors(&statuses), settings);
            state.status = DataEntryStatus::OnPage;
            action.listener.moved_next(&state);
            return Ok(state);
        }
    }

    /// 上一步，计时未满时不动；自动跳过没有可见元素的页面
    pub fn handle_previous(
        &self,
        action: &mut NavigationAction<'_, F>,
        ctx: &DataEntryContext<'_>,
    ) -> Result<Self> {
        let now = ctx.clock.now();
        let mut state = self.clone();

        if state.is_previous_blocked(now) {
            let remaining = state
                .timer_state
                .as_ref()
                .map(|timer| timer.remaining_stay_seconds(now))
                .unwrap_or(0);
            action.listener.previous_blocked(&state, remaining);
            return Ok(state);
        }

        // 前面全是空页时停在原页
        let mut walk = state.clone();
        while walk.move_previous(now) {
            let statuses = walk.settle_on_page(ctx);
            if walk.has_no_form_elements() {
                tracing::debug!("No form elements here. Moving to previous screen");
                continue;
            }
            walk.handle_validation_results(rule_validation_errors(&statuses), ctx.settings);
            state = walk;
            break;
        }

        state.status = DataEntryStatus::OnPage;
        action.listener.moved_previous(&state);
        Ok(state)
    }

    /// 连续下一步直到最后一页或遇到校验失败，再多走一步进入完成
    pub fn handle_summary_page(
        &self,
        action: &mut NavigationAction<'_, F>,
        ctx: &DataEntryContext<'_>,
    ) -> Result<Self> {
        let mut state = self.clone();
        while !state.wizard.is_last_page()
            && !state.any_failed_result_for_current_page()
            && state.status != DataEntryStatus::AwaitingVerification
        {
            state = state.handle_next(action, ctx)?;
        }
        let can_finish = state.wizard.is_last_page()
            && !state.any_failed_result_for_current_page()
            && matches!(
                state.status,
                DataEntryStatus::OnPage | DataEntryStatus::ValidationFailed
            );
        if can_finish {
            state = state.handle_next(action, ctx)?;
        }
        Ok(state)
    }

    /// 修改当前页某个元素的答案
    pub fn apply_answer(
        &self,
        element_uuid: &str,
        change: AnswerChange,
        ctx: &DataEntryContext<'_>,
    ) -> Result<Self> {
        let element = self
            .form_element_group()
            .form_elements
            .iter()
            .find(|e| e.uuid == element_uuid)
            .cloned()
            .ok_or_else(|| {
                DataEntryError::NotFound(format!("Form element {} not on current page", element_uuid))
            })?;

        let mut state = self.clone();
        let observations = state.flow.observations_mut();
        match change {
            AnswerChange::Value(value) => observations.set_value(&element.concept, value),
            AnswerChange::Clear => {
                observations.remove(&element.concept);
            }
            AnswerChange::ToggleMultiSelect(answer) => {
                observations.toggle_multi_select_answer(&element.concept, &answer)
            }
            AnswerChange::ToggleSingleSelect(answer) => {
                observations.toggle_single_select_answer(&element.concept, &answer)
            }
        }

        let statuses = state.settle_on_page(ctx);
        let element_result = state
            .filtered_form_elements
            .iter()
            .find(|e| e.uuid == element_uuid)
            .map(|e| e.validate(state.flow.observations()));
        let mut results = rule_validation_errors(&statuses);
        results.extend(element_result);
        state.handle_validation_results(results, ctx.settings);

        if state.status == DataEntryStatus::ValidationFailed
            && !state.any_failed_result_for_current_page()
        {
            state.status = DataEntryStatus::OnPage;
        }
        Ok(state)
    }

    /// 最后一页：规则校验通过后执行决策、清单和随访计划，并扩展工作列表
    fn complete(
        &mut self,
        action: &mut NavigationAction<'_, F>,
        ctx: &DataEntryContext<'_>,
    ) -> Result<()> {
        self.move_to_last_page_with_form_elements(ctx);
        self.validation_results.remove_rule_level();

        let rule_validations = self.flow.validate_against_rules(ctx);
        self.handle_validation_results(rule_validations.clone(), ctx.settings);
        if self.validation_results.has_failure() {
            self.status = DataEntryStatus::ValidationFailed;
            action.listener.validation_failed(self);
            return Ok(());
        }

        let decisions = self.flow.execute_rules(ctx);
        let checklists = self.flow.checklists(ctx);
        let next_scheduled_visits = self.flow.next_scheduled_visits(ctx)?;
        if !self.is_draft {
            let work_lists = self.work_list_state.work_lists().cloned();
            self.work_list_state =
                WorkListState::new(self.update_work_lists(work_lists, &next_scheduled_visits, ctx));
        }

        self.status = DataEntryStatus::Completed;
        tracing::info!(
            "Completed {} data entry for {}",
            self.flow.entity_type().schema_name(),
            self.flow.entity_uuid()
        );
        let completion = Completion {
            decisions,
            validation_results: rule_validations,
            checklists,
            next_scheduled_visits,
        };
        action.listener.completed(self, &completion);
        Ok(())
    }

    /// 从空的最后一页退回到最近一个有元素的页面
    fn move_to_last_page_with_form_elements(&mut self, ctx: &DataEntryContext<'_>) {
        let now = ctx.clock.now();
        while self.has_no_form_elements() && !self.wizard.is_first_page() {
            if !self.move_previous(now) {
                break;
            }
            self.settle_on_page(ctx);
        }
    }

    /// 根据本次录入结果扩展工作列表
    ///
    /// 家庭登记展开成员登记；今天到期且有权限的随访加入列表；列表耗尽时
    /// 按刚完成的项补一条同类登记，最后交给规则做领域调整。
    pub fn update_work_lists(
        &self,
        work_lists: Option<WorkLists>,
        next_scheduled_visits: &[ScheduledVisit],
        ctx: &DataEntryContext<'_>,
    ) -> Option<WorkLists> {
        let mut work_lists = work_lists?;
        let work_context = self.flow.work_context();
        let current = work_lists.current_work_item().cloned();

        if let Some(item) = current
            .as_ref()
            .filter(|item| item.item_type == WorkItemType::Registration)
        {
            let subject_type_name = item.parameter_str(SUBJECT_TYPE_NAME).unwrap_or_default();
            match ctx.entities.subject_type_by_name(subject_type_name) {
                Some(subject_type) if subject_type.household => {
                    add_household_members(&mut work_lists, &work_context);
                }
                Some(_) => {}
                None => tracing::warn!("SubjectType with name {} not found", subject_type_name),
            }
        }

        if !next_scheduled_visits.is_empty() {
            add_next_scheduled_visits(&mut work_lists, next_scheduled_visits, &work_context, ctx);
        }

        if work_lists.peek_next_work_item().is_none() {
            match current.as_ref().map(|item| item.item_type) {
                Some(WorkItemType::Registration) => {
                    let mut parameters = WorkItemParameters::new();
                    if let Some(item) = &current {
                        if let Some(name) = item.parameter(SUBJECT_TYPE_NAME) {
                            parameters.insert(SUBJECT_TYPE_NAME.to_string(), name.clone());
                        }
                    }
                    work_lists.add_items_to_current_work_list(vec![WorkItem::new(
                        WorkItemType::Registration,
                        parameters,
                    )]);
                }
                Some(WorkItemType::AddMember) => {
                    let parameters = current
                        .as_ref()
                        .map(|item| item.parameters.clone())
                        .unwrap_or_default();
                    work_lists.add_items_to_current_work_list(vec![WorkItem::new(
                        WorkItemType::AddMember,
                        parameters,
                    )]);
                }
                _ => {}
            }
        }

        Some(ctx.rules.update_work_lists(work_lists, &self.flow.entity()))
    }

    /// 当前页是否还在计时显示问题前
    pub fn questions_hidden_by_timer(&self, now: DateTime<Utc>) -> bool {
        self.uses_timer()
            && self
                .timer_state
                .as_ref()
                .is_some_and(|timer| !timer.display_questions(now))
    }

    /// 查询某个元素的失败结果
    pub fn validation_error(&self, form_identifier: &str) -> Option<&ValidationResult> {
        self.validation_results.get(form_identifier)
    }

    /// 工作列表中下一项的参数值
    pub fn next_work_item_parameter(&self, key: &str) -> Option<&Value> {
        self.work_list_state.peek_next_work_item()?.parameter(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flows::{SubjectRegistration, TOTAL_MEMBERS_CONCEPT};
    use crate::listener::{RecordingListener, TransitionEvent};
    use crate::rules::{RuleSet, ValidationRule, VisitScheduleRule};
    use crate::rules::DeclarativeRuleEvaluator;
    use crate::services::RuleEvaluationService;
    use crate::worklist::SUBJECT_UUID;
    use crate::test_support::{form, page, registration, single_question_form, Fixture};
    use crate::worklist::WorkList;
    use chrono::Duration;
    use dataentry_core::validation::EXTERNAL_RULE;
    use dataentry_core::{Condition, EMPTY_VALIDATION_MESSAGE};

    type State = DataEntryState<SubjectRegistration>;

    fn next(state: &State, listener: &mut RecordingListener, ctx: &DataEntryContext<'_>) -> State {
        state
            .handle_next(&mut NavigationAction::new(listener), ctx)
            .unwrap()
    }

    fn previous(state: &State, listener: &mut RecordingListener, ctx: &DataEntryContext<'_>) -> State {
        state
            .handle_previous(&mut NavigationAction::new(listener), ctx)
            .unwrap()
    }

    fn optional(uuid: &str) -> FormElement {
        FormElement::new(uuid, uuid, uuid)
    }

    fn never_shown(uuid: &str) -> FormElement {
        optional(uuid).shown_when(Condition::Answered {
            concept: "never".into(),
        })
    }

    fn three_pages() -> Form {
        form(vec![
            page("p0", 1, vec![optional("a")]),
            page("p1", 2, vec![optional("b")]),
            page("p2", 3, vec![optional("c")]),
        ])
    }

    fn answered_weight(fixture: &Fixture, weight: f64) -> SubjectRegistration {
        let mut flow = registration(fixture);
        flow.individual
            .observations
            .set_value("Weight", ObservationValue::Numeric(weight));
        flow
    }

    fn registration_work_lists(subject_type: &str) -> WorkLists {
        let mut parameters = WorkItemParameters::new();
        parameters.insert(SUBJECT_TYPE_NAME.into(), Value::from(subject_type));
        WorkLists::new(WorkList::new(
            "registration",
            vec![WorkItem::new(WorkItemType::Registration, parameters)],
        ))
    }

    fn with_work_lists(work_lists: WorkLists) -> FlowOptions {
        FlowOptions {
            work_lists: Some(work_lists),
            ..FlowOptions::default()
        }
    }

    fn visit_rule(name: &str, encounter_type: &str) -> VisitScheduleRule {
        VisitScheduleRule {
            name: name.into(),
            encounter_type: encounter_type.into(),
            earliest_offset_days: 0,
            max_offset_days: 0,
            when: None,
            program_name: None,
            subject_uuid: None,
            failure: None,
        }
    }

    #[test]
    fn test_create_on_load_starts_at_first_visible_page() {
        let fixture = Fixture::new();
        let ctx = fixture.context();
        let form = form(vec![
            page("p0", 1, vec![never_shown("a")]),
            page("p1", 2, vec![optional("b")]),
        ]);

        let state = State::create_on_load(registration(&fixture), &form, FlowOptions::default(), &ctx);
        assert_eq!(state.wizard().current_page(), 1);
        assert_eq!(state.filtered_form_elements().len(), 1);
        assert_eq!(state.status(), DataEntryStatus::OnPage);
    }

    #[test]
    fn test_empty_form_completes_on_next() {
        let fixture = Fixture::new();
        let ctx = fixture.context();
        let form = form(vec![page("p0", 1, vec![never_shown("a")])]);
        let mut listener = RecordingListener::new();

        let state = State::create_on_load(registration(&fixture), &form, FlowOptions::default(), &ctx);
        assert_eq!(state.wizard().number_of_pages(), 1);
        assert!(state.has_no_form_elements());

        let state = next(&state, &mut listener, &ctx);
        assert_eq!(state.status(), DataEntryStatus::Completed);
        assert_eq!(listener.completions().len(), 1);
    }

    #[test]
    fn test_mandatory_element_blocks_next() {
        let fixture = Fixture::new();
        let ctx = fixture.context();
        let mut listener = RecordingListener::new();
        let state = State::create_on_load(
            registration(&fixture),
            &single_question_form(),
            FlowOptions::default(),
            &ctx,
        );

        let state = next(&state, &mut listener, &ctx);
        assert_eq!(state.status(), DataEntryStatus::ValidationFailed);
        assert!(state.any_failed_result_for_current_page());
        assert_eq!(
            state.validation_error("weight").and_then(|r| r.message_key.as_deref()),
            Some(EMPTY_VALIDATION_MESSAGE)
        );
        assert!(matches!(listener.last(), Some(TransitionEvent::ValidationFailed { page: 0, .. })));
        assert!(listener.completions().is_empty());
    }

    #[test]
    fn test_validation_results_keep_one_entry_per_key() {
        let fixture = Fixture::new();
        let ctx = fixture.context();
        let mut listener = RecordingListener::new();
        let state = State::create_on_load(
            registration(&fixture),
            &single_question_form(),
            FlowOptions::default(),
            &ctx,
        );

        let state = next(&state, &mut listener, &ctx);
        let state = next(&state, &mut listener, &ctx);
        let weight_failures = state
            .validation_results()
            .iter()
            .filter(|r| r.form_identifier == "weight")
            .count();
        assert_eq!(weight_failures, 1);
    }

    #[test]
    fn test_next_then_previous_returns_to_same_page() {
        let fixture = Fixture::new();
        let ctx = fixture.context();
        let mut listener = RecordingListener::new();
        let state = State::create_on_load(registration(&fixture), &three_pages(), FlowOptions::default(), &ctx);

        let moved = next(&state, &mut listener, &ctx);
        assert_eq!(moved.wizard().current_page(), 1);
        let back = previous(&moved, &mut listener, &ctx);
        assert_eq!(back.wizard().current_page(), 0);
        assert_eq!(back.status(), DataEntryStatus::OnPage);
        assert_eq!(
            listener.events(),
            &[
                TransitionEvent::MovedNext { page: 1 },
                TransitionEvent::MovedPrevious { page: 0 }
            ]
        );
        // 原状态不受影响
        assert_eq!(state.wizard().current_page(), 0);
    }

    #[test]
    fn test_empty_pages_are_skipped_both_ways() {
        let fixture = Fixture::new();
        let ctx = fixture.context();
        let mut listener = RecordingListener::new();
        let form = form(vec![
            page("p0", 1, vec![optional("a")]),
            page("p1", 2, vec![never_shown("b")]),
            page("p2", 3, vec![never_shown("c")]),
            page("p3", 4, vec![optional("d")]),
        ]);
        let state = State::create_on_load(registration(&fixture), &form, FlowOptions::default(), &ctx);

        let state = next(&state, &mut listener, &ctx);
        assert_eq!(state.wizard().current_page(), 3);
        assert!(!state.has_no_form_elements());

        let state = previous(&state, &mut listener, &ctx);
        assert_eq!(state.wizard().current_page(), 0);
    }

    #[test]
    fn test_previous_on_first_page_stays() {
        let fixture = Fixture::new();
        let ctx = fixture.context();
        let mut listener = RecordingListener::new();
        let state = State::create_on_load(registration(&fixture), &three_pages(), FlowOptions::default(), &ctx);

        let state = previous(&state, &mut listener, &ctx);
        assert_eq!(state.wizard().current_page(), 0);
        assert_eq!(listener.events(), &[TransitionEvent::MovedPrevious { page: 0 }]);
    }

    #[test]
    fn test_completed_exactly_once() {
        let fixture = Fixture::new();
        let ctx = fixture.context();
        let mut listener = RecordingListener::new();
        let state = State::create_on_load(
            answered_weight(&fixture, 52.0),
            &single_question_form(),
            FlowOptions::default(),
            &ctx,
        );

        let done = next(&state, &mut listener, &ctx);
        assert_eq!(done.status(), DataEntryStatus::Completed);
        assert_eq!(listener.completions().len(), 1);

        let again = done.handle_next(&mut NavigationAction::new(&mut listener), &ctx);
        assert!(matches!(again, Err(DataEntryError::InvalidStateTransition { .. })));
        assert_eq!(listener.completions().len(), 1);
    }

    #[test]
    fn test_dev_skip_validation_ignores_mandatory() {
        let fixture = Fixture::new().with_settings(|s| s.dev_skip_validation = true);
        let ctx = fixture.context();
        let mut listener = RecordingListener::new();
        let form = form(vec![
            page("p0", 1, vec![FormElement::new("weight", "Weight", "Weight").mandatory()]),
            page("p1", 2, vec![optional("b")]),
        ]);
        let state = State::create_on_load(registration(&fixture), &form, FlowOptions::default(), &ctx);

        let state = next(&state, &mut listener, &ctx);
        assert_eq!(state.wizard().current_page(), 1);
        assert!(state.validation_results().is_empty());
    }

    #[test]
    fn test_timed_page_blocks_previous_until_stay_time() {
        let fixture = Fixture::new();
        let ctx = fixture.context();
        let mut listener = RecordingListener::new();
        let form = form(vec![
            page("p0", 1, vec![optional("a")]),
            page("p1", 2, vec![optional("b")]).with_timer(Some(0), Some(30)),
        ]);
        let state = State::create_on_load(registration(&fixture), &form, FlowOptions::default(), &ctx);
        let state = next(&state, &mut listener, &ctx);
        assert_eq!(state.wizard().current_page(), 1);

        fixture.clock.advance(Duration::seconds(5));
        let blocked = previous(&state, &mut listener, &ctx);
        assert_eq!(blocked.wizard().current_page(), 1);
        assert_eq!(
            listener.last(),
            Some(&TransitionEvent::PreviousBlocked {
                page: 1,
                remaining_seconds: 25
            })
        );

        fixture.clock.advance(Duration::seconds(26));
        let back = previous(&blocked, &mut listener, &ctx);
        assert_eq!(back.wizard().current_page(), 0);
    }

    #[test]
    fn test_draft_ignores_timer() {
        let fixture = Fixture::new();
        let ctx = fixture.context();
        let mut listener = RecordingListener::new();
        let form = form(vec![
            page("p0", 1, vec![optional("a")]),
            page("p1", 2, vec![optional("b")]).with_timer(Some(0), Some(30)),
        ]);
        let options = FlowOptions {
            is_draft: true,
            ..FlowOptions::default()
        };
        let state = State::create_on_load(registration(&fixture), &form, options, &ctx);
        assert!(state.timer_state().is_none());

        let state = next(&state, &mut listener, &ctx);
        let back = previous(&state, &mut listener, &ctx);
        assert_eq!(back.wizard().current_page(), 0);
    }

    #[test]
    fn test_household_without_members_reseeds_registration() {
        let fixture = Fixture::new();
        fixture.register_subject_type("Household", true);
        let ctx = fixture.context();
        let mut listener = RecordingListener::new();
        let state = State::create_on_load(
            answered_weight(&fixture, 52.0),
            &single_question_form(),
            with_work_lists(registration_work_lists("Household")),
            &ctx,
        );

        let done = next(&state, &mut listener, &ctx);
        let upcoming = done.work_list_state().peek_next_work_item().unwrap();
        assert_eq!(upcoming.item_type, WorkItemType::Registration);
        assert_eq!(upcoming.parameter_str(SUBJECT_TYPE_NAME), Some("Household"));
        assert_eq!(
            done.work_list_state().save_and_proceed_label().as_deref(),
            Some("saveAndRegisterAnother")
        );
    }

    #[test]
    fn test_household_members_added_to_work_list() {
        let fixture = Fixture::new();
        fixture.register_subject_type("Household", true);
        let ctx = fixture.context();
        let mut listener = RecordingListener::new();
        let mut flow = answered_weight(&fixture, 52.0);
        flow.individual
            .observations
            .set_value(TOTAL_MEMBERS_CONCEPT, ObservationValue::Numeric(3.0));
        let state = State::create_on_load(
            flow,
            &single_question_form(),
            with_work_lists(registration_work_lists("Household")),
            &ctx,
        );

        let done = next(&state, &mut listener, &ctx);
        let work_lists = done.work_list_state().work_lists().unwrap();
        assert_eq!(work_lists.remaining_items(), 2);
        let upcoming = work_lists.peek_next_work_item().unwrap();
        assert_eq!(upcoming.item_type, WorkItemType::Household);
        assert_eq!(upcoming.parameter_str("household"), Some("2 of 3"));
        assert_eq!(
            done.next_work_item_parameter("groupSubjectUUID").and_then(|v| v.as_str()),
            Some("subject-1")
        );
    }

    #[test]
    fn test_due_visits_added_once() {
        let fixture = Fixture::new().with_rules(RuleSet {
            visit_schedules: vec![visit_rule("ANC 1", "ANC"), visit_rule("ANC 1b", "ANC")],
            ..RuleSet::default()
        });
        fixture.grant_general_visit("ANC");
        let ctx = fixture.context();
        let mut listener = RecordingListener::new();
        let state = State::create_on_load(
            answered_weight(&fixture, 52.0),
            &single_question_form(),
            with_work_lists(registration_work_lists("Individual")),
            &ctx,
        );

        let done = next(&state, &mut listener, &ctx);
        assert_eq!(listener.completions()[0].next_scheduled_visits.len(), 2);
        let work_lists = done.work_list_state().work_lists().unwrap();
        let encounters = work_lists
            .current_work_list()
            .unwrap()
            .items
            .iter()
            .filter(|item| item.item_type == WorkItemType::Encounter)
            .count();
        assert_eq!(encounters, 1);
        assert_eq!(
            work_lists.peek_next_work_item().map(|item| item.item_type),
            Some(WorkItemType::Encounter)
        );
    }

    #[test]
    fn test_visit_without_privilege_not_added() {
        let fixture = Fixture::new().with_rules(RuleSet {
            visit_schedules: vec![visit_rule("ANC 1", "ANC")],
            ..RuleSet::default()
        });
        fixture.register_encounter_type("ANC");
        let ctx = fixture.context();
        let mut listener = RecordingListener::new();
        let state = State::create_on_load(
            answered_weight(&fixture, 52.0),
            &single_question_form(),
            with_work_lists(registration_work_lists("Individual")),
            &ctx,
        );

        let done = next(&state, &mut listener, &ctx);
        let work_lists = done.work_list_state().work_lists().unwrap();
        assert!(work_lists
            .lists()
            .iter()
            .flat_map(|list| list.items.iter())
            .all(|item| item.item_type != WorkItemType::Encounter));
        assert_eq!(
            work_lists.peek_next_work_item().map(|item| item.item_type),
            Some(WorkItemType::Registration)
        );
    }

    #[test]
    fn test_rule_failure_for_other_subject_is_tolerated() {
        let mut failing = visit_rule("Child growth", "Growth");
        failing.subject_uuid = Some("member-2".into());
        failing.failure = Some("rule threw".into());
        let fixture = Fixture::new().with_rules(RuleSet {
            visit_schedules: vec![failing],
            ..RuleSet::default()
        });
        let ctx = fixture.context();
        let mut listener = RecordingListener::new();
        let state = State::create_on_load(
            answered_weight(&fixture, 52.0),
            &single_question_form(),
            FlowOptions::default(),
            &ctx,
        );

        let done = next(&state, &mut listener, &ctx);
        assert_eq!(done.status(), DataEntryStatus::Completed);
        assert_eq!(fixture.rule_failures.failures().len(), 1);
    }

    #[test]
    fn test_rule_failure_for_current_subject_is_an_error() {
        let mut failing = visit_rule("ANC", "ANC");
        failing.failure = Some("rule threw".into());
        let fixture = Fixture::new().with_rules(RuleSet {
            visit_schedules: vec![failing],
            ..RuleSet::default()
        });
        let ctx = fixture.context();
        let mut listener = RecordingListener::new();
        let state = State::create_on_load(
            answered_weight(&fixture, 52.0),
            &single_question_form(),
            FlowOptions::default(),
            &ctx,
        );

        let result = state.handle_next(&mut NavigationAction::new(&mut listener), &ctx);
        assert!(matches!(result, Err(DataEntryError::RuleEvaluation(_))));
        assert!(listener.completions().is_empty());
    }

    #[test]
    fn test_rule_validation_on_last_page() {
        let fixture = Fixture::new().with_rules(RuleSet {
            validations: vec![ValidationRule {
                when: Condition::GreaterThan {
                    concept: "Weight".into(),
                    value: 100.0,
                },
                message_key: "weightTooHigh".into(),
                entity_types: vec![],
            }],
            ..RuleSet::default()
        });
        let ctx = fixture.context();
        let mut listener = RecordingListener::new();
        let state = State::create_on_load(
            answered_weight(&fixture, 150.0),
            &single_question_form(),
            FlowOptions::default(),
            &ctx,
        );

        let failed = next(&state, &mut listener, &ctx);
        assert_eq!(failed.status(), DataEntryStatus::ValidationFailed);
        assert!(failed.validation_error(EXTERNAL_RULE).is_some());
        assert!(listener.completions().is_empty());

        let fixed = failed
            .apply_answer("weight", AnswerChange::Value(ObservationValue::Numeric(60.0)), &ctx)
            .unwrap();
        assert_eq!(fixed.status(), DataEntryStatus::OnPage);
        let done = next(&fixed, &mut listener, &ctx);
        assert_eq!(done.status(), DataEntryStatus::Completed);
        assert!(done.validation_error(EXTERNAL_RULE).is_none());
        assert_eq!(listener.completions().len(), 1);
    }

    #[test]
    fn test_phone_number_verification() {
        let fixture = Fixture::new();
        let ctx = fixture.context();
        let mut listener = RecordingListener::new();
        let state = State::create_on_load(registration(&fixture), &three_pages(), FlowOptions::default(), &ctx);
        let phone = Observation::new("Phone", ObservationValue::Text("9876543210".into()));

        let waiting = state
            .handle_next(
                &mut NavigationAction::new(&mut listener).with_phone_number(phone.clone()),
                &ctx,
            )
            .unwrap();
        assert_eq!(waiting.status(), DataEntryStatus::AwaitingVerification);
        assert_eq!(waiting.wizard().current_page(), 0);

        let moved = waiting
            .handle_next(
                &mut NavigationAction::new(&mut listener)
                    .with_phone_number(phone)
                    .verified(),
                &ctx,
            )
            .unwrap();
        assert_eq!(moved.wizard().current_page(), 1);
        assert_eq!(
            listener.events(),
            &[
                TransitionEvent::VerifyPhoneNumber {
                    concept: "Phone".into()
                },
                TransitionEvent::VerificationViewClosed,
                TransitionEvent::MovedNext { page: 1 },
            ]
        );
    }

    #[test]
    fn test_location_permission_blocks_next() {
        let fixture = Fixture::new().with_settings(|s| s.track_location = true);
        let ctx = fixture.context();
        let mut listener = RecordingListener::new();
        let state = State::create_on_load(registration(&fixture), &three_pages(), FlowOptions::default(), &ctx)
            .with_location_error(Some(LocationError::new(LocationErrorCode::PermissionDenied)));

        let state = next(&state, &mut listener, &ctx);
        assert_eq!(state.status(), DataEntryStatus::ValidationFailed);
        assert_eq!(
            state
                .validation_error("registrationLocation")
                .and_then(|r| r.message_key.as_deref()),
            Some("giveLocationPermissions")
        );
    }

    #[test]
    fn test_unrecognised_location_error_does_not_block() {
        let settings = Settings {
            track_location: true,
            ..Settings::default()
        };
        let timeout = LocationError::new(LocationErrorCode::Timeout);
        assert!(validate_location(None, "registrationLocation", Some(&timeout), &settings).success);
    }

    #[test]
    fn test_database_validation_blocks_next() {
        let fixture = Fixture::new();
        let ctx = fixture.context();
        let mut listener = RecordingListener::new();
        let state = State::create_on_load(
            answered_weight(&fixture, 52.0),
            &single_question_form(),
            FlowOptions::default(),
            &ctx,
        )
        .with_database_validation(ValidationResult::failure("weight", "duplicateValue"));

        let state = next(&state, &mut listener, &ctx);
        assert_eq!(state.status(), DataEntryStatus::ValidationFailed);
        assert!(listener.completions().is_empty());
    }

    #[test]
    fn test_hidden_answers_are_removed() {
        let fixture = Fixture::new();
        let ctx = fixture.context();
        let form = form(vec![page(
            "p0",
            1,
            vec![
                FormElement::new("pregnant", "Pregnant", "Pregnant"),
                FormElement::new("weeks", "Weeks", "Weeks").shown_when(Condition::Contains {
                    concept: "Pregnant".into(),
                    answer: "Yes".into(),
                }),
            ],
        )]);
        let state = State::create_on_load(registration(&fixture), &form, FlowOptions::default(), &ctx);
        assert_eq!(state.filtered_form_elements().len(), 1);

        let state = state
            .apply_answer("pregnant", AnswerChange::ToggleSingleSelect("Yes".into()), &ctx)
            .unwrap();
        assert_eq!(state.filtered_form_elements().len(), 2);
        let state = state
            .apply_answer("weeks", AnswerChange::Value(ObservationValue::Numeric(12.0)), &ctx)
            .unwrap();
        assert!(state.flow().observations().has_answer("Weeks"));

        let state = state
            .apply_answer("pregnant", AnswerChange::ToggleSingleSelect("Yes".into()), &ctx)
            .unwrap();
        assert_eq!(state.filtered_form_elements().len(), 1);
        assert!(!state.flow().observations().has_answer("Weeks"));

        let missing = state.apply_answer("nope", AnswerChange::Clear, &ctx);
        assert!(matches!(missing, Err(DataEntryError::NotFound(_))));
    }

    #[test]
    fn test_summary_page_runs_to_completion() {
        let fixture = Fixture::new();
        let ctx = fixture.context();
        let mut listener = RecordingListener::new();
        let state = State::create_on_load(registration(&fixture), &three_pages(), FlowOptions::default(), &ctx);

        let done = state
            .handle_summary_page(&mut NavigationAction::new(&mut listener), &ctx)
            .unwrap();
        assert_eq!(done.status(), DataEntryStatus::Completed);
        assert_eq!(listener.completions().len(), 1);
    }

    #[test]
    fn test_summary_page_stops_at_failure() {
        let fixture = Fixture::new();
        let ctx = fixture.context();
        let mut listener = RecordingListener::new();
        let form = form(vec![
            page("p0", 1, vec![optional("a")]),
            page("p1", 2, vec![FormElement::new("weight", "Weight", "Weight").mandatory()]),
            page("p2", 3, vec![optional("c")]),
        ]);
        let state = State::create_on_load(registration(&fixture), &form, FlowOptions::default(), &ctx);

        let stopped = state
            .handle_summary_page(&mut NavigationAction::new(&mut listener), &ctx)
            .unwrap();
        assert_eq!(stopped.wizard().current_page(), 1);
        assert_eq!(stopped.status(), DataEntryStatus::ValidationFailed);
        assert!(listener.completions().is_empty());
    }

    #[test]
    fn test_go_to_last_page_on_next() {
        let fixture = Fixture::new().with_settings(|s| s.go_to_last_page_on_next = true);
        let ctx = fixture.context();
        let mut listener = RecordingListener::new();
        let state = State::create_on_load(registration(&fixture), &three_pages(), FlowOptions::default(), &ctx);

        let done = next(&state, &mut listener, &ctx);
        assert_eq!(done.wizard().current_page(), 2);
        assert_eq!(done.status(), DataEntryStatus::Completed);
    }

    #[test]
    fn test_previous_never_lands_on_leading_empty_pages() {
        let fixture = Fixture::new();
        let ctx = fixture.context();
        let mut listener = RecordingListener::new();
        let form = form(vec![
            page("p0", 1, vec![never_shown("a")]),
            page("p1", 2, vec![never_shown("b")]),
            page("p2", 3, vec![optional("c")]),
        ]);
        let state = State::create_on_load(registration(&fixture), &form, FlowOptions::default(), &ctx);
        assert_eq!(state.wizard().current_page(), 2);

        let back = previous(&state, &mut listener, &ctx);
        assert_eq!(back.wizard().current_page(), 2);
        assert!(!back.has_no_form_elements());
        assert_eq!(back.filtered_form_elements()[0].uuid, "c");
        assert_eq!(listener.events(), &[TransitionEvent::MovedPrevious { page: 2 }]);
    }

    #[test]
    fn test_add_member_reseeds_add_member() {
        let fixture = Fixture::new();
        let ctx = fixture.context();
        let mut listener = RecordingListener::new();
        let mut parameters = WorkItemParameters::new();
        parameters.insert("groupSubjectUUID".into(), Value::from("household-1"));
        let work_lists = WorkLists::new(WorkList::new(
            "members",
            vec![WorkItem::new(WorkItemType::AddMember, parameters)],
        ));
        let state = State::create_on_load(
            answered_weight(&fixture, 52.0),
            &single_question_form(),
            with_work_lists(work_lists),
            &ctx,
        );

        let done = next(&state, &mut listener, &ctx);
        let upcoming = done.work_list_state().peek_next_work_item().unwrap();
        assert_eq!(upcoming.item_type, WorkItemType::AddMember);
        assert_eq!(upcoming.parameter_str("groupSubjectUUID"), Some("household-1"));
        assert_eq!(
            done.work_list_state().save_and_proceed_label().as_deref(),
            Some("saveAndAddMember")
        );
    }

    /// 在规则调整阶段追加一条项目登记
    struct EnrolAfterRegistration(DeclarativeRuleEvaluator);

    impl RuleEvaluationService for EnrolAfterRegistration {
        fn form_element_statuses(
            &self,
            entity: &EntityView<'_>,
            group: &FormElementGroup,
        ) -> Vec<FormElementStatus> {
            self.0.form_element_statuses(entity, group)
        }

        fn update_work_lists(&self, mut work_lists: WorkLists, entity: &EntityView<'_>) -> WorkLists {
            let mut parameters = WorkItemParameters::new();
            parameters.insert(SUBJECT_UUID.into(), Value::from(entity.subject_uuid));
            work_lists.add_items_to_current_work_list(vec![WorkItem::new(
                WorkItemType::ProgramEnrolment,
                parameters,
            )]);
            work_lists
        }
    }

    #[test]
    fn test_rules_adjust_updated_work_lists() {
        let fixture = Fixture::new();
        fixture.register_subject_type("Individual", false);
        let rules = EnrolAfterRegistration(DeclarativeRuleEvaluator::new(RuleSet::default()));
        let ctx = DataEntryContext {
            rules: &rules,
            ..fixture.context()
        };
        let mut listener = RecordingListener::new();
        let state = State::create_on_load(
            answered_weight(&fixture, 52.0),
            &single_question_form(),
            with_work_lists(registration_work_lists("Individual")),
            &ctx,
        );

        let done = next(&state, &mut listener, &ctx);
        let items = &done
            .work_list_state()
            .work_lists()
            .unwrap()
            .current_work_list()
            .unwrap()
            .items;
        let types: Vec<WorkItemType> = items.iter().map(|item| item.item_type).collect();
        assert_eq!(
            types,
            vec![
                WorkItemType::Registration,
                WorkItemType::Registration,
                WorkItemType::ProgramEnrolment
            ]
        );
        assert_eq!(items[2].parameter_str(SUBJECT_UUID), Some("subject-1"));
    }

    #[test]
    fn test_draft_leaves_work_lists_untouched() {
        let fixture = Fixture::new().with_rules(RuleSet {
            visit_schedules: vec![visit_rule("ANC 1", "ANC")],
            ..RuleSet::default()
        });
        fixture.register_subject_type("Household", true);
        fixture.grant_general_visit("ANC");
        let ctx = fixture.context();
        let mut listener = RecordingListener::new();
        let mut flow = answered_weight(&fixture, 52.0);
        flow.individual
            .observations
            .set_value(TOTAL_MEMBERS_CONCEPT, ObservationValue::Numeric(3.0));
        let work_lists = registration_work_lists("Household");
        let options = FlowOptions {
            work_lists: Some(work_lists.clone()),
            is_draft: true,
            ..FlowOptions::default()
        };
        let state = State::create_on_load(flow, &single_question_form(), options, &ctx);

        let done = next(&state, &mut listener, &ctx);
        assert_eq!(done.status(), DataEntryStatus::Completed);
        assert_eq!(listener.completions()[0].next_scheduled_visits.len(), 1);
        assert_eq!(done.work_list_state().work_lists(), Some(&work_lists));
        assert!(done.work_list_state().peek_next_work_item().is_none());
    }

    #[test]
    fn test_questions_hidden_until_start_time() {
        let fixture = Fixture::new();
        let ctx = fixture.context();
        let form = form(vec![
            page("p0", 1, vec![optional("a")]).with_timer(Some(10), Some(30)),
            page("p1", 2, vec![optional("b")]),
        ]);
        let state = State::create_on_load(registration(&fixture), &form, FlowOptions::default(), &ctx);

        let entered = fixture.clock.now();
        assert!(state.questions_hidden_by_timer(entered));
        assert!(state.questions_hidden_by_timer(entered + Duration::seconds(9)));
        assert!(!state.questions_hidden_by_timer(entered + Duration::seconds(10)));

        let draft = State::create_on_load(
            registration(&fixture),
            &form,
            FlowOptions {
                is_draft: true,
                ..FlowOptions::default()
            },
            &ctx,
        );
        assert!(!draft.questions_hidden_by_timer(entered));
    }

    #[test]
    fn test_visit_dates_follow_context_clock() {
        let mut rule = visit_rule("ANC 1", "ANC");
        rule.max_offset_days = 3;
        let fixture = Fixture::new().with_rules(RuleSet {
            visit_schedules: vec![rule],
            ..RuleSet::default()
        });
        fixture.grant_general_visit("ANC");
        fixture.clock.advance(Duration::days(10));
        let ctx = fixture.context();
        let mut listener = RecordingListener::new();
        let state = State::create_on_load(
            answered_weight(&fixture, 52.0),
            &single_question_form(),
            with_work_lists(registration_work_lists("Individual")),
            &ctx,
        );

        let done = next(&state, &mut listener, &ctx);
        let today = fixture.clock.today();
        let visit = &listener.completions()[0].next_scheduled_visits[0];
        assert_eq!(visit.earliest_date, today);
        assert_eq!(visit.max_date, today + Duration::days(3));
        assert_eq!(
            done.work_list_state().peek_next_work_item().map(|item| item.item_type),
            Some(WorkItemType::Encounter)
        );
    }
}
