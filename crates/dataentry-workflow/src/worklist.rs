//! 工作列表管理
//!
//! 记录数据录入过程中待完成的后续任务，例如继续登记家庭成员或完成到期随访。

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use uuid::Uuid;

pub const SUBJECT_TYPE_NAME: &str = "subjectTypeName";
pub const SUBJECT_UUID: &str = "subjectUUID";
pub const TOTAL_MEMBERS: &str = "totalMembers";
pub const PROGRAM_ENROLMENT_UUID: &str = "programEnrolmentUUID";
pub const PROGRAM_NAME: &str = "programName";
pub const ENCOUNTER_TYPE: &str = "encounterType";
pub const SAVE_AND_PROCEED_LABEL: &str = "saveAndProceedLabel";

/// 工作项参数
pub type WorkItemParameters = BTreeMap<String, Value>;

/// 工作项类型
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkItemType {
    Registration,
    AddMember,
    Household,
    ProgramEnrolment,
    ProgramEncounter,
    Encounter,
    CancelProgramEncounter,
    CancelEncounter,
    ProgramExit,
}

/// 工作项，创建后不再修改
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkItem {
    pub id: Uuid,
    pub item_type: WorkItemType,
    pub parameters: WorkItemParameters,
}

impl WorkItem {
    pub fn new(item_type: WorkItemType, parameters: WorkItemParameters) -> Self {
        Self {
            id: Uuid::new_v4(),
            item_type,
            parameters,
        }
    }

    pub fn parameter(&self, key: &str) -> Option<&Value> {
        self.parameters.get(key)
    }

    pub fn parameter_str(&self, key: &str) -> Option<&str> {
        self.parameter(key).and_then(Value::as_str)
    }
}

/// 单个工作列表
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkList {
    pub name: String,
    pub items: Vec<WorkItem>,
}

impl WorkList {
    pub fn new(name: impl Into<String>, items: Vec<WorkItem>) -> Self {
        Self {
            name: name.into(),
            items,
        }
    }
}

/// 有序的工作列表集合，带当前位置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkLists {
    lists: Vec<WorkList>,
    current_list: usize,
    current_item: usize,
}

impl WorkLists {
    pub fn new(list: WorkList) -> Self {
        Self::with_lists(vec![list])
    }

    pub fn with_lists(lists: Vec<WorkList>) -> Self {
        Self {
            lists,
            current_list: 0,
            current_item: 0,
        }
    }

    pub fn current_work_list(&self) -> Option<&WorkList> {
        self.lists.get(self.current_list)
    }

    pub fn current_work_item(&self) -> Option<&WorkItem> {
        self.current_work_list()
            .and_then(|list| list.items.get(self.current_item))
    }

    /// 当前项之后的下一项，必要时跨越到后续列表
    pub fn peek_next_work_item(&self) -> Option<&WorkItem> {
        self.next_position()
            .map(|(list, item)| &self.lists[list].items[item])
    }

    /// 取出下一项并将其设为当前项
    pub fn next_work_item(&mut self) -> Option<&WorkItem> {
        let (list, item) = self.next_position()?;
        self.current_list = list;
        self.current_item = item;
        self.current_work_item()
    }

    fn next_position(&self) -> Option<(usize, usize)> {
        let current = self.lists.get(self.current_list)?;
        if self.current_item + 1 < current.items.len() {
            return Some((self.current_list, self.current_item + 1));
        }
        self.lists
            .iter()
            .enumerate()
            .skip(self.current_list + 1)
            .find(|(_, list)| !list.items.is_empty())
            .map(|(index, _)| (index, 0))
    }

    /// 追加到当前工作列表末尾
    pub fn add_items_to_current_work_list<I: IntoIterator<Item = WorkItem>>(&mut self, items: I) {
        if self.lists.is_empty() {
            self.lists.push(WorkList::new("default", Vec::new()));
            self.current_list = 0;
        }
        let list = &mut self.lists[self.current_list];
        for item in items {
            tracing::debug!("Adding {:?} work item {} to work list {}", item.item_type, item.id, list.name);
            list.items.push(item);
        }
    }

    pub fn lists(&self) -> &[WorkList] {
        &self.lists
    }

    /// 尚未处理的工作项数量
    pub fn remaining_items(&self) -> usize {
        self.lists
            .iter()
            .enumerate()
            .skip(self.current_list)
            .map(|(index, list)| {
                if index == self.current_list {
                    list.items.len().saturating_sub(self.current_item + 1)
                } else {
                    list.items.len()
                }
            })
            .sum()
    }
}

/// 工作上下文，由当前流程提供，合并进新工作项的参数
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct WorkContext(WorkItemParameters);

impl WorkContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.0.insert(key.to_string(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn subject_uuid(&self) -> Option<&str> {
        self.get(SUBJECT_UUID).and_then(Value::as_str)
    }

    pub fn total_members(&self) -> u64 {
        self.get(TOTAL_MEMBERS).and_then(Value::as_u64).unwrap_or(0)
    }

    pub fn to_parameters(&self) -> WorkItemParameters {
        self.0.clone()
    }
}

/// 流程持有的工作列表状态
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct WorkListState {
    work_lists: Option<WorkLists>,
}

impl WorkListState {
    pub fn new(work_lists: Option<WorkLists>) -> Self {
        Self { work_lists }
    }

    pub fn work_lists(&self) -> Option<&WorkLists> {
        self.work_lists.as_ref()
    }

    pub fn peek_next_work_item(&self) -> Option<&WorkItem> {
        self.work_lists.as_ref()?.peek_next_work_item()
    }

    /// "保存并继续" 按钮文案键
    pub fn save_and_proceed_label(&self) -> Option<String> {
        let next = self.peek_next_work_item()?;
        if let Some(label) = next.parameter_str(SAVE_AND_PROCEED_LABEL) {
            return Some(label.to_string());
        }
        let label = match next.item_type {
            WorkItemType::Registration => "saveAndRegisterAnother",
            WorkItemType::AddMember | WorkItemType::Household => "saveAndAddMember",
            WorkItemType::ProgramEnrolment => "saveAndEnrol",
            WorkItemType::ProgramEncounter | WorkItemType::Encounter => "saveAndProceedEncounter",
            _ => "saveAndProceed",
        };
        Some(label.to_string())
    }
}
