//! 校验结果
//!
//! 校验失败是预期内的用户数据问题，始终以值的形式记录和传递，从不作为错误返回。

use serde::{Deserialize, Serialize};

/// 规则级校验结果使用的表单标识
pub const EXTERNAL_RULE: &str = "EXTERNAL_RULE";

/// 校验结果来源
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub enum ValidationType {
    #[default]
    Form,     // 页面及实体字段校验
    Database, // 持久化层返回的冲突
    Rule,     // 规则引擎给出的校验
}

/// 单条校验结果
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    /// 表单元素标识，规则级结果为 [`EXTERNAL_RULE`]
    pub form_identifier: String,
    /// 重复问题组中的行号
    #[serde(default)]
    pub question_group_index: Option<usize>,
    pub success: bool,
    #[serde(default)]
    pub message_key: Option<String>,
    #[serde(default)]
    pub validation_type: ValidationType,
}

impl ValidationResult {
    /// 创建成功结果
    pub fn successful(form_identifier: impl Into<String>) -> Self {
        Self {
            form_identifier: form_identifier.into(),
            question_group_index: None,
            success: true,
            message_key: None,
            validation_type: ValidationType::Form,
        }
    }

    /// 创建失败结果
    pub fn failure(form_identifier: impl Into<String>, message_key: impl Into<String>) -> Self {
        Self {
            form_identifier: form_identifier.into(),
            question_group_index: None,
            success: false,
            message_key: Some(message_key.into()),
            validation_type: ValidationType::Form,
        }
    }

    /// 创建规则级失败结果
    pub fn rule_failure(message_key: impl Into<String>) -> Self {
        Self::failure(EXTERNAL_RULE, message_key).with_type(ValidationType::Rule)
    }

    pub fn with_type(mut self, validation_type: ValidationType) -> Self {
        self.validation_type = validation_type;
        self
    }

    pub fn with_question_group_index(mut self, index: usize) -> Self {
        self.question_group_index = Some(index);
        self
    }

    /// 去重键 (表单标识, 问题组行号)
    pub fn key(&self) -> (&str, Option<usize>) {
        (self.form_identifier.as_str(), self.question_group_index)
    }

    pub fn same_key(&self, other: &ValidationResult) -> bool {
        self.key() == other.key()
    }

    /// 是否为规则级结果 (外部规则标识或空标识)
    pub fn is_rule_level(&self) -> bool {
        self.form_identifier.is_empty() || self.form_identifier == EXTERNAL_RULE
    }
}

/// 当前有效的校验结果集合
///
/// 同一个 (表单标识, 问题组行号) 最多保留一条。插入新结果会先移除旧结果，
/// 只有失败结果会被保留，成功结果仅用于清除旧的失败。
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ValidationResults {
    results: Vec<ValidationResult>,
}

impl ValidationResults {
    pub fn new() -> Self {
        Self::default()
    }

    /// 插入一条结果，替换相同键的旧结果
    pub fn insert(&mut self, result: ValidationResult) {
        self.results.retain(|existing| !existing.same_key(&result));
        if !result.success {
            self.results.push(result);
        }
    }

    pub fn extend<I: IntoIterator<Item = ValidationResult>>(&mut self, results: I) {
        for result in results {
            self.insert(result);
        }
    }

    /// 按键合并多组结果，保留首次出现的那条
    pub fn union_by_key<I>(sources: I) -> Vec<ValidationResult>
    where
        I: IntoIterator<Item = Vec<ValidationResult>>,
    {
        let mut merged: Vec<ValidationResult> = Vec::new();
        for result in sources.into_iter().flatten() {
            if !merged.iter().any(|existing| existing.same_key(&result)) {
                merged.push(result);
            }
        }
        merged
    }

    pub fn has_failure(&self) -> bool {
        self.results.iter().any(|result| !result.success)
    }

    /// 给定标识集合中是否存在失败
    pub fn any_failure_for<S: AsRef<str>>(&self, identifiers: &[S]) -> bool {
        self.results.iter().any(|result| {
            !result.success
                && identifiers
                    .iter()
                    .any(|identifier| identifier.as_ref() == result.form_identifier)
        })
    }

    pub fn get(&self, form_identifier: &str) -> Option<&ValidationResult> {
        self.results
            .iter()
            .find(|result| result.form_identifier == form_identifier)
    }

    pub fn of_type(&self, validation_type: ValidationType) -> Vec<ValidationResult> {
        self.results
            .iter()
            .filter(|result| result.validation_type == validation_type)
            .cloned()
            .collect()
    }

    pub fn remove_type(&mut self, validation_type: ValidationType) {
        self.results
            .retain(|result| result.validation_type != validation_type);
    }

    pub fn remove_rule_level(&mut self) {
        self.results.retain(|result| !result.is_rule_level());
    }

    /// 移除已隐藏元素的结果
    pub fn remove_keys(&mut self, hidden: &[(String, Option<usize>)]) {
        self.results.retain(|result| {
            !hidden
                .iter()
                .any(|(uuid, index)| result.key() == (uuid.as_str(), *index))
        });
    }

    pub fn iter(&self) -> impl Iterator<Item = &ValidationResult> {
        self.results.iter()
    }

    pub fn to_vec(&self) -> Vec<ValidationResult> {
        self.results.clone()
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

impl FromIterator<ValidationResult> for ValidationResults {
    fn from_iter<I: IntoIterator<Item = ValidationResult>>(iter: I) -> Self {
        let mut results = ValidationResults::new();
        results.extend(iter);
        results
    }
}
