//! 声明式条件
//!
//! 基于表单答案的条件树，用于元素可见性、规则校验、决策和随访计划。

use crate::observations::{ObservationValue, ObservationsHolder};
use serde::{Deserialize, Serialize};

/// 条件树
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Condition {
    /// 已作答
    Answered { concept: String },
    /// 答案等于
    Equals { concept: String, value: ObservationValue },
    /// 编码答案包含
    Contains { concept: String, answer: String },
    /// 数值大于
    GreaterThan { concept: String, value: f64 },
    /// 数值小于
    LessThan { concept: String, value: f64 },
    All { conditions: Vec<Condition> },
    Any { conditions: Vec<Condition> },
    Not { condition: Box<Condition> },
}

impl Condition {
    pub fn evaluate(&self, observations: &ObservationsHolder) -> bool {
        match self {
            Condition::Answered { concept } => observations.has_answer(concept),
            Condition::Equals { concept, value } => observations.value(concept) == Some(value),
            Condition::Contains { concept, answer } => observations
                .value(concept)
                .is_some_and(|v| v.coded_answers().iter().any(|a| a == answer)),
            Condition::GreaterThan { concept, value } => observations
                .value(concept)
                .and_then(ObservationValue::as_numeric)
                .is_some_and(|v| v > *value),
            Condition::LessThan { concept, value } => observations
                .value(concept)
                .and_then(ObservationValue::as_numeric)
                .is_some_and(|v| v < *value),
            Condition::All { conditions } => conditions.iter().all(|c| c.evaluate(observations)),
            Condition::Any { conditions } => conditions.iter().any(|c| c.evaluate(observations)),
            Condition::Not { condition } => !condition.evaluate(observations),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observations::Observation;

    fn holder() -> ObservationsHolder {
        ObservationsHolder::new(vec![
            Observation::new("Pregnant", ObservationValue::Coded(vec!["Yes".into()])),
            Observation::new("Age", ObservationValue::Numeric(24.0)),
        ])
    }

    #[test]
    fn test_leaf_conditions() {
        let obs = holder();
        assert!(Condition::Answered { concept: "Age".into() }.evaluate(&obs));
        assert!(!Condition::Answered { concept: "Weight".into() }.evaluate(&obs));
        assert!(Condition::Contains { concept: "Pregnant".into(), answer: "Yes".into() }.evaluate(&obs));
        assert!(Condition::GreaterThan { concept: "Age".into(), value: 18.0 }.evaluate(&obs));
        assert!(!Condition::LessThan { concept: "Age".into(), value: 18.0 }.evaluate(&obs));
        assert!(Condition::Equals {
            concept: "Age".into(),
            value: ObservationValue::Numeric(24.0)
        }
        .evaluate(&obs));
    }

    #[test]
    fn test_composite_conditions() {
        let obs = holder();
        let adult_pregnant = Condition::All {
            conditions: vec![
                Condition::GreaterThan { concept: "Age".into(), value: 18.0 },
                Condition::Contains { concept: "Pregnant".into(), answer: "Yes".into() },
            ],
        };
        assert!(adult_pregnant.evaluate(&obs));
        assert!(!Condition::Not { condition: Box::new(adult_pregnant) }.evaluate(&obs));
        assert!(!Condition::Any { conditions: vec![] }.evaluate(&obs));
    }

    #[test]
    fn test_deserialize_from_json() {
        let json = r#"{"type":"not","condition":{"type":"answered","concept":"Weight"}}"#;
        let condition: Condition = serde_json::from_str(json).unwrap();
        assert!(condition.evaluate(&holder()));
    }
}
