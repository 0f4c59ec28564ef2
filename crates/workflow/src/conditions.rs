//! Branch predicates evaluated against a contact snapshot.
//!
//! Matching and ordering operators need the attribute present and surface a
//! typed error when it is not; only the emptiness operators treat a missing
//! attribute as empty. Numeric comparison coerces JSON numbers and numeric
//! strings; a present but non-coercible value compares false rather than
//! erroring.

use engage_core::types::ContactSnapshot;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConditionError {
    #[error("contact attribute \"{0}\" is missing from the snapshot")]
    MissingAttribute(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOperator {
    Equals,
    NotEquals,
    Contains,
    NotContains,
    GreaterThan,
    LessThan,
    GreaterThanOrEqual,
    LessThanOrEqual,
    InList,
    NotInList,
    IsEmpty,
    IsNotEmpty,
}

/// One `field operator value` check against the contact snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Condition {
    pub field: String,
    pub operator: ConditionOperator,
    #[serde(default)]
    pub value: Value,
}

impl Condition {
    pub fn new(field: impl Into<String>, operator: ConditionOperator, value: Value) -> Self {
        Self {
            field: field.into(),
            operator,
            value,
        }
    }

    pub fn evaluate(&self, contact: &ContactSnapshot) -> Result<bool, ConditionError> {
        let actual = contact.attribute(&self.field);
        match self.operator {
            ConditionOperator::IsEmpty => Ok(is_empty_value(actual)),
            ConditionOperator::IsNotEmpty => Ok(!is_empty_value(actual)),
            _ => {
                let actual = actual
                    .ok_or_else(|| ConditionError::MissingAttribute(self.field.clone()))?;
                Ok(compare_values(actual, self.operator, &self.value))
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogicalOperator {
    And,
    Or,
}

/// Flat list of conditions combined under one logical operator. An empty
/// group is vacuously true.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConditionGroup {
    pub logic: LogicalOperator,
    pub conditions: Vec<Condition>,
}

impl Default for ConditionGroup {
    fn default() -> Self {
        Self {
            logic: LogicalOperator::And,
            conditions: Vec::new(),
        }
    }
}

impl ConditionGroup {
    pub fn all_of(conditions: Vec<Condition>) -> Self {
        Self {
            logic: LogicalOperator::And,
            conditions,
        }
    }

    pub fn any_of(conditions: Vec<Condition>) -> Self {
        Self {
            logic: LogicalOperator::Or,
            conditions,
        }
    }

    pub fn evaluate(&self, contact: &ContactSnapshot) -> Result<bool, ConditionError> {
        if self.conditions.is_empty() {
            return Ok(true);
        }
        match self.logic {
            LogicalOperator::And => {
                for condition in &self.conditions {
                    if !condition.evaluate(contact)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            LogicalOperator::Or => {
                for condition in &self.conditions {
                    if condition.evaluate(contact)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
        }
    }
}

fn is_empty_value(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.is_empty(),
        Some(Value::Array(a)) => a.is_empty(),
        Some(Value::Object(m)) => m.is_empty(),
        Some(Value::Bool(b)) => !b,
        Some(Value::Number(n)) => n.as_f64() == Some(0.0),
    }
}

#[allow(clippy::unnecessary_map_or)]
fn compare_values(actual: &Value, operator: ConditionOperator, expected: &Value) -> bool {
    match operator {
        ConditionOperator::Equals => values_equal(actual, expected),
        ConditionOperator::NotEquals => !values_equal(actual, expected),
        ConditionOperator::Contains => actual
            .as_str()
            .zip(expected.as_str())
            .map_or(false, |(a, e)| a.to_lowercase().contains(&e.to_lowercase())),
        ConditionOperator::NotContains => actual
            .as_str()
            .zip(expected.as_str())
            .map_or(true, |(a, e)| !a.to_lowercase().contains(&e.to_lowercase())),
        ConditionOperator::GreaterThan => {
            numeric_cmp(actual, expected).map_or(false, |o| o == std::cmp::Ordering::Greater)
        }
        ConditionOperator::GreaterThanOrEqual => {
            numeric_cmp(actual, expected).map_or(false, |o| o != std::cmp::Ordering::Less)
        }
        ConditionOperator::LessThan => {
            numeric_cmp(actual, expected).map_or(false, |o| o == std::cmp::Ordering::Less)
        }
        ConditionOperator::LessThanOrEqual => {
            numeric_cmp(actual, expected).map_or(false, |o| o != std::cmp::Ordering::Greater)
        }
        ConditionOperator::InList => expected
            .as_array()
            .map_or(false, |list| list.iter().any(|v| values_equal(actual, v))),
        ConditionOperator::NotInList => expected
            .as_array()
            .map_or(true, |list| !list.iter().any(|v| values_equal(actual, v))),
        ConditionOperator::IsEmpty => is_empty_value(Some(actual)),
        ConditionOperator::IsNotEmpty => !is_empty_value(Some(actual)),
    }
}

/// Equality with numeric widening so `5` and `5.0` match.
fn values_equal(a: &Value, b: &Value) -> bool {
    match (coerce_number(a), coerce_number(b)) {
        (Some(x), Some(y)) if a.is_number() && b.is_number() => x == y,
        _ => a == b,
    }
}

fn coerce_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn numeric_cmp(a: &Value, b: &Value) -> Option<std::cmp::Ordering> {
    let a_num = coerce_number(a)?;
    let b_num = coerce_number(b)?;
    a_num.partial_cmp(&b_num)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use uuid::Uuid;

    fn make_contact() -> ContactSnapshot {
        ContactSnapshot::new(Uuid::new_v4())
            .with_attribute("status", json!("customer"))
            .with_attribute("lead_score", json!(72))
            .with_attribute("company", json!("Acme Corporation"))
            .with_attribute("tags", json!(["vip", "newsletter"]))
            .with_attribute("phone", json!(""))
    }

    #[test]
    fn test_equals_and_not_equals() {
        let contact = make_contact();
        let eq = Condition::new("status", ConditionOperator::Equals, json!("customer"));
        assert_eq!(eq.evaluate(&contact), Ok(true));
        let ne = Condition::new("status", ConditionOperator::NotEquals, json!("lead"));
        assert_eq!(ne.evaluate(&contact), Ok(true));
    }

    #[test]
    fn test_contains_is_case_insensitive() {
        let contact = make_contact();
        let c = Condition::new("company", ConditionOperator::Contains, json!("acme"));
        assert_eq!(c.evaluate(&contact), Ok(true));
        let n = Condition::new("company", ConditionOperator::NotContains, json!("globex"));
        assert_eq!(n.evaluate(&contact), Ok(true));
        // Non-string attribute never "contains".
        let non_str = Condition::new("lead_score", ConditionOperator::Contains, json!("7"));
        assert_eq!(non_str.evaluate(&contact), Ok(false));
    }

    #[test]
    fn test_numeric_comparison_coerces_strings() {
        let contact = make_contact().with_attribute("deal_size", json!("1500.5"));
        let gt = Condition::new("lead_score", ConditionOperator::GreaterThan, json!(50));
        assert_eq!(gt.evaluate(&contact), Ok(true));
        let le = Condition::new(
            "deal_size",
            ConditionOperator::LessThanOrEqual,
            json!(1500.5),
        );
        assert_eq!(le.evaluate(&contact), Ok(true));
        // Non-numeric value compares false rather than erroring.
        let bad = Condition::new("status", ConditionOperator::GreaterThan, json!(10));
        assert_eq!(bad.evaluate(&contact), Ok(false));
    }

    #[test]
    fn test_in_list() {
        let contact = make_contact();
        let in_list = Condition::new(
            "status",
            ConditionOperator::InList,
            json!(["lead", "customer"]),
        );
        assert_eq!(in_list.evaluate(&contact), Ok(true));
        let not_in = Condition::new("status", ConditionOperator::NotInList, json!(["lead"]));
        assert_eq!(not_in.evaluate(&contact), Ok(true));
        // A non-list expected value can never match.
        let malformed = Condition::new("status", ConditionOperator::InList, json!("lead"));
        assert_eq!(malformed.evaluate(&contact), Ok(false));
    }

    #[test]
    fn test_emptiness_handles_missing_attribute() {
        let contact = make_contact();
        let empty = Condition::new("phone", ConditionOperator::IsEmpty, Value::Null);
        assert_eq!(empty.evaluate(&contact), Ok(true));
        let missing = Condition::new("nickname", ConditionOperator::IsEmpty, Value::Null);
        assert_eq!(missing.evaluate(&contact), Ok(true));
        let present = Condition::new("company", ConditionOperator::IsNotEmpty, Value::Null);
        assert_eq!(present.evaluate(&contact), Ok(true));
    }

    #[test]
    fn test_missing_attribute_is_a_typed_error() {
        let contact = make_contact();
        let check = Condition::new("nickname", ConditionOperator::Equals, json!("Al"));
        assert_eq!(
            check.evaluate(&contact),
            Err(ConditionError::MissingAttribute("nickname".into()))
        );
    }

    #[test]
    fn test_group_and_or() {
        let contact = make_contact();
        let both = ConditionGroup::all_of(vec![
            Condition::new("status", ConditionOperator::Equals, json!("customer")),
            Condition::new("lead_score", ConditionOperator::GreaterThan, json!(50)),
        ]);
        assert_eq!(both.evaluate(&contact), Ok(true));

        let either = ConditionGroup::any_of(vec![
            Condition::new("status", ConditionOperator::Equals, json!("lead")),
            Condition::new("lead_score", ConditionOperator::GreaterThan, json!(50)),
        ]);
        assert_eq!(either.evaluate(&contact), Ok(true));

        let neither = ConditionGroup::any_of(vec![
            Condition::new("status", ConditionOperator::Equals, json!("lead")),
            Condition::new("lead_score", ConditionOperator::GreaterThan, json!(90)),
        ]);
        assert_eq!(neither.evaluate(&contact), Ok(false));
    }

    #[test]
    fn test_empty_group_is_true() {
        let contact = make_contact();
        assert_eq!(ConditionGroup::default().evaluate(&contact), Ok(true));
    }

    #[test]
    fn test_numeric_equality_widens() {
        let contact = make_contact().with_attribute("score", json!(5.0));
        let eq = Condition::new("score", ConditionOperator::Equals, json!(5));
        assert_eq!(eq.evaluate(&contact), Ok(true));
    }
}
