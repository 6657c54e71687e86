//! 条件评估器
//!
//! `ConditionEvaluator` 实现内置操作的比较逻辑，支持多种数据类型；
//! `RuleEvaluator` 负责单个叶子规则的完整评估流程。

use crate::error::RuleError;
use crate::models::{RuleLeaf, RuleNode, RuleResult};
use crate::path;
use crate::registry::OperationRegistry;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// 条件比较函数集合
pub struct ConditionEvaluator;

impl ConditionEvaluator {
    /// 严格相等：整数之间精确比较，含浮点数时按数值比较（`35 == 35.0`），
    /// 其他类型按结构比较，不做跨类型转换
    pub fn eq(field: &Value, expected: &Value) -> bool {
        match (field, expected) {
            (Value::Number(a), Value::Number(b)) if a.is_f64() || b.is_f64() => {
                a.as_f64() == b.as_f64()
            }
            _ => field == expected,
        }
    }

    /// 数值/时间比较，任一侧无法转换时返回 false
    pub fn compare<F>(field: &Value, expected: &Value, cmp: F) -> bool
    where
        F: Fn(f64, f64) -> bool,
    {
        match (Self::as_comparable(field), Self::as_comparable(expected)) {
            (Some(a), Some(b)) => cmp(a, b),
            _ => false,
        }
    }

    /// 范围比较 (between)，expected 为 [min, max]，两端包含
    pub fn between(field: &Value, expected: &Value) -> bool {
        match expected.as_array().map(Vec::as_slice) {
            Some([min, max]) => {
                Self::compare(field, min, |a, b| a >= b) && Self::compare(field, max, |a, b| a <= b)
            }
            _ => false,
        }
    }

    /// 列表包含检查 (in)
    pub fn in_list(field: &Value, expected: &Value) -> bool {
        expected
            .as_array()
            .is_some_and(|arr| arr.iter().any(|item| Self::eq(field, item)))
    }

    /// 字符串/数组包含检查
    pub fn contains(field: &Value, expected: &Value) -> bool {
        match field {
            Value::String(s) => expected.as_str().is_some_and(|sub| s.contains(sub)),
            Value::Array(arr) => arr.iter().any(|item| Self::eq(item, expected)),
            _ => false,
        }
    }

    /// 字符串前缀检查
    pub fn starts_with(field: &Value, expected: &Value) -> bool {
        match (field.as_str(), expected.as_str()) {
            (Some(s), Some(prefix)) => s.starts_with(prefix),
            _ => false,
        }
    }

    /// 字符串后缀检查
    pub fn ends_with(field: &Value, expected: &Value) -> bool {
        match (field.as_str(), expected.as_str()) {
            (Some(s), Some(suffix)) => s.ends_with(suffix),
            _ => false,
        }
    }

    /// 存在且非空：数组非空、对象至少有一个字段，其他非 null 值均为真
    pub fn is_present(field: &Value) -> bool {
        match field {
            Value::Null => false,
            Value::Array(arr) => !arr.is_empty(),
            Value::Object(obj) => !obj.is_empty(),
            _ => true,
        }
    }

    /// 转换为可比较的数值：数字原样，数字字符串解析，日期字符串转为毫秒时间戳
    pub fn as_comparable(value: &Value) -> Option<f64> {
        match value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s
                .trim()
                .parse::<f64>()
                .ok()
                .or_else(|| Self::parse_datetime(s).map(|dt| dt.timestamp_millis() as f64)),
            _ => None,
        }
    }

    /// 将值解释为时间：日期字符串，或毫秒时间戳
    pub fn as_datetime(value: &Value) -> Option<DateTime<Utc>> {
        match value {
            Value::String(s) => Self::parse_datetime(s),
            Value::Number(n) => n
                .as_i64()
                .or_else(|| n.as_f64().map(|f| f as i64))
                .and_then(DateTime::from_timestamp_millis),
            _ => None,
        }
    }

    /// 解析日期时间
    pub fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
        // ISO 8601 / RFC 3339
        if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
            return Some(dt.with_timezone(&Utc));
        }

        // 不带时区的日期时间，按 UTC 处理
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S") {
            return Some(dt.and_utc());
        }

        // 纯日期
        NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .ok()
            .and_then(|date| date.and_hms_opt(0, 0, 0))
            .map(|dt| dt.and_utc())
    }
}

/// 叶子规则评估器
///
/// 评估顺序（遇到第一个适用条件即返回）：
/// 1. key 为空 → MissingKey
/// 2. 操作未注册 → OperationNotFound
/// 3. 操作参数校验失败 → OperationParameterValidation
/// 4. 路径解析结果缺失或为 null → DataValueNotFound
/// 5. 调用操作，true 为 PASSED，false 为不带错误的 FAILED
#[derive(Clone)]
pub struct RuleEvaluator {
    registry: Arc<OperationRegistry>,
}

impl RuleEvaluator {
    pub fn new(registry: Arc<OperationRegistry>) -> Self {
        Self { registry }
    }

    /// 评估叶子规则，结果中原样回显规则
    pub fn evaluate_leaf(&self, leaf: &RuleLeaf, context: &Value) -> RuleResult {
        let rule = RuleNode::Leaf(leaf.clone());
        match self.check(leaf, context) {
            Ok(true) => RuleResult::passed(rule),
            Ok(false) => RuleResult::failed(rule),
            Err(e) => RuleResult::errored(rule, e),
        }
    }

    /// 评估叶子规则，返回是否通过或评估错误
    pub fn check(&self, leaf: &RuleLeaf, context: &Value) -> Result<bool, RuleError> {
        if leaf.key.is_empty() {
            return Err(RuleError::MissingKey);
        }

        let operation = self.registry.lookup(&leaf.operation).ok_or_else(|| {
            RuleError::OperationNotFound {
                operation: leaf.operation.clone(),
            }
        })?;

        if let Some(validator) = operation.parameter_validator() {
            validator
                .validate(&leaf.value)
                .map_err(|e| RuleError::OperationParameterValidation {
                    operation: leaf.operation.clone(),
                    detail: e.detail,
                })?;
        }

        let field_value = match path::resolve(context, &leaf.key) {
            Some(v) if !v.is_null() => v,
            _ => {
                return Err(RuleError::DataValueNotFound {
                    key: leaf.key.clone(),
                });
            }
        };

        let matched = operation.evaluate(&field_value, &leaf.value);
        debug!(
            key = %leaf.key,
            operation = %leaf.operation,
            matched,
            "leaf rule evaluated"
        );

        Ok(matched)
    }
}

impl Default for RuleEvaluator {
    fn default() -> Self {
        Self::new(OperationRegistry::shared())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RuleStatus;
    use serde_json::json;

    fn create_test_context() -> Value {
        json!({
            "country": "US",
            "name": "John",
            "age": 35,
            "tags": ["vip", "frequent"],
            "profile": { "nickname": null }
        })
    }

    #[test]
    fn test_eq_numbers() {
        assert!(ConditionEvaluator::eq(&json!(100), &json!(100)));
        assert!(ConditionEvaluator::eq(&json!(100.0), &json!(100)));
        assert!(!ConditionEvaluator::eq(&json!(100), &json!(101)));
        assert!(ConditionEvaluator::eq(&json!(-7), &json!(-7)));
        assert!(ConditionEvaluator::eq(&json!(-7), &json!(-7.0)));
    }

    #[test]
    fn test_eq_large_integers_are_exact() {
        // 超过 f64 精度的相邻整数
        let id = json!(9_007_199_254_740_993_u64);
        let other = json!(9_007_199_254_740_992_u64);
        assert!(!ConditionEvaluator::eq(&id, &other));
        assert!(ConditionEvaluator::eq(&id, &json!(9_007_199_254_740_993_u64)));
        assert!(!ConditionEvaluator::eq(&json!(u64::MAX), &json!(-1)));

        let evaluator = RuleEvaluator::default();
        let ctx = json!({ "id": 9_007_199_254_740_993_u64 });
        let equals = evaluator.evaluate_leaf(&RuleLeaf::new("id", "EQUALS", other.clone()), &ctx);
        let not_equals = evaluator.evaluate_leaf(&RuleLeaf::new("id", "NOT_EQUALS", other), &ctx);
        assert_eq!(equals.status, RuleStatus::Failed);
        assert_eq!(not_equals.status, RuleStatus::Passed);
    }

    #[test]
    fn test_eq_is_strict() {
        assert!(ConditionEvaluator::eq(&json!("hello"), &json!("hello")));
        assert!(!ConditionEvaluator::eq(&json!("100"), &json!(100)));
        assert!(!ConditionEvaluator::eq(&json!(true), &json!(1)));
    }

    #[test]
    fn test_numeric_comparisons() {
        assert!(ConditionEvaluator::compare(&json!(100), &json!(50), |a, b| a > b));
        assert!(ConditionEvaluator::compare(&json!("100"), &json!(50), |a, b| a > b));
        assert!(!ConditionEvaluator::compare(&json!("abc"), &json!(50), |a, b| a > b));
        assert!(!ConditionEvaluator::compare(&json!(true), &json!(0), |a, b| a > b));
    }

    #[test]
    fn test_date_comparisons() {
        assert!(ConditionEvaluator::compare(
            &json!("2024-01-15T10:00:00Z"),
            &json!("2024-01-20"),
            |a, b| a < b
        ));
        assert!(ConditionEvaluator::compare(
            &json!("2024-01-20T10:00:00"),
            &json!("2024-01-15T10:00:00+08:00"),
            |a, b| a > b
        ));
    }

    #[test]
    fn test_between() {
        assert!(ConditionEvaluator::between(&json!(50), &json!([0, 100])));
        assert!(ConditionEvaluator::between(&json!(100), &json!([0, 100])));
        assert!(!ConditionEvaluator::between(&json!(150), &json!([0, 100])));
        assert!(!ConditionEvaluator::between(&json!(50), &json!(100)));
    }

    #[test]
    fn test_in_list() {
        assert!(ConditionEvaluator::in_list(&json!("a"), &json!(["a", "b", "c"])));
        assert!(!ConditionEvaluator::in_list(&json!("d"), &json!(["a", "b", "c"])));
        assert!(!ConditionEvaluator::in_list(&json!("a"), &json!("a")));
    }

    #[test]
    fn test_contains() {
        assert!(ConditionEvaluator::contains(&json!("hello world"), &json!("world")));
        assert!(ConditionEvaluator::contains(&json!(["a", "b"]), &json!("b")));
        assert!(!ConditionEvaluator::contains(&json!(10), &json!(1)));
    }

    #[test]
    fn test_is_present() {
        assert!(!ConditionEvaluator::is_present(&json!([])));
        assert!(!ConditionEvaluator::is_present(&json!({})));
        assert!(ConditionEvaluator::is_present(&json!([0])));
        assert!(ConditionEvaluator::is_present(&json!({ "a": null })));
        assert!(ConditionEvaluator::is_present(&json!("")));
        assert!(ConditionEvaluator::is_present(&json!(0)));
        assert!(ConditionEvaluator::is_present(&json!(false)));
    }

    #[test]
    fn test_as_datetime() {
        let expected = DateTime::parse_from_rfc3339("2024-01-15T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(ConditionEvaluator::as_datetime(&json!("2024-01-15")), Some(expected));
        assert_eq!(
            ConditionEvaluator::as_datetime(&json!(expected.timestamp_millis())),
            Some(expected)
        );
        assert_eq!(ConditionEvaluator::as_datetime(&json!("yesterday")), None);
    }

    #[test]
    fn test_missing_key() {
        let evaluator = RuleEvaluator::default();
        let leaf = RuleLeaf::new("", "EQUALS", "US");
        let result = evaluator.evaluate_leaf(&leaf, &create_test_context());

        assert_eq!(result.status, RuleStatus::Failed);
        assert_eq!(result.error, Some(RuleError::MissingKey));
        assert_eq!(result.message.as_deref(), Some("Rule is missing the key field"));
        assert_eq!(result.rule, RuleNode::Leaf(leaf));
    }

    #[test]
    fn test_missing_key_precedes_unknown_operation() {
        let evaluator = RuleEvaluator::default();
        let result = evaluator.evaluate_leaf(&RuleLeaf::new("", "NOPE", 1), &json!({}));
        assert_eq!(result.error, Some(RuleError::MissingKey));
    }

    #[test]
    fn test_unknown_operation() {
        let evaluator = RuleEvaluator::default();
        // 字段不存在，但操作检查在路径解析之前
        let result = evaluator.evaluate_leaf(&RuleLeaf::new("nonexistent", "FOO", 1), &json!({}));

        assert_eq!(
            result.error,
            Some(RuleError::OperationNotFound {
                operation: "FOO".to_string()
            })
        );
        assert_eq!(result.message.as_deref(), Some("Unknown operation FOO"));
    }

    #[test]
    fn test_missing_or_null_field() {
        let evaluator = RuleEvaluator::default();
        let ctx = create_test_context();

        for key in ["nonexistent", "profile.nickname", "tags[9]"] {
            let result = evaluator.evaluate_leaf(&RuleLeaf::new(key, "EXISTS", Value::Null), &ctx);
            assert_eq!(result.status, RuleStatus::Failed);
            assert_eq!(
                result.error,
                Some(RuleError::DataValueNotFound {
                    key: key.to_string()
                })
            );
            assert_eq!(
                result.message,
                Some(format!("Field {} is missing or null", key))
            );
        }
    }

    #[test]
    fn test_parameter_validation_precedes_resolution() {
        let evaluator = RuleEvaluator::default();
        let result = evaluator.evaluate_leaf(
            &RuleLeaf::new("nonexistent", "IN", "US"),
            &create_test_context(),
        );

        assert!(matches!(
            result.error,
            Some(RuleError::OperationParameterValidation { .. })
        ));
        assert!(result
            .message
            .unwrap()
            .starts_with("Validation failed for 'IN', message: "));
    }

    #[test]
    fn test_logical_failure_has_no_error() {
        let evaluator = RuleEvaluator::default();
        let result = evaluator.evaluate_leaf(
            &RuleLeaf::new("country", "EQUALS", "CA"),
            &create_test_context(),
        );

        assert_eq!(result.status, RuleStatus::Failed);
        assert!(result.error.is_none());
        assert!(result.message.is_none());
    }

    #[test]
    fn test_passed() {
        let evaluator = RuleEvaluator::default();
        let result = evaluator.evaluate_leaf(
            &RuleLeaf::new("tags.length", "GTE", 2),
            &create_test_context(),
        );

        assert_eq!(result.status, RuleStatus::Passed);
        assert!(result.error.is_none());
    }
}
