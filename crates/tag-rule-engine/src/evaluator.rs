//! 条件评估器
//!
//! 负责字段路径解析、单个条件的操作符求值，以及条件组的逻辑组合。

use crate::error::{Result, RuleError};
use crate::models::{Condition, ConditionGroup, Event};
use crate::operators::{LogicalOperator, Operator};
use serde_json::Value;
use std::cmp::Ordering;
use tracing::trace;

/// 解析点号分隔的字段路径
///
/// 逐段向下查找对象键；任一段的当前值不是对象或键不存在时返回 `None`（缺失）。
/// 显式的 JSON `null` 是存在的值，不视为缺失。
///
/// 注意：这与“`null` 即缺失”的约定不同。`{"meta": {"device_id": null}}` 上
/// `exists meta.device_id` 为真、`not_exists` 为假；持久化实现不能用 `null`
/// 代替删除字段。
pub fn resolve_field<'a>(event: &'a Event, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let first = segments.next()?;

    segments.try_fold(event.get(first)?, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        _ => None,
    })
}

/// 单条件操作符评估器
pub struct ConditionEvaluator;

impl ConditionEvaluator {
    /// 评估操作符
    ///
    /// 返回 `Some(bool)` 表示比较结果（可被 negate 取反）；
    /// 返回 `None` 表示操作符不适用（字段缺失、`in` 的比较值不是数组、
    /// `contains` 作用于不支持的类型），条件直接视为不成立。
    ///
    /// # Arguments
    /// * `field_value` - 从事件中解析出的字段值
    /// * `operator` - 操作符
    /// * `expected_value` - 规则中定义的比较值
    pub fn evaluate(
        field_value: Option<&Value>,
        operator: Operator,
        expected_value: &Value,
    ) -> Result<Option<bool>> {
        match operator {
            Operator::Exists => return Ok(Some(field_value.is_some())),
            Operator::NotExists => return Ok(Some(field_value.is_none())),
            _ => {}
        }

        // 操作符不会作用于缺失字段
        let Some(field) = field_value else {
            return Ok(None);
        };

        match operator {
            Operator::Eq => Ok(Some(Self::values_equal(field, expected_value))),
            Operator::Ne => Ok(Some(!Self::values_equal(field, expected_value))),
            Operator::Gt => Self::ordered(field, expected_value, operator, Ordering::is_gt),
            Operator::Gte => Self::ordered(field, expected_value, operator, Ordering::is_ge),
            Operator::Lt => Self::ordered(field, expected_value, operator, Ordering::is_lt),
            Operator::Lte => Self::ordered(field, expected_value, operator, Ordering::is_le),
            Operator::In => Ok(Self::in_list(field, expected_value)),
            Operator::NotIn => Ok(Self::in_list(field, expected_value).map(|r| !r)),
            Operator::Contains => Ok(Self::contains(field, expected_value)),
            Operator::Exists | Operator::NotExists => unreachable!(),
        }
    }

    /// 相等比较：数值按数值语义比较（130 == 130.0），数组/对象逐元素比较
    pub fn values_equal(left: &Value, right: &Value) -> bool {
        match (left, right) {
            (Value::Number(_), Value::Number(_)) => {
                Self::compare_numbers(left, right) == Some(Ordering::Equal)
            }
            (Value::Array(a), Value::Array(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| Self::values_equal(x, y))
            }
            (Value::Object(a), Value::Object(b)) => {
                a.len() == b.len()
                    && a.iter()
                        .all(|(k, v)| b.get(k).is_some_and(|w| Self::values_equal(v, w)))
            }
            _ => left == right,
        }
    }

    /// 有序比较，两侧类型必须可比较
    fn ordered(
        field: &Value,
        expected: &Value,
        operator: Operator,
        accept: fn(Ordering) -> bool,
    ) -> Result<Option<bool>> {
        let ordering = Self::compare_values(field, expected).ok_or_else(|| {
            RuleError::IncomparableTypes {
                operator,
                left: Self::type_name(field),
                right: Self::type_name(expected),
            }
        })?;

        Ok(Some(accept(ordering)))
    }

    /// 同类型值的全序比较；类型不兼容时返回 None
    fn compare_values(left: &Value, right: &Value) -> Option<Ordering> {
        match (left, right) {
            (Value::Number(_), Value::Number(_)) => Self::compare_numbers(left, right),
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            (Value::Array(a), Value::Array(b)) => {
                for (x, y) in a.iter().zip(b) {
                    match Self::compare_values(x, y)? {
                        Ordering::Equal => continue,
                        other => return Some(other),
                    }
                }
                Some(a.len().cmp(&b.len()))
            }
            _ => None,
        }
    }

    fn compare_numbers(left: &Value, right: &Value) -> Option<Ordering> {
        // 整数优先精确比较，避免大整数转 f64 丢失精度
        if let (Some(a), Some(b)) = (left.as_i64(), right.as_i64()) {
            return Some(a.cmp(&b));
        }
        if let (Some(a), Some(b)) = (left.as_u64(), right.as_u64()) {
            return Some(a.cmp(&b));
        }
        left.as_f64()?.partial_cmp(&right.as_f64()?)
    }

    /// 列表成员检查，比较值不是数组时不适用
    fn in_list(field: &Value, expected: &Value) -> Option<bool> {
        let items = expected.as_array()?;
        Some(items.iter().any(|item| Self::values_equal(field, item)))
    }

    /// 字符串子串 / 数组元素包含检查
    fn contains(field: &Value, expected: &Value) -> Option<bool> {
        match field {
            Value::String(s) => expected.as_str().map(|needle| s.contains(needle)),
            Value::Array(items) => {
                Some(items.iter().any(|item| Self::values_equal(item, expected)))
            }
            _ => None,
        }
    }

    /// 获取值的类型名称
    pub fn type_name(value: &Value) -> &'static str {
        match value {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
        }
    }
}

/// 条件组评估器
pub struct RuleEvaluator;

impl RuleEvaluator {
    /// 评估单个条件（含 negate）
    pub fn evaluate_condition(condition: &Condition, event: &Event) -> Result<bool> {
        let field_value = resolve_field(event, &condition.field);

        let outcome =
            ConditionEvaluator::evaluate(field_value, condition.operator, &condition.value)?;

        let matched = match outcome {
            Some(result) => result != condition.negate,
            None => false,
        };

        trace!(
            field = %condition.field,
            operator = %condition.operator,
            negate = condition.negate,
            present = field_value.is_some(),
            matched,
            "条件评估"
        );

        Ok(matched)
    }

    /// 评估条件组（短路求值）
    ///
    /// 空条件组视为成立；NOT 组必须恰好包含一个条件。
    pub fn evaluate(group: &ConditionGroup, event: &Event) -> Result<bool> {
        if group.conditions.is_empty() {
            return Ok(true);
        }

        match group.operator {
            LogicalOperator::And => {
                for cond in &group.conditions {
                    if !Self::evaluate_condition(cond, event)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            LogicalOperator::Or => {
                for cond in &group.conditions {
                    if Self::evaluate_condition(cond, event)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            LogicalOperator::Not => match group.conditions.as_slice() {
                [only] => Ok(!Self::evaluate_condition(only, event)?),
                _ => Err(RuleError::NotArity {
                    actual: group.conditions.len(),
                }),
            },
        }
    }
}
