//! 规则引擎领域模型

use crate::error::{Result, RuleError};
use crate::operators::{LogicalOperator, Operator};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;

/// 事件：任意嵌套的 JSON 对象
pub type Event = Map<String, Value>;

/// 单个条件：字段路径 + 操作符 + 比较值
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    /// 点号分隔的字段路径，如 "meta.device_id"
    pub field: String,
    pub operator: Operator,
    /// exists / not_exists 不使用该值
    #[serde(default)]
    pub value: Value,
    /// 对比较结果取反
    #[serde(default)]
    pub negate: bool,
}

impl Condition {
    pub fn new(field: impl Into<String>, operator: Operator, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            operator,
            value: value.into(),
            negate: false,
        }
    }

    pub fn exists(field: impl Into<String>) -> Self {
        Self::new(field, Operator::Exists, Value::Null)
    }

    pub fn not_exists(field: impl Into<String>) -> Self {
        Self::new(field, Operator::NotExists, Value::Null)
    }

    /// 返回取反后的条件
    pub fn negated(mut self) -> Self {
        self.negate = !self.negate;
        self
    }

    /// 校验字段路径
    pub fn validate(&self) -> Result<()> {
        if self.field.is_empty() {
            return Err(RuleError::Validation("条件的字段不能为空".to_string()));
        }

        if self.field.split('.').any(str::is_empty) {
            return Err(RuleError::Validation(format!(
                "字段路径 '{}' 包含空段",
                self.field
            )));
        }

        Ok(())
    }
}

/// 条件组：一组条件 + 逻辑组合方式
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionGroup {
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub operator: LogicalOperator,
}

/// 与规则定义 JSON 中的 `condition` 字段同名的别名
pub type RuleCondition = ConditionGroup;

impl ConditionGroup {
    pub fn new(operator: LogicalOperator, conditions: Vec<Condition>) -> Self {
        Self {
            conditions,
            operator,
        }
    }

    pub fn and(conditions: Vec<Condition>) -> Self {
        Self::new(LogicalOperator::And, conditions)
    }

    pub fn or(conditions: Vec<Condition>) -> Self {
        Self::new(LogicalOperator::Or, conditions)
    }

    pub fn not(condition: Condition) -> Self {
        Self::new(LogicalOperator::Not, vec![condition])
    }

    pub fn validate(&self) -> Result<()> {
        if self.operator == LogicalOperator::Not && self.conditions.len() != 1 {
            return Err(RuleError::Validation(format!(
                "NOT 逻辑组必须且只能包含一个条件, 实际 {} 个",
                self.conditions.len()
            )));
        }

        for (i, cond) in self.conditions.iter().enumerate() {
            cond.validate().map_err(|e| match e {
                RuleError::Validation(msg) => {
                    RuleError::Validation(format!("conditions[{}]: {}", i, msg))
                }
                other => other,
            })?;
        }

        Ok(())
    }
}

/// 规则命中后附加到事件上的标签
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TagAction {
    #[serde(default)]
    pub features: Vec<String>,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl TagAction {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_features<I, S>(mut self, features: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.features.extend(features.into_iter().map(Into::into));
        self
    }

    pub fn with_labels<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.labels.extend(labels.into_iter().map(Into::into));
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// 规则定义
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// 数值越大越先评估
    #[serde(default)]
    pub priority: i64,
    pub condition: ConditionGroup,
    pub action: TagAction,
}

fn default_enabled() -> bool {
    true
}

impl Rule {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        condition: ConditionGroup,
        action: TagAction,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: None,
            enabled: true,
            priority: 0,
            condition,
            action,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// 从 JSON 字符串解析并校验规则
    pub fn from_json(json: &str) -> Result<Self> {
        let rule: Self = serde_json::from_str(json)
            .map_err(|e| RuleError::Validation(format!("规则解析失败: {}", e)))?;
        rule.validate()?;
        Ok(rule)
    }

    /// 从 JSON 值解析并校验规则
    pub fn from_value(value: Value) -> Result<Self> {
        let rule: Self = serde_json::from_value(value)
            .map_err(|e| RuleError::Validation(format!("规则解析失败: {}", e)))?;
        rule.validate()?;
        Ok(rule)
    }

    /// 校验规则结构
    pub fn validate(&self) -> Result<()> {
        if self.id.is_empty() {
            return Err(RuleError::Validation("规则 ID 不能为空".to_string()));
        }

        if self.name.is_empty() {
            return Err(RuleError::Validation(format!(
                "规则 '{}' 的名称不能为空",
                self.id
            )));
        }

        self.condition.validate().map_err(|e| match e {
            RuleError::Validation(msg) => {
                RuleError::Validation(format!("规则 '{}': {}", self.id, msg))
            }
            other => other,
        })
    }
}

/// 单次处理的聚合标签结果
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TagResult {
    pub features: Vec<String>,
    pub labels: Vec<String>,
    pub metadata: Map<String, Value>,
    /// 按评估顺序记录的命中规则 ID
    pub matched_rules: Vec<String>,
}

impl TagResult {
    /// 合并一条命中规则的标签
    ///
    /// 元数据按遍历顺序覆盖：同名键以后合并的规则为准。
    pub fn apply(&mut self, rule: &Rule) {
        self.features.extend(rule.action.features.iter().cloned());
        self.labels.extend(rule.action.labels.iter().cloned());
        for (key, value) in &rule.action.metadata {
            self.metadata.insert(key.clone(), value.clone());
        }
        self.matched_rules.push(rule.id.clone());
    }

    /// 稳定去重：保留每个 feature / label 首次出现的位置
    pub fn dedup(&mut self) {
        dedup_stable(&mut self.features);
        dedup_stable(&mut self.labels);
    }

    pub fn is_empty(&self) -> bool {
        self.matched_rules.is_empty()
    }
}

fn dedup_stable(items: &mut Vec<String>) {
    let mut seen = HashSet::with_capacity(items.len());
    items.retain(|item| seen.insert(item.clone()));
}
