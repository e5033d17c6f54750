//! 事件标签规则引擎
//!
//! 对任意结构化事件评估一组带优先级的布尔规则，输出合并后的标签：
//! - 可组合的条件模型（AND / OR / NOT）
//! - 点号字段路径解析与操作符求值
//! - 优先级降序、id 升序的确定性执行顺序
//! - 支持并发读写的快照式规则存储

pub mod engine;
pub mod error;
pub mod evaluator;
pub mod models;
pub mod operators;
pub mod repository;
pub mod store;

pub use engine::{RuleEngine, TAGS_FIELD};
pub use error::{Result, RuleError};
pub use evaluator::{resolve_field, ConditionEvaluator, RuleEvaluator};
pub use models::{Condition, ConditionGroup, Event, Rule, RuleCondition, TagAction, TagResult};
pub use operators::{LogicalOperator, Operator};
pub use repository::{JsonFileRuleRepository, RuleRepository};
pub use store::RuleStore;
