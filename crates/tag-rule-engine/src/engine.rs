//! 规则引擎
//!
//! 按优先级顺序对事件执行全部启用规则，合并命中规则的标签，
//! 返回附加了 `tags` 字段的事件副本。

use crate::error::{Result, RuleError};
use crate::evaluator::{ConditionEvaluator, RuleEvaluator};
use crate::models::{Event, Rule, TagResult};
use crate::repository::RuleRepository;
use crate::store::RuleStore;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tagger_shared::observability::metrics::{
    record_evaluation_error, record_event_processed, record_rule_match,
};
use tracing::{debug, error, info, instrument};

/// 输出事件中承载标签结果的字段名
pub const TAGS_FIELD: &str = "tags";

/// 规则引擎
#[derive(Clone, Default)]
pub struct RuleEngine {
    store: RuleStore,
}

impl RuleEngine {
    pub fn new() -> Self {
        Self::with_store(RuleStore::new())
    }

    /// 使用已有的规则存储创建引擎
    pub fn with_store(store: RuleStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &RuleStore {
        &self.store
    }

    /// 计算事件的标签结果
    ///
    /// 任一规则评估出错都会中止整个事件的处理，不会跳过出错的规则。
    #[instrument(skip_all, fields(rules = tracing::field::Empty, matched = tracing::field::Empty))]
    pub fn evaluate(&self, event: &Event) -> Result<TagResult> {
        let start = Instant::now();
        let rules = self.store.get_all(true);

        let span = tracing::Span::current();
        span.record("rules", rules.len());

        let mut tags = TagResult::default();

        for rule in &rules {
            let matched = RuleEvaluator::evaluate(&rule.condition, event).map_err(|e| {
                record_evaluation_error(&rule.id);
                error!(rule_id = %rule.id, error = %e, "规则评估失败");
                e
            })?;

            if matched {
                debug!(rule_id = %rule.id, priority = rule.priority, "规则命中");
                record_rule_match(&rule.id);
                tags.apply(rule);
            }
        }

        tags.dedup();

        span.record("matched", tags.matched_rules.len());
        record_event_processed(tags.matched_rules.len(), start.elapsed().as_secs_f64());

        Ok(tags)
    }

    /// 处理事件，返回附加 `tags` 字段的副本，原事件不被修改
    pub fn process(&self, event: &Event) -> Result<Event> {
        let tags = self.evaluate(event)?;
        Self::annotate(event, &tags)
    }

    /// 处理任意 JSON 值形式的事件，要求其为对象
    pub fn process_value(&self, event: &Value) -> Result<Value> {
        let object = event
            .as_object()
            .ok_or_else(|| RuleError::EventNotObject(ConditionEvaluator::type_name(event)))?;

        self.process(object).map(Value::Object)
    }

    /// 复制事件并写入标签结果
    pub fn annotate(event: &Event, tags: &TagResult) -> Result<Event> {
        let mut tagged = event.clone();
        tagged.insert(TAGS_FIELD.to_string(), serde_json::to_value(tags)?);
        Ok(tagged)
    }

    /// 试运行规则，不写入存储
    pub fn test_rule(&self, rule: &Rule, event: &Event) -> Result<bool> {
        rule.validate()?;
        RuleEvaluator::evaluate(&rule.condition, event)
    }

    pub fn add_rule(&self, rule: Rule) -> Result<()> {
        self.store.add(rule)
    }

    pub fn get_rule(&self, rule_id: &str) -> Option<Arc<Rule>> {
        self.store.get(rule_id)
    }

    pub fn list_rules(&self, enabled_only: bool) -> Vec<Arc<Rule>> {
        self.store.get_all(enabled_only)
    }

    pub fn delete_rule(&self, rule_id: &str) -> bool {
        self.store.delete(rule_id)
    }

    /// 从仓储加载规则到存储（按 id upsert）
    pub fn load_from(&self, repository: &dyn RuleRepository) -> Result<usize> {
        let rules = repository.load_all()?;
        let count = self.store.load_batch(rules)?;
        info!("已从仓储加载 {} 条规则", count);
        Ok(count)
    }

    /// 将当前全部规则按排序契约写入仓储
    pub fn save_to(&self, repository: &dyn RuleRepository) -> Result<usize> {
        let rules: Vec<Rule> = self
            .store
            .get_all(false)
            .iter()
            .map(|r| Rule::clone(r))
            .collect();

        repository.save_all(&rules)?;
        info!("已保存 {} 条规则到仓储", rules.len());
        Ok(rules.len())
    }
}
