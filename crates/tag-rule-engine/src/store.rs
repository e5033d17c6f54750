//! 规则存储管理
//!
//! 读取端通过 `ArcSwap` 获取整张规则表的快照（无锁），写入端串行化后
//! 以写时复制的方式发布新版本，保证 `get_all` 永远只看到一个完整版本。

use crate::error::Result;
use crate::models::Rule;
use arc_swap::ArcSwap;
use parking_lot::Mutex;
use std::cmp::Reverse;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument, warn};

type RuleMap = HashMap<String, Arc<Rule>>;

/// 规则存储
#[derive(Clone)]
pub struct RuleStore {
    /// 当前规则表快照
    rules: Arc<ArcSwap<RuleMap>>,
    /// 串行化写入，避免并发写丢失更新
    write_lock: Arc<Mutex<()>>,
}

impl RuleStore {
    /// 创建新的规则存储
    pub fn new() -> Self {
        Self {
            rules: Arc::new(ArcSwap::from_pointee(RuleMap::new())),
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    /// 获取当前存储的规则数量
    pub fn len(&self) -> usize {
        self.rules.load().len()
    }

    /// 检查存储是否为空
    pub fn is_empty(&self) -> bool {
        self.rules.load().is_empty()
    }

    /// 新增或替换规则（按 id upsert）
    ///
    /// 校验失败时存储保持不变。
    #[instrument(skip(self, rule), fields(rule_id = %rule.id, rule_name = %rule.name))]
    pub fn add(&self, rule: Rule) -> Result<()> {
        rule.validate()?;

        let rule_id = rule.id.clone();
        let replaced = self.mutate(|rules| rules.insert(rule_id.clone(), Arc::new(rule)).is_some());

        if replaced {
            info!("规则已替换: {}", rule_id);
        } else {
            info!("规则已加载: {}", rule_id);
        }
        Ok(())
    }

    /// 获取规则
    pub fn get(&self, rule_id: &str) -> Option<Arc<Rule>> {
        self.rules.load().get(rule_id).cloned()
    }

    /// 检查规则是否存在
    pub fn exists(&self, rule_id: &str) -> bool {
        self.rules.load().contains_key(rule_id)
    }

    /// 获取规则快照，按 priority 降序、id 升序排列
    pub fn get_all(&self, enabled_only: bool) -> Vec<Arc<Rule>> {
        let snapshot = self.rules.load_full();

        let mut rules: Vec<Arc<Rule>> = snapshot
            .values()
            .filter(|r| !enabled_only || r.enabled)
            .cloned()
            .collect();

        rules.sort_by(|a, b| {
            Reverse(a.priority)
                .cmp(&Reverse(b.priority))
                .then_with(|| a.id.cmp(&b.id))
        });
        rules
    }

    /// 删除规则，返回规则是否存在
    #[instrument(skip(self))]
    pub fn delete(&self, rule_id: &str) -> bool {
        let existed = self.mutate(|rules| rules.remove(rule_id).is_some());

        if existed {
            info!("规则已删除: {}", rule_id);
        } else {
            warn!("删除不存在的规则: {}", rule_id);
        }
        existed
    }

    /// 批量加载规则
    ///
    /// 先校验全部规则，任一失败则整体拒绝；成功后一次性发布，
    /// 同一批次中重复的 id 以后出现者为准。
    #[instrument(skip(self, rules), fields(count = rules.len()))]
    pub fn load_batch(&self, rules: Vec<Rule>) -> Result<usize> {
        for rule in &rules {
            rule.validate()?;
        }

        let count = rules.len();
        self.mutate(|current| {
            for rule in rules {
                current.insert(rule.id.clone(), Arc::new(rule));
            }
        });

        info!("批量加载完成: {} 条规则", count);
        Ok(count)
    }

    /// 清空所有规则
    #[instrument(skip(self))]
    pub fn clear(&self) {
        let count = self.mutate(|rules| {
            let count = rules.len();
            rules.clear();
            count
        });
        info!("已清空 {} 条规则", count);
    }

    /// 在写锁内复制当前规则表、修改并发布新版本
    fn mutate<T>(&self, f: impl FnOnce(&mut RuleMap) -> T) -> T {
        let _guard = self.write_lock.lock();
        let mut next = RuleMap::clone(&self.rules.load());
        let out = f(&mut next);
        self.rules.store(Arc::new(next));
        out
    }
}

impl Default for RuleStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RuleError;
    use crate::models::{Condition, ConditionGroup, TagAction};
    use crate::operators::Operator;

    fn sample_rule(id: &str, priority: i64) -> Rule {
        Rule::new(
            id,
            format!("rule {}", id),
            ConditionGroup::and(vec![Condition::new("heart_rate", Operator::Gt, 120)]),
            TagAction::new().with_labels(["urgent"]),
        )
        .with_priority(priority)
    }

    fn ids(rules: &[Arc<Rule>]) -> Vec<&str> {
        rules.iter().map(|r| r.id.as_str()).collect()
    }

    #[test]
    fn test_add_and_get() {
        let store = RuleStore::new();
        store.add(sample_rule("rule-001", 0)).unwrap();

        assert_eq!(store.len(), 1);
        assert!(store.exists("rule-001"));
        assert_eq!(store.get("rule-001").unwrap().name, "rule rule-001");
    }

    #[test]
    fn test_get_nonexistent_rule() {
        let store = RuleStore::new();
        assert!(store.get("nonexistent").is_none());
        assert!(!store.exists("nonexistent"));
    }

    #[test]
    fn test_add_replaces_existing_id() {
        let store = RuleStore::new();
        store.add(sample_rule("rule-001", 0)).unwrap();
        store
            .add(sample_rule("rule-001", 5).with_description("updated"))
            .unwrap();

        assert_eq!(store.len(), 1);
        let rule = store.get("rule-001").unwrap();
        assert_eq!(rule.priority, 5);
        assert_eq!(rule.description.as_deref(), Some("updated"));
    }

    #[test]
    fn test_invalid_rule_leaves_store_unchanged() {
        let store = RuleStore::new();
        store.add(sample_rule("rule-001", 0)).unwrap();

        let mut invalid = sample_rule("rule-001", 9);
        invalid.condition.conditions[0].field.clear();

        assert!(matches!(store.add(invalid), Err(RuleError::Validation(_))));
        assert_eq!(store.get("rule-001").unwrap().priority, 0);
    }

    #[test]
    fn test_delete() {
        let store = RuleStore::new();
        store.add(sample_rule("rule-001", 0)).unwrap();

        assert!(store.delete("rule-001"));
        assert!(!store.exists("rule-001"));
        assert!(!store.delete("rule-001"));
        assert!(store.is_empty());
    }

    #[test]
    fn test_get_all_ordering() {
        let store = RuleStore::new();
        store.add(sample_rule("c", 0)).unwrap();
        store.add(sample_rule("b", 10)).unwrap();
        store.add(sample_rule("a", 0)).unwrap();
        store.add(sample_rule("d", -3)).unwrap();
        store.add(sample_rule("e", 10)).unwrap();

        let all = store.get_all(false);
        assert_eq!(ids(&all), vec!["b", "e", "a", "c", "d"]);
        assert_eq!(ids(&store.get_all(false)), ids(&all));
    }

    #[test]
    fn test_get_all_enabled_only() {
        let store = RuleStore::new();
        store.add(sample_rule("on", 0)).unwrap();
        store.add(sample_rule("off", 1).with_enabled(false)).unwrap();

        assert_eq!(ids(&store.get_all(true)), vec!["on"]);
        assert_eq!(ids(&store.get_all(false)), vec!["off", "on"]);
    }

    #[test]
    fn test_snapshot_not_affected_by_later_mutation() {
        let store = RuleStore::new();
        store.add(sample_rule("a", 0)).unwrap();
        store.add(sample_rule("b", 0)).unwrap();

        let snapshot = store.get_all(false);
        store.delete("a");
        store.add(sample_rule("c", 100)).unwrap();

        assert_eq!(ids(&snapshot), vec!["a", "b"]);
        assert_eq!(ids(&store.get_all(false)), vec!["c", "b"]);
    }

    #[test]
    fn test_load_batch() {
        let store = RuleStore::new();
        let loaded = store
            .load_batch(vec![
                sample_rule("rule-001", 0),
                sample_rule("rule-002", 0),
                sample_rule("rule-001", 7),
            ])
            .unwrap();

        assert_eq!(loaded, 3);
        assert_eq!(store.len(), 2);
        assert_eq!(store.get("rule-001").unwrap().priority, 7);
    }

    #[test]
    fn test_load_batch_is_all_or_nothing() {
        let store = RuleStore::new();
        let result = store.load_batch(vec![sample_rule("ok", 0), sample_rule("", 0)]);

        assert!(result.is_err());
        assert!(store.is_empty());
    }

    #[test]
    fn test_clear() {
        let store = RuleStore::new();
        store.add(sample_rule("rule-001", 0)).unwrap();
        store.add(sample_rule("rule-002", 0)).unwrap();

        store.clear();

        assert!(store.is_empty());
    }

    #[test]
    fn test_concurrent_access() {
        use std::thread;

        let store = RuleStore::new();
        let writer_store = store.clone();
        let reader_store = store.clone();

        let writer = thread::spawn(move || {
            for i in 0..100 {
                writer_store.add(sample_rule(&format!("rule-{:03}", i), i % 5)).unwrap();
            }
        });

        let reader = thread::spawn(move || {
            for _ in 0..100 {
                let snapshot = reader_store.get_all(true);
                for pair in snapshot.windows(2) {
                    assert!(
                        pair[0].priority > pair[1].priority
                            || (pair[0].priority == pair[1].priority && pair[0].id < pair[1].id)
                    );
                }
            }
        });

        for i in 100..200 {
            store.add(sample_rule(&format!("rule-{:03}", i), i % 5)).unwrap();
        }

        writer.join().unwrap();
        reader.join().unwrap();

        assert_eq!(store.len(), 200);
    }
}
