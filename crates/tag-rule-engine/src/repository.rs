//! 规则持久化
//!
//! 存储本身只在内存中；需要跨进程保留规则时，通过 `RuleRepository`
//! 在启动时加载、在变更后保存。

use crate::error::{Result, RuleError};
use crate::models::Rule;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// 规则仓储接口
#[cfg_attr(test, mockall::automock)]
pub trait RuleRepository: Send + Sync {
    /// 读取全部规则
    fn load_all(&self) -> Result<Vec<Rule>>;

    /// 以给定规则集整体覆盖持久化内容
    fn save_all(&self, rules: &[Rule]) -> Result<()>;
}

/// 基于 JSON 文件的规则仓储
///
/// 文件内容是规则对象数组。
pub struct JsonFileRuleRepository {
    path: PathBuf,
}

impl JsonFileRuleRepository {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RuleRepository for JsonFileRuleRepository {
    fn load_all(&self) -> Result<Vec<Rule>> {
        let content = fs::read_to_string(&self.path)?;

        let values: Vec<Value> = serde_json::from_str(&content).map_err(|e| {
            RuleError::Repository(format!(
                "规则文件 '{}' 不是规则数组: {}",
                self.path.display(),
                e
            ))
        })?;

        let rules = values
            .into_iter()
            .map(Rule::from_value)
            .collect::<Result<Vec<_>>>()?;

        info!(path = %self.path.display(), count = rules.len(), "规则文件已读取");
        Ok(rules)
    }

    fn save_all(&self, rules: &[Rule]) -> Result<()> {
        let json = serde_json::to_string_pretty(rules)?;

        // 先写临时文件再重命名，避免读到写了一半的文件
        let mut tmp_name = self.path.as_os_str().to_owned();
        tmp_name.push(".tmp");
        let tmp_path = PathBuf::from(tmp_name);

        fs::write(&tmp_path, json)?;
        fs::rename(&tmp_path, &self.path)?;

        debug!(path = %self.path.display(), count = rules.len(), "规则文件已保存");
        Ok(())
    }
}
