//! 规则引擎错误类型

use crate::operators::Operator;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuleError {
    #[error("规则校验失败: {0}")]
    Validation(String),

    #[error("NOT 逻辑组必须且只能包含一个条件, 实际 {actual} 个")]
    NotArity { actual: usize },

    #[error("无法比较的类型: {operator} 不支持 {left} 与 {right} 比较")]
    IncomparableTypes {
        operator: Operator,
        left: &'static str,
        right: &'static str,
    },

    #[error("事件必须是 JSON 对象, 实际类型 {0}")]
    EventNotObject(&'static str),

    #[error("规则仓储错误: {0}")]
    Repository(String),

    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON 序列化错误: {0}")]
    JsonError(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, RuleError>;

impl RuleError {
    /// 获取错误码
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::NotArity { .. } => "NOT_ARITY",
            Self::IncomparableTypes { .. } => "INCOMPARABLE_TYPES",
            Self::EventNotObject(_) => "EVENT_NOT_OBJECT",
            Self::Repository(_) => "REPOSITORY_ERROR",
            Self::Io(_) => "IO_ERROR",
            Self::JsonError(_) => "JSON_ERROR",
        }
    }

    /// 是否为评估阶段错误（规则结构在运行时被判定为非法）
    pub fn is_evaluation_error(&self) -> bool {
        matches!(self, Self::NotArity { .. } | Self::IncomparableTypes { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code() {
        let err = RuleError::Validation("field 不能为空".to_string());
        assert_eq!(err.code(), "VALIDATION_ERROR");
        assert!(!err.is_evaluation_error());
    }

    #[test]
    fn test_evaluation_errors() {
        let arity = RuleError::NotArity { actual: 2 };
        assert!(arity.is_evaluation_error());
        assert!(arity.to_string().contains('2'));

        let cmp = RuleError::IncomparableTypes {
            operator: Operator::Gt,
            left: "string",
            right: "number",
        };
        assert!(cmp.is_evaluation_error());
        assert_eq!(cmp.code(), "INCOMPARABLE_TYPES");
    }
}
