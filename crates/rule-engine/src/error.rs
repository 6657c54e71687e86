//! 规则引擎错误类型
//!
//! `RuleError` 是叶子规则评估时可恢复的错误，总是被转换为 FAILED 结果附带返回，
//! 不会向调用方传播；`RuleSetError` 只在加载规则集时出现。

use serde::Serialize;
use thiserror::Error;

/// 叶子规则评估错误
///
/// `Display` 输出即为结果中的 `message` 字段。
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind")]
pub enum RuleError {
    #[error("Rule is missing the key field")]
    MissingKey,

    #[error("Field {key} is missing or null")]
    DataValueNotFound { key: String },

    #[error("Unknown operation {operation}")]
    OperationNotFound { operation: String },

    #[error("Validation failed for '{operation}', message: {detail}")]
    OperationParameterValidation { operation: String, detail: String },
}

impl RuleError {
    /// 错误分类名称（用于日志和指标标签）
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MissingKey => "MissingKeyError",
            Self::DataValueNotFound { .. } => "DataValueNotFoundError",
            Self::OperationNotFound { .. } => "OperationNotFoundError",
            Self::OperationParameterValidation { .. } => "OperationParameterValidationError",
        }
    }
}

/// 规则集加载错误
#[derive(Debug, Error)]
pub enum RuleSetError {
    #[error("规则集解析失败: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("规则集根节点必须是逻辑组")]
    RootNotGroup,
}

pub type Result<T> = std::result::Result<T, RuleSetError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        assert_eq!(RuleError::MissingKey.to_string(), "Rule is missing the key field");
        assert_eq!(
            RuleError::DataValueNotFound {
                key: "user.age".to_string()
            }
            .to_string(),
            "Field user.age is missing or null"
        );
        assert_eq!(
            RuleError::OperationNotFound {
                operation: "FOO".to_string()
            }
            .to_string(),
            "Unknown operation FOO"
        );
        assert_eq!(
            RuleError::OperationParameterValidation {
                operation: "LAST_YEAR".to_string(),
                detail: "Invalid condition value".to_string(),
            }
            .to_string(),
            "Validation failed for 'LAST_YEAR', message: Invalid condition value"
        );
    }

    #[test]
    fn test_error_serialization() {
        let err = RuleError::DataValueNotFound {
            key: "country".to_string(),
        };
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["kind"], "DataValueNotFound");
        assert_eq!(json["key"], "country");
        assert_eq!(err.kind(), "DataValueNotFoundError");
    }
}
