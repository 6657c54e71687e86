//! 规则引擎领域模型

use crate::error::{Result, RuleError, RuleSetError};
use crate::operators::LogicalOperator;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::mem;
use std::sync::Arc;

/// 叶子规则：字段路径 + 操作名 + 操作值
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleLeaf {
    /// 上下文中的路径表达式，如 `user.addresses[0].city`
    #[serde(default)]
    pub key: String,
    pub operation: String,
    #[serde(default)]
    pub value: Value,
}

impl RuleLeaf {
    pub fn new(
        key: impl Into<String>,
        operation: impl Into<String>,
        value: impl Into<Value>,
    ) -> Self {
        Self {
            key: key.into(),
            operation: operation.into(),
            value: value.into(),
        }
    }
}

/// 逻辑组节点
///
/// 子节点列表共享存储，克隆只增加引用计数，与嵌套深度无关。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleGroup {
    pub operator: LogicalOperator,
    pub rules: Arc<Vec<RuleNode>>,
}

impl RuleGroup {
    pub fn new(operator: LogicalOperator, rules: Vec<RuleNode>) -> Self {
        Self {
            operator,
            rules: Arc::new(rules),
        }
    }

    pub fn and(rules: Vec<RuleNode>) -> Self {
        Self::new(LogicalOperator::And, rules)
    }

    pub fn or(rules: Vec<RuleNode>) -> Self {
        Self::new(LogicalOperator::Or, rules)
    }

    /// 从 JSON 字符串解析规则集，根节点必须是逻辑组
    pub fn from_json(json: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(json)?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> Result<Self> {
        match serde_json::from_value::<RuleNode>(value)? {
            RuleNode::Group(group) => Ok(group),
            RuleNode::Leaf(_) => Err(RuleSetError::RootNotGroup),
        }
    }
}

impl Drop for RuleGroup {
    // 逐层摘下独占的子节点列表，释放深树时不递归
    fn drop(&mut self) {
        let Some(rules) = Arc::get_mut(&mut self.rules) else {
            return;
        };
        let mut pending = mem::take(rules);

        while let Some(node) = pending.pop() {
            if let RuleNode::Group(mut group) = node {
                if let Some(children) = Arc::get_mut(&mut group.rules) {
                    pending.append(children);
                }
            }
        }
    }
}

/// 规则集的根总是一个逻辑组
pub type RuleSet = RuleGroup;

/// 规则节点（叶子规则或逻辑组）
///
/// JSON 中不带类型标签：含 `operator` + `rules` 的对象是逻辑组，含 `operation` 的是叶子。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RuleNode {
    Group(RuleGroup),
    Leaf(RuleLeaf),
}

impl From<RuleLeaf> for RuleNode {
    fn from(leaf: RuleLeaf) -> Self {
        Self::Leaf(leaf)
    }
}

impl From<RuleGroup> for RuleNode {
    fn from(group: RuleGroup) -> Self {
        Self::Group(group)
    }
}

/// 评估状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RuleStatus {
    Passed,
    Failed,
}

impl RuleStatus {
    pub fn from_bool(passed: bool) -> Self {
        if passed { Self::Passed } else { Self::Failed }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Passed => "PASSED",
            Self::Failed => "FAILED",
        }
    }
}

/// 单个顶层规则条目的评估结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuleResult {
    /// 原样回显的规则节点
    pub rule: RuleNode,
    pub status: RuleStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RuleError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl RuleResult {
    pub fn passed(rule: RuleNode) -> Self {
        Self {
            rule,
            status: RuleStatus::Passed,
            error: None,
            message: None,
        }
    }

    /// 普通的业务失败，不带错误
    pub fn failed(rule: RuleNode) -> Self {
        Self {
            rule,
            status: RuleStatus::Failed,
            error: None,
            message: None,
        }
    }

    /// 带错误的失败，message 取自错误描述
    pub fn errored(rule: RuleNode, error: RuleError) -> Self {
        Self {
            rule,
            status: RuleStatus::Failed,
            message: Some(error.to_string()),
            error: Some(error),
        }
    }

    pub fn is_passed(&self) -> bool {
        self.status == RuleStatus::Passed
    }
}

/// 带诊断信息的评估报告
#[derive(Debug, Clone, Serialize)]
pub struct EvaluationReport {
    pub results: Vec<RuleResult>,
    pub evaluation_trace: Vec<String>,
    pub evaluation_time_ms: i64,
}
