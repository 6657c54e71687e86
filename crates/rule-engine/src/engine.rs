//! 绑定规则集的引擎
//!
//! 同一规则集需要对多条记录反复评估时，先用 `RuleEngine::new` 绑定规则集，
//! 再对每条记录调用 `run`。

use crate::error::Result;
use crate::executor::{EvaluationOptions, RuleExecutor};
use crate::models::{EvaluationReport, RuleNode, RuleResult, RuleSet};
use crate::registry::OperationRegistry;
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::info;

/// 绑定了规则集的引擎
#[derive(Clone)]
pub struct RuleEngine {
    rule_set: Arc<RuleSet>,
    /// 规则集中引用的所有字段路径
    required_keys: BTreeSet<String>,
    executor: RuleExecutor,
}

impl RuleEngine {
    pub fn new(rule_set: RuleSet) -> Self {
        let required_keys = collect_keys(&rule_set);
        info!(
            entries = rule_set.rules.len(),
            keys = required_keys.len(),
            "Rule set bound"
        );

        Self {
            rule_set: Arc::new(rule_set),
            required_keys,
            executor: RuleExecutor::default(),
        }
    }

    /// 从 JSON 字符串解析并绑定规则集
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(Self::new(RuleSet::from_json(json)?))
    }

    /// 使用自定义操作注册表，已设置的选项保留
    pub fn with_registry(mut self, registry: Arc<OperationRegistry>) -> Self {
        let options = self.executor.options().clone();
        self.executor = RuleExecutor::new(registry).with_options(options);
        self
    }

    pub fn with_options(mut self, options: EvaluationOptions) -> Self {
        self.executor = self.executor.with_options(options);
        self
    }

    pub fn rule_set(&self) -> &RuleSet {
        &self.rule_set
    }

    pub fn required_keys(&self) -> &BTreeSet<String> {
        &self.required_keys
    }

    /// 对一条记录评估规则集
    pub fn run(&self, context: &Value) -> Vec<RuleResult> {
        self.executor.run(&self.rule_set, context)
    }

    /// 评估并返回带追踪信息的报告
    pub fn run_with_report(&self, context: &Value) -> EvaluationReport {
        self.executor.run_with_report(&self.rule_set, context)
    }
}

/// 收集规则树中所有叶子的 key（迭代遍历）
fn collect_keys(rule_set: &RuleSet) -> BTreeSet<String> {
    let mut keys = BTreeSet::new();
    let mut pending: Vec<&RuleNode> = rule_set.rules.iter().collect();

    while let Some(node) = pending.pop() {
        match node {
            RuleNode::Leaf(leaf) => {
                if !leaf.key.is_empty() {
                    keys.insert(leaf.key.clone());
                }
            }
            RuleNode::Group(group) => pending.extend(group.rules.iter()),
        }
    }

    keys
}
