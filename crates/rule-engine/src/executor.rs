//! 规则集执行器
//!
//! 遍历根逻辑组的直接子节点，每个子节点产生一个结果：叶子规则交给 `RuleEvaluator`，
//! 嵌套逻辑组折叠为单个 PASSED/FAILED。兄弟节点之间互不短路。

use crate::evaluator::RuleEvaluator;
use crate::models::{EvaluationReport, RuleGroup, RuleNode, RuleResult, RuleSet, RuleStatus};
use crate::operators::LogicalOperator;
use crate::registry::OperationRegistry;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, instrument, warn};

/// 空逻辑组的处理策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmptyGroupPolicy {
    /// 空 AND 为真，空 OR 为假
    #[default]
    Vacuous,
    /// 空逻辑组总是失败
    Fail,
}

/// 评估选项
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EvaluationOptions {
    #[serde(default)]
    pub empty_group: EmptyGroupPolicy,
    /// 是否记录评估追踪
    #[serde(default)]
    pub trace: bool,
}

/// 规则集执行器
#[derive(Clone)]
pub struct RuleExecutor {
    evaluator: RuleEvaluator,
    options: EvaluationOptions,
}

/// 逻辑组求值的栈帧
struct GroupFrame<'a> {
    group: &'a RuleGroup,
    next: usize,
    /// 仅在记录追踪时生成
    path: Option<String>,
}

impl RuleExecutor {
    pub fn new(registry: Arc<OperationRegistry>) -> Self {
        Self {
            evaluator: RuleEvaluator::new(registry),
            options: EvaluationOptions::default(),
        }
    }

    pub fn with_options(mut self, options: EvaluationOptions) -> Self {
        self.options = options;
        self
    }

    /// 启用评估追踪
    pub fn with_trace(mut self) -> Self {
        self.options.trace = true;
        self
    }

    pub fn options(&self) -> &EvaluationOptions {
        &self.options
    }

    pub fn evaluator(&self) -> &RuleEvaluator {
        &self.evaluator
    }

    /// 评估规则集，每个顶层条目对应一个结果，顺序与声明顺序一致
    pub fn run(&self, rule_set: &RuleSet, context: &Value) -> Vec<RuleResult> {
        self.run_with_trace(rule_set, context, None)
    }

    /// 评估规则集并附带追踪信息和耗时
    pub fn run_with_report(&self, rule_set: &RuleSet, context: &Value) -> EvaluationReport {
        let start = Instant::now();
        let mut trace = Vec::new();

        let results = if self.options.trace {
            self.run_with_trace(rule_set, context, Some(&mut trace))
        } else {
            self.run_with_trace(rule_set, context, None)
        };

        EvaluationReport {
            results,
            evaluation_trace: trace,
            evaluation_time_ms: start.elapsed().as_millis() as i64,
        }
    }

    #[instrument(skip_all, fields(operator = %rule_set.operator, entries = rule_set.rules.len()))]
    fn run_with_trace(
        &self,
        rule_set: &RuleSet,
        context: &Value,
        mut trace: Option<&mut Vec<String>>,
    ) -> Vec<RuleResult> {
        let results: Vec<RuleResult> = rule_set
            .rules
            .iter()
            .enumerate()
            .map(|(i, node)| {
                let path = format!("root.rules[{}]", i);
                let result = self.evaluate_entry(node, context, &path, trace.as_deref_mut());
                record_result(&result);
                result
            })
            .collect();

        debug!(
            passed = results.iter().filter(|r| r.is_passed()).count(),
            total = results.len(),
            "rule set evaluated"
        );

        results
    }

    /// 评估单个顶层条目
    fn evaluate_entry(
        &self,
        node: &RuleNode,
        context: &Value,
        path: &str,
        mut trace: Option<&mut Vec<String>>,
    ) -> RuleResult {
        match node {
            RuleNode::Leaf(leaf) => {
                let result = self.evaluator.evaluate_leaf(leaf, context);
                if let Some(trace) = trace.as_deref_mut() {
                    trace.push(format!(
                        "{}: {} {} {} => {}",
                        path,
                        leaf.key,
                        leaf.operation,
                        leaf.value,
                        describe(&result)
                    ));
                }
                if let Some(error) = &result.error {
                    warn!(path, kind = error.kind(), error = %error, "rule entry errored");
                }
                result
            }
            RuleNode::Group(group) => {
                let passed = self.evaluate_group(group, context, path, trace);
                let rule = node.clone();
                if passed {
                    RuleResult::passed(rule)
                } else {
                    RuleResult::failed(rule)
                }
            }
        }
    }

    /// 将逻辑组子树折叠为一个布尔值
    ///
    /// 使用显式栈迭代求值，嵌套深度不受调用栈限制。组内按操作符短路：
    /// AND 遇到失败即停止，OR 遇到通过即停止；叶子错误视为失败。
    pub fn evaluate_group(
        &self,
        group: &RuleGroup,
        context: &Value,
        path: &str,
        mut trace: Option<&mut Vec<String>>,
    ) -> bool {
        let mut stack = vec![GroupFrame {
            group,
            next: 0,
            path: trace.is_some().then(|| path.to_string()),
        }];
        // 上一个完成的子组的结果，由父帧消费
        let mut finished: Option<bool> = None;

        while let Some(frame) = stack.last_mut() {
            let short_circuit = match frame.group.operator {
                LogicalOperator::And => false,
                LogicalOperator::Or => true,
            };

            let mut outcome = None;

            if let Some(child_passed) = finished.take() {
                if child_passed == short_circuit {
                    outcome = Some(short_circuit);
                }
            }

            while outcome.is_none() {
                let Some(child) = frame.group.rules.get(frame.next) else {
                    outcome = Some(self.exhausted(frame.group));
                    break;
                };
                let index = frame.next;
                frame.next += 1;
                let child_path = frame
                    .path
                    .as_ref()
                    .map(|path| format!("{}.rules[{}]", path, index));

                match child {
                    RuleNode::Leaf(leaf) => {
                        let checked = self.evaluator.check(leaf, context);
                        if let (Some(trace), Some(child_path)) =
                            (trace.as_deref_mut(), &child_path)
                        {
                            let status = match &checked {
                                Ok(true) => "PASSED".to_string(),
                                Ok(false) => "FAILED".to_string(),
                                Err(e) => format!("FAILED ({})", e),
                            };
                            trace.push(format!(
                                "{}: {} {} {} => {}",
                                child_path, leaf.key, leaf.operation, leaf.value, status
                            ));
                        }
                        if let Err(e) = &checked {
                            debug!(key = %leaf.key, error = %e, "nested rule errored");
                        }
                        if checked.unwrap_or(false) == short_circuit {
                            if let (Some(trace), Some(path)) =
                                (trace.as_deref_mut(), &frame.path)
                            {
                                trace.push(format!(
                                    "{}: {} 短路 - 子节点 {} 决定结果",
                                    path, frame.group.operator, index
                                ));
                            }
                            outcome = Some(short_circuit);
                        }
                    }
                    RuleNode::Group(child_group) => {
                        stack.push(GroupFrame {
                            group: child_group,
                            next: 0,
                            path: child_path,
                        });
                        break;
                    }
                }
            }

            // 压入了子组，先求子组
            let Some(passed) = outcome else {
                continue;
            };

            if let Some(frame) = stack.pop() {
                if let (Some(trace), Some(path)) = (trace.as_deref_mut(), &frame.path) {
                    trace.push(format!(
                        "{}: {} 组 => {}",
                        path,
                        frame.group.operator,
                        RuleStatus::from_bool(passed).as_str()
                    ));
                }
            }
            finished = Some(passed);
        }

        finished.unwrap_or(false)
    }

    /// 所有子节点都未触发短路时的结果
    fn exhausted(&self, group: &RuleGroup) -> bool {
        if group.rules.is_empty() && self.options.empty_group == EmptyGroupPolicy::Fail {
            return false;
        }

        match group.operator {
            LogicalOperator::And => true,
            LogicalOperator::Or => false,
        }
    }
}

impl Default for RuleExecutor {
    fn default() -> Self {
        Self::new(OperationRegistry::shared())
    }
}

fn describe(result: &RuleResult) -> String {
    match &result.error {
        Some(e) => format!("FAILED ({})", e),
        None => result.status.as_str().to_string(),
    }
}

fn record_result(result: &RuleResult) {
    metrics::counter!("rule_engine_rule_results_total", "status" => result.status.as_str())
        .increment(1);
    if let Some(error) = &result.error {
        metrics::counter!("rule_engine_rule_errors_total", "kind" => error.kind()).increment(1);
    }
}

/// 使用默认注册表和默认选项评估规则集
pub fn run(rule_set: &RuleSet, context: &Value) -> Vec<RuleResult> {
    RuleExecutor::default().run(rule_set, context)
}
