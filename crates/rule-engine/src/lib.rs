//! 规则评估引擎
//!
//! 对任意嵌套的 JSON 上下文评估 AND/OR 规则树：
//! - 路径表达式解析（`a.b[0].c`、`items.length`）
//! - 可扩展的操作注册表，支持参数校验
//! - 叶子规则评估，区分业务失败与评估错误
//! - 规则集执行，每个顶层条目产生一个结果

pub mod config;
pub mod engine;
pub mod error;
pub mod evaluator;
pub mod executor;
pub mod models;
pub mod observability;
pub mod operators;
pub mod path;
pub mod registry;
pub mod validation;

pub use engine::RuleEngine;
pub use error::{Result, RuleError, RuleSetError};
pub use evaluator::{ConditionEvaluator, RuleEvaluator};
pub use executor::{run, EmptyGroupPolicy, EvaluationOptions, RuleExecutor};
pub use models::{EvaluationReport, RuleGroup, RuleLeaf, RuleNode, RuleResult, RuleSet, RuleStatus};
pub use operators::{BuiltinOperation, LogicalOperator};
pub use path::{FieldPath, PathSegment};
pub use registry::{Operation, OperationRegistry, OperationSpec};
pub use validation::{SchemaCompiler, SchemaValidator, ValidationFailure};
