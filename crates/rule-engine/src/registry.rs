//! 操作注册表
//!
//! 操作名到比较逻辑的映射。每个操作由谓词和可选的参数校验器组成，
//! 新增操作只需注册，不需要改动评估器或执行器。

use crate::evaluator::ConditionEvaluator;
use crate::operators::BuiltinOperation;
use crate::validation::{
    ArrayValue, EmbeddedSchema, JsonSchemaCompiler, RegexPattern, SchemaCompiler,
    SchemaValidator, TypedParams,
};
use chrono::{DateTime, Months, Utc};
use dashmap::DashMap;
use serde::Deserialize;
use serde_json::Value;
use std::sync::{Arc, OnceLock};
use tracing::{info, warn};
use validator::Validate;

/// 操作接口
pub trait Operation: Send + Sync {
    /// 谓词：`field` 为上下文中解析出的值（非 null），`expected` 为规则中的值
    fn evaluate(&self, field: &Value, expected: &Value) -> bool;

    /// 规则值的校验器，评估前执行
    fn parameter_validator(&self) -> Option<&dyn SchemaValidator> {
        None
    }
}

/// 基于函数的操作定义
pub struct OperationSpec<F> {
    predicate: F,
    validator: Option<Arc<dyn SchemaValidator>>,
}

impl<F> OperationSpec<F>
where
    F: Fn(&Value, &Value) -> bool + Send + Sync,
{
    pub fn new(predicate: F) -> Self {
        Self {
            predicate,
            validator: None,
        }
    }

    pub fn with_validator(mut self, validator: impl SchemaValidator + 'static) -> Self {
        self.validator = Some(Arc::new(validator));
        self
    }
}

impl<F> Operation for OperationSpec<F>
where
    F: Fn(&Value, &Value) -> bool + Send + Sync,
{
    fn evaluate(&self, field: &Value, expected: &Value) -> bool {
        (self.predicate)(field, expected)
    }

    fn parameter_validator(&self) -> Option<&dyn SchemaValidator> {
        self.validator.as_deref()
    }
}

/// EXISTS：存在且非空；规则值带 `schema` 时改为按 schema 校验
///
/// 无法编译的 schema 在参数校验阶段报告。
pub struct ExistsOperation {
    schema: EmbeddedSchema,
}

impl ExistsOperation {
    pub fn new(schemas: Arc<dyn SchemaCompiler>) -> Self {
        Self {
            schema: EmbeddedSchema::new(schemas),
        }
    }
}

impl Default for ExistsOperation {
    fn default() -> Self {
        Self::new(Arc::new(JsonSchemaCompiler::new()))
    }
}

impl Operation for ExistsOperation {
    fn evaluate(&self, field: &Value, expected: &Value) -> bool {
        match self.schema.compile(expected) {
            Ok(Some(validator)) => validator.validate(field).is_ok(),
            Ok(None) => ConditionEvaluator::is_present(field),
            Err(e) => {
                warn!(error = %e, "EXISTS schema could not be compiled");
                false
            }
        }
    }

    fn parameter_validator(&self) -> Option<&dyn SchemaValidator> {
        Some(&self.schema)
    }
}

/// LAST_YEAR 的参数
#[derive(Debug, Deserialize, Validate)]
pub struct LastYearParams {
    #[validate(range(min = 1, message = "Invalid condition value"))]
    pub years: u32,
}

type Clock = dyn Fn() -> DateTime<Utc> + Send + Sync;

/// LAST_YEAR：值解释为时间后落在 `[now - years, now]` 内
pub struct LastYearOperation {
    params: TypedParams<LastYearParams>,
    clock: Arc<Clock>,
}

impl LastYearOperation {
    pub fn new() -> Self {
        Self::with_clock(Utc::now)
    }

    /// 指定评估时刻的来源
    pub fn with_clock(clock: impl Fn() -> DateTime<Utc> + Send + Sync + 'static) -> Self {
        Self {
            params: TypedParams::new(),
            clock: Arc::new(clock),
        }
    }
}

impl Default for LastYearOperation {
    fn default() -> Self {
        Self::new()
    }
}

impl Operation for LastYearOperation {
    fn evaluate(&self, field: &Value, expected: &Value) -> bool {
        let (Ok(params), Some(date)) = (
            self.params.parse(expected),
            ConditionEvaluator::as_datetime(field),
        ) else {
            return false;
        };

        let now = (self.clock)();
        let window_start = params
            .years
            .checked_mul(12)
            .and_then(|months| now.checked_sub_months(Months::new(months)))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);

        date >= window_start && date <= now
    }

    fn parameter_validator(&self) -> Option<&dyn SchemaValidator> {
        Some(&self.params)
    }
}

/// MATCHES：正则匹配，参数校验与评估共用同一份编译缓存
#[derive(Default)]
pub struct MatchesOperation {
    patterns: RegexPattern,
}

impl Operation for MatchesOperation {
    fn evaluate(&self, field: &Value, expected: &Value) -> bool {
        let (Some(s), Some(pattern)) = (field.as_str(), expected.as_str()) else {
            return false;
        };

        self.patterns
            .compile(pattern)
            .is_ok_and(|regex| regex.is_match(s))
    }

    fn parameter_validator(&self) -> Option<&dyn SchemaValidator> {
        Some(&self.patterns)
    }
}

/// 操作注册表
///
/// 线程安全，共享的注册表可以在运行期追加操作。
pub struct OperationRegistry {
    operations: DashMap<String, Arc<dyn Operation>>,
}

static SHARED_REGISTRY: OnceLock<Arc<OperationRegistry>> = OnceLock::new();

impl OperationRegistry {
    /// 创建空注册表
    pub fn empty() -> Self {
        Self {
            operations: DashMap::new(),
        }
    }

    /// 创建包含全部内置操作的注册表
    pub fn new() -> Self {
        let registry = Self::empty();
        registry.register_builtins();
        registry
    }

    /// 进程内共享的默认注册表
    pub fn shared() -> Arc<Self> {
        SHARED_REGISTRY
            .get_or_init(|| {
                let registry = Self::new();
                info!(operations = registry.len(), "Default operation registry initialized");
                Arc::new(registry)
            })
            .clone()
    }

    /// 注册操作，同名操作会被替换
    pub fn register(&self, name: impl Into<String>, operation: impl Operation + 'static) {
        self.operations.insert(name.into(), Arc::new(operation));
    }

    /// 以函数注册不带参数校验的操作
    pub fn register_fn<F>(&self, name: impl Into<String>, predicate: F)
    where
        F: Fn(&Value, &Value) -> bool + Send + Sync + 'static,
    {
        self.register(name, OperationSpec::new(predicate));
    }

    /// 移除操作
    pub fn unregister(&self, name: &str) -> bool {
        self.operations.remove(name).is_some()
    }

    pub fn lookup(&self, name: &str) -> Option<Arc<dyn Operation>> {
        self.operations.get(name).map(|op| op.value().clone())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.operations.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    fn register_builtins(&self) {
        use BuiltinOperation as Op;

        self.register_fn(Op::Equals, ConditionEvaluator::eq);
        self.register_fn(Op::NotEquals, |f, e| !ConditionEvaluator::eq(f, e));

        self.register_fn(Op::Gt, |f, e| ConditionEvaluator::compare(f, e, |a, b| a > b));
        self.register_fn(Op::Gte, |f, e| ConditionEvaluator::compare(f, e, |a, b| a >= b));
        self.register_fn(Op::Lt, |f, e| ConditionEvaluator::compare(f, e, |a, b| a < b));
        self.register_fn(Op::Lte, |f, e| ConditionEvaluator::compare(f, e, |a, b| a <= b));
        self.register(
            Op::Between,
            OperationSpec::new(ConditionEvaluator::between).with_validator(ArrayValue::exact(2)),
        );

        self.register(
            Op::In,
            OperationSpec::new(ConditionEvaluator::in_list).with_validator(ArrayValue::any()),
        );
        self.register(
            Op::NotIn,
            OperationSpec::new(|f: &Value, e: &Value| !ConditionEvaluator::in_list(f, e))
                .with_validator(ArrayValue::any()),
        );
        self.register_fn(Op::Contains, ConditionEvaluator::contains);

        self.register_fn(Op::StartsWith, ConditionEvaluator::starts_with);
        self.register_fn(Op::EndsWith, ConditionEvaluator::ends_with);
        self.register(Op::Matches, MatchesOperation::default());

        self.register(Op::Exists, ExistsOperation::default());
        self.register(Op::LastYear, LastYearOperation::new());
    }
}

impl Default for OperationRegistry {
    fn default() -> Self {
        Self::new()
    }
}
