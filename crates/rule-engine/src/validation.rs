//! 操作参数与数据的校验
//!
//! 引擎只依赖 `SchemaValidator` 这一最小接口：校验成功返回（可能经过转换的）数据，
//! 失败返回详细原因。具体的校验库通过适配器接入：
//! - `JsonSchemaValidator`：基于 jsonschema，支持顶层类型的宽松转换
//! - `TypedParams<T>`：基于 serde 反序列化 + validator 派生校验
//! - `EmbeddedSchema`：校验规则值中 `schema` 字段本身能否编译
//! - `ArrayValue` / `RegexPattern`：内置操作使用的轻量校验

use dashmap::DashMap;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde_json::{Number, Value};
use std::marker::PhantomData;
use std::sync::Arc;
use thiserror::Error;
use validator::{Validate, ValidationErrors};

/// 校验失败详情
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{detail}")]
pub struct ValidationFailure {
    pub detail: String,
}

impl ValidationFailure {
    pub fn new(detail: impl Into<String>) -> Self {
        Self {
            detail: detail.into(),
        }
    }
}

/// 校验器接口
pub trait SchemaValidator: Send + Sync {
    /// 校验值，成功时返回校验后的数据
    fn validate(&self, value: &Value) -> Result<Value, ValidationFailure>;
}

/// 将 schema 描述编译为校验器
///
/// EXISTS 操作通过它处理规则值中的 `schema` 字段，更换实现即可接入其他 schema 库。
pub trait SchemaCompiler: Send + Sync {
    fn compile(&self, schema: &Value) -> Result<Arc<dyn SchemaValidator>, ValidationFailure>;
}

// ==================== JSON Schema ====================

/// JSON Schema 校验器
///
/// 原值校验失败时，会按 schema 顶层的 `type` 尝试一次宽松转换（如 `"35"` → `35`），
/// 转换后通过则返回转换后的值。
pub struct JsonSchemaValidator {
    schema: Value,
    validator: jsonschema::Validator,
}

impl JsonSchemaValidator {
    pub fn new(schema: &Value) -> Result<Self, ValidationFailure> {
        let validator = jsonschema::validator_for(schema)
            .map_err(|e| ValidationFailure::new(format!("Invalid schema: {}", e)))?;

        Ok(Self {
            schema: schema.clone(),
            validator,
        })
    }

    fn errors(&self, value: &Value) -> Vec<String> {
        self.validator
            .iter_errors(value)
            .map(|e| e.to_string())
            .collect()
    }
}

impl SchemaValidator for JsonSchemaValidator {
    fn validate(&self, value: &Value) -> Result<Value, ValidationFailure> {
        let errors = self.errors(value);
        if errors.is_empty() {
            return Ok(value.clone());
        }

        if let Some(coerced) = coerce(value, &self.schema) {
            if self.validator.is_valid(&coerced) {
                return Ok(coerced);
            }
        }

        Err(ValidationFailure::new(errors.join("; ")))
    }
}

/// 按 schema 声明的顶层类型转换标量值
fn coerce(value: &Value, schema: &Value) -> Option<Value> {
    let types: Vec<&str> = match schema.get("type")? {
        Value::String(t) => vec![t.as_str()],
        Value::Array(ts) => ts.iter().filter_map(Value::as_str).collect(),
        _ => return None,
    };

    types.into_iter().find_map(|t| match (t, value) {
        ("number", Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number),
        ("number" | "integer", Value::Bool(b)) => Some(Value::from(u8::from(*b))),
        ("integer", Value::String(s)) => s.trim().parse::<i64>().ok().map(Value::from),
        ("boolean", Value::String(s)) => match s.as_str() {
            "true" => Some(Value::Bool(true)),
            "false" => Some(Value::Bool(false)),
            _ => None,
        },
        ("string", Value::Number(n)) => Some(Value::String(n.to_string())),
        ("string", Value::Bool(b)) => Some(Value::String(b.to_string())),
        _ => None,
    })
}

/// 带缓存的 JSON Schema 编译器
///
/// 同一 schema 在多条记录上重复评估时只编译一次。
#[derive(Default)]
pub struct JsonSchemaCompiler {
    cache: DashMap<String, Arc<dyn SchemaValidator>>,
}

impl JsonSchemaCompiler {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SchemaCompiler for JsonSchemaCompiler {
    fn compile(&self, schema: &Value) -> Result<Arc<dyn SchemaValidator>, ValidationFailure> {
        let cache_key = schema.to_string();
        if let Some(validator) = self.cache.get(&cache_key) {
            return Ok(validator.clone());
        }

        let validator: Arc<dyn SchemaValidator> = Arc::new(JsonSchemaValidator::new(schema)?);
        self.cache.insert(cache_key, validator.clone());
        Ok(validator)
    }
}

/// 规则值中内嵌的 schema
///
/// 值为对象且带非 null 的 `schema` 字段时，要求该 schema 能够编译；
/// 不带 `schema` 的值原样通过。
pub struct EmbeddedSchema {
    schemas: Arc<dyn SchemaCompiler>,
}

impl EmbeddedSchema {
    pub fn new(schemas: Arc<dyn SchemaCompiler>) -> Self {
        Self { schemas }
    }

    /// 取出规则值中的 schema
    pub fn of(value: &Value) -> Option<&Value> {
        value.get("schema").filter(|s| !s.is_null())
    }

    /// 编译规则值中的 schema，没有 schema 时返回 `None`
    pub fn compile(
        &self,
        value: &Value,
    ) -> Result<Option<Arc<dyn SchemaValidator>>, ValidationFailure> {
        Self::of(value)
            .map(|schema| self.schemas.compile(schema))
            .transpose()
    }
}

impl SchemaValidator for EmbeddedSchema {
    fn validate(&self, value: &Value) -> Result<Value, ValidationFailure> {
        self.compile(value)?;
        Ok(value.clone())
    }
}

// ==================== 类型化参数 ====================

/// 默认的参数不合法提示
pub const INVALID_CONDITION_VALUE: &str = "Invalid condition value";

/// 基于 serde + validator 的参数校验器
///
/// 先反序列化为 `T`（失败时报告 `INVALID_CONDITION_VALUE`），再执行 `T` 上的 `#[validate]` 规则。
pub struct TypedParams<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> TypedParams<T> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for TypedParams<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> TypedParams<T>
where
    T: DeserializeOwned + Validate,
{
    /// 反序列化并校验，返回类型化参数
    pub fn parse(&self, value: &Value) -> Result<T, ValidationFailure> {
        let params: T = serde_json::from_value(value.clone())
            .map_err(|_| ValidationFailure::new(INVALID_CONDITION_VALUE))?;

        params
            .validate()
            .map_err(|errors| ValidationFailure::new(describe_errors(&errors)))?;

        Ok(params)
    }
}

impl<T> SchemaValidator for TypedParams<T>
where
    T: DeserializeOwned + Validate,
{
    fn validate(&self, value: &Value) -> Result<Value, ValidationFailure> {
        self.parse(value).map(|_| value.clone())
    }
}

/// 汇总 validator 的字段错误，按字段名排序保证输出稳定
fn describe_errors(errors: &ValidationErrors) -> String {
    let mut fields: Vec<_> = errors.field_errors().into_iter().collect();
    fields.sort_by(|a, b| a.0.cmp(&b.0));

    fields
        .into_iter()
        .flat_map(|(_, errs)| errs.iter())
        .map(|e| match &e.message {
            Some(message) => message.to_string(),
            None => e.code.to_string(),
        })
        .collect::<Vec<_>>()
        .join("; ")
}

// ==================== 轻量校验 ====================

/// 要求值为数组，可选地限定长度
pub struct ArrayValue {
    len: Option<usize>,
}

impl ArrayValue {
    pub fn any() -> Self {
        Self { len: None }
    }

    pub fn exact(len: usize) -> Self {
        Self { len: Some(len) }
    }
}

impl SchemaValidator for ArrayValue {
    fn validate(&self, value: &Value) -> Result<Value, ValidationFailure> {
        let arr = value
            .as_array()
            .ok_or_else(|| ValidationFailure::new("Expected an array of values"))?;

        match self.len {
            Some(len) if arr.len() != len => Err(ValidationFailure::new(format!(
                "Expected an array of {} values, got {}",
                len,
                arr.len()
            ))),
            _ => Ok(value.clone()),
        }
    }
}

/// 编译缓存的容量上限，超出后清空重建
const REGEX_CACHE_CAPACITY: usize = 1024;

/// 要求值为合法的正则表达式，编译结果按模式缓存
#[derive(Default)]
pub struct RegexPattern {
    cache: DashMap<String, Regex>,
}

impl RegexPattern {
    pub fn new() -> Self {
        Self::default()
    }

    /// 编译正则表达式，命中缓存时不重新编译
    pub fn compile(&self, pattern: &str) -> Result<Regex, ValidationFailure> {
        if let Some(regex) = self.cache.get(pattern) {
            return Ok(regex.clone());
        }

        let regex = Regex::new(pattern)
            .map_err(|e| ValidationFailure::new(format!("Invalid regular expression: {}", e)))?;

        if self.cache.len() >= REGEX_CACHE_CAPACITY {
            self.cache.clear();
        }
        self.cache.insert(pattern.to_string(), regex.clone());
        Ok(regex)
    }
}

impl SchemaValidator for RegexPattern {
    fn validate(&self, value: &Value) -> Result<Value, ValidationFailure> {
        let pattern = value
            .as_str()
            .ok_or_else(|| ValidationFailure::new("Expected a regular expression string"))?;

        self.compile(pattern)?;
        Ok(value.clone())
    }
}
