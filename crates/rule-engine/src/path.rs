//! 路径解析
//!
//! 将 `a.b[0].c`、`items.length` 这样的路径表达式解析为段序列，并在上下文中逐段查找。
//! 任何一段缺失、不可索引或越界都返回 `None`，由调用方决定如何处理"缺失"。

use serde_json::Value;
use std::borrow::Cow;

const LENGTH_SEGMENT: &str = "length";

/// 路径段
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    /// 对象字段；若当前值是数组且字段为纯数字，则按下标访问
    Key(String),
    /// `[n]` 下标
    Index(usize),
    /// 虚拟段 `length`：数组元素个数或字符串字符数
    Length,
}

/// 解析后的字段路径
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPath {
    segments: Vec<PathSegment>,
}

impl FieldPath {
    /// 解析路径表达式，格式不合法时返回 `None`
    pub fn parse(expr: &str) -> Option<Self> {
        if expr.is_empty() {
            return None;
        }

        let mut segments = Vec::new();
        for part in expr.split('.') {
            let (name, mut rest) = match part.find('[') {
                Some(pos) => part.split_at(pos),
                None => (part, ""),
            };

            match name {
                // `a..b` 或 `.a` 这类空段只允许出现在下标之前，如 `[0].a`
                "" if rest.is_empty() => return None,
                "" => {}
                LENGTH_SEGMENT => segments.push(PathSegment::Length),
                _ => segments.push(PathSegment::Key(name.to_string())),
            }

            while !rest.is_empty() {
                let close = rest.find(']')?;
                let index = rest.get(1..close)?.trim().parse::<usize>().ok()?;
                segments.push(PathSegment::Index(index));
                rest = &rest[close + 1..];
                if !rest.is_empty() && !rest.starts_with('[') {
                    return None;
                }
            }
        }

        Some(Self { segments })
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    /// 在上下文中解析该路径
    pub fn resolve<'a>(&self, context: &'a Value) -> Option<Cow<'a, Value>> {
        let mut current = context;

        for (i, segment) in self.segments.iter().enumerate() {
            match segment {
                PathSegment::Key(name) => {
                    current = match current {
                        Value::Object(map) => map.get(name)?,
                        Value::Array(arr) => arr.get(name.parse::<usize>().ok()?)?,
                        _ => return None,
                    };
                }
                PathSegment::Index(index) => {
                    current = current.as_array()?.get(*index)?;
                }
                PathSegment::Length => {
                    let len = match current {
                        Value::Object(map) => {
                            current = map.get(LENGTH_SEGMENT)?;
                            continue;
                        }
                        Value::Array(arr) => arr.len(),
                        Value::String(s) => s.chars().count(),
                        _ => return None,
                    };
                    // 长度是一个数字，后面不能再有段
                    return if i + 1 == self.segments.len() {
                        Some(Cow::Owned(Value::from(len)))
                    } else {
                        None
                    };
                }
            }
        }

        Some(Cow::Borrowed(current))
    }
}

/// 解析路径表达式并在上下文中查找值
pub fn resolve<'a>(context: &'a Value, expr: &str) -> Option<Cow<'a, Value>> {
    FieldPath::parse(expr)?.resolve(context)
}
