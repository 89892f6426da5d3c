//! 评估上下文与运行期值模型

use crate::models::{FieldPath, Literal};
use serde::Serialize;
use serde_json::{Map, Value as JsonValue};
use std::collections::HashMap;
use std::fmt;

/// 评估期的值
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
    /// 路径指向中间节点（对象或数组）
    Object,
    /// 字段不存在或为 null
    Absent,
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Int(_) => "integer",
            Self::Float(_) => "float",
            Self::Bool(_) => "boolean",
            Self::Str(_) => "string",
            Self::Object => "object",
            Self::Absent => "absent",
        }
    }

    /// 真值判断：0、0.0、NaN、空字符串、false 和缺失为假
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Int(n) => *n != 0,
            Self::Float(n) => *n != 0.0 && !n.is_nan(),
            Self::Bool(b) => *b,
            Self::Str(s) => !s.is_empty(),
            Self::Object => true,
            Self::Absent => false,
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }

    pub fn from_json(value: &JsonValue) -> Self {
        match value {
            JsonValue::Null => Self::Absent,
            JsonValue::Bool(b) => Self::Bool(*b),
            JsonValue::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Self::Int(i)
                } else if let Some(u) = n.as_u64() {
                    // 超出 i64 范围的无符号整数按浮点数处理
                    Self::Float(u as f64)
                } else {
                    Self::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            JsonValue::String(s) => Self::Str(s.clone()),
            JsonValue::Array(_) | JsonValue::Object(_) => Self::Object,
        }
    }
}

impl From<&Literal> for Value {
    fn from(literal: &Literal) -> Self {
        match literal {
            Literal::Int(n) => Self::Int(*n),
            Literal::Float(n) => Self::Float(*n),
            Literal::Bool(b) => Self::Bool(*b),
            Literal::Str(s) => Self::Str(s.clone()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(n) => write!(f, "{}", n),
            Self::Float(n) => write!(f, "{:?}", n),
            Self::Bool(b) => write!(f, "{}", b),
            Self::Str(s) => write!(f, "{:?}", s),
            Self::Object => f.write_str("<object>"),
            Self::Absent => f.write_str("<absent>"),
        }
    }
}

/// 字段解析器
///
/// 返回 `None` 表示字段缺失，求值时按 `Value::Absent` 处理。
pub trait FieldResolver {
    fn resolve(&self, path: &FieldPath) -> Option<Value>;
}

/// 以完整路径为键的扁平映射，便于测试和简单宿主使用
impl FieldResolver for HashMap<String, Value> {
    fn resolve(&self, path: &FieldPath) -> Option<Value> {
        self.get(path.as_str()).cloned()
    }
}

/// 评估上下文 - 提供给规则引擎的只读数据快照
#[derive(Debug, Clone, Default)]
pub struct EvaluationContext {
    data: JsonValue,
}

impl EvaluationContext {
    pub fn new(data: JsonValue) -> Self {
        Self { data }
    }

    /// 从 JSON 对象创建
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let data: JsonValue = serde_json::from_str(json)?;
        Ok(Self { data })
    }

    /// 将事件序列化后挂到根名称下，如 `ChannelAccept`
    pub fn from_event<T: Serialize>(root: &str, event: &T) -> Result<Self, serde_json::Error> {
        let mut map = Map::new();
        map.insert(root.to_string(), serde_json::to_value(event)?);
        Ok(Self::new(JsonValue::Object(map)))
    }

    /// 获取字段值（支持点号分隔的路径，如 "ChannelAccept.Event.FundingAmt"）
    pub fn get_field(&self, path: &str) -> Option<&JsonValue> {
        self.lookup(path.split('.'))
    }

    fn lookup<'a, I>(&self, segments: I) -> Option<&JsonValue>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut current = &self.data;

        for part in segments {
            match current {
                JsonValue::Object(map) => {
                    current = map.get(part)?;
                }
                JsonValue::Array(arr) => {
                    // 支持数组索引访问，如 "Channels.0.Capacity"
                    let index: usize = part.parse().ok()?;
                    current = arr.get(index)?;
                }
                _ => return None,
            }
        }

        Some(current)
    }

    /// 获取底层数据
    pub fn data(&self) -> &JsonValue {
        &self.data
    }
}

impl FieldResolver for EvaluationContext {
    fn resolve(&self, path: &FieldPath) -> Option<Value> {
        self.lookup(path.segments().iter().map(String::as_str))
            .map(Value::from_json)
    }
}
