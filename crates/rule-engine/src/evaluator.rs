//! 条件评估器
//!
//! 实现比较与按位与操作符的求值逻辑，以及缺失值的零值补齐规则：
//! 缺失的一侧取另一侧类型的零值（数字为 0，字符串为 ""，布尔为 false），
//! 两侧同时缺失时按 0 与 0 比较。

use crate::context::Value;
use crate::error::{Result, RuleError};
use crate::operators::ComparisonOp;

/// 条件评估器
pub struct ConditionEvaluator;

impl ConditionEvaluator {
    /// 比较两个值
    ///
    /// 数字之间支持全部六种比较；字符串、布尔值只支持 `==` / `!=`；
    /// 其他组合返回 `TypeMismatch`。
    pub fn compare(op: ComparisonOp, left: Value, right: Value) -> Result<bool> {
        let (left, right) = Self::coerce_absent(left, right);

        match (&left, &right) {
            // 整数之间精确比较，避免大整数转浮点后丢失精度
            (Value::Int(a), Value::Int(b)) => Ok(op.holds(a.cmp(b))),
            (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
                match (Self::as_f64(&left), Self::as_f64(&right)) {
                    (Some(a), Some(b)) => Ok(Self::compare_f64(op, a, b)),
                    _ => Err(Self::mismatch(op.symbol(), &left, &right)),
                }
            }
            (Value::Str(a), Value::Str(b)) if op.is_equality() => Ok(op.holds(a.cmp(b))),
            (Value::Bool(a), Value::Bool(b)) if op.is_equality() => Ok(op.holds(a.cmp(b))),
            _ => Err(Self::mismatch(op.symbol(), &left, &right)),
        }
    }

    /// 按位与，仅支持整数（缺失值视为 0）
    pub fn bit_and(left: Value, right: Value) -> Result<Value> {
        match (Self::absent_as_zero(left), Self::absent_as_zero(right)) {
            (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a & b)),
            (left, right) => Err(Self::mismatch("&", &left, &right)),
        }
    }

    /// 缺失值补齐为另一侧类型的零值
    pub fn coerce_absent(left: Value, right: Value) -> (Value, Value) {
        match (left, right) {
            (Value::Absent, Value::Absent) => (Value::Int(0), Value::Int(0)),
            (Value::Absent, right) => (Self::zero_like(&right), right),
            (left, Value::Absent) => {
                let zero = Self::zero_like(&left);
                (left, zero)
            }
            pair => pair,
        }
    }

    fn zero_like(value: &Value) -> Value {
        match value {
            Value::Int(_) => Value::Int(0),
            Value::Float(_) => Value::Float(0.0),
            Value::Bool(_) => Value::Bool(false),
            Value::Str(_) => Value::Str(String::new()),
            Value::Object | Value::Absent => Value::Absent,
        }
    }

    fn absent_as_zero(value: Value) -> Value {
        match value {
            Value::Absent => Value::Int(0),
            other => other,
        }
    }

    /// NaN 参与的比较只有 `!=` 成立
    fn compare_f64(op: ComparisonOp, a: f64, b: f64) -> bool {
        match a.partial_cmp(&b) {
            Some(ordering) => op.holds(ordering),
            None => op == ComparisonOp::Ne,
        }
    }

    fn as_f64(value: &Value) -> Option<f64> {
        match value {
            Value::Int(n) => Some(*n as f64),
            Value::Float(n) => Some(*n),
            _ => None,
        }
    }

    fn mismatch(operator: &str, left: &Value, right: &Value) -> RuleError {
        RuleError::type_mismatch(operator, left.type_name(), right.type_name())
    }
}
