//! 规则执行器
//!
//! 实现规则的短路求值执行，返回准入决策和评估追踪信息。

use crate::compiler::CompiledRule;
use crate::context::{FieldResolver, Value};
use crate::error::Result;
use crate::evaluator::ConditionEvaluator;
use crate::models::{Decision, Expr};
use chanwall_shared::observability::metrics;
use std::time::Instant;
use tracing::debug;

/// 规则执行器
pub struct RuleExecutor {
    /// 是否记录详细评估追踪
    trace_enabled: bool,
}

impl RuleExecutor {
    pub fn new() -> Self {
        Self {
            trace_enabled: false,
        }
    }

    /// 启用评估追踪
    pub fn with_trace(mut self) -> Self {
        self.trace_enabled = true;
        self
    }

    /// 执行规则评估
    ///
    /// 求值是 (规则, 上下文) 的纯函数；耗时只进入日志和指标，不进入决策。
    pub fn execute<R>(&self, rule: &CompiledRule, resolver: &R) -> Result<Decision>
    where
        R: FieldResolver + ?Sized,
    {
        let start = Instant::now();
        let mut trace = Vec::new();

        let outcome = self.first_failing(rule.root(), resolver, &mut trace);
        let elapsed = start.elapsed();

        let failing = match outcome {
            Ok(failing) => failing,
            Err(e) => {
                metrics::record_rule_error(rule.id(), e.code());
                debug!(
                    rule_id = %rule.id(),
                    version = %rule.version(),
                    error = %e,
                    "规则评估失败"
                );
                return Err(e);
            }
        };

        let decision = match failing {
            None => Decision::accepted(rule.id(), rule.version()),
            Some(clause) => Decision::rejected(rule.id(), rule.version(), clause.to_string()),
        }
        .with_trace(trace);

        metrics::record_rule_evaluation(rule.id(), decision.accept, elapsed.as_secs_f64());
        debug!(
            rule_id = %rule.id(),
            version = %rule.version(),
            accept = decision.accept,
            rejected_by = ?decision.rejected_by,
            elapsed_us = elapsed.as_micros() as u64,
            "规则评估完成"
        );

        Ok(decision)
    }

    /// 沿顶层 `&&` 链（穿过括号）求值，返回第一个为假的子句
    ///
    /// 返回 `None` 表示整条规则为真。求值顺序与短路行为和 `eval_bool` 一致。
    fn first_failing<'a, R>(
        &self,
        expr: &'a Expr,
        resolver: &R,
        trace: &mut Vec<String>,
    ) -> Result<Option<&'a Expr>>
    where
        R: FieldResolver + ?Sized,
    {
        match expr {
            Expr::And { lhs, rhs } => {
                if let Some(failing) = self.first_failing(lhs, resolver, trace)? {
                    self.record(trace, || format!("AND 短路 - 跳过 {}", rhs));
                    return Ok(Some(failing));
                }
                self.first_failing(rhs, resolver, trace)
            }
            Expr::Group { inner } if matches!(**inner, Expr::And { .. } | Expr::Group { .. }) => {
                self.first_failing(inner, resolver, trace)
            }
            clause => {
                if self.eval_bool(clause, resolver, trace)? {
                    Ok(None)
                } else {
                    self.record(trace, || format!("拒绝子句: {}", clause));
                    Ok(Some(clause))
                }
            }
        }
    }

    /// 逻辑求值（短路）
    fn eval_bool<R>(&self, expr: &Expr, resolver: &R, trace: &mut Vec<String>) -> Result<bool>
    where
        R: FieldResolver + ?Sized,
    {
        match expr {
            Expr::And { lhs, rhs } => {
                // AND: 左侧为假立即返回
                if !self.eval_bool(lhs, resolver, trace)? {
                    self.record(trace, || format!("AND 短路 - 跳过 {}", rhs));
                    return Ok(false);
                }
                self.eval_bool(rhs, resolver, trace)
            }
            Expr::Or { lhs, rhs } => {
                // OR: 左侧为真立即返回
                if self.eval_bool(lhs, resolver, trace)? {
                    self.record(trace, || format!("OR 短路 - 跳过 {}", rhs));
                    return Ok(true);
                }
                self.eval_bool(rhs, resolver, trace)
            }
            Expr::Group { inner } => self.eval_bool(inner, resolver, trace),
            other => Ok(self.eval_value(other, resolver, trace)?.is_truthy()),
        }
    }

    /// 值求值
    fn eval_value<R>(&self, expr: &Expr, resolver: &R, trace: &mut Vec<String>) -> Result<Value>
    where
        R: FieldResolver + ?Sized,
    {
        match expr {
            Expr::Field { path } => {
                let value = resolver.resolve(path).unwrap_or(Value::Absent);
                self.record(trace, || format!("{} = {}", path, value));
                Ok(value)
            }
            Expr::Literal { value } => Ok(Value::from(value)),
            Expr::Comparison { op, lhs, rhs } => {
                let left = self.eval_value(lhs, resolver, trace)?;
                let right = self.eval_value(rhs, resolver, trace)?;
                let holds = ConditionEvaluator::compare(*op, left, right)?;
                self.record(trace, || format!("{} => {}", expr, holds));
                Ok(Value::Bool(holds))
            }
            Expr::BitAnd { lhs, rhs } => {
                let left = self.eval_value(lhs, resolver, trace)?;
                let right = self.eval_value(rhs, resolver, trace)?;
                ConditionEvaluator::bit_and(left, right)
            }
            Expr::And { .. } | Expr::Or { .. } => {
                Ok(Value::Bool(self.eval_bool(expr, resolver, trace)?))
            }
            Expr::Group { inner } => self.eval_value(inner, resolver, trace),
        }
    }

    fn record(&self, trace: &mut Vec<String>, entry: impl FnOnce() -> String) {
        if self.trace_enabled {
            trace.push(entry());
        }
    }
}

impl Default for RuleExecutor {
    fn default() -> Self {
        Self::new()
    }
}
