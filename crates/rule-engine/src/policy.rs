//! 准入决策入口
//!
//! 宿主只需调用 [`decide`]：同一个 `Arc<CompiledRule>` 可以在多个线程上并发评估。

use crate::compiler::CompiledRule;
use crate::context::FieldResolver;
use crate::error::Result;
use crate::executor::RuleExecutor;
use crate::models::Decision;

/// 对上下文评估规则，得出准入决策
pub fn decide<R>(rule: &CompiledRule, context: &R) -> Result<Decision>
where
    R: FieldResolver + ?Sized,
{
    RuleExecutor::new().execute(rule, context)
}

/// 同 [`decide`]，额外记录评估追踪
pub fn decide_with_trace<R>(rule: &CompiledRule, context: &R) -> Result<Decision>
where
    R: FieldResolver + ?Sized,
{
    RuleExecutor::new().with_trace().execute(rule, context)
}
