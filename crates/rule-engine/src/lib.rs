//! 通道准入规则引擎
//!
//! 提供可复用的规则评估能力，支持：
//! - 文本规则语法（点号字段路径、比较、`&&`/`||`、按位与、括号分组、`//` 注释）
//! - 规则编译、版本摘要与字段提取
//! - 短路求值执行与评估追踪
//! - 线程安全的规则存储与热替换

pub mod compiler;
pub mod context;
pub mod error;
pub mod evaluator;
pub mod executor;
pub mod lexer;
pub mod models;
pub mod operators;
pub mod policy;
pub mod store;

pub use compiler::{CompiledRule, RuleCompiler, parse};
pub use context::{EvaluationContext, FieldResolver, Value};
pub use error::{Result, RuleError, SyntaxError, SyntaxErrorKind};
pub use evaluator::ConditionEvaluator;
pub use executor::RuleExecutor;
pub use models::{Decision, Expr, FieldPath, Literal};
pub use operators::ComparisonOp;
pub use policy::{decide, decide_with_trace};
pub use store::{RuleStore, RuleStoreStats};
