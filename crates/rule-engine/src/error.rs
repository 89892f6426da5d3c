//! 规则引擎错误类型

use std::path::PathBuf;
use thiserror::Error;

/// 规则解析错误的具体类别
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyntaxErrorKind {
    #[error("未知操作符 '{0}'")]
    UnknownOperator(String),

    #[error("非法字符 '{0}'")]
    UnexpectedChar(char),

    #[error("字符串字面量未闭合")]
    UnterminatedString,

    #[error("无效的转义序列 '\\{0}'")]
    InvalidEscape(char),

    #[error("无效的数字字面量 '{0}'")]
    InvalidNumber(String),

    #[error("括号未闭合")]
    UnclosedParen,

    #[error("多余的右括号")]
    UnmatchedParen,

    #[error("意外的符号 {0}")]
    UnexpectedToken(String),

    #[error("表达式意外结束")]
    UnexpectedEnd,

    #[error("比较操作符不能连续使用")]
    ChainedComparison,

    #[error("规则为空")]
    EmptyRule,

    #[error("表达式嵌套超过 {0} 层")]
    TooDeep(usize),
}

/// 规则解析错误，附带 1 起始的行列位置
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("第 {line} 行第 {column} 列: {kind}")]
pub struct SyntaxError {
    pub kind: SyntaxErrorKind,
    pub line: usize,
    pub column: usize,
}

impl SyntaxError {
    pub fn new(kind: SyntaxErrorKind, line: usize, column: usize) -> Self {
        Self { kind, line, column }
    }
}

#[derive(Debug, Error)]
pub enum RuleError {
    #[error("规则解析失败: {0}")]
    Syntax(#[from] SyntaxError),

    #[error("类型不匹配: '{operator}' 不支持 {left} 与 {right}")]
    TypeMismatch {
        operator: String,
        left: String,
        right: String,
    },

    #[error("规则未找到: {0}")]
    RuleNotFound(String),

    #[error("读取规则文件失败 {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON 序列化错误: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl RuleError {
    pub fn type_mismatch(operator: impl Into<String>, left: &str, right: &str) -> Self {
        Self::TypeMismatch {
            operator: operator.into(),
            left: left.to_string(),
            right: right.to_string(),
        }
    }

    /// 获取错误码
    pub fn code(&self) -> &'static str {
        match self {
            Self::Syntax(_) => "SYNTAX_ERROR",
            Self::TypeMismatch { .. } => "TYPE_MISMATCH",
            Self::RuleNotFound(_) => "RULE_NOT_FOUND",
            Self::Io { .. } => "IO_ERROR",
            Self::JsonError(_) => "JSON_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, RuleError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_syntax_error_display() {
        let err = SyntaxError::new(SyntaxErrorKind::UnterminatedString, 3, 14);
        assert_eq!(err.to_string(), "第 3 行第 14 列: 字符串字面量未闭合");
    }

    #[test]
    fn test_error_codes() {
        let err: RuleError = SyntaxError::new(SyntaxErrorKind::EmptyRule, 1, 1).into();
        assert_eq!(err.code(), "SYNTAX_ERROR");
        assert_eq!(
            RuleError::type_mismatch("&", "float", "integer").code(),
            "TYPE_MISMATCH"
        );
    }
}
