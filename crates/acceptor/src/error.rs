//! 准入层错误类型

use chanwall_shared::error::SharedError;
use rule_engine::RuleError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AcceptorError {
    #[error("规则错误: {0}")]
    Rule(#[from] RuleError),

    #[error(transparent)]
    Shared(#[from] SharedError),

    #[error("JSON 错误: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, AcceptorError>;

impl AcceptorError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Rule(e) => e.code(),
            Self::Shared(e) => e.code(),
            Self::Json(_) => "JSON_ERROR",
        }
    }
}
