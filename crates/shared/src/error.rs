//! 统一错误处理模块
//!
//! 定义基础设施层共享的错误类型，使用 thiserror 提供良好的错误信息。

use thiserror::Error;

/// 基础设施错误类型
#[derive(Debug, Error)]
pub enum SharedError {
    // ==================== 配置错误 ====================
    #[error("配置错误: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("文件监听错误: {0}")]
    Watch(#[from] notify::Error),

    // ==================== 外部数据源错误 ====================
    #[error("外部数据源超时: {provider}")]
    ProviderTimeout { provider: String },

    #[error("外部数据源错误: {provider} - {message}")]
    Provider { provider: String, message: String },

    // ==================== 通用错误 ====================
    #[error("参数验证失败: {0}")]
    Validation(String),

    #[error("内部错误: {0}")]
    Internal(String),
}

/// 错误结果类型别名
pub type Result<T> = std::result::Result<T, SharedError>;

impl SharedError {
    /// 获取错误码
    pub fn code(&self) -> &'static str {
        match self {
            Self::Config(_) => "CONFIG_ERROR",
            Self::Io(_) => "IO_ERROR",
            Self::Watch(_) => "WATCH_ERROR",
            Self::ProviderTimeout { .. } => "PROVIDER_TIMEOUT",
            Self::Provider { .. } => "PROVIDER_ERROR",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// 是否为可重试错误
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ProviderTimeout { .. } | Self::Io(_))
    }
}
