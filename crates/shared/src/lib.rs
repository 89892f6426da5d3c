//! 共享库
//!
//! 包含所有 crate 共用的配置、错误处理、文件监听与可观测性基础设施代码。

pub mod config;
pub mod config_watcher;
pub mod error;
pub mod observability;
