//! CLI 模块
//!
//! - `check` - 编译规则文件并打印摘要或表达式树
//! - `run` - 读取 stdin 上逐行的 JSON 请求，向 stdout 逐行输出决策
//!
//! ```bash
//! chanwall check rules/ChannelAccept.rule --json
//! CHANWALL_CHANNEL__MODE=allowlist chanwall run --config-dir /etc/chanwall
//! ```

pub mod commands;
pub mod runner;

pub use commands::{Cli, Commands};
pub use runner::CommandRunner;
