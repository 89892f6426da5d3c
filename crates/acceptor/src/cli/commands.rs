//! CLI 命令定义

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// 闪电网络通道准入工具
#[derive(Parser, Debug)]
#[command(name = "chanwall")]
#[command(version, about = "闪电网络通道开启与 HTLC 转发准入")]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// 编译规则文件，语法错误时以非零状态退出
    Check {
        /// 规则文件路径
        file: PathBuf,

        /// 输出 JSON 表达式树
        #[arg(long)]
        json: bool,
    },

    /// 启动准入服务
    ///
    /// 从 stdin 读取 `{"type":"channel_accept",...}` 或 `{"type":"htlc_forward",...}`，
    /// 每个请求向 stdout 输出一行 JSON 响应。
    Run {
        /// 配置目录
        #[arg(long, env = "CONFIG_DIR", default_value = "config")]
        config_dir: PathBuf,
    },
}
