//! 通道准入服务
//!
//! 把闪电网络节点的通道开启请求和 HTLC 转发请求转换为规则引擎的评估上下文，
//! 结合静态名单得出最终决策。
//!
//! ## 模块结构
//!
//! - `events`: 请求、事件与响应模型
//! - `lists`: 允许名单 / 拒绝名单策略
//! - `providers`: 1ML / Amboss 信誉数据源与上下文构建
//! - `acceptor`: 名单与规则组合后的准入决策
//! - `reload`: 规则文件加载与热更新
//! - `cli`: 命令行入口

pub mod acceptor;
pub mod cli;
pub mod error;
pub mod events;
pub mod helpers;
pub mod lists;
pub mod providers;
pub mod reload;

pub use acceptor::{AdmissionService, ChannelAcceptor, ForwardInterceptor};
pub use error::{AcceptorError, Result};
pub use events::{AdmissionRequest, AdmissionResponse, EventKind};
pub use lists::{ForwardListPolicy, ListPolicy};
pub use providers::{AmbossSource, ContextBuilder, OneMlSource};
