//! 配置管理模块
//!
//! 支持多格式配置文件加载，环境变量覆盖，以及类型安全的配置访问。

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

/// 拒绝消息的最大长度（字符数），超出部分会被截断
pub const MAX_REJECT_MESSAGE_LEN: usize = 500;

/// 名单过滤模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ListMode {
    /// 仅放行名单中的条目
    Allowlist,
    /// 拒绝名单中的条目，其余放行
    #[default]
    Denylist,
    /// 不做名单过滤，完全交给规则决定
    Passthrough,
}

impl fmt::Display for ListMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Allowlist => write!(f, "allowlist"),
            Self::Denylist => write!(f, "denylist"),
            Self::Passthrough => write!(f, "passthrough"),
        }
    }
}

/// 通道开启请求策略配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChannelPolicyConfig {
    pub mode: ListMode,
    /// 允许名单（十六进制节点公钥，或 `*`）
    pub allowlist: Vec<String>,
    /// 拒绝名单（十六进制节点公钥，或 `*`）
    pub denylist: Vec<String>,
    /// 拒绝时返回给对端的消息
    pub reject_message: String,
}

impl Default for ChannelPolicyConfig {
    fn default() -> Self {
        Self {
            mode: ListMode::Denylist,
            allowlist: Vec::new(),
            denylist: Vec::new(),
            reject_message: String::new(),
        }
    }
}

/// HTLC 转发策略配置
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ForwardPolicyConfig {
    pub mode: ListMode,
    /// 允许名单：`BxTxO`、`in->out` 或 `*`
    pub allowlist: Vec<String>,
    /// 拒绝名单：`BxTxO`、`in->out` 或 `*`
    pub denylist: Vec<String>,
}

/// 规则文件配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RulesConfig {
    /// 是否执行规则评估；关闭时只使用名单决策
    pub apply: bool,
    /// 规则文件所在目录
    pub dir: String,
    pub channel_accept_file: String,
    pub htlc_forward_file: String,
    /// 是否监听规则文件变更并热加载
    pub watch: bool,
    /// 文件变更去抖窗口（毫秒）
    pub debounce_ms: u64,
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            apply: true,
            dir: "rules".to_string(),
            channel_accept_file: "ChannelAccept.rule".to_string(),
            htlc_forward_file: "HtlcForward.rule".to_string(),
            watch: true,
            debounce_ms: 500,
        }
    }
}

impl RulesConfig {
    pub fn channel_accept_path(&self) -> PathBuf {
        Path::new(&self.dir).join(&self.channel_accept_file)
    }

    pub fn htlc_forward_path(&self) -> PathBuf {
        Path::new(&self.dir).join(&self.htlc_forward_file)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

/// 单个信誉数据源配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub active: bool,
    pub timeout_ms: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            active: false,
            timeout_ms: 2000,
        }
    }
}

impl ProviderConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// 信誉数据源配置（1ML / Amboss）
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    pub oneml: ProviderConfig,
    pub amboss: ProviderConfig,
    /// 超时后的最大重试次数（不含首次请求）
    pub max_retries: u32,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            oneml: ProviderConfig::default(),
            amboss: ProviderConfig::default(),
            max_retries: 1,
        }
    }
}

/// 可观测性配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub log_level: String,
    /// 日志输出格式：json（结构化）或 pretty（人类可读）
    pub log_format: String,
    pub metrics_enabled: bool,
    pub metrics_port: u16,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            metrics_enabled: false,
            metrics_port: 9090,
        }
    }
}

impl ObservabilityConfig {
    pub fn json_logs(&self) -> bool {
        self.log_format.eq_ignore_ascii_case("json")
    }
}

/// 应用配置
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub service_name: String,
    pub environment: String,
    pub observability: ObservabilityConfig,
    pub channel: ChannelPolicyConfig,
    pub forward: ForwardPolicyConfig,
    pub rules: RulesConfig,
    pub providers: ProvidersConfig,
}

impl AppConfig {
    /// 从配置文件和环境变量加载配置
    ///
    /// 加载顺序（后加载的会覆盖先加载的同名配置项）：
    /// 1. config/default.toml（默认配置）
    /// 2. config/{environment}.toml（环境特定配置）
    /// 3. config/{service_name}.toml（服务特定配置）
    /// 4. 环境变量（CHANWALL_ 前缀，嵌套用双下划线，如 CHANWALL_RULES__APPLY -> rules.apply）
    pub fn load(service_name: &str) -> Result<Self, ConfigError> {
        let config_dir = std::env::var("CONFIG_DIR").unwrap_or_else(|_| "config".to_string());
        Self::load_from(service_name, config_dir)
    }

    /// 从指定目录加载配置
    pub fn load_from(
        service_name: &str,
        config_dir: impl AsRef<Path>,
    ) -> Result<Self, ConfigError> {
        let env = std::env::var("CHANWALL_ENV").unwrap_or_else(|_| "development".to_string());
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            .set_default("service_name", service_name)?
            .set_default("environment", env.clone())?
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            .add_source(File::from(config_dir.join(format!("{}.toml", env))).required(false))
            .add_source(
                File::from(config_dir.join(format!("{}.toml", service_name))).required(false),
            )
            .add_source(
                Environment::with_prefix("CHANWALL")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );

        let mut config: Self = builder.build()?.try_deserialize()?;
        config.normalize();

        Ok(config)
    }

    /// 规范化配置值
    ///
    /// 拒绝消息超过 500 个字符时截断。
    pub fn normalize(&mut self) {
        let message = &self.channel.reject_message;
        if message.chars().count() > MAX_REJECT_MESSAGE_LEN {
            warn!(
                max = MAX_REJECT_MESSAGE_LEN,
                "channel reject message is too long, trimming"
            );
            self.channel.reject_message = message.chars().take(MAX_REJECT_MESSAGE_LEN).collect();
        }
    }

    /// 是否为生产环境
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}
