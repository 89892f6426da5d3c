//! 信誉数据源与上下文构建
//!
//! 1ML 与 Amboss 数据有两个来源：宿主随请求附带的数据，或运行时注入的数据源实现。
//! 请求已附带的数据段直接使用；其余数据段并发查询，各自带超时与重试，
//! 最终失败时对应数据段留空，规则中引用它的字段按缺失处理。

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chanwall_shared::config::{ProviderConfig, ProvidersConfig};
use chanwall_shared::error::SharedError;
use chanwall_shared::observability::metrics;
use tracing::{debug, warn};

use crate::events::{AmbossNodeInfo, ChannelAcceptEvent, ChannelAcceptInput, OneMlNodeInfo};

pub const ONEML_PROVIDER: &str = "1ml";
pub const AMBOSS_PROVIDER: &str = "amboss";

/// 1ML 节点信息数据源
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OneMlSource: Send + Sync {
    async fn node_info(&self, pubkey: &str) -> Result<OneMlNodeInfo, SharedError>;
}

/// Amboss 节点信息数据源
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AmbossSource: Send + Sync {
    async fn node_info(&self, pubkey: &str) -> Result<AmbossNodeInfo, SharedError>;
}

/// 信誉查询的重试策略
///
/// 查询位于通道请求的关键路径上，只对超时重试，退避从 100ms 起翻倍，不超过 1s。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(1),
        }
    }

    /// 第 `retry` 次重试前的等待时间（从 0 开始）
    pub fn backoff(&self, retry: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(retry))
            .min(self.max_delay)
    }

    fn allows(&self, retry: u32, error: &SharedError) -> bool {
        retry < self.max_retries && error.is_retryable()
    }
}

/// 通道开启事件构建器
#[derive(Clone, Default)]
pub struct ContextBuilder {
    oneml: Option<Arc<dyn OneMlSource>>,
    amboss: Option<Arc<dyn AmbossSource>>,
}

impl ContextBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_oneml(mut self, source: Arc<dyn OneMlSource>) -> Self {
        self.oneml = Some(source);
        self
    }

    pub fn with_amboss(mut self, source: Arc<dyn AmbossSource>) -> Self {
        self.amboss = Some(source);
        self
    }

    /// 是否未注入任何数据源
    pub fn is_empty(&self) -> bool {
        self.oneml.is_none() && self.amboss.is_none()
    }

    /// 组装通道开启事件
    ///
    /// 输入已附带的数据段优先，缺失的数据段按配置查询已注入的数据源。
    /// 未提供别名时回退到 1ML 数据中的别名。
    pub async fn channel_accept_event(
        &self,
        config: &ProvidersConfig,
        input: ChannelAcceptInput,
    ) -> ChannelAcceptEvent {
        let ChannelAcceptInput {
            alias_from,
            one_ml: supplied_oneml,
            amboss: supplied_amboss,
            request,
        } = input;
        let pubkey = request.node_pubkey.as_str();
        let policy = RetryPolicy::new(config.max_retries);

        let oneml = async move {
            match (supplied_oneml, &self.oneml) {
                (Some(info), _) => Some(info),
                (None, Some(source)) => {
                    lookup(ONEML_PROVIDER, &config.oneml, policy, || {
                        source.node_info(pubkey)
                    })
                    .await
                }
                (None, None) => None,
            }
        };
        let amboss = async move {
            match (supplied_amboss, &self.amboss) {
                (Some(info), _) => Some(info),
                (None, Some(source)) => {
                    lookup(AMBOSS_PROVIDER, &config.amboss, policy, || {
                        source.node_info(pubkey)
                    })
                    .await
                }
                (None, None) => None,
            }
        };

        let (one_ml, amboss) = tokio::join!(oneml, amboss);

        let alias_from = alias_from
            .filter(|alias| !alias.is_empty())
            .or_else(|| one_ml.as_ref().map(|info| info.alias.clone()))
            .unwrap_or_default();

        ChannelAcceptEvent {
            pubkey_from: request.node_pubkey.clone(),
            alias_from,
            event: request,
            one_ml,
            amboss,
        }
    }
}

/// 查询数据源，每次请求受超时限制，失败时返回 `None`
async fn lookup<T, F, Fut>(
    provider: &'static str,
    config: &ProviderConfig,
    policy: RetryPolicy,
    mut query: F,
) -> Option<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, SharedError>>,
{
    if !config.active {
        return None;
    }

    let mut retry = 0;
    let result = loop {
        let outcome = tokio::time::timeout(config.timeout(), query())
            .await
            .unwrap_or_else(|_| {
                Err(SharedError::ProviderTimeout {
                    provider: provider.to_string(),
                })
            });

        match outcome {
            Err(e) if policy.allows(retry, &e) => {
                let delay = policy.backoff(retry);
                debug!(
                    provider,
                    retry,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "信誉数据查询超时，退避后重试"
                );
                tokio::time::sleep(delay).await;
                retry += 1;
            }
            other => break other,
        }
    };

    match result {
        Ok(info) => {
            debug!(provider, retry, "信誉数据查询成功");
            Some(info)
        }
        Err(e) => {
            metrics::record_provider_failure(provider);
            warn!(provider, error = %e, code = e.code(), "信誉数据查询失败，跳过该数据源");
            None
        }
    }
}
