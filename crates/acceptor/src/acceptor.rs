//! 准入决策
//!
//! 最终决策 = 名单决策 && (rules.apply ? 规则决策 : true)。
//! 先查名单，名单已拒绝的请求不再评估规则；规则缺失或评估出错时拒绝。

use chanwall_shared::config_watcher::DynamicConfig;
use chanwall_shared::observability::metrics;
use rule_engine::{Decision, EvaluationContext, RuleStore, decide};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::error::Result;
use crate::events::{
    AdmissionRequest, AdmissionResponse, ChannelAcceptInput, ChannelAcceptResponse, EventKind,
    ForwardAction, ForwardResponse, HtlcForwardEvent, HtlcForwardInput,
};
use crate::helpers::{parse_channel_id, trim_pubkey};
use crate::lists::{ForwardListPolicy, ListPolicy};
use crate::providers::ContextBuilder;

/// 规则评估结论
#[derive(Debug, Clone, PartialEq, Eq)]
struct RuleVerdict {
    accept: bool,
    rejected_by: Option<String>,
}

impl RuleVerdict {
    fn rejected(reason: impl Into<String>) -> Self {
        Self {
            accept: false,
            rejected_by: Some(reason.into()),
        }
    }
}

impl From<Decision> for RuleVerdict {
    fn from(decision: Decision) -> Self {
        Self {
            accept: decision.accept,
            rejected_by: decision.rejected_by,
        }
    }
}

fn try_evaluate<T: Serialize>(store: &RuleStore, kind: EventKind, event: &T) -> Result<Decision> {
    let rule = store.require(kind.rule_id())?;
    let context = EvaluationContext::from_event(kind.root(), event)?;
    Ok(decide(&rule, &context)?)
}

/// 评估事件对应的规则，出错时按拒绝处理
fn evaluate_rule<T: Serialize>(store: &RuleStore, kind: EventKind, event: &T) -> RuleVerdict {
    match try_evaluate(store, kind, event) {
        Ok(decision) => decision.into(),
        Err(e) => {
            match e.code() {
                "RULE_NOT_FOUND" => {
                    error!(rule_id = kind.rule_id(), "规则未加载，拒绝请求");
                }
                code => {
                    warn!(rule_id = kind.rule_id(), error = %e, code, "规则评估失败，拒绝请求");
                }
            }
            RuleVerdict::rejected(e.to_string())
        }
    }
}

fn decision_label(accept: bool) -> &'static str {
    if accept { "accept" } else { "reject" }
}

// ============================================================================
// 通道开启
// ============================================================================

/// 通道开启请求处理器
#[derive(Clone)]
pub struct ChannelAcceptor {
    config: DynamicConfig,
    store: RuleStore,
    context_builder: ContextBuilder,
}

impl ChannelAcceptor {
    pub fn new(config: DynamicConfig, store: RuleStore, context_builder: ContextBuilder) -> Self {
        Self {
            config,
            store,
            context_builder,
        }
    }

    pub async fn handle(&self, input: ChannelAcceptInput) -> ChannelAcceptResponse {
        let config = self.config.load();
        let request = input.request.clone();
        let policy = ListPolicy::for_channel(&config.channel);

        let mut alias = input.alias_from.clone().unwrap_or_default();
        let verdict = if !policy.decide(&request.node_pubkey) {
            RuleVerdict::rejected(format!("{} 名单", policy.mode()))
        } else if config.rules.apply {
            let event = self
                .context_builder
                .channel_accept_event(&config.providers, input)
                .await;
            alias = event.alias_from.clone();
            evaluate_rule(&self.store, EventKind::ChannelAccept, &event)
        } else {
            RuleVerdict {
                accept: true,
                rejected_by: None,
            }
        };

        metrics::record_channel_request(verdict.accept);
        info!(
            pubkey = %trim_pubkey(&request.node_pubkey),
            alias = %alias,
            amount = request.funding_amt,
            chan_id = %request.pending_chan_id,
            decision = decision_label(verdict.accept),
            mode = %policy.mode(),
            rejected_by = verdict.rejected_by.as_deref().unwrap_or(""),
            "通道开启请求"
        );

        if verdict.accept {
            ChannelAcceptResponse::accept(&request)
        } else {
            ChannelAcceptResponse::reject(&request, &config.channel.reject_message)
        }
    }
}

// ============================================================================
// HTLC 转发
// ============================================================================

/// HTLC 转发拦截处理器
#[derive(Clone)]
pub struct ForwardInterceptor {
    config: DynamicConfig,
    store: RuleStore,
}

impl ForwardInterceptor {
    pub fn new(config: DynamicConfig, store: RuleStore) -> Self {
        Self { config, store }
    }

    pub fn handle(&self, input: HtlcForwardInput) -> ForwardResponse {
        let config = self.config.load();
        let request = &input.request;
        let incoming = request.incoming_circuit_key.chan_id;
        let outgoing = request.outgoing_requested_chan_id;
        let policy = ForwardListPolicy::for_forward(&config.forward);

        let verdict = if !policy.decide(incoming, outgoing) {
            RuleVerdict::rejected(format!("{} 名单", policy.mode()))
        } else if config.rules.apply {
            let event = HtlcForwardEvent {
                pubkey_from: input.pubkey_from.clone(),
                alias_from: input.alias_from.clone(),
                pubkey_to: input.pubkey_to.clone(),
                alias_to: input.alias_to.clone(),
                event: request.clone(),
            };
            evaluate_rule(&self.store, EventKind::HtlcForward, &event)
        } else {
            RuleVerdict {
                accept: true,
                rejected_by: None,
            }
        };

        metrics::record_forward_request(verdict.accept);
        info!(
            pubkey = %trim_pubkey(&input.pubkey_from),
            alias = %input.alias_from,
            amount = request.incoming_amount_msat / 1000,
            chan_id = %format!("{}->{}", parse_channel_id(incoming), parse_channel_id(outgoing)),
            decision = decision_label(verdict.accept),
            mode = %policy.mode(),
            rejected_by = verdict.rejected_by.as_deref().unwrap_or(""),
            "HTLC 转发请求"
        );

        ForwardResponse {
            incoming_circuit_key: request.incoming_circuit_key,
            action: if verdict.accept {
                ForwardAction::Resume
            } else {
                ForwardAction::Fail
            },
        }
    }
}

// ============================================================================
// 统一入口
// ============================================================================

/// 按请求类型分发到对应处理器
#[derive(Clone)]
pub struct AdmissionService {
    channel: ChannelAcceptor,
    forward: ForwardInterceptor,
}

impl AdmissionService {
    pub fn new(config: DynamicConfig, store: RuleStore, context_builder: ContextBuilder) -> Self {
        Self {
            channel: ChannelAcceptor::new(config.clone(), store.clone(), context_builder),
            forward: ForwardInterceptor::new(config, store),
        }
    }

    pub async fn handle(&self, request: AdmissionRequest) -> AdmissionResponse {
        match request {
            AdmissionRequest::ChannelAccept(input) => {
                AdmissionResponse::ChannelAccept(self.channel.handle(input).await)
            }
            AdmissionRequest::HtlcForward(input) => {
                AdmissionResponse::HtlcForward(self.forward.handle(input))
            }
        }
    }

    /// 处理一行 JSON 请求
    pub async fn handle_line(&self, line: &str) -> Result<AdmissionResponse> {
        let request: AdmissionRequest = serde_json::from_str(line)?;
        Ok(self.handle(request).await)
    }
}
