//! 准入服务集成测试
//!
//! 名单、示例规则与信誉数据源组合后的完整决策流程。

use std::sync::Arc;

use async_trait::async_trait;
use chanwall_acceptor::AdmissionService;
use chanwall_acceptor::cli::runner::serve_lines;
use chanwall_acceptor::events::{
    AdmissionResponse, AmbossContactInfo, AmbossNodeInfo, AmbossProfile, AmbossSocials,
    ChannelAcceptInput, ChannelAcceptRequest, CircuitKey, ForwardAction, HtlcForwardInput,
    HtlcForwardRequest, OneMlNodeInfo, OneMlNodeRank,
};
use chanwall_acceptor::providers::{AmbossSource, ContextBuilder, OneMlSource};
use chanwall_shared::config::{AppConfig, ListMode};
use chanwall_shared::config_watcher::DynamicConfig;
use chanwall_shared::error::SharedError;
use rule_engine::RuleStore;
use serde_json::json;
use tokio_test::assert_ok;

const CHANNEL_ACCEPT_RULE: &str = include_str!("../../../rules/ChannelAccept.rule");
const HTLC_FORWARD_RULE: &str = include_str!("../../../rules/HtlcForward.rule");

const PUBKEY: &str = "02a1b2c3d4e5f60718293a4b5c6d7e8f90";
const IN_CHAN: u64 = 770495967390531585; // 700762x1327x1
const OUT_CHAN: u64 = 759495353533530113; // 690757x1005x1

// ============================================================================
// 测试数据源
// ============================================================================

struct StaticOneMl;

#[async_trait]
impl OneMlSource for StaticOneMl {
    async fn node_info(&self, pubkey: &str) -> Result<OneMlNodeInfo, SharedError> {
        Ok(OneMlNodeInfo {
            pub_key: pubkey.to_string(),
            alias: "reputable-node".to_string(),
            noderank: OneMlNodeRank {
                availability: 150,
                age: 5000,
                ..Default::default()
            },
            ..Default::default()
        })
    }
}

struct StaticAmboss {
    with_contact: bool,
}

#[async_trait]
impl AmbossSource for StaticAmboss {
    async fn node_info(&self, _pubkey: &str) -> Result<AmbossNodeInfo, SharedError> {
        let socials = self.with_contact.then(|| AmbossSocials {
            info: Some(AmbossContactInfo {
                email: Some("ops@example.com".to_string()),
                ..Default::default()
            }),
        });
        Ok(AmbossNodeInfo {
            socials,
            amboss: Some(AmbossProfile {
                is_prime: Some(true),
                ..Default::default()
            }),
            ..Default::default()
        })
    }
}

struct FailingAmboss;

#[async_trait]
impl AmbossSource for FailingAmboss {
    async fn node_info(&self, _pubkey: &str) -> Result<AmbossNodeInfo, SharedError> {
        Err(SharedError::Provider {
            provider: "amboss".to_string(),
            message: "unavailable".to_string(),
        })
    }
}

// ============================================================================
// 测试辅助
// ============================================================================

fn base_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.channel.reject_message = "Channel request rejected by node policy".to_string();
    config.providers.oneml.active = true;
    config.providers.amboss.active = true;
    config.providers.oneml.timeout_ms = 200;
    config.providers.amboss.timeout_ms = 200;
    config
}

fn sample_store() -> RuleStore {
    let store = RuleStore::new();
    store.load("ChannelAccept", CHANNEL_ACCEPT_RULE).unwrap();
    store.load("HtlcForward", HTLC_FORWARD_RULE).unwrap();
    store
}

fn reputable_builder() -> ContextBuilder {
    ContextBuilder::new()
        .with_oneml(Arc::new(StaticOneMl))
        .with_amboss(Arc::new(StaticAmboss { with_contact: true }))
}

fn service(config: AppConfig, store: RuleStore, builder: ContextBuilder) -> AdmissionService {
    AdmissionService::new(DynamicConfig::new(config), store, builder)
}

fn channel_input(funding_amt: u64, channel_flags: u32) -> ChannelAcceptInput {
    ChannelAcceptInput {
        alias_from: None,
        request: ChannelAcceptRequest {
            node_pubkey: PUBKEY.to_string(),
            pending_chan_id: "beef".to_string(),
            funding_amt,
            channel_flags,
            csv_delay: 144,
            max_accepted_htlcs: 483,
            ..Default::default()
        },
        ..Default::default()
    }
}

fn forward_input(incoming_msat: u64, outgoing_msat: u64) -> HtlcForwardInput {
    HtlcForwardInput {
        pubkey_from: PUBKEY.to_string(),
        alias_from: "alice".to_string(),
        pubkey_to: "03ffee".to_string(),
        alias_to: "bob".to_string(),
        request: HtlcForwardRequest {
            incoming_circuit_key: CircuitKey {
                chan_id: IN_CHAN,
                htlc_id: 7,
            },
            incoming_amount_msat: incoming_msat,
            outgoing_amount_msat: outgoing_msat,
            incoming_expiry: 800_040,
            outgoing_expiry: 800_000,
            outgoing_requested_chan_id: OUT_CHAN,
            payment_hash: "00".repeat(32),
        },
    }
}

async fn channel_accepted(service: &AdmissionService, input: ChannelAcceptInput) -> bool {
    match service
        .handle(chanwall_acceptor::AdmissionRequest::ChannelAccept(input))
        .await
    {
        AdmissionResponse::ChannelAccept(response) => response.accept,
        other => panic!("unexpected response {:?}", other),
    }
}

async fn forward_action(service: &AdmissionService, input: HtlcForwardInput) -> ForwardAction {
    match service
        .handle(chanwall_acceptor::AdmissionRequest::HtlcForward(input))
        .await
    {
        AdmissionResponse::HtlcForward(response) => response.action,
        other => panic!("unexpected response {:?}", other),
    }
}

// ============================================================================
// 通道开启
// ============================================================================

#[tokio::test]
async fn test_reputable_node_is_accepted_with_echoed_parameters() {
    let acceptor = chanwall_acceptor::ChannelAcceptor::new(
        DynamicConfig::new(base_config()),
        sample_store(),
        reputable_builder(),
    );

    let response = acceptor.handle(channel_input(800_000, 0)).await;
    assert!(response.accept);
    assert_eq!(response.pending_chan_id, "beef");
    assert_eq!(response.csv_delay, 144);
    assert_eq!(response.max_htlc_count, 483);
    assert!(response.error.is_none());
}

#[tokio::test]
async fn test_rule_rejection_carries_reject_message() {
    let acceptor = chanwall_acceptor::ChannelAcceptor::new(
        DynamicConfig::new(base_config()),
        sample_store(),
        reputable_builder(),
    );

    let response = acceptor.handle(channel_input(500_000, 0)).await;
    assert!(!response.accept);
    assert_eq!(
        response.error.as_deref(),
        Some("Channel request rejected by node policy")
    );
    assert_eq!(response.csv_delay, 0);
}

#[tokio::test]
async fn test_missing_contact_data_rejects() {
    let builder = ContextBuilder::new()
        .with_oneml(Arc::new(StaticOneMl))
        .with_amboss(Arc::new(StaticAmboss {
            with_contact: false,
        }));
    let service = service(base_config(), sample_store(), builder);

    assert!(!channel_accepted(&service, channel_input(900_000, 0)).await);
}

#[tokio::test]
async fn test_failed_provider_degrades_to_absent_data() {
    let builder = ContextBuilder::new()
        .with_oneml(Arc::new(StaticOneMl))
        .with_amboss(Arc::new(FailingAmboss));
    let service = service(base_config(), sample_store(), builder);

    // Amboss 数据缺失，联系方式子句为假
    assert!(!channel_accepted(&service, channel_input(900_000, 0)).await);
}

#[tokio::test]
async fn test_public_channel_bypasses_size_cap() {
    let service = service(base_config(), sample_store(), reputable_builder());

    assert!(channel_accepted(&service, channel_input(12_000_000, 1)).await);
    assert!(!channel_accepted(&service, channel_input(12_000_000, 0)).await);
}

#[tokio::test]
async fn test_allowlist_rejects_before_rules() {
    let mut config = base_config();
    config.channel.mode = ListMode::Allowlist;
    config.channel.allowlist = vec!["03deadbeef".to_string()];
    let service = service(config, sample_store(), reputable_builder());

    assert!(!channel_accepted(&service, channel_input(800_000, 0)).await);
}

#[tokio::test]
async fn test_allowlisted_node_still_subject_to_rules() {
    let mut config = base_config();
    config.channel.mode = ListMode::Allowlist;
    config.channel.allowlist = vec![PUBKEY.to_string()];
    let service = service(config, sample_store(), reputable_builder());

    assert!(channel_accepted(&service, channel_input(800_000, 0)).await);
    assert!(!channel_accepted(&service, channel_input(500_000, 0)).await);
}

#[tokio::test]
async fn test_denylist_wildcard_rejects_everything() {
    let mut config = base_config();
    config.channel.denylist = vec!["*".to_string()];
    let service = service(config, sample_store(), reputable_builder());

    assert!(!channel_accepted(&service, channel_input(800_000, 0)).await);
}

#[tokio::test]
async fn test_passthrough_lets_rules_decide() {
    let mut config = base_config();
    config.channel.mode = ListMode::Passthrough;
    config.channel.denylist = vec![PUBKEY.to_string()];
    let service = service(config, sample_store(), reputable_builder());

    assert!(channel_accepted(&service, channel_input(800_000, 0)).await);
}

#[tokio::test]
async fn test_rules_disabled_accepts_on_list_alone() {
    let mut config = base_config();
    config.rules.apply = false;
    let service = service(config, RuleStore::new(), ContextBuilder::new());

    assert!(channel_accepted(&service, channel_input(1, 0)).await);
}

#[tokio::test]
async fn test_missing_rule_rejects() {
    let service = service(base_config(), RuleStore::new(), reputable_builder());

    assert!(!channel_accepted(&service, channel_input(800_000, 0)).await);
    assert_eq!(
        forward_action(&service, forward_input(2_000, 1_000)).await,
        ForwardAction::Fail
    );
}

#[tokio::test]
async fn test_type_mismatch_rejects() {
    let store = RuleStore::new();
    store
        .load("ChannelAccept", "ChannelAccept.Event.NodePubkey > 5")
        .unwrap();
    let service = service(base_config(), store, reputable_builder());

    assert!(!channel_accepted(&service, channel_input(800_000, 0)).await);
}

#[tokio::test]
async fn test_config_update_takes_effect_immediately() {
    let dynamic = DynamicConfig::new(base_config());
    let service = AdmissionService::new(dynamic.clone(), sample_store(), reputable_builder());
    assert!(channel_accepted(&service, channel_input(800_000, 0)).await);

    let mut updated = base_config();
    updated.channel.denylist = vec![PUBKEY.to_string()];
    dynamic.update(updated);
    assert!(!channel_accepted(&service, channel_input(800_000, 0)).await);
}

// ============================================================================
// HTLC 转发
// ============================================================================

#[tokio::test]
async fn test_forward_rule_decides() {
    let service = service(base_config(), sample_store(), ContextBuilder::new());

    assert_eq!(
        forward_action(&service, forward_input(1_001_000, 1_000_000)).await,
        ForwardAction::Resume
    );
    // 入站金额不足以覆盖出站
    assert_eq!(
        forward_action(&service, forward_input(999_000, 1_000_000)).await,
        ForwardAction::Fail
    );
    // 超过单笔上限
    assert_eq!(
        forward_action(&service, forward_input(20_000_000_000, 10_000_000_001)).await,
        ForwardAction::Fail
    );
}

#[tokio::test]
async fn test_forward_denylist_pair() {
    let mut config = base_config();
    config.forward.denylist = vec!["700762x1327x1->690757x1005x1".to_string()];
    let service = service(config, sample_store(), ContextBuilder::new());

    assert_eq!(
        forward_action(&service, forward_input(1_001_000, 1_000_000)).await,
        ForwardAction::Fail
    );
}

#[tokio::test]
async fn test_forward_allowlist_pair() {
    let mut config = base_config();
    config.forward.mode = ListMode::Allowlist;
    config.forward.allowlist = vec!["700762x1327x1->690757x1005x1".to_string()];
    let service = service(config, sample_store(), ContextBuilder::new());
    assert_eq!(
        forward_action(&service, forward_input(1_001_000, 1_000_000)).await,
        ForwardAction::Resume
    );

    let mut input = forward_input(1_001_000, 1_000_000);
    input.request.outgoing_requested_chan_id = IN_CHAN;
    assert_eq!(forward_action(&service, input).await, ForwardAction::Fail);
}

// ============================================================================
// 行协议
// ============================================================================

#[tokio::test]
async fn test_handle_line_channel_accept() {
    let service = service(base_config(), sample_store(), reputable_builder());
    let line = json!({
        "type": "channel_accept",
        "request": { "node_pubkey": PUBKEY, "pending_chan_id": "beef", "funding_amt": 800000 }
    })
    .to_string();

    let response = assert_ok!(service.handle_line(&line).await);
    let value = serde_json::to_value(&response).unwrap();
    assert_eq!(value["type"], "channel_accept");
    assert_eq!(value["accept"], true);
    assert_eq!(value["pending_chan_id"], "beef");
}

#[tokio::test]
async fn test_handle_line_rejects_malformed_json() {
    let service = service(base_config(), sample_store(), reputable_builder());

    let err = service.handle_line("{not json").await.unwrap_err();
    assert_eq!(err.code(), "JSON_ERROR");
    assert!(service.handle_line(r#"{"type":"unknown"}"#).await.is_err());
}

fn ndjson(values: &[serde_json::Value]) -> String {
    values.iter().map(|value| format!("{}\n", value)).collect()
}

fn read_lines(output: Vec<u8>) -> Vec<serde_json::Value> {
    String::from_utf8(output)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

#[tokio::test]
async fn test_serve_lines_answers_every_request() {
    let service = service(base_config(), sample_store(), ContextBuilder::new());
    let resumed = json!({
        "type": "htlc_forward",
        "request": {
            "incoming_circuit_key": { "chan_id": 1, "htlc_id": 2 },
            "incoming_amount_msat": 2000,
            "outgoing_amount_msat": 1000,
            "incoming_expiry": 50,
            "outgoing_expiry": 10
        }
    });
    let failed = json!({
        "type": "htlc_forward",
        "request": { "incoming_amount_msat": 1, "outgoing_amount_msat": 1000 }
    });
    let input = format!("{}\n\ngarbage\n{}\n", resumed, failed);

    let mut output = Vec::new();
    let handled = assert_ok!(serve_lines(&service, input.as_bytes(), &mut output).await);
    assert_eq!(handled, 3);

    let lines = read_lines(output);
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[0]["action"], "resume");
    assert_eq!(lines[0]["incoming_circuit_key"]["HtlcId"], 2);
    assert_eq!(lines[1]["type"], "error");
    assert_eq!(lines[1]["code"], "JSON_ERROR");
    assert!(lines[1]["message"].as_str().is_some_and(|m| !m.is_empty()));
    assert_eq!(lines[2]["action"], "fail");
}

#[tokio::test]
async fn test_serve_lines_accepts_with_supplied_reputation() {
    // 未注入数据源，信誉数据随请求行提供
    let service = service(base_config(), sample_store(), ContextBuilder::new());
    let rated = json!({
        "type": "channel_accept",
        "one_ml": { "noderank": { "availability": 150, "age": 5000 } },
        "amboss": {
            "socials": { "info": { "email": "ops@example.com" } },
            "amboss": { "is_prime": true }
        },
        "request": {
            "node_pubkey": PUBKEY,
            "pending_chan_id": "beef",
            "funding_amt": 800000,
            "channel_flags": 0
        }
    });
    let unrated = json!({
        "type": "channel_accept",
        "request": { "node_pubkey": PUBKEY, "funding_amt": 800000 }
    });
    let input = ndjson(&[rated, unrated]);

    let mut output = Vec::new();
    let handled = assert_ok!(serve_lines(&service, input.as_bytes(), &mut output).await);
    assert_eq!(handled, 2);

    let lines = read_lines(output);
    assert_eq!(lines[0]["type"], "channel_accept");
    assert_eq!(lines[0]["accept"], true);
    assert_eq!(lines[0]["pending_chan_id"], "beef");
    assert_eq!(lines[1]["accept"], false);
}
