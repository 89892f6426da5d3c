//! 准入请求与事件模型
//!
//! 输入侧按 lnd 的 snake_case 命名反序列化；事件序列化为 PascalCase，
//! 挂在 `ChannelAccept` / `HtlcForward` 根名称下供规则按路径引用，
//! 如 `ChannelAccept.Event.FundingAmt`、`ChannelAccept.OneMl.Noderank.Age`。
//! 可选数据为 `None` 时不出现在上下文中，规则里按缺失处理。

use serde::{Deserialize, Serialize};

/// 事件类型，决定上下文根名称和使用的规则
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    ChannelAccept,
    HtlcForward,
}

impl EventKind {
    /// 上下文根名称
    pub fn root(&self) -> &'static str {
        match self {
            Self::ChannelAccept => "ChannelAccept",
            Self::HtlcForward => "HtlcForward",
        }
    }

    /// 规则存储中的规则 ID
    pub fn rule_id(&self) -> &'static str {
        self.root()
    }
}

// ============================================================================
// 通道开启请求
// ============================================================================

/// 通道开启请求（对应 lnd ChannelAcceptRequest）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all(serialize = "PascalCase", deserialize = "snake_case"))]
pub struct ChannelAcceptRequest {
    /// 对端节点公钥（十六进制）
    pub node_pubkey: String,
    /// 待定通道 ID（十六进制）
    pub pending_chan_id: String,
    pub funding_amt: u64,
    pub push_amt: u64,
    pub dust_limit: u64,
    pub max_value_in_flight: u64,
    pub channel_reserve: u64,
    pub min_htlc: u64,
    pub fee_per_kw: u64,
    pub csv_delay: u32,
    pub max_accepted_htlcs: u32,
    /// bit 0 表示公开通道
    pub channel_flags: u32,
    pub wants_zero_conf: bool,
    pub wants_scid_alias: bool,
}

impl ChannelAcceptRequest {
    pub fn is_public(&self) -> bool {
        self.channel_flags & 1 == 1
    }
}

/// 交给规则评估的通道开启事件
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ChannelAcceptEvent {
    pub pubkey_from: String,
    pub alias_from: String,
    pub event: ChannelAcceptRequest,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub one_ml: Option<OneMlNodeInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amboss: Option<AmbossNodeInfo>,
}

// ============================================================================
// HTLC 转发请求
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all(serialize = "PascalCase", deserialize = "snake_case"))]
pub struct CircuitKey {
    pub chan_id: u64,
    pub htlc_id: u64,
}

/// HTLC 转发拦截请求（对应 lnd ForwardHtlcInterceptRequest）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all(serialize = "PascalCase", deserialize = "snake_case"))]
pub struct HtlcForwardRequest {
    pub incoming_circuit_key: CircuitKey,
    pub incoming_amount_msat: u64,
    pub incoming_expiry: u32,
    pub outgoing_requested_chan_id: u64,
    pub outgoing_amount_msat: u64,
    pub outgoing_expiry: u32,
    pub payment_hash: String,
}

/// 交给规则评估的 HTLC 转发事件
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct HtlcForwardEvent {
    pub pubkey_from: String,
    pub alias_from: String,
    pub pubkey_to: String,
    pub alias_to: String,
    pub event: HtlcForwardRequest,
}

// ============================================================================
// 信誉数据源模型
// ============================================================================

/// 1ML 节点信息
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all(serialize = "PascalCase", deserialize = "snake_case"))]
pub struct OneMlNodeInfo {
    pub last_update: i64,
    pub pub_key: String,
    pub alias: String,
    pub color: String,
    pub capacity: i64,
    pub channelcount: i64,
    pub noderank: OneMlNodeRank,
}

/// 1ML 排名（数值越小越靠前）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all(serialize = "PascalCase", deserialize = "snake_case"))]
pub struct OneMlNodeRank {
    pub capacity: i64,
    pub channelcount: i64,
    pub age: i64,
    pub growth: i64,
    pub availability: i64,
}

/// Amboss 节点信息
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all(serialize = "PascalCase", deserialize = "snake_case"))]
pub struct AmbossNodeInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub socials: Option<AmbossSocials>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub graph_info: Option<AmbossGraphInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amboss: Option<AmbossProfile>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all(serialize = "PascalCase", deserialize = "snake_case"))]
pub struct AmbossSocials {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub info: Option<AmbossContactInfo>,
}

/// 联系方式，未填写的字段不进入上下文
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all(serialize = "PascalCase", deserialize = "snake_case"))]
pub struct AmbossContactInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub telegram: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub twitter: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lightning_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub twitter_verified: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all(serialize = "PascalCase", deserialize = "snake_case"))]
pub struct AmbossGraphInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<AmbossMetrics>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all(serialize = "PascalCase", deserialize = "snake_case"))]
pub struct AmbossMetrics {
    /// Amboss 以字符串返回容量（sat）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capacity: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capacity_rank: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channels: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channels_rank: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all(serialize = "PascalCase", deserialize = "snake_case"))]
pub struct AmbossProfile {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_prime: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_favorite: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub number_favorites: Option<i64>,
}

// ============================================================================
// 宿主输入输出
// ============================================================================

/// 通道开启输入：请求本身加上宿主已知的对端信息
///
/// `one_ml` / `amboss` 为宿主已经取得的信誉数据，提供时不再查询对应数据源。
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ChannelAcceptInput {
    pub alias_from: Option<String>,
    pub one_ml: Option<OneMlNodeInfo>,
    pub amboss: Option<AmbossNodeInfo>,
    pub request: ChannelAcceptRequest,
}

/// HTLC 转发输入：请求加上宿主解析出的两端节点
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct HtlcForwardInput {
    pub pubkey_from: String,
    pub alias_from: String,
    pub pubkey_to: String,
    pub alias_to: String,
    pub request: HtlcForwardRequest,
}

/// 一行输入请求
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AdmissionRequest {
    ChannelAccept(ChannelAcceptInput),
    HtlcForward(HtlcForwardInput),
}

/// 通道开启响应（对应 lnd ChannelAcceptResponse）
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ChannelAcceptResponse {
    pub accept: bool,
    pub pending_chan_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub csv_delay: u32,
    pub max_htlc_count: u32,
    pub reserve_sat: u64,
    pub in_flight_max_msat: u64,
    pub min_htlc_in: u64,
}

impl ChannelAcceptResponse {
    /// 接受并回显请求中的通道参数
    pub fn accept(request: &ChannelAcceptRequest) -> Self {
        Self {
            accept: true,
            pending_chan_id: request.pending_chan_id.clone(),
            error: None,
            csv_delay: request.csv_delay,
            max_htlc_count: request.max_accepted_htlcs,
            reserve_sat: request.channel_reserve,
            in_flight_max_msat: request.max_value_in_flight,
            min_htlc_in: request.min_htlc,
        }
    }

    pub fn reject(request: &ChannelAcceptRequest, message: &str) -> Self {
        Self {
            accept: false,
            pending_chan_id: request.pending_chan_id.clone(),
            error: (!message.is_empty()).then(|| message.to_string()),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ForwardAction {
    Resume,
    Fail,
}

/// HTLC 转发响应（对应 lnd ForwardHtlcInterceptResponse）
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForwardResponse {
    pub incoming_circuit_key: CircuitKey,
    pub action: ForwardAction,
}

/// 一行输出响应
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AdmissionResponse {
    ChannelAccept(ChannelAcceptResponse),
    HtlcForward(ForwardResponse),
    /// 无法处理的输入行
    Error { code: String, message: String },
}

impl AdmissionResponse {
    pub fn error(code: &str, message: impl ToString) -> Self {
        Self::Error {
            code: code.to_string(),
            message: message.to_string(),
        }
    }
}
