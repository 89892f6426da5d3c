//! 静态名单策略
//!
//! 允许名单从拒绝出发，拒绝名单从接受出发；命中条目或 `*` 时翻转结果并停止匹配。
//! passthrough 模式直接放行，交给规则决定。

use chanwall_shared::config::{ChannelPolicyConfig, ForwardPolicyConfig, ListMode};

use crate::helpers::parse_channel_id;

const WILDCARD: &str = "*";
const PAIR_SEPARATOR: &str = "->";

/// 名单初始结果与待匹配条目，passthrough 时为 `None`
fn starting_point<'a>(
    mode: ListMode,
    allowlist: &'a [String],
    denylist: &'a [String],
) -> Option<(bool, &'a [String])> {
    match mode {
        ListMode::Allowlist => Some((false, allowlist)),
        ListMode::Denylist => Some((true, denylist)),
        ListMode::Passthrough => None,
    }
}

/// 通道开启请求的名单策略，按节点公钥匹配
#[derive(Debug, Clone)]
pub struct ListPolicy {
    mode: ListMode,
    allowlist: Vec<String>,
    denylist: Vec<String>,
}

impl ListPolicy {
    pub fn for_channel(config: &ChannelPolicyConfig) -> Self {
        Self {
            mode: config.mode,
            allowlist: config.allowlist.clone(),
            denylist: config.denylist.clone(),
        }
    }

    pub fn mode(&self) -> ListMode {
        self.mode
    }

    /// 名单是否放行该节点
    pub fn decide(&self, node_pubkey: &str) -> bool {
        let Some((mut accept, entries)) =
            starting_point(self.mode, &self.allowlist, &self.denylist)
        else {
            return true;
        };

        if entries
            .iter()
            .any(|entry| entry == WILDCARD || entry.eq_ignore_ascii_case(node_pubkey))
        {
            accept = !accept;
        }
        accept
    }
}

/// HTLC 转发的名单策略
///
/// 条目形式：
/// - `*`：匹配所有转发
/// - `700762x1327x1`：匹配入站通道
/// - `700762x1327x1->690757x1005x1`：匹配入站与出站通道对，任一侧可写 `*`
#[derive(Debug, Clone)]
pub struct ForwardListPolicy {
    mode: ListMode,
    allowlist: Vec<String>,
    denylist: Vec<String>,
}

impl ForwardListPolicy {
    pub fn for_forward(config: &ForwardPolicyConfig) -> Self {
        Self {
            mode: config.mode,
            allowlist: config.allowlist.clone(),
            denylist: config.denylist.clone(),
        }
    }

    pub fn mode(&self) -> ListMode {
        self.mode
    }

    pub fn decide(&self, incoming_chan_id: u64, outgoing_chan_id: u64) -> bool {
        let Some((mut accept, entries)) =
            starting_point(self.mode, &self.allowlist, &self.denylist)
        else {
            return true;
        };

        let incoming = parse_channel_id(incoming_chan_id);
        let outgoing = parse_channel_id(outgoing_chan_id);

        if entries
            .iter()
            .any(|entry| entry_matches(entry, &incoming, &outgoing))
        {
            accept = !accept;
        }
        accept
    }
}

fn entry_matches(entry: &str, incoming: &str, outgoing: &str) -> bool {
    if entry == WILDCARD {
        return true;
    }

    let parts: Vec<&str> = entry.split(PAIR_SEPARATOR).collect();
    match parts.as_slice() {
        [from, to] => side_matches(from, incoming) && side_matches(to, outgoing),
        _ => entry == incoming,
    }
}

fn side_matches(pattern: &str, chan_id: &str) -> bool {
    pattern == WILDCARD || pattern == chan_id
}

#[cfg(test)]
mod tests {
    use super::*;

    const PUBKEY: &str =
        "6d792d7075626b65792d69732d766572792d6c6f6e672d666f722d7472696d6d696e672d7075626b6579";
    const IN_CHAN: u64 = 770495967390531585; // 700762x1327x1
    const OUT_CHAN: u64 = 759495353533530113; // 690757x1005x1

    fn channel(mode: ListMode, entries: &[&str]) -> ListPolicy {
        let entries: Vec<String> = entries.iter().map(|s| s.to_string()).collect();
        ListPolicy::for_channel(&ChannelPolicyConfig {
            mode,
            allowlist: entries.clone(),
            denylist: entries,
            reject_message: String::new(),
        })
    }

    fn forward(mode: ListMode, entries: &[&str]) -> ForwardListPolicy {
        let entries: Vec<String> = entries.iter().map(|s| s.to_string()).collect();
        ForwardListPolicy::for_forward(&ForwardPolicyConfig {
            mode,
            allowlist: entries.clone(),
            denylist: entries,
        })
    }

    #[test]
    fn test_channel_allowlist() {
        assert!(channel(ListMode::Allowlist, &[PUBKEY]).decide(PUBKEY));
        assert!(!channel(ListMode::Allowlist, &["02ab"]).decide(PUBKEY));
        assert!(!channel(ListMode::Allowlist, &[]).decide(PUBKEY));
        assert!(channel(ListMode::Allowlist, &["*"]).decide(PUBKEY));
    }

    #[test]
    fn test_channel_denylist() {
        assert!(!channel(ListMode::Denylist, &[PUBKEY]).decide(PUBKEY));
        assert!(channel(ListMode::Denylist, &["02ab"]).decide(PUBKEY));
        assert!(channel(ListMode::Denylist, &[]).decide(PUBKEY));
        assert!(!channel(ListMode::Denylist, &["*"]).decide(PUBKEY));
    }

    #[test]
    fn test_channel_pubkey_match_ignores_case() {
        let upper = PUBKEY.to_ascii_uppercase();
        assert!(!channel(ListMode::Denylist, &[&upper]).decide(PUBKEY));
    }

    #[test]
    fn test_channel_passthrough() {
        assert!(channel(ListMode::Passthrough, &["*"]).decide(PUBKEY));
    }

    #[test]
    fn test_forward_pair() {
        let entry = "700762x1327x1->690757x1005x1";
        assert!(!forward(ListMode::Denylist, &[entry]).decide(IN_CHAN, OUT_CHAN));
        assert!(forward(ListMode::Allowlist, &[entry]).decide(IN_CHAN, OUT_CHAN));

        // 方向相反不匹配
        assert!(forward(ListMode::Denylist, &[entry]).decide(OUT_CHAN, IN_CHAN));
    }

    #[test]
    fn test_forward_pair_with_wildcard_side() {
        assert!(!forward(ListMode::Denylist, &["*->690757x1005x1"]).decide(IN_CHAN, OUT_CHAN));
        assert!(!forward(ListMode::Denylist, &["700762x1327x1->*"]).decide(IN_CHAN, OUT_CHAN));
        assert!(forward(ListMode::Denylist, &["*->700762x1327x1"]).decide(IN_CHAN, OUT_CHAN));
    }

    #[test]
    fn test_forward_single_incoming_id() {
        assert!(!forward(ListMode::Denylist, &["700762x1327x1"]).decide(IN_CHAN, OUT_CHAN));
        // 单个 ID 只匹配入站通道
        assert!(forward(ListMode::Denylist, &["690757x1005x1"]).decide(IN_CHAN, OUT_CHAN));
    }

    #[test]
    fn test_forward_wildcard_and_passthrough() {
        assert!(!forward(ListMode::Denylist, &["*"]).decide(IN_CHAN, OUT_CHAN));
        assert!(forward(ListMode::Allowlist, &["*"]).decide(IN_CHAN, OUT_CHAN));
        assert!(forward(ListMode::Passthrough, &[]).decide(IN_CHAN, OUT_CHAN));
    }
}
