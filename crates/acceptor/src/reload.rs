//! 规则文件加载与热更新

use std::sync::Arc;

use chanwall_shared::config::RulesConfig;
use chanwall_shared::config_watcher::{DynamicConfig, FileWatcher, ReloadFn};
use rule_engine::RuleStore;
use tracing::{info, warn};

use crate::events::EventKind;

/// 编译两个规则文件并装入存储，返回成功加载的数量
///
/// 单个文件编译失败时保留存储中的旧版本；从未加载过的规则在评估时会被拒绝。
pub fn load_rule_files(store: &RuleStore, rules: &RulesConfig) -> usize {
    let files = [
        (EventKind::ChannelAccept, rules.channel_accept_path()),
        (EventKind::HtlcForward, rules.htlc_forward_path()),
    ];

    let mut loaded = 0;
    for (kind, path) in files {
        match store.load_file(kind.rule_id(), &path) {
            Ok(rule) => {
                info!(
                    rule_id = rule.id(),
                    version = rule.version(),
                    file = %path.display(),
                    "规则已加载"
                );
                loaded += 1;
            }
            Err(e) => {
                let kept = store.contains(kind.rule_id());
                warn!(
                    rule_id = kind.rule_id(),
                    file = %path.display(),
                    error = %e,
                    kept_previous = kept,
                    "规则加载失败"
                );
            }
        }
    }
    loaded
}

/// 监听规则目录，变更时按当前配置重新编译规则文件
pub fn rule_watcher(store: RuleStore, config: DynamicConfig) -> FileWatcher {
    let rules = config.load().rules.clone();

    let on_change: ReloadFn = Arc::new(move || {
        let rules = config.load().rules.clone();
        let loaded = load_rule_files(&store, &rules);
        info!(loaded, "规则目录变更，已重新加载");
    });

    FileWatcher::new("rules", &rules.dir, rules.debounce(), on_change)
}
