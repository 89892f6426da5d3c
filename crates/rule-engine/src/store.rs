//! 规则存储管理
//!
//! 使用 DashMap 提供线程安全的规则缓存。规则以 `Arc` 快照形式提供，
//! 重新加载只替换映射中的条目，不影响正在进行的评估。

use crate::compiler::{CompiledRule, RuleCompiler};
use crate::error::{Result, RuleError};
use chanwall_shared::observability::metrics;
use dashmap::DashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

/// 规则存储
#[derive(Clone)]
pub struct RuleStore {
    /// 编译后的规则缓存
    rules: Arc<DashMap<String, Arc<CompiledRule>>>,
    /// 规则编译器
    compiler: Arc<parking_lot::Mutex<RuleCompiler>>,
}

impl RuleStore {
    /// 创建新的规则存储
    pub fn new() -> Self {
        Self {
            rules: Arc::new(DashMap::new()),
            compiler: Arc::new(parking_lot::Mutex::new(RuleCompiler::new())),
        }
    }

    /// 获取当前存储的规则数量
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// 检查存储是否为空
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// 编译并加载规则文本
    ///
    /// 编译失败时返回错误，已加载的旧版本保持不变。
    #[instrument(skip(self, source))]
    pub fn load(&self, rule_id: &str, source: &str) -> Result<Arc<CompiledRule>> {
        let compiled = {
            let mut compiler = self.compiler.lock();
            compiler.compile(rule_id, source)
        };
        self.install(rule_id, compiled)
    }

    /// 从文件编译并加载规则
    #[instrument(skip(self, path), fields(file = %path.as_ref().display()))]
    pub fn load_file(&self, rule_id: &str, path: impl AsRef<Path>) -> Result<Arc<CompiledRule>> {
        let compiled = {
            let mut compiler = self.compiler.lock();
            compiler.compile_file(rule_id, path.as_ref())
        };
        self.install(rule_id, compiled)
    }

    fn install(
        &self,
        rule_id: &str,
        compiled: Result<CompiledRule>,
    ) -> Result<Arc<CompiledRule>> {
        match compiled {
            Ok(rule) => {
                let rule = Arc::new(rule);
                self.rules.insert(rule_id.to_string(), rule.clone());
                metrics::record_rule_reload(rule_id, true);
                info!(
                    rule_id = %rule_id,
                    version = %rule.version(),
                    fields = rule.required_fields().len(),
                    "规则已加载"
                );
                Ok(rule)
            }
            Err(e) => {
                metrics::record_rule_reload(rule_id, false);
                error!(
                    rule_id = %rule_id,
                    error = %e,
                    kept_previous = self.rules.contains_key(rule_id),
                    "规则加载失败"
                );
                Err(e)
            }
        }
    }

    /// 删除规则
    #[instrument(skip(self))]
    pub fn delete(&self, rule_id: &str) -> Result<()> {
        if self.rules.remove(rule_id).is_some() {
            info!("规则已删除: {}", rule_id);
            Ok(())
        } else {
            warn!("删除不存在的规则: {}", rule_id);
            Err(RuleError::RuleNotFound(rule_id.to_string()))
        }
    }

    /// 获取规则快照
    pub fn get(&self, rule_id: &str) -> Option<Arc<CompiledRule>> {
        self.rules.get(rule_id).map(|r| r.value().clone())
    }

    /// 获取规则快照，不存在时返回 `RuleNotFound`
    pub fn require(&self, rule_id: &str) -> Result<Arc<CompiledRule>> {
        self.get(rule_id)
            .ok_or_else(|| RuleError::RuleNotFound(rule_id.to_string()))
    }

    /// 检查规则是否存在
    pub fn contains(&self, rule_id: &str) -> bool {
        self.rules.contains_key(rule_id)
    }

    /// 获取所有规则 ID（已排序）
    pub fn list_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.rules.iter().map(|r| r.key().clone()).collect();
        ids.sort();
        ids
    }

    /// 获取所有规则
    pub fn list_all(&self) -> Vec<Arc<CompiledRule>> {
        self.rules.iter().map(|r| r.value().clone()).collect()
    }

    /// 清空所有规则
    #[instrument(skip(self))]
    pub fn clear(&self) {
        let count = self.rules.len();
        self.rules.clear();
        info!("已清空 {} 条规则", count);
    }

    /// 获取规则统计信息
    pub fn stats(&self) -> RuleStoreStats {
        let rules_count = self.rules.len();
        let total_fields: usize = self
            .rules
            .iter()
            .map(|r| r.required_fields().len())
            .sum();

        RuleStoreStats {
            rules_count,
            total_fields,
            avg_fields_per_rule: if rules_count > 0 {
                total_fields as f64 / rules_count as f64
            } else {
                0.0
            },
        }
    }
}

impl Default for RuleStore {
    fn default() -> Self {
        Self::new()
    }
}

/// 规则存储统计信息
#[derive(Debug, Clone)]
pub struct RuleStoreStats {
    /// 规则总数
    pub rules_count: usize,
    /// 所有规则使用的字段总数
    pub total_fields: usize,
    /// 平均每条规则使用的字段数
    pub avg_fields_per_rule: f64,
}
