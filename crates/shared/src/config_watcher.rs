//! 配置与规则热更新模块
//!
//! 提供 `ConfigWatcher` trait 和基于文件系统事件的实现，支持运行时动态更新配置和规则文件。
//!
//! ## 架构设计
//!
//! ```text
//! ConfigWatcher trait
//!  └── FileWatcher — 基于文件系统事件 + debounce，变更后调用 reload 回调
//!       ├── FileWatcher::for_config — 重新加载 AppConfig 并推送到 DynamicConfig
//!       └── FileWatcher::new        — 任意回调（如重新编译规则文件）
//! ```
//!
//! 各组件通过 `DynamicConfig` 持有 `Arc<ArcSwap<AppConfig>>`，
//! 读取几乎无开销（一次原子 load），写入通过 watcher 回调自动触发。

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use arc_swap::ArcSwap;
use async_trait::async_trait;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::config::AppConfig;

// ============================================================================
// ConfigWatcher trait
// ============================================================================

/// 变更监听器抽象
#[async_trait]
pub trait ConfigWatcher: Send + Sync {
    /// 启动监听
    async fn start(&self) -> Result<()>;

    /// 停止监听并释放资源
    async fn stop(&self) -> Result<()>;
}

// ============================================================================
// DynamicConfig — 线程安全的动态配置容器
// ============================================================================

/// 动态配置容器
///
/// 使用 `ArcSwap` 实现近零开销的读取（仅一次原子 load），
/// 配合 `watch` channel 让消费方异步等待配置变更通知。
#[derive(Clone)]
pub struct DynamicConfig {
    current: Arc<ArcSwap<AppConfig>>,
    tx: watch::Sender<Arc<AppConfig>>,
    rx: watch::Receiver<Arc<AppConfig>>,
}

impl DynamicConfig {
    /// 用初始配置创建 DynamicConfig
    pub fn new(config: AppConfig) -> Self {
        let config = Arc::new(config);
        let (tx, rx) = watch::channel(config.clone());
        Self {
            current: Arc::new(ArcSwap::from(config)),
            tx,
            rx,
        }
    }

    /// 获取当前配置快照
    pub fn load(&self) -> Arc<AppConfig> {
        self.current.load_full()
    }

    /// 获取 watch receiver，用于异步等待配置变更
    pub fn subscribe(&self) -> watch::Receiver<Arc<AppConfig>> {
        self.rx.clone()
    }

    /// 更新配置
    ///
    /// 同时更新 ArcSwap 快照和 watch channel，
    /// 保证 load() 读取和 subscribe() 通知的一致性。
    pub fn update(&self, new_config: AppConfig) {
        let new_config = Arc::new(new_config);
        self.current.store(new_config.clone());
        // send 失败说明没有 receiver，属于正常情况（关闭阶段）
        let _ = self.tx.send(new_config);
    }
}

// ============================================================================
// FileWatcher — 基于文件系统事件的热更新
// ============================================================================

/// 文件变更后执行的重新加载回调
pub type ReloadFn = Arc<dyn Fn() + Send + Sync>;

/// 基于文件系统事件的监听器
///
/// 使用 `notify` crate 监听目录（或文件）变化，
/// 写入后经 debounce 窗口去抖再调用回调。
pub struct FileWatcher {
    /// 监听器名称，仅用于日志
    name: String,
    watch_path: PathBuf,
    debounce: Duration,
    on_change: ReloadFn,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl FileWatcher {
    pub fn new(
        name: &str,
        watch_path: impl AsRef<Path>,
        debounce: Duration,
        on_change: ReloadFn,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            name: name.to_string(),
            watch_path: watch_path.as_ref().to_path_buf(),
            debounce,
            on_change,
            shutdown_tx,
            shutdown_rx,
        }
    }

    /// 监听配置目录，变更时重新加载 AppConfig 并推送到 DynamicConfig
    ///
    /// 重新加载失败时保留当前配置。
    pub fn for_config(
        service_name: &str,
        config_dir: impl AsRef<Path>,
        debounce: Duration,
        dynamic_config: DynamicConfig,
    ) -> Self {
        let config_dir = config_dir.as_ref().to_path_buf();
        let service = service_name.to_string();
        let reload_dir = config_dir.clone();

        let on_change: ReloadFn = Arc::new(move || {
            match AppConfig::load_from(&service, &reload_dir) {
                Ok(new_config) => {
                    info!(service = %service, "配置文件变更，已重新加载");
                    dynamic_config.update(new_config);
                }
                Err(e) => {
                    error!(
                        service = %service,
                        error = %e,
                        "配置文件重新加载失败，保留当前配置"
                    );
                }
            }
        });

        Self::new("config", config_dir, debounce, on_change)
    }
}

#[async_trait]
impl ConfigWatcher for FileWatcher {
    async fn start(&self) -> Result<()> {
        use notify::{EventKind, RecursiveMode, Watcher};

        let (event_tx, mut event_rx) = tokio::sync::mpsc::channel::<()>(16);

        let mut watcher =
            notify::recommended_watcher(move |res: Result<notify::Event, notify::Error>| {
                match res {
                    Ok(event) => match event.kind {
                        EventKind::Modify(_) | EventKind::Create(_) | EventKind::Remove(_) => {
                            let _ = event_tx.try_send(());
                        }
                        _ => {}
                    },
                    Err(e) => {
                        warn!(error = %e, "文件监听器事件错误");
                    }
                }
            })
            .context("创建文件监听器失败")?;

        watcher
            .watch(&self.watch_path, RecursiveMode::NonRecursive)
            .with_context(|| format!("启动文件监听失败: {}", self.watch_path.display()))?;

        info!(watcher = %self.name, path = %self.watch_path.display(), "文件监听已启动");

        let name = self.name.clone();
        let debounce = self.debounce;
        let on_change = self.on_change.clone();
        let mut shutdown_rx = self.shutdown_rx.clone();

        tokio::spawn(async move {
            // watcher 随任务存活，任务退出时停止监听
            let _watcher = watcher;
            loop {
                tokio::select! {
                    Some(()) = event_rx.recv() => {
                        tokio::time::sleep(debounce).await;
                        // 清空窗口内积压的重复事件
                        while event_rx.try_recv().is_ok() {}
                        on_change();
                    }
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            info!(watcher = %name, "文件监听已停止");
                            break;
                        }
                    }
                }
            }
        });

        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        let _ = self.shutdown_tx.send(true);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ListMode;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_dynamic_config_load_and_update() {
        let dc = DynamicConfig::new(AppConfig::default());
        assert_eq!(dc.load().channel.mode, ListMode::Denylist);

        let mut updated = AppConfig::default();
        updated.channel.mode = ListMode::Allowlist;
        dc.update(updated);
        assert_eq!(dc.load().channel.mode, ListMode::Allowlist);
    }

    #[test]
    fn test_dynamic_config_subscribe() {
        let dc = DynamicConfig::new(AppConfig::default());
        let mut rx = dc.subscribe();
        assert!(rx.borrow().rules.apply);

        let mut updated = AppConfig::default();
        updated.rules.apply = false;
        dc.update(updated);
        assert!(!rx.borrow_and_update().rules.apply);
    }

    #[tokio::test]
    async fn test_file_watcher_invokes_reload() {
        let dir = tempfile::tempdir().unwrap();
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let watcher = FileWatcher::new(
            "test",
            dir.path(),
            Duration::from_millis(20),
            Arc::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );
        watcher.start().await.unwrap();

        std::fs::write(dir.path().join("ChannelAccept.rule"), "true").unwrap();

        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while calls.load(Ordering::SeqCst) == 0 && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        watcher.stop().await.unwrap();

        assert!(calls.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test]
    async fn test_file_watcher_missing_path_fails() {
        let watcher = FileWatcher::new(
            "test",
            "/nonexistent/chanwall/rules",
            Duration::from_millis(20),
            Arc::new(|| {}),
        );
        assert!(watcher.start().await.is_err());
    }
}
