//! 命令执行器

use std::path::Path;

use anyhow::{Context, Result};
use chanwall_shared::config::AppConfig;
use chanwall_shared::config_watcher::{ConfigWatcher, DynamicConfig, FileWatcher};
use chanwall_shared::observability;
use rule_engine::{RuleCompiler, RuleError, RuleStore};
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::signal;
use tracing::{info, warn};

use crate::acceptor::AdmissionService;
use crate::events::AdmissionResponse;
use crate::providers::ContextBuilder;
use crate::reload::{load_rule_files, rule_watcher};

pub const SERVICE_NAME: &str = "chanwall";

/// `check` 命令的摘要输出
#[derive(Debug, Serialize)]
struct RuleSummary<'a> {
    id: &'a str,
    version: &'a str,
    compiled_at: String,
    required_fields: Vec<&'a str>,
}

pub struct CommandRunner {
    context_builder: ContextBuilder,
}

impl CommandRunner {
    /// 信誉数据源由宿主注入，未注入时只使用请求行附带的 1ML / Amboss 数据
    pub fn new(context_builder: ContextBuilder) -> Self {
        Self { context_builder }
    }

    /// 执行 check 命令
    pub fn run_check(&self, file: &Path, json: bool) -> Result<()> {
        println!("{}", check_output(file, json)?);
        Ok(())
    }

    /// 执行 run 命令
    pub async fn run_service(&self, config_dir: &Path) -> Result<()> {
        let config = AppConfig::load_from(SERVICE_NAME, config_dir)
            .with_context(|| format!("加载配置失败: {}", config_dir.display()))?;
        let _guard = observability::init(&config.service_name, &config.observability).await?;

        info!(
            environment = %config.environment,
            channel_mode = %config.channel.mode,
            forward_mode = %config.forward.mode,
            apply_rules = config.rules.apply,
            "Starting chanwall..."
        );

        let providers = &config.providers;
        if (providers.oneml.active || providers.amboss.active) && self.context_builder.is_empty() {
            warn!("信誉数据源已启用但未注入实现，只使用请求行附带的信誉数据");
        }

        let store = RuleStore::new();
        let loaded = load_rule_files(&store, &config.rules);
        info!(loaded, rules_dir = %config.rules.dir, "规则初始化完成");

        let watch = config.rules.watch;
        let debounce = config.rules.debounce();
        let dynamic_config = DynamicConfig::new(config);

        let mut watchers: Vec<FileWatcher> = Vec::new();
        if watch {
            watchers.push(FileWatcher::for_config(
                SERVICE_NAME,
                config_dir,
                debounce,
                dynamic_config.clone(),
            ));
            watchers.push(rule_watcher(store.clone(), dynamic_config.clone()));
        }
        for watcher in &watchers {
            // 监听失败不影响服务，只是失去热更新
            if let Err(e) = watcher.start().await {
                warn!(error = %e, "文件监听启动失败");
            }
        }

        let service = AdmissionService::new(dynamic_config, store, self.context_builder.clone());
        let result = tokio::select! {
            result = serve_lines(&service, tokio::io::stdin(), tokio::io::stdout()) => result,
            _ = signal::ctrl_c() => {
                info!("收到中断信号");
                Ok(0)
            }
        };

        for watcher in &watchers {
            watcher.stop().await?;
        }
        let handled = result?;
        info!(handled, "chanwall stopped");
        Ok(())
    }
}

/// 逐行处理请求直到输入结束，返回处理的请求数
///
/// 编译规则文件，返回语法树或摘要的 JSON 文本
fn check_output(file: &Path, json: bool) -> Result<String> {
    let id = file
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("rule");

    let rule = match RuleCompiler::new().compile_file(id, file) {
        Ok(rule) => rule,
        Err(RuleError::Syntax(e)) => {
            anyhow::bail!("{}:{}:{}: {}", file.display(), e.line, e.column, e.kind);
        }
        Err(e) => return Err(e).with_context(|| format!("无法编译 {}", file.display())),
    };

    let output = if json {
        serde_json::to_string_pretty(rule.root())?
    } else {
        serde_json::to_string_pretty(&RuleSummary {
            id: rule.id(),
            version: rule.version(),
            compiled_at: rule.compiled_at().to_rfc3339(),
            required_fields: rule.required_fields().iter().map(String::as_str).collect(),
        })?
    };
    Ok(output)
}

/// 逐行处理请求直到输入结束，返回写出的响应数
///
/// 每个非空行对应一行响应，无法解析的行以 `error` 响应回复。
pub async fn serve_lines<R, W>(
    service: &AdmissionService,
    input: R,
    mut output: W,
) -> Result<usize>
where
    R: tokio::io::AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = BufReader::new(input).lines();
    let mut handled = 0;

    while let Some(line) = lines.next_line().await.context("读取请求失败")? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let response = match service.handle_line(line).await {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, code = e.code(), "无法解析请求");
                AdmissionResponse::error(e.code(), &e)
            }
        };

        let mut encoded = serde_json::to_vec(&response)?;
        encoded.push(b'\n');
        output.write_all(&encoded).await?;
        output.flush().await?;
        handled += 1;
    }

    Ok(handled)
}
