//! Prometheus 指标模块
//!
//! 基于 metrics crate 和 metrics-exporter-prometheus 实现指标收集与导出。
//! 指标通过独立的 HTTP 端口暴露，供 Prometheus 抓取。

use anyhow::Result;
use axum::{Router, routing::get};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::{error, info};

/// Metrics 资源守卫
pub struct MetricsHandle {
    _server_handle: tokio::task::JoinHandle<()>,
}

/// 初始化 Prometheus 指标导出
///
/// 启动一个独立的 HTTP 服务器在指定端口暴露 `/metrics` 端点。
pub async fn init(service_name: &str, port: u16) -> Result<MetricsHandle> {
    let handle = PrometheusBuilder::new().install_recorder()?;

    register_common_metrics(service_name);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let server_handle = start_metrics_server(addr, handle).await?;

    Ok(MetricsHandle {
        _server_handle: server_handle,
    })
}

/// 注册通用指标
fn register_common_metrics(service_name: &str) {
    metrics::describe_counter!(
        "channel_requests_total",
        "Total number of channel open requests by decision"
    );
    metrics::describe_counter!(
        "forward_requests_total",
        "Total number of HTLC forward requests by decision"
    );
    metrics::describe_counter!("rule_evaluations_total", "Total number of rule evaluations");
    metrics::describe_counter!("rule_errors_total", "Total number of failed rule evaluations");
    metrics::describe_histogram!(
        "rule_evaluation_duration_seconds",
        "Rule evaluation duration in seconds"
    );
    metrics::describe_counter!(
        "provider_failures_total",
        "Total number of reputation lookups that failed or timed out"
    );
    metrics::describe_counter!("rule_reloads_total", "Total number of rule file reloads");

    metrics::counter!("service_starts_total", "service" => service_name.to_string()).increment(1);
}

/// 启动指标 HTTP 服务器
async fn start_metrics_server(
    addr: SocketAddr,
    handle: PrometheusHandle,
) -> Result<tokio::task::JoinHandle<()>> {
    let app = Router::new()
        .route("/metrics", get(move || std::future::ready(handle.render())))
        .route("/health", get(|| async { "OK" }));

    let listener = TcpListener::bind(addr).await?;
    info!("Metrics server listening on {}", addr);

    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("Metrics server error: {}", e);
        }
    });

    Ok(server_handle)
}

// ============================================================================
// 便捷的指标记录函数
// ============================================================================

/// 记录通道开启请求决策
#[inline]
pub fn record_channel_request(accepted: bool) {
    metrics::counter!(
        "channel_requests_total",
        "decision" => decision_label(accepted)
    )
    .increment(1);
}

/// 记录 HTLC 转发请求决策
#[inline]
pub fn record_forward_request(accepted: bool) {
    metrics::counter!(
        "forward_requests_total",
        "decision" => decision_label(accepted)
    )
    .increment(1);
}

/// 记录规则评估
#[inline]
pub fn record_rule_evaluation(rule_id: &str, accepted: bool, duration_secs: f64) {
    metrics::counter!(
        "rule_evaluations_total",
        "rule" => rule_id.to_string(),
        "result" => decision_label(accepted)
    )
    .increment(1);

    metrics::histogram!(
        "rule_evaluation_duration_seconds",
        "rule" => rule_id.to_string()
    )
    .record(duration_secs);
}

/// 记录规则评估失败
#[inline]
pub fn record_rule_error(rule_id: &str, code: &'static str) {
    metrics::counter!(
        "rule_errors_total",
        "rule" => rule_id.to_string(),
        "code" => code
    )
    .increment(1);
}

/// 记录信誉数据源查询失败
#[inline]
pub fn record_provider_failure(provider: &str) {
    metrics::counter!(
        "provider_failures_total",
        "provider" => provider.to_string()
    )
    .increment(1);
}

/// 记录规则文件重新加载
#[inline]
pub fn record_rule_reload(rule_id: &str, success: bool) {
    metrics::counter!(
        "rule_reloads_total",
        "rule" => rule_id.to_string(),
        "status" => if success { "success" } else { "failure" }
    )
    .increment(1);
}

fn decision_label(accepted: bool) -> &'static str {
    if accepted { "accept" } else { "reject" }
}
