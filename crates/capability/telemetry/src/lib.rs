//! 日志初始化、dispatch ID 生成与基础指标。

use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing_subscriber::{EnvFilter, fmt};

/// 基础指标快照。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub packets_received: u64,
    pub receive_errors: u64,
    pub decode_failures: u64,
    pub reports_ignored: u64,
    pub points_decoded: u64,
    pub write_success: u64,
    pub write_failure: u64,
    pub write_skipped: u64,
    pub dispatch_panics: u64,
    pub write_latency_ms_total: u64,
    pub write_latency_ms_count: u64,
}

/// 基础指标（进程级计数器）。
pub struct TelemetryMetrics {
    packets_received: AtomicU64,
    receive_errors: AtomicU64,
    decode_failures: AtomicU64,
    reports_ignored: AtomicU64,
    points_decoded: AtomicU64,
    write_success: AtomicU64,
    write_failure: AtomicU64,
    write_skipped: AtomicU64,
    dispatch_panics: AtomicU64,
    write_latency_ms_total: AtomicU64,
    write_latency_ms_count: AtomicU64,
}

impl TelemetryMetrics {
    pub fn new() -> Self {
        Self {
            packets_received: AtomicU64::new(0),
            receive_errors: AtomicU64::new(0),
            decode_failures: AtomicU64::new(0),
            reports_ignored: AtomicU64::new(0),
            points_decoded: AtomicU64::new(0),
            write_success: AtomicU64::new(0),
            write_failure: AtomicU64::new(0),
            write_skipped: AtomicU64::new(0),
            dispatch_panics: AtomicU64::new(0),
            write_latency_ms_total: AtomicU64::new(0),
            write_latency_ms_count: AtomicU64::new(0),
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            packets_received: self.packets_received.load(Ordering::Relaxed),
            receive_errors: self.receive_errors.load(Ordering::Relaxed),
            decode_failures: self.decode_failures.load(Ordering::Relaxed),
            reports_ignored: self.reports_ignored.load(Ordering::Relaxed),
            points_decoded: self.points_decoded.load(Ordering::Relaxed),
            write_success: self.write_success.load(Ordering::Relaxed),
            write_failure: self.write_failure.load(Ordering::Relaxed),
            write_skipped: self.write_skipped.load(Ordering::Relaxed),
            dispatch_panics: self.dispatch_panics.load(Ordering::Relaxed),
            write_latency_ms_total: self.write_latency_ms_total.load(Ordering::Relaxed),
            write_latency_ms_count: self.write_latency_ms_count.load(Ordering::Relaxed),
        }
    }
}

impl Default for TelemetryMetrics {
    fn default() -> Self {
        Self::new()
    }
}

static METRICS: OnceLock<TelemetryMetrics> = OnceLock::new();

/// 获取全局指标实例。
pub fn metrics() -> &'static TelemetryMetrics {
    METRICS.get_or_init(TelemetryMetrics::new)
}

/// 初始化 tracing（RUST_LOG 优先，否则 debug 模式为 debug，其余为 info）。
pub fn init_tracing(debug: bool) {
    let default_level = if debug { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = fmt().with_env_filter(filter).try_init();
}

/// 为单个报文的处理单元生成 ID。
pub fn new_dispatch_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// 记录 UDP 报文接收次数。
pub fn record_packet_received() {
    metrics().packets_received.fetch_add(1, Ordering::Relaxed);
}

/// 记录 UDP 读取错误次数（不含读超时）。
pub fn record_receive_error() {
    metrics().receive_errors.fetch_add(1, Ordering::Relaxed);
}

/// 记录解码失败次数。
pub fn record_decode_failure() {
    metrics().decode_failures.fetch_add(1, Ordering::Relaxed);
}

/// 记录被忽略的报文次数（hub_status 等）。
pub fn record_report_ignored() {
    metrics().reports_ignored.fetch_add(1, Ordering::Relaxed);
}

/// 记录解码出的数据点次数。
pub fn record_point_decoded() {
    metrics().points_decoded.fetch_add(1, Ordering::Relaxed);
}

/// 记录写入成功次数。
pub fn record_write_success() {
    metrics().write_success.fetch_add(1, Ordering::Relaxed);
}

/// 记录写入失败次数（传输错误或 4xx/5xx）。
pub fn record_write_failure() {
    metrics().write_failure.fetch_add(1, Ordering::Relaxed);
}

/// 记录 noop 模式跳过写入次数。
pub fn record_write_skipped() {
    metrics().write_skipped.fetch_add(1, Ordering::Relaxed);
}

/// 记录处理单元 panic 次数。
pub fn record_dispatch_panic() {
    metrics().dispatch_panics.fetch_add(1, Ordering::Relaxed);
}

/// 记录写入延迟（毫秒）。
pub fn record_write_latency_ms(latency_ms: u64) {
    let metrics = metrics();
    metrics
        .write_latency_ms_total
        .fetch_add(latency_ms, Ordering::Relaxed);
    metrics
        .write_latency_ms_count
        .fetch_add(1, Ordering::Relaxed);
}
