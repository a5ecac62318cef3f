//! Tempest 气象站 UDP 广播 → InfluxDB 转发服务入口。

use std::sync::Arc;
use tempest_config::RelayConfig;
use tempest_pipeline::{ServiceError, WeatherService};
use tempest_telemetry::{init_tracing, metrics};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 加载本地 .env（如存在），便于直接 cargo run 启动
    dotenvy::dotenv().ok();
    // 从环境变量加载运行配置（校验失败直接退出）
    let config = RelayConfig::from_env()?;
    // 初始化结构化日志
    init_tracing(config.debug);

    // token 不进日志
    info!(
        target: "tempest.relay",
        listen_address = %config.listen_address,
        influx_url = %config.influx_url,
        influx_org = %config.influx_org,
        influx_bucket = %config.influx_bucket,
        rapid_wind = config.rapid_wind,
        rapid_wind_bucket = %config.rapid_wind_bucket(),
        noop = config.noop,
        buffer = config.buffer,
        "starting tempest relay"
    );

    let service = WeatherService::bind(Arc::new(config)).await?;
    let cancel = CancellationToken::new();
    tokio::spawn(shutdown_on_signal(cancel.clone()));

    let result = service.run(cancel).await;
    let snapshot = metrics().snapshot();
    info!(
        target: "tempest.relay",
        packets_received = snapshot.packets_received,
        points_decoded = snapshot.points_decoded,
        write_success = snapshot.write_success,
        write_failure = snapshot.write_failure,
        decode_failures = snapshot.decode_failures,
        "tempest relay stopped"
    );

    match result {
        Ok(()) | Err(ServiceError::Cancelled) => Ok(()),
        Err(err) => Err(err.into()),
    }
}

/// 收到 Ctrl-C 或 SIGTERM 时触发取消。
async fn shutdown_on_signal(cancel: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = terminate.recv() => {}
                }
            }
            Err(err) => {
                warn!(target: "tempest.relay", error = %err, "sigterm handler unavailable");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
    info!(target: "tempest.relay", "shutdown signal received");
    cancel.cancel();
}
