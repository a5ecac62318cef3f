use crate::dispatcher::PacketDispatcher;
use crate::writer::{DeliveryError, HttpPointWriter, NoopWriter, PointWriter};
use std::net::SocketAddr;
use std::sync::Arc;
use tempest_config::RelayConfig;
use tempest_ingest::{IngestError, UdpSource, UdpSourceConfig};
use tempest_normalize::ReportDecoder;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// 服务错误。
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("ingest error: {0}")]
    Ingest(#[from] IngestError),
    #[error("delivery setup error: {0}")]
    Delivery(#[from] DeliveryError),
    #[error("service cancelled")]
    Cancelled,
}

/// 气象数据转发服务：UDP 接收循环 + 报文分发器。
pub struct WeatherService {
    source: UdpSource,
    dispatcher: Arc<PacketDispatcher>,
}

impl WeatherService {
    /// 绑定 UDP socket 并准备写入器。
    ///
    /// noop 模式下不创建 HTTP 客户端。
    pub async fn bind(config: Arc<RelayConfig>) -> Result<Self, ServiceError> {
        let writer: Arc<dyn PointWriter> = if config.noop {
            info!(target: "tempest.pipeline", "delivery: noop");
            Arc::new(NoopWriter)
        } else {
            let writer = HttpPointWriter::new(&config)?;
            info!(target: "tempest.pipeline", endpoint = %writer.endpoint(), "delivery: influxdb");
            Arc::new(writer)
        };
        let dispatcher = PacketDispatcher::new(
            ReportDecoder::new(&config),
            writer,
            config.verbose,
        );

        let mut source_config = UdpSourceConfig::new(config.bind_address(), config.buffer);
        source_config.debug = config.debug;
        source_config.raw_udp = config.raw_udp;
        let source = UdpSource::bind(source_config).await?;

        Ok(Self {
            source,
            dispatcher: Arc::new(dispatcher),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.source.local_addr()
    }

    /// 运行直到 `cancel` 触发，返回 `ServiceError::Cancelled`。
    pub async fn run(self, cancel: CancellationToken) -> Result<(), ServiceError> {
        info!(target: "tempest.pipeline", local_addr = %self.local_addr(), "weather service started");
        match self.source.run(self.dispatcher, cancel).await {
            Err(IngestError::Cancelled) => {
                info!(target: "tempest.pipeline", "weather service shutting down");
                Err(ServiceError::Cancelled)
            }
            Err(err) => Err(err.into()),
            Ok(()) => Ok(()),
        }
    }
}
