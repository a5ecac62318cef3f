//! UDP 接收循环
//!
//! ## 使用示例
//!
//! ```rust,ignore
//! let source = UdpSource::bind(UdpSourceConfig::new("0.0.0.0:50222", 10240)).await?;
//! source.run(handler, cancel).await?;
//! ```

use crate::{BufferPool, DatagramHandler, IngestError};
use domain::Datagram;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tempest_telemetry::{record_packet_received, record_receive_error};
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// 单次读取的最长等待时间，超时后重新检查停止信号。
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(1);

/// UDP 采集源配置
#[derive(Debug, Clone)]
pub struct UdpSourceConfig {
    /// 监听地址（host:port）
    pub listen_address: String,
    /// 接收缓冲大小
    pub buffer_size: usize,
    /// 读超时
    pub read_timeout: Duration,
    /// 打印每个报文内容（debug 日志）
    pub debug: bool,
    /// 以十六进制打印原始报文
    pub raw_udp: bool,
}

impl UdpSourceConfig {
    pub fn new(listen_address: impl Into<String>, buffer_size: usize) -> Self {
        Self {
            listen_address: listen_address.into(),
            buffer_size,
            read_timeout: DEFAULT_READ_TIMEOUT,
            debug: false,
            raw_udp: false,
        }
    }
}

/// UDP 采集源：独占 socket，每个报文派生一个处理任务。
pub struct UdpSource {
    config: UdpSourceConfig,
    socket: UdpSocket,
    local_addr: SocketAddr,
    pool: Arc<BufferPool>,
}

impl UdpSource {
    /// 解析地址并绑定 socket。
    pub async fn bind(config: UdpSourceConfig) -> Result<Self, IngestError> {
        let addr = tokio::net::lookup_host(config.listen_address.as_str())
            .await
            .map_err(|err| IngestError::InvalidAddress(config.listen_address.clone(), err.to_string()))?
            .next()
            .ok_or_else(|| {
                IngestError::InvalidAddress(
                    config.listen_address.clone(),
                    "no address resolved".to_string(),
                )
            })?;
        let socket = UdpSocket::bind(addr).await.map_err(IngestError::Bind)?;
        let local_addr = socket.local_addr().map_err(IngestError::Bind)?;
        let pool = Arc::new(BufferPool::new(config.buffer_size));
        info!(target: "tempest.ingest", local_addr = %local_addr, "udp_source_bound");
        Ok(Self {
            config,
            socket,
            local_addr,
            pool,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn buffer_pool(&self) -> Arc<BufferPool> {
        Arc::clone(&self.pool)
    }

    /// 运行接收循环，直到 `cancel` 触发；返回 `IngestError::Cancelled` 并释放 socket。
    ///
    /// 已派生的处理任务不会被中断。
    pub async fn run(
        self,
        handler: Arc<dyn DatagramHandler>,
        cancel: CancellationToken,
    ) -> Result<(), IngestError> {
        info!(target: "tempest.ingest", local_addr = %self.local_addr, "udp_source_started");

        loop {
            let mut buf = self.pool.get();
            let received = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                received = tokio::time::timeout(
                    self.config.read_timeout,
                    self.socket.recv_from(&mut buf),
                ) => Some(received),
            };
            let Some(received) = received else {
                self.pool.put(buf);
                info!(target: "tempest.ingest", local_addr = %self.local_addr, "udp_source_stopping");
                return Err(IngestError::Cancelled);
            };

            let (len, remote_addr) = match received {
                // 读超时属于正常情况，回到循环顶部检查停止信号
                Err(_elapsed) => {
                    self.pool.put(buf);
                    continue;
                }
                Ok(Err(err)) => {
                    self.pool.put(buf);
                    record_receive_error();
                    error!(
                        target: "tempest.ingest",
                        local_addr = %self.local_addr,
                        error = %err,
                        "udp_receive_failed"
                    );
                    continue;
                }
                Ok(Ok(received)) => received,
            };

            let payload = buf[..len].to_vec();
            self.pool.put(buf);
            record_packet_received();

            if self.config.debug {
                debug!(
                    target: "tempest.ingest",
                    remote_addr = %remote_addr,
                    bytes = len,
                    data = %String::from_utf8_lossy(&payload),
                    "udp_packet_received"
                );
            }
            if self.config.raw_udp {
                println!("{}", raw_udp_line(remote_addr, &payload));
            }

            let datagram = Datagram {
                remote_addr,
                payload,
            };
            let handler = Arc::clone(&handler);
            tokio::spawn(async move {
                if let Err(err) = handler.handle(datagram).await {
                    error!(
                        target: "tempest.ingest",
                        remote_addr = %remote_addr,
                        error = %err,
                        "datagram_dispatch_failed"
                    );
                }
            });
        }
    }
}

/// RAW_UDP 模式下的输出行：`RAW UDP: <n> bytes from <addr>: <hex>`。
pub(crate) fn raw_udp_line(remote_addr: SocketAddr, payload: &[u8]) -> String {
    format!(
        "RAW UDP: {} bytes from {}: {}",
        payload.len(),
        remote_addr,
        hex::encode(payload)
    )
}
