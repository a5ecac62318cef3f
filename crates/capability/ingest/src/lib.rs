//! # UDP 数据接入能力
//!
//! 监听 Tempest 气象站的 UDP 广播，每个报文交给独立的 tokio 任务处理：
//!
//! ```text
//! UdpSocket ──recv──▶ BufferPool 缓冲 ──copy──▶ Datagram
//!                                                 │ tokio::spawn
//!                                                 ▼
//!                                        DatagramHandler::handle
//! ```
//!
//! 接收循环不等待处理结果；停止信号通过 `CancellationToken` 传入。

mod buffer;
mod udp;

use async_trait::async_trait;
use domain::Datagram;

pub use buffer::BufferPool;
pub use udp::{DEFAULT_READ_TIMEOUT, UdpSource, UdpSourceConfig};

/// 采集错误。
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("invalid listen address {0}: {1}")]
    InvalidAddress(String, String),
    #[error("bind error: {0}")]
    Bind(#[source] std::io::Error),
    #[error("handler error: {0}")]
    Handler(String),
    #[error("source cancelled")]
    Cancelled,
}

/// 报文处理器（每个报文一次调用，调用方已在独立任务中执行）。
#[async_trait]
pub trait DatagramHandler: Send + Sync {
    async fn handle(&self, datagram: Datagram) -> Result<(), IngestError>;
}
