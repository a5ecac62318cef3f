//! # 数据流水线能力
//!
//! 将接入、解码、写入串成完整链路：
//!
//! ```text
//! UdpSource ──Datagram──▶ PacketDispatcher ──▶ ReportDecoder
//!                                │                   │ DataPoint
//!                                ▼                   ▼
//!                           PointWriter ◀────── line protocol
//!                     (HttpPointWriter / NoopWriter)
//! ```

mod dispatcher;
mod service;
mod writer;

pub use dispatcher::{DispatchOutcome, PacketDispatcher};
pub use service::{ServiceError, WeatherService};
pub use writer::{DeliveryError, HttpPointWriter, NoopWriter, PointWriter, WriteResult};
