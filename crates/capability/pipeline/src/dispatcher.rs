use crate::writer::{PointWriter, WriteResult};
use async_trait::async_trait;
use domain::Datagram;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tempest_ingest::{DatagramHandler, IngestError};
use tempest_normalize::ReportDecoder;
use tempest_telemetry::{
    new_dispatch_id, record_decode_failure, record_dispatch_panic, record_point_decoded,
    record_report_ignored, record_write_failure, record_write_latency_ms, record_write_skipped,
    record_write_success,
};
use tracing::{Instrument, debug, error, info, trace, warn};

/// 单个报文的处理结果。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// 报文类型不转发，或时间戳为 0 / 无 field
    Ignored,
    DecodeFailed,
    Written(WriteResult),
    DeliveryFailed,
}

/// 报文分发器：解码 → 写入，每个报文一个独立的处理单元。
pub struct PacketDispatcher {
    decoder: ReportDecoder,
    writer: Arc<dyn PointWriter>,
    verbose: bool,
}

impl PacketDispatcher {
    pub fn new(decoder: ReportDecoder, writer: Arc<dyn PointWriter>, verbose: bool) -> Self {
        Self {
            decoder,
            writer,
            verbose,
        }
    }

    /// 处理一个报文；错误只记录日志，不向上传播。
    pub async fn process(&self, datagram: Datagram) -> DispatchOutcome {
        let remote_addr = datagram.remote_addr;
        let point = match self.decoder.decode(&datagram.payload, remote_addr) {
            Ok(Some(point)) => point,
            Ok(None) => {
                record_report_ignored();
                trace!(target: "tempest.pipeline", "report_ignored");
                return DispatchOutcome::Ignored;
            }
            Err(err) => {
                record_decode_failure();
                warn!(
                    target: "tempest.pipeline",
                    bytes = datagram.payload.len(),
                    error = %err,
                    "decode_failed"
                );
                return DispatchOutcome::DecodeFailed;
            }
        };

        if !point.is_deliverable() {
            record_report_ignored();
            trace!(target: "tempest.pipeline", timestamp = point.timestamp, "point_not_deliverable");
            return DispatchOutcome::Ignored;
        }
        record_point_decoded();

        debug!(
            target: "tempest.pipeline",
            measurement = %point.name,
            timestamp = point.timestamp,
            bucket = %point.bucket,
            "processing_point"
        );
        if self.verbose {
            info!(target: "tempest.pipeline", data = %point.marshal(), bucket = %point.bucket, "posting_point");
        }

        let started_at = Instant::now();
        match self.writer.write(&point).await {
            Ok(result) => {
                if result.written {
                    record_write_success();
                    record_write_latency_ms(started_at.elapsed().as_millis() as u64);
                    if self.verbose {
                        info!(
                            target: "tempest.pipeline",
                            bucket = %result.bucket,
                            status = ?result.status,
                            "point_delivered"
                        );
                    }
                } else {
                    record_write_skipped();
                }
                DispatchOutcome::Written(result)
            }
            Err(err) => {
                record_write_failure();
                error!(
                    target: "tempest.pipeline",
                    bucket = %point.bucket,
                    timestamp = point.timestamp,
                    error = %err,
                    "point_delivery_failed"
                );
                DispatchOutcome::DeliveryFailed
            }
        }
    }
}

#[async_trait]
impl DatagramHandler for PacketDispatcher {
    /// 在处理单元边界捕获 panic，转换为错误返回给接收循环记录。
    async fn handle(&self, datagram: Datagram) -> Result<(), IngestError> {
        let span = tracing::info_span!(
            "dispatch",
            dispatch_id = %new_dispatch_id(),
            remote_addr = %datagram.remote_addr,
        );
        let outcome = AssertUnwindSafe(self.process(datagram))
            .catch_unwind()
            .instrument(span)
            .await;
        match outcome {
            Ok(_) => Ok(()),
            Err(panic) => {
                record_dispatch_panic();
                Err(IngestError::Handler(format!(
                    "dispatch panicked: {}",
                    panic_message(panic.as_ref())
                )))
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
