use async_trait::async_trait;
use domain::DataPoint;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Url};
use tempest_config::{
    DEFAULT_TIMEOUT, HTTP_CONNECT_TIMEOUT, HTTP_IDLE_CONN_TIMEOUT, HTTP_MAX_CONNS_PER_HOST,
    HTTP_MAX_IDLE_CONNS, HTTP_TCP_KEEPALIVE, RelayConfig,
};
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::info;

/// 写入结果。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteResult {
    pub bucket: String,
    pub written: bool,
    pub status: Option<u16>,
    pub reason: Option<String>,
}

/// 写入错误（不重试，由调用方记录日志后丢弃）。
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("invalid endpoint {0}: {1}")]
    Endpoint(String, String),
    #[error("client error: {0}")]
    Client(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("influxdb returned {status}: {body}")]
    Rejected { status: u16, body: String },
}

/// 数据点写入器抽象。
#[async_trait]
pub trait PointWriter: Send + Sync {
    async fn write(&self, point: &DataPoint) -> Result<WriteResult, DeliveryError>;
}

/// 空写入器（noop 模式：只记录日志，不发起 HTTP 请求）。
#[derive(Debug, Default)]
pub struct NoopWriter;

#[async_trait]
impl PointWriter for NoopWriter {
    async fn write(&self, point: &DataPoint) -> Result<WriteResult, DeliveryError> {
        info!(
            target: "tempest.pipeline",
            bucket = %point.bucket,
            timestamp = point.timestamp,
            "noop mode - not posting to influxdb"
        );
        Ok(WriteResult {
            bucket: point.bucket.clone(),
            written: false,
            status: None,
            reason: Some("noop".to_string()),
        })
    }
}

/// InfluxDB v2 HTTP 写入器。
///
/// `reqwest::Client` 内部持有连接池，clone 后在所有处理任务间共享；
/// 同时在途的请求数由信号量限制为 `HTTP_MAX_CONNS_PER_HOST`。
/// 单次写入（含排队等待许可）总耗时不超过 `request_timeout`。
pub struct HttpPointWriter {
    client: Client,
    endpoint: Url,
    authorization: String,
    in_flight: Semaphore,
    request_timeout: Duration,
}

impl HttpPointWriter {
    /// 构建客户端，并预先计算带 `org`、`precision` 参数的写入地址。
    pub fn new(config: &RelayConfig) -> Result<Self, DeliveryError> {
        Self::with_timeout(config, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(
        config: &RelayConfig,
        request_timeout: Duration,
    ) -> Result<Self, DeliveryError> {
        let write_url = config.write_url();
        let mut endpoint = Url::parse(&write_url)
            .map_err(|err| DeliveryError::Endpoint(write_url.clone(), err.to_string()))?;
        endpoint
            .query_pairs_mut()
            .append_pair("org", &config.influx_org)
            .append_pair("precision", "s");

        let client = Client::builder()
            .pool_max_idle_per_host(HTTP_MAX_IDLE_CONNS)
            .pool_idle_timeout(HTTP_IDLE_CONN_TIMEOUT)
            .connect_timeout(HTTP_CONNECT_TIMEOUT)
            .tcp_keepalive(HTTP_TCP_KEEPALIVE)
            .timeout(request_timeout)
            .build()
            .map_err(|err| DeliveryError::Client(err.to_string()))?;

        Ok(Self {
            client,
            endpoint,
            authorization: format!("Token {}", config.influx_token),
            in_flight: Semaphore::new(HTTP_MAX_CONNS_PER_HOST),
            request_timeout,
        })
    }

    /// 基础写入地址（不含 bucket）。
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// 目标 bucket 的写入地址；已有的 bucket 参数会被替换。
    pub fn endpoint_for(&self, bucket: &str) -> Url {
        let mut url = self.endpoint.clone();
        if bucket.is_empty() {
            return url;
        }
        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(key, _)| key != "bucket")
            .map(|(key, value)| (key.into_owned(), value.into_owned()))
            .collect();
        url.query_pairs_mut()
            .clear()
            .extend_pairs(pairs)
            .append_pair("bucket", bucket);
        url
    }
}

#[async_trait]
impl PointWriter for HttpPointWriter {
    async fn write(&self, point: &DataPoint) -> Result<WriteResult, DeliveryError> {
        let url = self.endpoint_for(&point.bucket);
        let request = async {
            let _permit = self
                .in_flight
                .acquire()
                .await
                .map_err(|err| DeliveryError::Client(err.to_string()))?;

            let response = self
                .client
                .post(url)
                .header(AUTHORIZATION, &self.authorization)
                .header(CONTENT_TYPE, "text/plain; charset=utf-8")
                .header(ACCEPT, "application/json")
                .body(point.marshal())
                .send()
                .await
                .map_err(|err| DeliveryError::Transport(err.to_string()))?;

            let status = response.status().as_u16();
            if status >= 400 {
                let body = response.text().await.unwrap_or_default();
                return Err(DeliveryError::Rejected { status, body });
            }
            Ok(status)
        };

        // 排队等待许可也计入超时
        let status = tokio::time::timeout(self.request_timeout, request)
            .await
            .map_err(|_| {
                DeliveryError::Transport(format!(
                    "request timed out after {}ms",
                    self.request_timeout.as_millis()
                ))
            })??;
        Ok(WriteResult {
            bucket: point.bucket.clone(),
            written: true,
            status: Some(status),
            reason: None,
        })
    }
}
