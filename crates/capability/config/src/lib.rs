//! 转发服务运行配置加载与校验。

use std::env;
use std::fmt;
use std::time::Duration;

pub const DEFAULT_LISTEN_ADDRESS: &str = ":50222";
pub const DEFAULT_INFLUX_URL: &str = "https://localhost:8086";
pub const DEFAULT_INFLUX_API_PATH: &str = "/api/v2/write";
pub const DEFAULT_BUFFER: usize = 10240;

/// 单次 HTTP 写入超时。
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

// HTTP 连接池参数
pub const HTTP_MAX_IDLE_CONNS: usize = 100;
pub const HTTP_MAX_CONNS_PER_HOST: usize = 10;
pub const HTTP_IDLE_CONN_TIMEOUT: Duration = Duration::from_secs(90);
pub const HTTP_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
pub const HTTP_TCP_KEEPALIVE: Duration = Duration::from_secs(30);

/// 配置加载错误。
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {0}: {1}")]
    Invalid(String, String),
    #[error("configuration validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),
}

/// 转发服务运行配置。
#[derive(Clone)]
pub struct RelayConfig {
    pub listen_address: String,
    pub influx_url: String,
    pub influx_api_path: String,
    pub influx_org: String,
    pub influx_token: String,
    pub influx_bucket: String,
    /// rapid_wind 报文的独立 bucket（未配置时沿用 `influx_bucket`）。
    pub influx_bucket_rapid_wind: Option<String>,
    /// UDP 接收缓冲大小（字节）。
    pub buffer: usize,
    pub verbose: bool,
    pub debug: bool,
    /// 以十六进制打印每个原始 UDP 报文。
    pub raw_udp: bool,
    /// 只解码不写入 InfluxDB。
    pub noop: bool,
    /// 转发 rapid_wind 报文。
    pub rapid_wind: bool,
}

impl RelayConfig {
    /// 以默认值构造配置（必填项由调用方给出）。
    pub fn new(
        influx_url: impl Into<String>,
        influx_org: impl Into<String>,
        influx_token: impl Into<String>,
        influx_bucket: impl Into<String>,
    ) -> Self {
        Self {
            listen_address: DEFAULT_LISTEN_ADDRESS.to_string(),
            influx_url: influx_url.into(),
            influx_api_path: DEFAULT_INFLUX_API_PATH.to_string(),
            influx_org: influx_org.into(),
            influx_token: influx_token.into(),
            influx_bucket: influx_bucket.into(),
            influx_bucket_rapid_wind: None,
            buffer: DEFAULT_BUFFER,
            verbose: false,
            debug: false,
            raw_udp: false,
            noop: false,
            rapid_wind: false,
        }
    }

    /// 从环境变量读取配置并校验。
    pub fn from_env() -> Result<Self, ConfigError> {
        let listen_address = env::var("LISTEN_ADDRESS")
            .ok()
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DEFAULT_LISTEN_ADDRESS.to_string());
        let influx_url = read_optional("INFLUX_URL").unwrap_or_else(|| DEFAULT_INFLUX_URL.to_string());
        let influx_api_path =
            read_optional("INFLUX_API_PATH").unwrap_or_else(|| DEFAULT_INFLUX_API_PATH.to_string());
        let influx_org = read_optional("INFLUX_ORG").unwrap_or_default();
        let influx_token = read_optional("INFLUX_TOKEN").unwrap_or_default();
        let influx_bucket = read_optional("INFLUX_BUCKET").unwrap_or_default();
        let influx_bucket_rapid_wind = read_optional("INFLUX_BUCKET_RAPID_WIND");
        let buffer = read_usize_with_default("BUFFER", DEFAULT_BUFFER)?;
        let debug = read_bool_with_default("DEBUG", false);
        // debug 隐含 verbose
        let verbose = debug || read_bool_with_default("VERBOSE", false);
        let raw_udp = read_bool_with_default("RAW_UDP", false);
        let noop = read_bool_with_default("NOOP", false);
        let rapid_wind = read_bool_with_default("RAPID_WIND", false);

        let config = Self {
            listen_address,
            influx_url,
            influx_api_path,
            influx_org,
            influx_token,
            influx_bucket,
            influx_bucket_rapid_wind,
            buffer,
            verbose,
            debug,
            raw_udp,
            noop,
            rapid_wind,
        };
        config.validate()?;
        Ok(config)
    }

    /// 校验配置，汇总所有问题后一次性返回。
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut problems = Vec::new();

        if self.influx_url.is_empty() {
            problems.push("INFLUX_URL is required".to_string());
        } else if !is_http_url(&self.influx_url) {
            problems.push(format!(
                "INFLUX_URL is not a valid URL: {}",
                self.influx_url
            ));
        }
        if self.influx_org.is_empty() {
            problems.push("INFLUX_ORG is required".to_string());
        }
        if self.influx_token.is_empty() {
            problems.push("INFLUX_TOKEN is required".to_string());
        }
        if self.influx_bucket.is_empty() {
            problems.push("INFLUX_BUCKET is required".to_string());
        }
        if !self.listen_address.is_empty() && !self.listen_address.contains(':') {
            problems.push("LISTEN_ADDRESS must include port (e.g., ':50222')".to_string());
        }
        if self.buffer == 0 {
            problems.push("Buffer size must be greater than 0".to_string());
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(problems))
        }
    }

    /// 可直接绑定的监听地址：`:50222` 视为所有网卡。
    pub fn bind_address(&self) -> String {
        if self.listen_address.starts_with(':') {
            format!("0.0.0.0{}", self.listen_address)
        } else {
            self.listen_address.clone()
        }
    }

    /// 写入 InfluxDB 的完整地址（不含查询参数）。
    pub fn write_url(&self) -> String {
        format!(
            "{}{}",
            self.influx_url.trim_end_matches('/'),
            self.influx_api_path
        )
    }

    /// 指定报文类型对应的目标 bucket。
    pub fn rapid_wind_bucket(&self) -> &str {
        self.influx_bucket_rapid_wind
            .as_deref()
            .filter(|bucket| !bucket.is_empty())
            .unwrap_or(&self.influx_bucket)
    }
}

impl fmt::Debug for RelayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelayConfig")
            .field("listen_address", &self.listen_address)
            .field("influx_url", &self.influx_url)
            .field("influx_api_path", &self.influx_api_path)
            .field("influx_org", &self.influx_org)
            .field("influx_token", &"<redacted>")
            .field("influx_bucket", &self.influx_bucket)
            .field("influx_bucket_rapid_wind", &self.influx_bucket_rapid_wind)
            .field("buffer", &self.buffer)
            .field("verbose", &self.verbose)
            .field("debug", &self.debug)
            .field("raw_udp", &self.raw_udp)
            .field("noop", &self.noop)
            .field("rapid_wind", &self.rapid_wind)
            .finish()
    }
}

fn is_http_url(value: &str) -> bool {
    match url::Url::parse(value) {
        Ok(url) => matches!(url.scheme(), "http" | "https") && url.has_host(),
        Err(_) => false,
    }
}

fn read_optional(key: &str) -> Option<String> {
    match env::var(key) {
        Ok(value) if !value.is_empty() => Some(value),
        _ => None,
    }
}

fn read_usize_with_default(key: &str, default: usize) -> Result<usize, ConfigError> {
    let value = match env::var(key) {
        Ok(value) if !value.is_empty() => value,
        _ => return Ok(default),
    };
    value
        .parse::<usize>()
        .map_err(|_| ConfigError::Invalid(key.to_string(), value))
}

fn read_bool_with_default(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(value) => parse_bool(&value),
        Err(_) => default,
    }
}

/// 与 strconv.ParseBool 一致的真值写法；其余一律为 false。
fn parse_bool(value: &str) -> bool {
    matches!(value, "1" | "t" | "T" | "true" | "TRUE" | "True")
}
