use axum::extract::Query;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::Router;
use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempest_config::RelayConfig;
use tempest_pipeline::{ServiceError, WeatherService};
use tokio::net::UdpSocket;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
struct CapturedWrite {
    query: HashMap<String, String>,
    authorization: String,
    content_type: String,
    accept: String,
    body: String,
}

type Captured = Arc<Mutex<Vec<CapturedWrite>>>;

fn obs_st(timestamp: i64) -> String {
    format!(
        r#"{{"serial_number":"ST-00001234","type":"obs_st","hub_sn":"HB-1","obs":[[{timestamp},0.5,1.2,2.0,180,3,1013.2,22.5,55.0,1000,3.1,200,0.0,0,0,0,12.6,1]],"firmware_revision":129}}"#
    )
}

/// 模拟 InfluxDB 写入接口，记录收到的请求并返回固定状态码。
async fn spawn_influx(status: StatusCode) -> (SocketAddr, Captured) {
    let captured: Captured = Arc::new(Mutex::new(Vec::new()));
    let state = Arc::clone(&captured);
    let app = Router::new().route(
        "/api/v2/write",
        post(
            move |Query(query): Query<HashMap<String, String>>, headers: HeaderMap, body: String| {
                let state = Arc::clone(&state);
                async move {
                    let header = |name: &str| {
                        headers
                            .get(name)
                            .and_then(|value| value.to_str().ok())
                            .unwrap_or_default()
                            .to_string()
                    };
                    state.lock().await.push(CapturedWrite {
                        query,
                        authorization: header("authorization"),
                        content_type: header("content-type"),
                        accept: header("accept"),
                        body,
                    });
                    status
                }
            },
        ),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("influx listener");
    let addr = listener.local_addr().expect("influx addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (addr, captured)
}

fn relay_config(influx: SocketAddr) -> RelayConfig {
    let mut config = RelayConfig::new(format!("http://{influx}"), "home", "token-1", "tempest");
    config.listen_address = "127.0.0.1:0".to_string();
    config.buffer = 4096;
    config
}

async fn wait_for_writes(captured: &Captured, expected: usize) -> Vec<CapturedWrite> {
    let deadline = Instant::now() + Duration::from_secs(3);
    loop {
        let writes = captured.lock().await.clone();
        if writes.len() >= expected || Instant::now() >= deadline {
            return writes;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
}

#[tokio::test]
async fn observation_is_posted_to_influx() {
    let (influx, captured) = spawn_influx(StatusCode::NO_CONTENT).await;
    let service = WeatherService::bind(Arc::new(relay_config(influx)))
        .await
        .expect("bind");
    let addr = service.local_addr();
    let cancel = CancellationToken::new();
    let task = tokio::spawn(service.run(cancel.clone()));

    let client = UdpSocket::bind("127.0.0.1:0").await.expect("client");
    client
        .send_to(obs_st(1_500_000_000).as_bytes(), addr)
        .await
        .expect("send");

    let writes = wait_for_writes(&captured, 1).await;
    assert_eq!(writes.len(), 1);
    let write = &writes[0];
    assert_eq!(write.query.get("org").map(String::as_str), Some("home"));
    assert_eq!(write.query.get("precision").map(String::as_str), Some("s"));
    assert_eq!(write.query.get("bucket").map(String::as_str), Some("tempest"));
    assert_eq!(write.authorization, "Token token-1");
    assert_eq!(write.content_type, "text/plain; charset=utf-8");
    assert_eq!(write.accept, "application/json");
    assert!(write.body.starts_with("weather,station=ST-00001234 battery=12.60,dew_point=13.01,"));
    assert!(write.body.contains("wind_avg=1.20,wind_direction=180,"));
    assert!(write.body.ends_with(" 1500000000"));

    cancel.cancel();
    let result = task.await.expect("join");
    assert!(matches!(result, Err(ServiceError::Cancelled)));
}

#[tokio::test]
async fn rapid_wind_uses_dedicated_bucket() {
    let (influx, captured) = spawn_influx(StatusCode::NO_CONTENT).await;
    let mut config = relay_config(influx);
    config.rapid_wind = true;
    config.influx_bucket_rapid_wind = Some("tempest-wind".to_string());
    let service = WeatherService::bind(Arc::new(config)).await.expect("bind");
    let addr = service.local_addr();
    let cancel = CancellationToken::new();
    let task = tokio::spawn(service.run(cancel.clone()));

    let client = UdpSocket::bind("127.0.0.1:0").await.expect("client");
    client
        .send_to(
            br#"{"serial_number":"ST-1","type":"rapid_wind","hub_sn":"HB-1","ob":[1500000000,2.3,128]}"#,
            addr,
        )
        .await
        .expect("send");

    let writes = wait_for_writes(&captured, 1).await;
    assert_eq!(writes.len(), 1);
    assert_eq!(
        writes[0].query.get("bucket").map(String::as_str),
        Some("tempest-wind")
    );
    assert_eq!(
        writes[0].body,
        "weather,station=ST-1 rapid_wind_direction=128,rapid_wind_speed=2.30 1500000000"
    );

    cancel.cancel();
    let _ = task.await;
}

#[tokio::test]
async fn noop_mode_makes_no_http_calls() {
    let (influx, captured) = spawn_influx(StatusCode::NO_CONTENT).await;
    let mut config = relay_config(influx);
    config.noop = true;
    let service = WeatherService::bind(Arc::new(config)).await.expect("bind");
    let addr = service.local_addr();
    let cancel = CancellationToken::new();
    let task = tokio::spawn(service.run(cancel.clone()));

    let client = UdpSocket::bind("127.0.0.1:0").await.expect("client");
    for i in 0..5 {
        client
            .send_to(obs_st(1_500_000_000 + i).as_bytes(), addr)
            .await
            .expect("send");
    }
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(captured.lock().await.is_empty());

    cancel.cancel();
    let _ = task.await;
}

#[tokio::test]
async fn rejected_writes_do_not_stop_service() {
    let (influx, captured) = spawn_influx(StatusCode::INTERNAL_SERVER_ERROR).await;
    let service = WeatherService::bind(Arc::new(relay_config(influx)))
        .await
        .expect("bind");
    let addr = service.local_addr();
    let cancel = CancellationToken::new();
    let task = tokio::spawn(service.run(cancel.clone()));

    let client = UdpSocket::bind("127.0.0.1:0").await.expect("client");
    client
        .send_to(obs_st(1_500_000_000).as_bytes(), addr)
        .await
        .expect("send");
    client.send_to(b"garbage", addr).await.expect("send");
    client
        .send_to(obs_st(1_500_000_060).as_bytes(), addr)
        .await
        .expect("send");

    let writes = wait_for_writes(&captured, 2).await;
    assert_eq!(writes.len(), 2, "each point attempted once, no retries");
    assert!(!task.is_finished());

    cancel.cancel();
    let result = task.await.expect("join");
    assert!(matches!(result, Err(ServiceError::Cancelled)));
}

#[tokio::test]
async fn unreachable_influx_does_not_stop_service() {
    // 绑定后立即释放端口，使连接被拒绝
    let closed = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("listener");
        listener.local_addr().expect("addr")
    };
    let service = WeatherService::bind(Arc::new(relay_config(closed)))
        .await
        .expect("bind");
    let addr = service.local_addr();
    let cancel = CancellationToken::new();
    let task = tokio::spawn(service.run(cancel.clone()));

    let client = UdpSocket::bind("127.0.0.1:0").await.expect("client");
    client
        .send_to(obs_st(1_500_000_000).as_bytes(), addr)
        .await
        .expect("send");
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(!task.is_finished());

    cancel.cancel();
    let result = task.await.expect("join");
    assert!(matches!(result, Err(ServiceError::Cancelled)));
}

#[tokio::test]
async fn cancellation_returns_within_read_timeout() {
    let (influx, _captured) = spawn_influx(StatusCode::NO_CONTENT).await;
    let service = WeatherService::bind(Arc::new(relay_config(influx)))
        .await
        .expect("bind");
    let cancel = CancellationToken::new();
    let task = tokio::spawn(service.run(cancel.clone()));

    tokio::time::sleep(Duration::from_millis(50)).await;
    cancel.cancel();
    let result = tokio::time::timeout(Duration::from_secs(1), task)
        .await
        .expect("stopped within one read timeout")
        .expect("join");
    assert!(matches!(result, Err(ServiceError::Cancelled)));
}

#[tokio::test]
async fn invalid_listen_address_fails_construction() {
    let mut config = RelayConfig::new("http://127.0.0.1:8086", "home", "token-1", "tempest");
    config.listen_address = "invalid:address:format".to_string();
    let result = WeatherService::bind(Arc::new(config)).await;
    assert!(matches!(result, Err(ServiceError::Ingest(_))));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_datagrams_lead_to_independent_writes() {
    let (influx, captured) = spawn_influx(StatusCode::NO_CONTENT).await;
    let service = WeatherService::bind(Arc::new(relay_config(influx)))
        .await
        .expect("bind");
    let addr = service.local_addr();
    let cancel = CancellationToken::new();
    let task = tokio::spawn(service.run(cancel.clone()));

    let client = Arc::new(UdpSocket::bind("127.0.0.1:0").await.expect("client"));
    let mut senders = Vec::new();
    for i in 0..100i64 {
        let client = Arc::clone(&client);
        senders.push(tokio::spawn(async move {
            client
                .send_to(obs_st(1_500_000_000 + i).as_bytes(), addr)
                .await
                .expect("send");
        }));
    }
    for sender in senders {
        sender.await.expect("sender");
    }

    let writes = wait_for_writes(&captured, 100).await;
    assert!(!writes.is_empty());
    assert!(writes.len() <= 100);
    // 每个数据点都是独立对象：时间戳互不重复，内容未被其他任务污染
    let timestamps: HashSet<String> = writes
        .iter()
        .map(|write| {
            assert!(write.body.starts_with("weather,station=ST-00001234 "));
            write.body.rsplit(' ').next().unwrap_or_default().to_string()
        })
        .collect();
    assert_eq!(timestamps.len(), writes.len());

    cancel.cancel();
    let _ = task.await;
}
