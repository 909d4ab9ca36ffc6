//! HttpBackend against a one-request-per-connection HTTP stub.

use adwatch::catalog::Catalog;
use adwatch::config::BackendConfig;
use adwatch::sync::backend::{BackendError, CompletionReport, RewardBackend, WatchRequest};
use adwatch::sync::HttpBackend;
use parking_lot::Mutex;
use std::net::TcpListener as StdListener;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

#[derive(Debug, Clone)]
struct Recorded {
    method: String,
    path: String,
    headers: Vec<(String, String)>,
    body: String,
}

impl Recorded {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

type Log = Arc<Mutex<Vec<Recorded>>>;

/// Serve `responses` in order, one per connection.
async fn stub(responses: Vec<(u16, &'static str)>) -> (String, Log) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let log: Log = Arc::default();
    let seen = log.clone();
    tokio::spawn(async move {
        for (status, body) in responses {
            let (mut socket, _) = listener.accept().await.unwrap();
            let request = read_request(&mut socket).await;
            seen.lock().push(request);
            let reply = format!(
                "HTTP/1.1 {status} Stub\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(reply.as_bytes()).await.unwrap();
            let _ = socket.shutdown().await;
        }
    });
    (format!("http://{addr}"), log)
}

async fn read_request(socket: &mut TcpStream) -> Recorded {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    let header_end = loop {
        let n = socket.read(&mut chunk).await.unwrap();
        assert!(n > 0, "client closed before sending headers");
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };
    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let mut lines = head.split("\r\n");
    let mut request_line = lines.next().unwrap().split_whitespace();
    let method = request_line.next().unwrap().to_string();
    let path = request_line.next().unwrap().to_string();
    let headers: Vec<(String, String)> = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .collect();
    let length = headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case("content-length"))
        .and_then(|(_, v)| v.parse::<usize>().ok())
        .unwrap_or(0);
    while buf.len() < header_end + length {
        let n = socket.read(&mut chunk).await.unwrap();
        assert!(n > 0, "client closed mid-body");
        buf.extend_from_slice(&chunk[..n]);
    }
    let body = String::from_utf8_lossy(&buf[header_end..header_end + length]).to_string();
    Recorded {
        method,
        path,
        headers,
        body,
    }
}

fn backend(base_url: &str, token: Option<&str>) -> HttpBackend {
    HttpBackend::from_config(&BackendConfig {
        base_url: format!("{base_url}/"),
        token: token.map(str::to_string),
        timeout_ms: 2_000,
    })
}

#[tokio::test]
async fn record_watch_sends_auth_idempotency_key_and_body() {
    let (url, log) = stub(vec![(200, r#"{"points_earned":1,"total_points":11}"#)]).await;
    let backend = backend(&url, Some("secret"));

    let receipt = backend
        .record_watch(&WatchRequest {
            ad_id: "ad-7".into(),
            watch_time: 60,
            session_watch_time: 120,
            idempotency_key: "inst:ad-7:1:1".into(),
        })
        .await
        .unwrap();
    assert_eq!(receipt.points_earned, 1);
    assert_eq!(receipt.total_points, Some(11));

    let request = log.lock()[0].clone();
    assert_eq!(request.method, "POST");
    assert_eq!(request.path, "/api/ads/watch");
    assert_eq!(request.header("authorization"), Some("Bearer secret"));
    assert_eq!(request.header("idempotency-key"), Some("inst:ad-7:1:1"));
    let body: serde_json::Value = serde_json::from_str(&request.body).unwrap();
    assert_eq!(
        body,
        serde_json::json!({ "ad_id": "ad-7", "watch_time": 60, "session_watch_time": 120 })
    );
}

#[tokio::test]
async fn profile_accepts_wrapped_and_bare_shapes() {
    let (url, log) = stub(vec![
        (200, r#"{"user":{"id":"u1","name":"Viewer","points":120}}"#),
        (200, r#"{"id":"u1","points":121,"total_earned":300}"#),
    ])
    .await;
    let backend = backend(&url, None);

    assert_eq!(backend.fetch_profile().await.unwrap().points, 120);
    let bare = backend.fetch_profile().await.unwrap();
    assert_eq!(bare.points, 121);
    assert_eq!(bare.total_earned, 300);
    let log = log.lock();
    assert_eq!(log[0].path, "/api/auth/me");
    assert_eq!(log[0].header("authorization"), None);
}

#[tokio::test]
async fn catalog_fetch_skips_unplayable_ads() {
    let (url, log) = stub(vec![(
        200,
        r#"[{"id":"a","title":"A","duration":30,"points":2},{"id":"b","duration":0},{"id":"c","duration":45}]"#,
    )])
    .await;
    let backend = backend(&url, Some("t"));

    let catalog = Catalog::fetch(&backend, false).await.unwrap();
    let ids: Vec<_> = catalog.ads().iter().map(|ad| ad.id.as_str()).collect();
    assert_eq!(ids, vec!["a", "c"]);
    assert_eq!(catalog.ads()[0].points_per_interval, 2);
    assert_eq!(catalog.ads()[1].points_per_interval, 1);
    assert_eq!(log.lock()[0].method, "GET");
}

#[tokio::test]
async fn error_statuses_are_classified() {
    let (url, _log) = stub(vec![
        (503, r#"{"error":"maintenance"}"#),
        (404, r#"{"error":"no such ad"}"#),
    ])
    .await;
    let backend = backend(&url, None);
    let request = WatchRequest {
        ad_id: "a".into(),
        watch_time: 60,
        session_watch_time: 60,
        idempotency_key: "k".into(),
    };

    let err = backend.record_watch(&request).await.unwrap_err();
    assert!(matches!(err, BackendError::Status { status: 503, .. }));
    assert!(err.is_retryable());
    let err = backend.record_watch(&request).await.unwrap_err();
    match &err {
        BackendError::Status { status, body, .. } => {
            assert_eq!(*status, 404);
            assert!(body.contains("no such ad"));
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn undecodable_body_is_not_retryable() {
    let (url, _log) = stub(vec![(200, "not json")]).await;
    let err = backend(&url, None).current_rates().await.unwrap_err();
    assert!(matches!(err, BackendError::Decode { .. }));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn refused_connection_is_a_retryable_transport_error() {
    let port = StdListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port();
    let err = backend(&format!("http://127.0.0.1:{port}"), None)
        .heartbeat()
        .await
        .unwrap_err();
    assert!(matches!(err, BackendError::Transport { .. }));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn presence_and_completion_hit_their_endpoints() {
    let (url, log) = stub(vec![
        (200, ""),
        (200, r#"{"success":true}"#),
        (200, ""),
    ])
    .await;
    let backend = backend(&url, Some("t"));

    backend.ad_view_started("ad-1").await.unwrap();
    let ack = backend
        .complete_ad(&CompletionReport {
            ad_type: "video".into(),
            ad_id: "ad-1".into(),
            completed: true,
            watch_duration: 30,
            points_earned: 0,
        })
        .await
        .unwrap();
    assert!(ack.success);
    backend.ad_view_ended("ad-1").await.unwrap();

    let log = log.lock();
    let calls: Vec<_> = log
        .iter()
        .map(|r| format!("{} {}", r.method, r.path))
        .collect();
    assert_eq!(
        calls,
        vec![
            "POST /api/activity/ad-view/ad-1",
            "POST /api/rewarded-ads/complete",
            "DELETE /api/activity/ad-view/ad-1",
        ]
    );
    let body: serde_json::Value = serde_json::from_str(&log[1].body).unwrap();
    assert_eq!(body["ad_type"], "video");
    assert_eq!(body["completed"], true);
}

#[tokio::test]
async fn ad_ids_are_encoded_as_one_path_segment() {
    let (url, log) = stub(vec![(200, ""), (200, "")]).await;
    let backend = backend(&url, None);

    backend.ad_view_started("promo/1?x#y").await.unwrap();
    backend.ad_view_ended("promo/1?x#y").await.unwrap();

    let log = log.lock();
    assert_eq!(log[0].method, "POST");
    assert_eq!(log[0].path, "/api/activity/ad-view/promo%2F1%3Fx%23y");
    assert_eq!(log[1].method, "DELETE");
    assert_eq!(log[1].path, log[0].path);
}
