//! Integration tests for the fieldscope gateway client and realtime channel
//!
//! These tests run the real HTTP and websocket stacks against local stub
//! servers: a canned-response HTTP listener for response triage and a
//! `tokio-tungstenite` acceptor for the push channel.

use std::sync::Arc;
use std::time::Duration;

use fieldscope_core::config::{GatewayConfig, RealtimeConfig, TelemetryConfig};
use fieldscope_core::realtime::{subscribe, RealtimeEvent};
use fieldscope_core::session::SessionStore;
use fieldscope_core::telemetry::TelemetryAggregator;
use fieldscope_core::types::Reading;
use fieldscope_core::{load_field_snapshot, ApiClient, Error};

use chrono::{TimeZone, Utc};
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;

const WAIT: Duration = Duration::from_secs(5);

/// A client wired to a stub gateway, with its session on a temp path.
struct TestClient {
    client: ApiClient,
    session: Arc<SessionStore>,
    session_path: std::path::PathBuf,
    _dir: tempfile::TempDir,
}

fn test_client(base_url: &str) -> TestClient {
    let dir = tempfile::tempdir().unwrap();
    let session_path = dir.path().join("session.json");
    let session = Arc::new(SessionStore::open(session_path.clone()).unwrap());
    let gateway = GatewayConfig {
        base_url: base_url.to_string(),
        websocket_url: None,
        timeout_secs: 5,
    };
    let client = ApiClient::new(&gateway, Arc::clone(&session)).unwrap();
    TestClient {
        client,
        session,
        session_path,
        _dir: dir,
    }
}

// ============================================
// Stub HTTP gateway
// ============================================

type Routes = Vec<(&'static str, u16, &'static str)>;

/// Serve canned JSON responses, matched by `"METHOD /path"` prefix in
/// route order, until the listener task is dropped with the runtime.
async fn stub_gateway(routes: Routes) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base_url = format!("http://{}", listener.local_addr().unwrap());

    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };
            let routes = routes.clone();
            tokio::spawn(async move {
                serve_connection(stream, &routes).await;
            });
        }
    });

    base_url
}

/// Answer requests on one connection from the route table. Unroutable
/// requests get a 404 with a JSON detail.
async fn serve_connection(mut stream: TcpStream, routes: &[(&'static str, u16, &'static str)]) {
    loop {
        let Some(request_line) = read_request(&mut stream).await else {
            return;
        };
        let (status, body) = routes
            .iter()
            .find(|(prefix, _, _)| request_line.starts_with(prefix))
            .map(|(_, status, body)| (*status, *body))
            .unwrap_or((404, r#"{"detail": "Not found"}"#));

        let response = format!(
            "HTTP/1.1 {} {}\r\ncontent-type: application/json\r\ncontent-length: {}\r\n\r\n{}",
            status,
            reason(status),
            body.len(),
            body
        );
        if stream.write_all(response.as_bytes()).await.is_err() {
            return;
        }
    }
}

/// Read one request, headers plus any content-length body, and return the
/// request line. `None` when the client hung up.
async fn read_request(stream: &mut TcpStream) -> Option<String> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];

    let headers_end = loop {
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos;
        }
        match stream.read(&mut chunk).await {
            Ok(0) | Err(_) => return None,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
    };

    let head = String::from_utf8_lossy(&buf[..headers_end]).to_string();
    let content_length = head
        .lines()
        .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            if name.eq_ignore_ascii_case("content-length") {
                value.trim().parse::<usize>().ok()
            } else {
                None
            }
        })
        .unwrap_or(0);

    let mut body_read = buf.len() - (headers_end + 4);
    while body_read < content_length {
        match stream.read(&mut chunk).await {
            Ok(0) | Err(_) => return None,
            Ok(n) => body_read += n,
        }
    }

    head.lines().next().map(|line| line.to_string())
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        400 => "Bad Request",
        401 => "Unauthorized",
        404 => "Not Found",
        422 => "Unprocessable Entity",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "Status",
    }
}

// ============================================
// Stub websocket server
// ============================================

/// Accept one websocket connection, send the canned text frames, then hold
/// the socket open until the peer closes. Resolves to true on a clean
/// close handshake.
async fn stub_ws_server(frames: Vec<&'static str>) -> (String, tokio::task::JoinHandle<bool>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base_url = format!("http://{}", listener.local_addr().unwrap());

    let server = tokio::spawn(async move {
        let Ok((stream, _)) = listener.accept().await else {
            return false;
        };
        let mut ws = tokio_tungstenite::accept_async(stream)
            .await
            .expect("websocket handshake should succeed");
        for frame in frames {
            ws.send(Message::Text(frame.to_string()))
                .await
                .expect("frame send should succeed");
        }
        loop {
            match ws.next().await {
                Some(Ok(Message::Close(_))) => return true,
                Some(Ok(_)) => continue,
                Some(Err(_)) | None => return false,
            }
        }
    });

    (base_url, server)
}

fn fast_reconnect() -> RealtimeConfig {
    RealtimeConfig {
        reconnect: true,
        initial_delay_ms: 50,
        max_delay_ms: 100,
        delay_multiplier: 1.0,
        max_attempts: 2,
    }
}

async fn expect_event(handle: &mut fieldscope_core::RealtimeHandle) -> RealtimeEvent {
    timeout(WAIT, handle.next_event())
        .await
        .expect("timed out waiting for realtime event")
        .expect("event stream ended early")
}

// ============================================
// Gateway response triage
// ============================================

#[tokio::test]
async fn test_sign_in_persists_token_and_caches_profile() {
    let base_url = stub_gateway(vec![
        (
            "POST /login",
            200,
            r#"{"access_token": "tok-123", "token_type": "bearer"}"#,
        ),
        (
            "GET /users/me",
            200,
            r#"{"id": 1, "name": "Ada", "email": "ada@example.com"}"#,
        ),
    ])
    .await;
    let env = test_client(&base_url);

    let profile = env
        .client
        .sign_in("ada@example.com", "password")
        .await
        .expect("sign in should succeed");

    assert_eq!(profile.name, "Ada");
    assert_eq!(env.session.token().as_deref(), Some("tok-123"));
    assert_eq!(env.session.user().unwrap().email, "ada@example.com");

    // The token survives a restart, the profile is refetched instead
    let reopened = SessionStore::open(env.session_path.clone()).unwrap();
    assert_eq!(reopened.token().as_deref(), Some("tok-123"));
    assert!(reopened.user().is_none());
}

#[tokio::test]
async fn test_rejected_login_keeps_existing_session() {
    let base_url = stub_gateway(vec![(
        "POST /login",
        400,
        r#"{"detail": "Incorrect email or password"}"#,
    )])
    .await;
    let env = test_client(&base_url);
    env.session.login("old-token".to_string(), None).unwrap();

    let err = env
        .client
        .sign_in("ada@example.com", "wrong")
        .await
        .unwrap_err();

    // Bad credentials on the public login route are an API error, not a
    // session expiry
    assert!(!err.is_unauthorized());
    match err {
        Error::Api { status, message } => {
            assert_eq!(status, 400);
            assert_eq!(message, "Incorrect email or password");
        }
        other => panic!("expected api error, got {:?}", other),
    }
    assert_eq!(env.session.token().as_deref(), Some("old-token"));
}

#[tokio::test]
async fn test_unauthorized_response_tears_down_session() {
    let base_url = stub_gateway(vec![(
        "GET /fields",
        401,
        r#"{"detail": "Could not validate credentials"}"#,
    )])
    .await;
    let env = test_client(&base_url);
    env.session.login("stale-token".to_string(), None).unwrap();
    assert!(env.session_path.exists());

    // Concurrent requests race into the same 401; the session must come
    // down cleanly regardless
    let (a, b, c) = tokio::join!(env.client.fields(), env.client.fields(), env.client.fields());
    assert!(a.unwrap_err().is_unauthorized());
    assert!(b.unwrap_err().is_unauthorized());
    assert!(c.unwrap_err().is_unauthorized());

    assert!(!env.session.is_logged_in());
    assert!(!env.session_path.exists(), "session file should be removed");
}

#[tokio::test]
async fn test_validation_envelope_reaches_caller() {
    let base_url = stub_gateway(vec![(
        "POST /register",
        422,
        r#"{"errors": [
            {"field": "email", "message": "Indirizzo email non valido."},
            {"field": "password", "message": "Password troppo corta."}
        ]}"#,
    )])
    .await;
    let env = test_client(&base_url);

    let err = env
        .client
        .register("Ada", "not-an-email", "pw")
        .await
        .unwrap_err();

    let fields = err.field_errors().expect("validation error expected");
    assert_eq!(
        fields.get("email").map(String::as_str),
        Some("Indirizzo email non valido.")
    );
    assert_eq!(
        fields.get("password").map(String::as_str),
        Some("Password troppo corta.")
    );
}

#[tokio::test]
async fn test_error_body_detail_is_surfaced() {
    let base_url = stub_gateway(vec![(
        "GET /fields/ghost/weather",
        404,
        r#"{"detail": "Campo non trovato."}"#,
    )])
    .await;
    let env = test_client(&base_url);
    env.session.login("tok".to_string(), None).unwrap();

    let err = env.client.field_weather("ghost").await.unwrap_err();
    match err {
        Error::Api { status, message } => {
            assert_eq!(status, 404);
            assert_eq!(message, "Campo non trovato.");
        }
        other => panic!("expected api error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_plain_error_body_falls_back_to_status() {
    let base_url = stub_gateway(vec![("GET /fields", 500, "boom")]).await;
    let env = test_client(&base_url);
    env.session.login("tok".to_string(), None).unwrap();

    let err = env.client.fields().await.unwrap_err();
    match err {
        Error::Api { status, message } => {
            assert_eq!(status, 500);
            assert_eq!(message, "request failed with status 500");
        }
        other => panic!("expected api error, got {:?}", other),
    }
}

// ============================================
// Field snapshot
// ============================================

#[tokio::test]
async fn test_snapshot_degrades_failed_arms() {
    let base_url = stub_gateway(vec![
        (
            "GET /fields/field123/weather",
            200,
            r#"{
                "field": "field123",
                "current_weather": {
                    "city": "Rutigliano",
                    "temperature": 24.5,
                    "min_temperature": 18,
                    "max_temperature": 29,
                    "description": "clear sky",
                    "icon": "01d"
                },
                "forecast": []
            }"#,
        ),
        (
            "GET /fields/field123/readings",
            200,
            r#"[
                {"sensor_id": "s1", "sensor_type": "Temperatura", "value": 24.0,
                 "unit": "°C", "timestamp": "2026-07-14T12:00:05Z"},
                {"sensor_id": "s1", "sensor_type": "Temperatura", "value": 23.0,
                 "unit": "°C", "timestamp": "2026-07-14T12:00:00Z"}
            ]"#,
        ),
        (
            "GET /fields/field123/sensors",
            503,
            r#"{"detail": "Sensor service unavailable"}"#,
        ),
        ("GET /rules", 200, "[]"),
        (
            "GET /alerts/field123",
            200,
            r#"[
                {"alert_name": "alert1", "sensor_type": "Temperatura",
                 "message": "Too hot", "timestamp": "2026-07-14T11:59:00Z",
                 "active": true}
            ]"#,
        ),
        ("GET /sensor-types", 200, "[]"),
    ])
    .await;
    let env = test_client(&base_url);
    env.session.login("tok".to_string(), None).unwrap();

    let snapshot = load_field_snapshot(&env.client, "field123", 50)
        .await
        .expect("snapshot should load despite one failed arm");

    assert_eq!(snapshot.field, "field123");
    assert_eq!(snapshot.weather.unwrap().current_weather.city, "Rutigliano");
    assert_eq!(snapshot.readings.len(), 2);
    assert_eq!(snapshot.rules.len(), 0);

    // The stored row omitted its field, the request scope fills it in
    assert_eq!(snapshot.alerts.len(), 1);
    assert_eq!(snapshot.alerts[0].field, "field123");

    // The sensors arm failed and degraded to empty
    assert!(snapshot.sensors.is_empty());
    assert_eq!(snapshot.partial, vec!["sensors".to_string()]);
    assert!(!snapshot.is_complete());
}

// ============================================
// Realtime channel
// ============================================

#[tokio::test]
async fn test_stream_delivers_typed_events_and_skips_noise() {
    fieldscope_core::logging::init_test();
    let (base_url, server) = stub_ws_server(vec![
        r#"{"type": "reading", "data": {
            "sensor_id": "sensor1234", "field_id": "field123",
            "sensor_type": "Temperatura", "value": 23.5, "unit": "°C",
            "timestamp": "2026-07-14T12:00:00Z"}}"#,
        "not json",
        r#"{"type": "heartbeat", "data": {}}"#,
        r#"{"type": "alert", "data": {
            "rule_name": "temp-alta", "sensor_type": "Temperatura",
            "condition": ">", "threshold": 30.0,
            "message": "Temperatura sopra soglia", "field": "field123"}}"#,
    ])
    .await;

    let gateway = GatewayConfig {
        base_url,
        websocket_url: None,
        timeout_secs: 5,
    };
    let mut handle = subscribe(&gateway, &RealtimeConfig::default(), "tok", "field123");

    assert!(matches!(
        expect_event(&mut handle).await,
        RealtimeEvent::Connected
    ));

    let reading = match expect_event(&mut handle).await {
        RealtimeEvent::Reading(reading) => reading,
        other => panic!("expected reading, got {:?}", other),
    };
    assert_eq!(reading.sensor_type, "Temperatura");
    assert_eq!(reading.value, 23.5);
    assert_eq!(reading.field_id.as_deref(), Some("field123"));

    // The malformed frame and the unknown type are skipped, so the alert
    // comes through next
    let alert = match expect_event(&mut handle).await {
        RealtimeEvent::Alert(alert) => alert,
        other => panic!("expected alert, got {:?}", other),
    };
    assert_eq!(alert.id, "temp-alta");
    assert_eq!(alert.message, "Temperatura sopra soglia");
    assert!(alert.active);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(handle.try_next_event().is_none());

    // Deliberate teardown performs a close handshake instead of vanishing
    handle.close().await;
    let clean_close = timeout(WAIT, server)
        .await
        .expect("server should observe the close")
        .unwrap();
    assert!(clean_close, "client should send a websocket close frame");
}

#[tokio::test]
async fn test_lost_connection_reported_when_reconnect_disabled() {
    fieldscope_core::logging::init_test();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base_url = format!("http://{}", listener.local_addr().unwrap());

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        ws.close(None).await.unwrap();
    });

    let gateway = GatewayConfig {
        base_url,
        websocket_url: None,
        timeout_secs: 5,
    };
    let config = RealtimeConfig {
        reconnect: false,
        ..Default::default()
    };
    let mut handle = subscribe(&gateway, &config, "tok", "field123");

    assert!(matches!(
        expect_event(&mut handle).await,
        RealtimeEvent::Connected
    ));

    match expect_event(&mut handle).await {
        RealtimeEvent::ConnectionLost { reason } => {
            assert!(reason.contains("closed"), "unexpected reason: {}", reason);
        }
        other => panic!("expected connection lost, got {:?}", other),
    }

    // The channel closes once the loss is reported
    let ended = timeout(WAIT, handle.next_event()).await.unwrap();
    assert!(ended.is_none());
}

#[tokio::test]
async fn test_reconnect_backs_off_then_gives_up() {
    fieldscope_core::logging::init_test();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base_url = format!("http://{}", listener.local_addr().unwrap());

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        // Refuse everything after the first connection
        drop(listener);
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        ws.close(None).await.ok();
    });

    let gateway = GatewayConfig {
        base_url,
        websocket_url: None,
        timeout_secs: 5,
    };
    let mut handle = subscribe(&gateway, &fast_reconnect(), "tok", "field123");

    assert!(matches!(
        expect_event(&mut handle).await,
        RealtimeEvent::Connected
    ));

    match expect_event(&mut handle).await {
        RealtimeEvent::Reconnecting { attempt, delay } => {
            assert_eq!(attempt, 1);
            assert!(delay >= Duration::from_millis(50));
            assert!(delay < Duration::from_millis(200));
        }
        other => panic!("expected first reconnect attempt, got {:?}", other),
    }

    match expect_event(&mut handle).await {
        RealtimeEvent::Reconnecting { attempt, .. } => assert_eq!(attempt, 2),
        other => panic!("expected second reconnect attempt, got {:?}", other),
    }

    // Both retries hit a closed port, so the cap of 2 attempts is spent
    assert!(matches!(
        expect_event(&mut handle).await,
        RealtimeEvent::ConnectionLost { .. }
    ));
    let ended = timeout(WAIT, handle.next_event()).await.unwrap();
    assert!(ended.is_none());
}

// ============================================
// Live telemetry pipeline
// ============================================

#[tokio::test]
async fn test_push_events_feed_chart_series() {
    let (base_url, _server) = stub_ws_server(vec![
        r#"{"type": "reading", "data": {
            "sensor_id": "s1", "field_id": "field123",
            "sensor_type": "Temperatura", "value": 24.0, "unit": "°C",
            "timestamp": "2026-07-14T12:00:02Z"}}"#,
        r#"{"type": "reading", "data": {
            "sensor_id": "s1", "field_id": "field123",
            "sensor_type": "Temperatura", "value": 26.0, "unit": "°C",
            "timestamp": "2026-07-14T12:00:02.400Z"}}"#,
        r#"{"type": "reading", "data": {
            "sensor_id": "s2", "field_id": "field123",
            "sensor_type": "Umidita Suolo", "value": 48.0, "unit": "%",
            "timestamp": "2026-07-14T12:00:02Z"}}"#,
    ])
    .await;

    // Seed from a snapshot as the readings endpoint returns it, newest
    // first
    let snapshot: Vec<Reading> = serde_json::from_str(
        r#"[
            {"sensor_id": "s1", "sensor_type": "Temperatura", "value": 22.0,
             "unit": "°C", "timestamp": "2026-07-14T12:00:01Z"},
            {"sensor_id": "s1", "sensor_type": "Temperatura", "value": 21.0,
             "unit": "°C", "timestamp": "2026-07-14T12:00:00Z"}
        ]"#,
    )
    .unwrap();

    let telemetry = TelemetryConfig {
        history_capacity: 50,
        group_by_sensor: false,
        snapshot_limit: 50,
    };
    let mut aggregator = TelemetryAggregator::new(&telemetry);
    aggregator.seed(&snapshot);

    let gateway = GatewayConfig {
        base_url,
        websocket_url: None,
        timeout_secs: 5,
    };
    let mut handle = subscribe(&gateway, &RealtimeConfig::default(), "tok", "field123");

    let mut readings_seen = 0;
    while readings_seen < 3 {
        match expect_event(&mut handle).await {
            RealtimeEvent::Reading(reading) => {
                aggregator.push(&reading);
                readings_seen += 1;
            }
            RealtimeEvent::Connected => {}
            other => panic!("unexpected event: {:?}", other),
        }
    }
    handle.close().await;

    let series = aggregator.series();
    assert_eq!(series.len(), 2);

    let base = Utc.with_ymd_and_hms(2026, 7, 14, 12, 0, 0).unwrap().timestamp();

    // BTreeMap ordering puts temperatura before umidita_suolo
    let temperatura = &series[0];
    assert_eq!(temperatura.key, "temperatura");
    assert_eq!(temperatura.unit, "°C");
    let points: Vec<(i64, f64)> = temperatura
        .points
        .iter()
        .map(|p| (p.timestamp, p.value))
        .collect();
    // The two pushes in second :02 average to 25.0; seeded readings fill
    // :00 and :01
    assert_eq!(
        points,
        vec![(base, 21.0), (base + 1, 22.0), (base + 2, 25.0)]
    );

    let umidita = &series[1];
    assert_eq!(umidita.key, "umidita_suolo");
    assert_eq!(umidita.unit, "%");
    assert_eq!(umidita.points.len(), 1);
    assert_eq!(umidita.points[0].value, 48.0);
}
