//! End-to-end tests for the face-scan HTTP listener

use bmi_agent::domain::types::SessionEvent;
use bmi_agent::infra::Metrics;
use bmi_agent::io::{FaceIdListener, FaceIdListenerConfig};
use std::sync::Arc;
use tokio::sync::mpsc;

const FACE_EVENT: &str = r#"{
    "ipAddress": "192.168.1.50",
    "dateTime": "2024-03-01T09:30:00Z",
    "eventType": "AccessControllerEvent",
    "AccessControllerEvent": {
        "deviceName": "Entrance",
        "employeeNoString": "E1",
        "name": "Jane Doe"
    }
}"#;

async fn start_listener() -> (FaceIdListener, mpsc::Receiver<SessionEvent>, String) {
    let (tx, rx) = mpsc::channel(16);
    let config = FaceIdListenerConfig { port: 0, path: "/hikvision/listen".to_string() };
    let mut listener = FaceIdListener::new(config, tx, Arc::new(Metrics::new()));
    let addr = listener.start().await.expect("bind on an ephemeral port");
    let url = format!("http://127.0.0.1:{}/hikvision/listen", addr.port());
    (listener, rx, url)
}

#[tokio::test]
async fn test_valid_scan_is_published() {
    let (mut listener, mut rx, url) = start_listener().await;

    let response = reqwest::Client::new().post(&url).body(FACE_EVENT).send().await.unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await.unwrap(), r#"{"status":"ok"}"#);

    match rx.recv().await.expect("scan event published") {
        SessionEvent::Scan(scan) => {
            assert_eq!(scan.person_id, "E1");
            assert_eq!(scan.name.as_deref(), Some("Jane Doe"));
            assert_eq!(scan.device_ip.as_deref(), Some("192.168.1.50"));
        }
        other => panic!("unexpected event: {other:?}"),
    }

    listener.stop().await;
}

#[tokio::test]
async fn test_multipart_wrapped_scan_is_published() {
    let (mut listener, mut rx, url) = start_listener().await;

    let body = format!(
        "--boundary\r\nContent-Disposition: form-data; name=\"event_log\"\r\n\r\n{FACE_EVENT}\r\n--boundary--"
    );
    let response = reqwest::Client::new().post(&url).body(body).send().await.unwrap();
    assert_eq!(response.status(), 200);

    match rx.recv().await.expect("scan event published") {
        SessionEvent::Scan(scan) => assert_eq!(scan.person_id, "E1"),
        other => panic!("unexpected event: {other:?}"),
    }

    listener.stop().await;
}

#[tokio::test]
async fn test_non_post_is_rejected() {
    let (mut listener, mut rx, url) = start_listener().await;

    let response = reqwest::Client::new().get(&url).send().await.unwrap();
    assert_eq!(response.status(), 405);
    assert!(rx.try_recv().is_err());

    listener.stop().await;
}

#[tokio::test]
async fn test_ignorable_payloads_are_acknowledged_without_events() {
    let (mut listener, mut rx, url) = start_listener().await;
    let client = reqwest::Client::new();

    // Heartbeat-style event without the access-control sub-object
    let response = client
        .post(&url)
        .body(r#"{"ipAddress":"192.168.1.50","eventType":"videoloss"}"#)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    // Garbage body is acknowledged too - the device owns retries
    let response = client.post(&url).body("definitely not json").send().await.unwrap();
    assert_eq!(response.status(), 200);

    assert!(rx.try_recv().is_err());
    listener.stop().await;
}

#[tokio::test]
async fn test_stop_closes_the_socket() {
    let (mut listener, _rx, url) = start_listener().await;

    listener.stop().await;
    listener.stop().await; // idempotent

    let result = reqwest::Client::new().post(&url).body(FACE_EVENT).send().await;
    assert!(result.is_err(), "listener socket should be closed after stop");
}
