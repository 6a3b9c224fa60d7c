use super::common;

use common::test_server::TestServer;
use std::time::Duration;

/// Reads the SSE body until `needle` shows up or the deadline passes.
async fn read_until(response: &mut reqwest::Response, needle: &str) -> String {
    let mut seen = String::new();
    let deadline = tokio::time::Instant::now() + Duration::from_secs(3);

    while !seen.contains(needle) {
        let chunk = tokio::time::timeout_at(deadline, response.chunk())
            .await
            .expect("timed out waiting for event")
            .unwrap();
        match chunk {
            Some(bytes) => seen.push_str(&String::from_utf8_lossy(&bytes)),
            None => break,
        }
    }
    seen
}

#[tokio::test]
async fn test_event_stream_receives_checkin() {
    let server = TestServer::new().await;
    let client = reqwest::Client::new();

    let mut stream = client
        .get(server.url("/_mock/events?channel=events/7"))
        .send()
        .await
        .unwrap();
    assert_eq!(stream.status(), 200);

    let response = client
        .post(server.url("/api/events/7/checkin"))
        .bearer_auth("abc")
        .json(&serde_json::json!({ "attendee": "grace" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let text = read_until(&mut stream, "grace").await;
    assert!(text.contains("event: attendee.checked_in"));
    assert!(text.contains("\"channel\":\"events/7\""));
}

#[tokio::test]
async fn test_event_stream_filters_channel() {
    let server = TestServer::new().await;
    let client = reqwest::Client::new();

    let mut stream = client
        .get(server.url("/_mock/events?channel=events/2"))
        .send()
        .await
        .unwrap();

    for (id, attendee) in [("1", "skipped"), ("2", "kept")] {
        client
            .post(server.url(&format!("/api/events/{}/checkin", id)))
            .bearer_auth("abc")
            .json(&serde_json::json!({ "attendee": attendee }))
            .send()
            .await
            .unwrap();
    }

    let text = read_until(&mut stream, "kept").await;
    assert!(!text.contains("skipped"));
}
