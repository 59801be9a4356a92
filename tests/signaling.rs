use futures::{SinkExt, StreamExt};
use interview_signal_server::{
    signaling::ConnectionHandle, HubHandle, HubStats, SessionRegistry, Settings, SignalingHub,
    WebSocketServer,
};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{sleep, timeout};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use url::Url;

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

const RECV_TIMEOUT: Duration = Duration::from_secs(2);
const POLL_INTERVAL: Duration = Duration::from_millis(20);

async fn start_server() -> (Url, HubHandle) {
    let settings = Settings::new_for_test().expect("Failed to load test config");
    let (hub, _task) = SignalingHub::spawn(SessionRegistry::new());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = Arc::new(WebSocketServer::new(hub.clone(), &settings));
    tokio::spawn(server.run(listener));

    (Url::parse(&format!("ws://{}", addr)).unwrap(), hub)
}

async fn connect(url: &Url) -> (Client, ConnectionHandle) {
    let (mut client, _) = connect_async(url.as_str()).await.expect("Failed to connect");
    let greeting = recv(&mut client).await;
    assert_eq!(greeting["type"], "connected");
    let handle = serde_json::from_value(greeting["payload"]["handle"].clone()).unwrap();
    (client, handle)
}

async fn send(client: &mut Client, msg: Value) {
    client.send(Message::Text(msg.to_string())).await.unwrap();
}

async fn recv(client: &mut Client) -> Value {
    loop {
        let frame = timeout(RECV_TIMEOUT, client.next())
            .await
            .expect("timed out waiting for a message")
            .expect("stream ended")
            .expect("websocket error");
        match frame {
            Message::Text(text) => return serde_json::from_str(&text).unwrap(),
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("unexpected frame {:?}", other),
        }
    }
}

async fn assert_silent(client: &mut Client) {
    if let Ok(Some(Ok(Message::Text(text)))) = timeout(Duration::from_millis(200), client.next()).await {
        panic!("expected no message, got {}", text);
    }
}

async fn join(client: &mut Client, session_id: &str, role: &str) {
    send(
        client,
        json!({ "type": "join-session", "payload": { "sessionId": session_id, "role": role } }),
    )
    .await;
}

async fn wait_for_stats(hub: &HubHandle, expected: HubStats) {
    for _ in 0..100 {
        if hub.stats().await.unwrap() == expected {
            return;
        }
        sleep(POLL_INTERVAL).await;
    }
    panic!("hub never reached {:?}, last {:?}", expected, hub.stats().await.unwrap());
}

#[test_log::test(tokio::test)]
async fn test_interview_call_setup() {
    let (url, hub) = start_server().await;
    let (mut company, company_handle) = connect(&url).await;
    let (mut freelancer, freelancer_handle) = connect(&url).await;

    join(&mut company, "intA", "company").await;
    wait_for_stats(&hub, HubStats { connections: 2, sessions: 1, ready_sessions: 0 }).await;
    join(&mut freelancer, "intA", "freelancer").await;

    let ready = recv(&mut company).await;
    assert_eq!(ready, json!({ "type": "ready", "payload": { "peerHandle": freelancer_handle } }));
    let ready = recv(&mut freelancer).await;
    assert_eq!(ready, json!({ "type": "ready", "payload": { "peerHandle": company_handle } }));

    let sdp = json!({ "type": "offer", "sdp": "v=0\r\no=- 4611731400430051336 2 IN IP4 127.0.0.1\r\n" });
    send(
        &mut company,
        json!({ "type": "signal-offer", "payload": { "targetHandle": freelancer_handle, "sdp": sdp } }),
    )
    .await;

    let offer = recv(&mut freelancer).await;
    assert_eq!(offer["type"], "signal-offer");
    assert_eq!(offer["payload"]["sdp"], sdp);
    assert_eq!(offer["payload"]["senderHandle"], json!(company_handle));
    assert_silent(&mut freelancer).await;

    freelancer.close(None).await.unwrap();
    let left = recv(&mut company).await;
    assert_eq!(
        left,
        json!({ "type": "peer-left", "payload": { "peerHandle": freelancer_handle, "role": "freelancer" } })
    );
    wait_for_stats(&hub, HubStats { connections: 1, sessions: 1, ready_sessions: 0 }).await;

    company.close(None).await.unwrap();
    wait_for_stats(&hub, HubStats::default()).await;
}

#[test_log::test(tokio::test)]
async fn test_company_takeover() {
    let (url, hub) = start_server().await;
    let (mut first, _) = connect(&url).await;
    let (mut second, second_handle) = connect(&url).await;
    let (mut freelancer, _) = connect(&url).await;

    join(&mut first, "intB", "company").await;
    wait_for_stats(&hub, HubStats { connections: 3, sessions: 1, ready_sessions: 0 }).await;
    join(&mut second, "intB", "company").await;

    let superseded = recv(&mut first).await;
    assert_eq!(
        superseded,
        json!({ "type": "superseded", "payload": { "sessionId": "intB", "role": "company" } })
    );

    join(&mut freelancer, "intB", "freelancer").await;
    let ready = recv(&mut freelancer).await;
    assert_eq!(ready["payload"]["peerHandle"], json!(second_handle));
    assert_eq!(recv(&mut second).await["type"], "ready");

    // The displaced connection leaving must not evict its successor
    first.close(None).await.unwrap();
    wait_for_stats(&hub, HubStats { connections: 2, sessions: 1, ready_sessions: 1 }).await;
    assert_silent(&mut freelancer).await;
}

#[test_log::test(tokio::test)]
async fn test_session_lifecycle_broadcasts() {
    let (url, hub) = start_server().await;
    let (mut company, _) = connect(&url).await;
    let (mut freelancer, _) = connect(&url).await;

    join(&mut company, "intC", "company").await;
    join(&mut freelancer, "intC", "freelancer").await;
    assert_eq!(recv(&mut company).await["type"], "ready");
    assert_eq!(recv(&mut freelancer).await["type"], "ready");

    send(&mut company, json!({ "type": "start-session", "payload": { "sessionId": "intC" } })).await;
    assert_eq!(recv(&mut company).await, json!({ "type": "session-started" }));
    assert_eq!(recv(&mut freelancer).await, json!({ "type": "session-started" }));

    send(&mut freelancer, json!({ "type": "end-session", "payload": { "sessionId": "intC" } })).await;
    assert_eq!(recv(&mut company).await, json!({ "type": "session-ended" }));
    assert_eq!(recv(&mut freelancer).await, json!({ "type": "session-ended" }));

    wait_for_stats(&hub, HubStats { connections: 2, sessions: 0, ready_sessions: 0 }).await;
}

#[test_log::test(tokio::test)]
async fn test_relay_to_unknown_handle_is_dropped() {
    let (url, _hub) = start_server().await;
    let (mut company, _) = connect(&url).await;
    join(&mut company, "intD", "company").await;

    send(
        &mut company,
        json!({
            "type": "signal-ice",
            "payload": { "targetHandle": ConnectionHandle::new(), "candidate": { "candidate": "" } }
        }),
    )
    .await;
    assert_silent(&mut company).await;

    send(&mut company, json!({ "type": "ping" })).await;
    assert_eq!(recv(&mut company).await, json!({ "type": "pong" }));
}

#[test_log::test(tokio::test)]
async fn test_client_close_is_acknowledged() {
    let (url, hub) = start_server().await;
    let (mut client, _) = connect(&url).await;
    join(&mut client, "intE", "company").await;
    wait_for_stats(&hub, HubStats { connections: 1, sessions: 1, ready_sessions: 0 }).await;

    client.close(None).await.unwrap();

    let reply = timeout(RECV_TIMEOUT, client.next())
        .await
        .expect("timed out waiting for the close reply");
    assert!(
        matches!(reply, Some(Ok(Message::Close(_)))),
        "expected a close frame, got {:?}",
        reply
    );
    wait_for_stats(&hub, HubStats::default()).await;
}

#[test_log::test(tokio::test)]
async fn test_malformed_frame_gets_error_reply() {
    let (url, hub) = start_server().await;
    let (mut client, _) = connect(&url).await;

    send(&mut client, json!({ "type": "join-session", "payload": { "role": "company" } })).await;

    let reply = recv(&mut client).await;
    assert_eq!(reply["type"], "error");
    wait_for_stats(&hub, HubStats { connections: 1, sessions: 0, ready_sessions: 0 }).await;
}

#[tokio::test]
async fn test_rejects_disallowed_origin() {
    let (url, _hub) = start_server().await;

    let mut request = url.as_str().into_client_request().unwrap();
    request
        .headers_mut()
        .insert("Origin", HeaderValue::from_static("https://evil.example"));

    match connect_async(request).await {
        Err(WsError::Http(response)) => assert_eq!(response.status(), 403),
        Err(other) => panic!("unexpected error {:?}", other),
        Ok(_) => panic!("handshake from a foreign origin succeeded"),
    }

    let mut request = url.as_str().into_client_request().unwrap();
    request
        .headers_mut()
        .insert("Origin", HeaderValue::from_static("http://localhost:5173"));
    assert!(connect_async(request).await.is_ok());
}
