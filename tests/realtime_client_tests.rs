use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use voicelive_bridge::channel::{UpstreamReceiver, UpstreamSender};
use voicelive_bridge::{ClientEvent, EventKind, RealtimeClient};

#[derive(Default, Debug, Clone)]
struct Handshake {
    uri: String,
    api_key: Option<String>,
}

#[tokio::test]
async fn client_speaks_to_a_local_server() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let seen = Arc::new(Mutex::new(Handshake::default()));
    let captured = Arc::clone(&seen);

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut socket = tokio_tungstenite::accept_hdr_async(stream, move |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
            let mut seen = captured.lock().unwrap();
            seen.uri = req.uri().to_string();
            seen.api_key = req.headers().get("api-key").and_then(|v| v.to_str().ok()).map(str::to_string);
            Ok(resp)
        })
        .await
        .unwrap();

        socket.send(Message::text("not json")).await.unwrap();
        socket
            .send(Message::text(
                json!({ "type": "session.created", "event_id": "e1", "session": { "id": "sess_1" } }).to_string(),
            ))
            .await
            .unwrap();

        let frame = socket.next().await.unwrap().unwrap();
        let value: Value = serde_json::from_str(frame.to_text().unwrap()).unwrap();
        socket.close(None).await.ok();
        value
    });

    let client = RealtimeClient::connect(&format!("http://{addr}"), "secret", "gpt-4o-realtime").await.unwrap();
    let (sender, mut receiver) = client.split();

    let event = receiver.next_event().await.unwrap().unwrap();
    assert_eq!(event.kind(), EventKind::SessionCreated);

    sender.send(ClientEvent::ResponseCreate { event_id: None }).await.unwrap();
    let received = server.await.unwrap();
    assert_eq!(received, json!({ "type": "response.create" }));

    let handshake = seen.lock().unwrap().clone();
    assert!(handshake.uri.starts_with("/voice-live/realtime?"), "{}", handshake.uri);
    assert!(handshake.uri.contains("api-version=2025-05-01-preview"));
    assert!(handshake.uri.contains("model=gpt-4o-realtime"));
    assert_eq!(handshake.api_key.as_deref(), Some("secret"));

    assert!(receiver.next_event().await.unwrap().is_none());
}

#[tokio::test]
async fn invalid_audio_is_rejected_before_sending() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut socket = tokio_tungstenite::accept_async(stream).await.unwrap();
        socket.next().await
    });

    let client = RealtimeClient::connect(&format!("ws://{addr}"), "k", "m").await.unwrap();
    let (sender, _receiver) = client.split();

    let err = sender
        .send(ClientEvent::InputAudioBufferAppend { event_id: None, audio: "abc".to_string() })
        .await
        .unwrap_err();
    assert!(matches!(err, voicelive_bridge::Error::InvalidClientEvent(_)));

    sender.close().await.unwrap();
    let frame = server.await.unwrap();
    assert!(matches!(frame, Some(Ok(Message::Close(_))) | None));
}
