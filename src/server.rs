//! HTTP and WebSocket surface for browser clients.

use crate::bridge::SessionBridge;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::Response;
use axum::routing::get;
use axum::{Json, Router};
use futures::{SinkExt, StreamExt};
use serde_json::json;
use std::path::Path as FsPath;
use std::sync::Arc;
use tokio::sync::mpsc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

const SERVICE_NAME: &str = "voice-assistant-websocket";
const SERVICE_VERSION: &str = "1.0.0";
const CHANNEL_BUFFER_SIZE: usize = 256;

#[derive(Clone)]
pub struct AppState {
    pub bridge: Arc<SessionBridge>,
}

/// Build the application router.
///
/// Frontend assets under `static_dir` are served as the fallback when that
/// directory exists; otherwise `/` answers with a short service banner.
#[must_use]
pub fn router(bridge: Arc<SessionBridge>, static_dir: &FsPath) -> Router {
    let router = Router::new()
        .route("/health", get(health))
        .route("/ws/{client_id}", get(ws_handler));

    let router = if static_dir.is_dir() {
        tracing::info!(path = %static_dir.display(), "Serving frontend static files");
        router.fallback_service(ServeDir::new(static_dir).append_index_html_on_directories(true))
    } else {
        tracing::info!(path = %static_dir.display(), "Static directory not found, serving banner at /");
        router.route("/", get(root))
    };

    router
        .with_state(AppState { bridge })
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http())
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "healthy", "service": SERVICE_NAME }))
}

async fn root() -> Json<serde_json::Value> {
    Json(json!({ "message": "Voice Assistant WebSocket Server", "version": SERVICE_VERSION }))
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(client_id): Path<String>,
    State(state): State<AppState>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state.bridge, client_id))
}

async fn handle_socket(socket: WebSocket, bridge: Arc<SessionBridge>, client_id: String) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::channel::<String>(CHANNEL_BUFFER_SIZE);

    let writer_id = client_id.clone();
    let writer = tokio::spawn(async move {
        while let Some(text) = rx.recv().await {
            if let Err(err) = sink.send(Message::Text(text.into())).await {
                tracing::warn!(client_id = %writer_id, error = %err, "Failed to write to frontend socket");
                break;
            }
        }
    });

    let channel = tx.clone();
    bridge.registry().connect(&client_id, tx);

    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => bridge.handle_frontend_message(&client_id, text.as_str()).await,
            Ok(Message::Close(_)) => break,
            Ok(Message::Binary(data)) => {
                tracing::debug!(client_id = %client_id, bytes = data.len(), "Ignoring binary frame");
            }
            Ok(_) => {}
            Err(err) => {
                tracing::warn!(client_id = %client_id, error = %err, "Frontend socket error");
                break;
            }
        }
    }

    bridge.registry().disconnect_channel(&client_id, &channel).await;
    writer.abort();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VoiceLiveConfig;
    use crate::registry::ClientRegistry;
    use crate::session::WsConnector;
    use crate::tools::{KeywordCatalog, ToolRegistry, UserInfo};
    use std::net::SocketAddr;
    use std::time::Duration;
    use tokio::net::TcpListener;
    use tokio_tungstenite::tungstenite::Message as WsMessage;

    fn bridge() -> Arc<SessionBridge> {
        let tools = ToolRegistry::standard(Arc::new(KeywordCatalog::default()), UserInfo::default());
        Arc::new(SessionBridge::new(
            Arc::new(ClientRegistry::new()),
            VoiceLiveConfig::default(),
            Arc::new(tools),
            Arc::new(WsConnector),
        ))
    }

    async fn serve(app: Router) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        addr
    }

    #[tokio::test]
    async fn health_and_banner() {
        let addr = serve(router(bridge(), FsPath::new("does-not-exist"))).await;

        let health: serde_json::Value =
            reqwest::get(format!("http://{addr}/health")).await.unwrap().json().await.unwrap();
        assert_eq!(health, json!({ "status": "healthy", "service": "voice-assistant-websocket" }));

        let banner: serde_json::Value = reqwest::get(format!("http://{addr}/")).await.unwrap().json().await.unwrap();
        assert_eq!(banner, json!({ "message": "Voice Assistant WebSocket Server", "version": "1.0.0" }));
    }

    #[tokio::test]
    async fn serves_static_index() {
        let dir = std::env::temp_dir().join(format!("voicelive-static-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("index.html"), "<h1>voz</h1>").unwrap();

        let addr = serve(router(bridge(), &dir)).await;
        let body = reqwest::get(format!("http://{addr}/")).await.unwrap().text().await.unwrap();
        assert_eq!(body, "<h1>voz</h1>");

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn websocket_reports_missing_configuration() {
        let bridge = bridge();
        let addr = serve(router(Arc::clone(&bridge), FsPath::new("does-not-exist"))).await;

        let (mut socket, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws/c1")).await.unwrap();
        socket
            .send(WsMessage::text(json!({ "type": "start_session" }).to_string()))
            .await
            .unwrap();

        let frame = tokio::time::timeout(Duration::from_secs(2), socket.next()).await.unwrap().unwrap().unwrap();
        let value: serde_json::Value = serde_json::from_str(frame.to_text().unwrap()).unwrap();
        assert_eq!(value["type"], "session_error");
        assert!(value["error"].as_str().unwrap().contains("Missing Azure VoiceLive configuration"));
        assert!(bridge.registry().session("c1").is_none());

        socket.close(None).await.unwrap();
        for _ in 0..50 {
            if !bridge.registry().is_connected("c1") {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(!bridge.registry().is_connected("c1"));
    }

    #[tokio::test]
    async fn reconnect_survives_older_socket_closing() {
        let bridge = bridge();
        let addr = serve(router(Arc::clone(&bridge), FsPath::new("does-not-exist"))).await;
        let url = format!("ws://{addr}/ws/c1");

        let (mut first, _) = tokio_tungstenite::connect_async(&url).await.unwrap();
        for _ in 0..50 {
            if bridge.registry().is_connected("c1") {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        let (mut second, _) = tokio_tungstenite::connect_async(&url).await.unwrap();

        first.close(None).await.unwrap();
        while let Ok(Some(Ok(_))) = tokio::time::timeout(Duration::from_secs(2), first.next()).await {}
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(bridge.registry().is_connected("c1"));

        second
            .send(WsMessage::text(json!({ "type": "start_session" }).to_string()))
            .await
            .unwrap();
        let frame = tokio::time::timeout(Duration::from_secs(2), second.next()).await.unwrap().unwrap().unwrap();
        let value: serde_json::Value = serde_json::from_str(frame.to_text().unwrap()).unwrap();
        assert_eq!(value["type"], "session_error");
    }
}
