#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::multiple_crate_versions)]

pub mod bridge;
pub mod channel;
pub mod config;
pub mod error;
pub mod events;
pub mod handshake;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod session;
pub mod tools;
pub mod transport;

pub use bridge::{InboundMessage, SessionBridge, StartConfig};
pub use channel::{EventChannel, UpstreamReceiver, UpstreamSender};
pub use config::Config;
pub use error::{Error, Result};
pub use events::{EventSummary, Notifier, OutboundEvent, OutboundKind};
pub use handshake::{CallStatus, CallTracker, FunctionCallHandler, ToolCall};
pub use protocol::client_events::ClientEvent;
pub use protocol::server_events::{EventKind, ServerEvent};
pub use registry::ClientRegistry;
pub use session::{Connector, SessionHandle, UpstreamConfig, WsConnector};
pub use tools::{ToolDefinition, ToolRegistry};

use base64::decoded_len_estimate;
use channel::BoxFuture;
use futures::{SinkExt, StreamExt};
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::protocol::Message;
use transport::ws::WsStream;

const TRACE_LOG_MAX_BYTES: usize = 1024;
const MAX_INPUT_AUDIO_CHUNK_BYTES: usize = 15 * 1024 * 1024;
const TRACE_TRUNCATE_SUFFIX: &str = "... (truncated)";

/// A WebSocket connection to the realtime voice service.
///
/// Thread safety: `RealtimeClient` is `Send` but not `Sync` because the underlying
/// WebSocket stream is not `Sync`. Split it to share the sending half.
#[must_use]
pub struct RealtimeClient {
    stream: WsStream,
}

impl RealtimeClient {
    /// Connect to the realtime endpoint derived from `endpoint`.
    ///
    /// # Errors
    /// Returns an error if the connection fails or if the URL is invalid.
    pub async fn connect(endpoint: &str, api_key: &str, model: &str) -> Result<Self> {
        let stream = transport::ws::connect(endpoint, api_key, model).await?;
        Ok(Self { stream })
    }

    /// Send a client event to the server.
    ///
    /// # Errors
    /// Returns an error if validation or serialization fails, or if the WebSocket send fails.
    pub async fn send(&mut self, event: ClientEvent) -> Result<()> {
        let text = encode_client_event(&event)?;
        self.stream.send(Message::Text(text.into())).await?;
        Ok(())
    }

    /// Receive the next server event, skipping frames that are not JSON.
    ///
    /// # Errors
    /// Returns an error if the WebSocket fails.
    pub async fn next_event(&mut self) -> Result<Option<ServerEvent>> {
        while let Some(msg) = self.stream.next().await {
            match decode_frame(msg?) {
                Frame::Event(event) => return Ok(Some(event)),
                Frame::Closed => return Ok(None),
                Frame::Skip => {}
            }
        }
        Ok(None)
    }

    /// Split the client into a sender and a receiver for concurrent usage.
    pub fn split(self) -> (RealtimeSender, RealtimeReceiver) {
        let (write, read) = self.stream.split();
        (RealtimeSender { write: Mutex::new(write) }, RealtimeReceiver { read })
    }
}

enum Frame {
    Event(ServerEvent),
    Closed,
    Skip,
}

fn decode_frame(msg: Message) -> Frame {
    match msg {
        Message::Text(text) => {
            tracing::trace!("Received event: {}", safe_truncate(&text, TRACE_LOG_MAX_BYTES));
            match serde_json::from_str::<ServerEvent>(&text) {
                Ok(event) => Frame::Event(event),
                Err(err) => {
                    tracing::warn!(error = %err, "Skipping upstream frame that is not valid JSON");
                    Frame::Skip
                }
            }
        }
        Message::Close(frame) => {
            tracing::info!(?frame, "WebSocket connection closed by server");
            Frame::Closed
        }
        _ => Frame::Skip,
    }
}

#[allow(clippy::result_large_err)]
fn encode_client_event(event: &ClientEvent) -> Result<String> {
    validate_client_event(event)?;
    let json = serde_json::to_string(event)?;
    tracing::trace!("Sending event: {}", safe_truncate(&json, TRACE_LOG_MAX_BYTES));
    Ok(json)
}

/// Truncate `s` to at most `max_bytes` on a char boundary, for log output.
#[must_use]
pub fn safe_truncate(s: &str, max_bytes: usize) -> std::borrow::Cow<'_, str> {
    if s.len() <= max_bytes {
        return std::borrow::Cow::Borrowed(s);
    }

    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    std::borrow::Cow::Owned(format!(
        "{} {} {} bytes",
        &s[..end],
        TRACE_TRUNCATE_SUFFIX,
        s.len() - end
    ))
}

/// The sending half of a split `RealtimeClient`, shareable across tasks.
pub struct RealtimeSender {
    write: Mutex<futures::stream::SplitSink<WsStream, Message>>,
}

impl UpstreamSender for RealtimeSender {
    fn send(&self, event: ClientEvent) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let text = encode_client_event(&event)?;
            self.write.lock().await.send(Message::Text(text.into())).await?;
            Ok(())
        })
    }

    fn close(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let mut write = self.write.lock().await;
            match write.close().await {
                Ok(())
                | Err(
                    tokio_tungstenite::tungstenite::Error::ConnectionClosed
                    | tokio_tungstenite::tungstenite::Error::AlreadyClosed,
                ) => Ok(()),
                Err(err) => Err(err.into()),
            }
        })
    }
}

/// The receiving half of a split `RealtimeClient`.
pub struct RealtimeReceiver {
    read: futures::stream::SplitStream<WsStream>,
}

impl UpstreamReceiver for RealtimeReceiver {
    fn next_event(&mut self) -> BoxFuture<'_, Result<Option<ServerEvent>>> {
        Box::pin(async move {
            while let Some(msg) = self.read.next().await {
                match decode_frame(msg?) {
                    Frame::Event(event) => return Ok(Some(event)),
                    Frame::Closed => return Ok(None),
                    Frame::Skip => {}
                }
            }
            Ok(None)
        })
    }
}

#[allow(clippy::result_large_err)]
fn validate_client_event(event: &ClientEvent) -> Result<()> {
    if let ClientEvent::InputAudioBufferAppend { audio, .. } = event {
        if audio.len() % 4 != 0 {
            return Err(Error::InvalidClientEvent(
                "input_audio_buffer.append invalid base64 length".to_string(),
            ));
        }
        let size = decoded_len_estimate(audio.len());
        if size > MAX_INPUT_AUDIO_CHUNK_BYTES {
            return Err(Error::InvalidClientEvent(format!(
                "input_audio_buffer.append exceeds 15MB ({size} bytes)",
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_respects_char_boundaries() {
        let text = "ação".repeat(10);
        let out = safe_truncate(&text, 3);
        assert!(out.starts_with('a'));
        assert!(out.contains(TRACE_TRUNCATE_SUFFIX));
        assert_eq!(safe_truncate("short", 16), "short");
    }

    #[test]
    fn oversized_audio_is_rejected() {
        let audio = "A".repeat((MAX_INPUT_AUDIO_CHUNK_BYTES / 3 + 4) * 4);
        let err = validate_client_event(&ClientEvent::InputAudioBufferAppend { event_id: None, audio })
            .unwrap_err();
        assert!(matches!(err, Error::InvalidClientEvent(_)));
    }

    #[test]
    fn ordinary_audio_passes() {
        let event = ClientEvent::InputAudioBufferAppend { event_id: None, audio: "AAAA".to_string() };
        assert!(validate_client_event(&event).is_ok());
        assert!(validate_client_event(&ClientEvent::ResponseCreate { event_id: None }).is_ok());
    }

    #[test]
    fn malformed_base64_length_is_rejected() {
        let event = ClientEvent::InputAudioBufferAppend { event_id: None, audio: "AAA".to_string() };
        assert!(validate_client_event(&event).is_err());
    }

    #[test]
    fn non_json_frames_are_skipped() {
        assert!(matches!(decode_frame(Message::Text("not json".into())), Frame::Skip));
        match decode_frame(Message::Text(r#"{"type":"brand.new"}"#.into())) {
            Frame::Event(evt) => assert_eq!(evt.event_type(), "brand.new"),
            _ => panic!("expected an event"),
        }
        assert!(matches!(decode_frame(Message::Close(None)), Frame::Closed));
    }
}
