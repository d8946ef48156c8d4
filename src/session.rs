//! Upstream voice session: connection, configuration and the event loop.

use crate::channel::{BoxFuture, EventChannel, UpstreamReceiver, UpstreamSender};
use crate::events::{Notifier, OutboundEvent};
use crate::handshake::{CallTracker, FunctionCallHandler};
use crate::protocol::client_events::ClientEvent;
use crate::protocol::models::{
    AudioFormat, InputAudioTranscription, Item, Modality, SessionUpdate, ToolChoice, TurnDetection, Voice,
};
use crate::protocol::server_events::ServerEvent;
use crate::tools::ToolRegistry;
use crate::{RealtimeClient, Result};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;
use tokio::task::AbortHandle;

const TRANSCRIPTION_MODEL: &str = "whisper-1";

/// Everything needed to open one upstream session.
#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    pub endpoint: String,
    pub api_key: String,
    pub model: String,
    pub voice: String,
    pub instructions: String,
    pub call_timeout: Duration,
}

pub type UpstreamHalves = (Arc<dyn UpstreamSender>, Box<dyn UpstreamReceiver>);

/// Opens upstream connections.
pub trait Connector: Send + Sync {
    fn connect<'a>(&'a self, config: &'a UpstreamConfig) -> BoxFuture<'a, Result<UpstreamHalves>>;
}

/// Connects over WebSocket to the realtime endpoint.
#[derive(Debug, Default, Clone, Copy)]
pub struct WsConnector;

impl Connector for WsConnector {
    fn connect<'a>(&'a self, config: &'a UpstreamConfig) -> BoxFuture<'a, Result<UpstreamHalves>> {
        Box::pin(async move {
            let client = RealtimeClient::connect(&config.endpoint, &config.api_key, &config.model).await?;
            let (sender, receiver) = client.split();
            Ok((Arc::new(sender) as Arc<dyn UpstreamSender>, Box::new(receiver) as Box<dyn UpstreamReceiver>))
        })
    }
}

/// Control surface of a connected upstream session.
#[derive(Clone)]
pub struct SessionHandle {
    sender: Arc<dyn UpstreamSender>,
}

impl SessionHandle {
    #[must_use]
    pub fn new(sender: Arc<dyn UpstreamSender>) -> Self {
        Self { sender }
    }

    /// # Errors
    /// Returns an error if the chunk is rejected or the connection is closed.
    pub async fn append_audio(&self, audio: String) -> Result<()> {
        self.sender.send(ClientEvent::InputAudioBufferAppend { event_id: None, audio }).await
    }

    /// # Errors
    /// Returns an error if the connection is closed.
    pub async fn cancel_response(&self) -> Result<()> {
        self.sender.send(ClientEvent::ResponseCancel { event_id: None, response_id: None }).await
    }

    /// # Errors
    /// Returns an error if the connection is closed.
    pub async fn create_item(&self, previous_item_id: Option<String>, item: Item) -> Result<()> {
        self.sender
            .send(ClientEvent::ConversationItemCreate { event_id: None, previous_item_id, item: Box::new(item) })
            .await
    }

    /// # Errors
    /// Returns an error if the connection is closed.
    pub async fn create_response(&self) -> Result<()> {
        self.sender.send(ClientEvent::ResponseCreate { event_id: None }).await
    }

    /// Drop buffered input audio and close the connection.
    ///
    /// # Errors
    /// Returns an error if closing fails; a failed buffer clear is only logged.
    pub async fn release(&self) -> Result<()> {
        if let Err(err) = self.sender.send(ClientEvent::InputAudioBufferClear { event_id: None }).await {
            tracing::debug!(error = %err, "Could not clear input audio buffer");
        }
        self.sender.close().await
    }
}

/// Upstream handle, absent until the connection is open.
#[derive(Clone, Default)]
pub struct UpstreamSlot(Arc<RwLock<Option<SessionHandle>>>);

impl UpstreamSlot {
    pub fn attach(&self, handle: SessionHandle) {
        *self.0.write().unwrap_or_else(PoisonError::into_inner) = Some(handle);
    }

    #[must_use]
    pub fn get(&self) -> Option<SessionHandle> {
        self.0.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn take(&self) -> Option<SessionHandle> {
        self.0.write().unwrap_or_else(PoisonError::into_inner).take()
    }
}

/// Per-client voice session state.
pub struct ClientSession {
    pub client_id: String,
    pub model: String,
    pub voice: String,
    upstream: UpstreamSlot,
    tracker: CallTracker,
    task: Mutex<Option<AbortHandle>>,
}

impl ClientSession {
    #[must_use]
    pub fn new(client_id: &str, model: &str, voice: &str) -> Self {
        Self {
            client_id: client_id.to_string(),
            model: model.to_string(),
            voice: voice.to_string(),
            upstream: UpstreamSlot::default(),
            tracker: CallTracker::new(),
            task: Mutex::new(None),
        }
    }

    pub fn attach_upstream(&self, handle: SessionHandle) {
        self.upstream.attach(handle);
    }

    /// The upstream handle once the connection has opened.
    #[must_use]
    pub fn upstream(&self) -> Option<SessionHandle> {
        self.upstream.get()
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.upstream.get().is_some()
    }

    #[must_use]
    pub const fn tracker(&self) -> &CallTracker {
        &self.tracker
    }

    pub fn attach_task(&self, handle: AbortHandle) {
        *self.task.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
    }

    /// Build the run loop for this session.
    #[must_use]
    pub fn runner(&self, config: UpstreamConfig, tools: Arc<ToolRegistry>, notifier: Arc<dyn Notifier>) -> SessionRunner {
        SessionRunner {
            client_id: self.client_id.clone(),
            config,
            tools,
            notifier,
            tracker: self.tracker.clone(),
            upstream: self.upstream.clone(),
        }
    }

    /// Release call state and audio resources, then stop the run loop.
    pub async fn release(&self) {
        if let Some(handle) = self.upstream.take() {
            if let Err(err) = handle.release().await {
                tracing::debug!(client_id = %self.client_id, error = %err, "Upstream close failed");
            }
        }
        if let Some(task) = self.task.lock().unwrap_or_else(PoisonError::into_inner).take() {
            task.abort();
        }
        self.tracker.clear();
    }
}

/// Run loop of one upstream session.
pub struct SessionRunner {
    client_id: String,
    config: UpstreamConfig,
    tools: Arc<ToolRegistry>,
    notifier: Arc<dyn Notifier>,
    tracker: CallTracker,
    upstream: UpstreamSlot,
}

impl SessionRunner {
    /// Connect, configure and process upstream events until the connection ends.
    ///
    /// Failures are reported to the frontend as `session_error`.
    pub async fn run(self, connector: Arc<dyn Connector>) {
        match self.process(connector.as_ref()).await {
            Ok(()) => tracing::info!(client_id = %self.client_id, "Upstream session closed"),
            Err(err) => {
                tracing::error!(client_id = %self.client_id, error = %err, "Upstream session failed");
                self.notifier.notify(OutboundEvent::session_error(&err)).await;
            }
        }
        self.upstream.take();
    }

    async fn process(&self, connector: &dyn Connector) -> Result<()> {
        let (sender, receiver) = connector.connect(&self.config).await?;
        let mut channel = EventChannel::new(sender, receiver).with_mirror(Arc::clone(&self.notifier));

        channel
            .send(ClientEvent::SessionUpdate { event_id: None, session: Box::new(self.session_update()?) })
            .await?;
        self.upstream.attach(SessionHandle::new(channel.sender()));
        tracing::info!(client_id = %self.client_id, model = %self.config.model, "Upstream session configured");

        let handler = FunctionCallHandler::new(
            Arc::clone(&self.tools),
            Arc::clone(&self.notifier),
            self.tracker.clone(),
            self.config.call_timeout,
        );

        while let Some(event) = channel.receive().await? {
            match event {
                ServerEvent::ConversationItemCreated { item, .. } => match &item {
                    Item::FunctionCall { .. } => {
                        handler.handle(&mut channel, &item).await;
                    }
                    Item::Unknown(raw) if item.kind() == "function_call" => {
                        tracing::warn!(client_id = %self.client_id, item = %raw, "Malformed function call item");
                    }
                    _ => {}
                },
                ServerEvent::SessionCreated { session, .. } | ServerEvent::SessionUpdated { session, .. } => {
                    tracing::debug!(client_id = %self.client_id, session_id = %session.id, "Session ready");
                }
                ServerEvent::Error { error, .. } => {
                    tracing::warn!(
                        client_id = %self.client_id,
                        code = ?error.code,
                        message = %error.message,
                        "Upstream reported an error"
                    );
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// The `session.update` sent right after connecting.
    ///
    /// # Errors
    /// Returns an error if a tool schema fails to serialize.
    #[allow(clippy::result_large_err)]
    pub fn session_update(&self) -> Result<SessionUpdate> {
        Ok(SessionUpdate {
            instructions: Some(self.config.instructions.clone()),
            voice: Some(Voice::from(self.config.voice.as_str())),
            modalities: Some(vec![Modality::Text, Modality::Audio]),
            input_audio_format: Some(AudioFormat::Pcm16),
            output_audio_format: Some(AudioFormat::Pcm16),
            input_audio_transcription: Some(InputAudioTranscription { model: TRANSCRIPTION_MODEL.to_string() }),
            turn_detection: Some(TurnDetection::server_vad_default()),
            tools: Some(self.tools.as_tools()?),
            tool_choice: Some(ToolChoice::Auto),
        })
    }
}
