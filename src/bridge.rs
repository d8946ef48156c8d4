//! Routes frontend control messages to upstream voice sessions.

use crate::config::VoiceLiveConfig;
use crate::events::{Notifier, OutboundEvent};
use crate::registry::{ClientNotifier, ClientRegistry};
use crate::session::{ClientSession, Connector, UpstreamConfig};
use crate::tools::ToolRegistry;
use crate::transport::ws::realtime_url;
use crate::{Error, Result};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

/// Optional overrides sent with `start_session`.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct StartConfig {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub voice: Option<String>,
}

/// Messages accepted from the frontend socket.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundMessage {
    StartSession {
        #[serde(default)]
        config: StartConfig,
    },
    StopSession,
    SendAudio {
        audio: String,
    },
    Interrupt,
}

pub struct SessionBridge {
    registry: Arc<ClientRegistry>,
    settings: VoiceLiveConfig,
    tools: Arc<ToolRegistry>,
    connector: Arc<dyn Connector>,
}

impl SessionBridge {
    #[must_use]
    pub fn new(
        registry: Arc<ClientRegistry>,
        settings: VoiceLiveConfig,
        tools: Arc<ToolRegistry>,
        connector: Arc<dyn Connector>,
    ) -> Self {
        Self { registry, settings, tools, connector }
    }

    #[must_use]
    pub const fn registry(&self) -> &Arc<ClientRegistry> {
        &self.registry
    }

    /// Parse one text frame from the frontend and act on it.
    pub async fn handle_frontend_message(&self, client_id: &str, text: &str) {
        let value: Value = match serde_json::from_str(text) {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!(client_id, error = %err, "Ignoring malformed frontend message");
                return;
            }
        };
        match InboundMessage::deserialize(&value) {
            Ok(message) => self.dispatch(client_id, message).await,
            Err(err) => {
                let message_type = value.get("type").and_then(Value::as_str).unwrap_or_default();
                tracing::warn!(client_id, message_type, error = %err, "Unknown message type");
            }
        }
    }

    pub async fn dispatch(&self, client_id: &str, message: InboundMessage) {
        match message {
            InboundMessage::StartSession { config } => self.start_session(client_id, config).await,
            InboundMessage::StopSession => self.stop_session(client_id).await,
            InboundMessage::SendAudio { audio } => self.handle_audio(client_id, audio).await,
            InboundMessage::Interrupt => self.interrupt(client_id).await,
        }
    }

    /// Start (or restart) the client's voice session. Failures are reported
    /// as `session_error` and leave no session behind.
    pub async fn start_session(&self, client_id: &str, config: StartConfig) {
        if let Err(err) = self.try_start(client_id, config).await {
            tracing::error!(client_id, error = %err, "Failed to start voice session");
            self.registry.send(client_id, &OutboundEvent::session_error(&err)).await;
        }
    }

    async fn try_start(&self, client_id: &str, config: StartConfig) -> Result<()> {
        let upstream = self.upstream_config(config).await?;

        if let Some(previous) = self.registry.remove_session(client_id) {
            tracing::info!(client_id, "Replacing existing voice session");
            previous.release().await;
        }

        let session = Arc::new(ClientSession::new(client_id, &upstream.model, &upstream.voice));
        self.registry.insert_session(Arc::clone(&session));
        self.registry
            .send(
                client_id,
                &OutboundEvent::session_started(&session.model, &session.voice, self.tools.len()),
            )
            .await;

        let notifier: Arc<dyn Notifier> = Arc::new(ClientNotifier::new(Arc::clone(&self.registry), client_id));
        let runner = session.runner(upstream, Arc::clone(&self.tools), notifier);
        let task = tokio::spawn(runner.run(Arc::clone(&self.connector)));
        session.attach_task(task.abort_handle());

        // The client may have gone away while the session was being set up.
        let still_current = self
            .registry
            .session(client_id)
            .is_some_and(|current| Arc::ptr_eq(&current, &session));
        if !still_current {
            session.release().await;
            return Ok(());
        }

        tracing::info!(client_id, model = %session.model, voice = %session.voice, "Voice session started");
        Ok(())
    }

    async fn upstream_config(&self, config: StartConfig) -> Result<UpstreamConfig> {
        let missing = || Error::Configuration("Missing Azure VoiceLive configuration".to_string());
        let endpoint = self.settings.endpoint.clone().ok_or_else(missing)?;
        let api_key = self.settings.api_key.clone().ok_or_else(missing)?;

        let model = config
            .model
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| self.settings.model.clone());
        let voice = config
            .voice
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| self.settings.voice.clone());

        realtime_url(&endpoint, &model)
            .map_err(|err| Error::Configuration(format!("Invalid VoiceLive endpoint {endpoint}: {err}")))?;

        let path = &self.settings.instructions_path;
        let instructions = tokio::fs::read_to_string(path).await.map_err(|err| {
            Error::Configuration(format!("Cannot read instructions from {}: {err}", path.display()))
        })?;

        Ok(UpstreamConfig {
            endpoint,
            api_key,
            model,
            voice,
            instructions,
            call_timeout: self.settings.tool_call_timeout,
        })
    }

    /// Tear down the client's session and confirm with `session_stopped`.
    pub async fn stop_session(&self, client_id: &str) {
        let Some(session) = self.registry.remove_session(client_id) else {
            tracing::debug!(client_id, "No voice session to stop");
            return;
        };
        session.release().await;
        self.registry.send(client_id, &OutboundEvent::session_stopped()).await;
        tracing::info!(client_id, "Voice session stopped");
    }

    /// Forward a base64 PCM chunk; dropped when no upstream is connected.
    pub async fn handle_audio(&self, client_id: &str, audio: String) {
        let Some(upstream) = self.registry.session(client_id).and_then(|s| s.upstream()) else {
            return;
        };
        if let Err(err) = upstream.append_audio(audio).await {
            tracing::error!(client_id, error = %err, "Error handling audio input");
        }
    }

    /// Cancel the in-flight assistant response.
    pub async fn interrupt(&self, client_id: &str) {
        let Some(upstream) = self.registry.session(client_id).and_then(|s| s.upstream()) else {
            return;
        };
        match upstream.cancel_response().await {
            Ok(()) => {
                self.registry.send(client_id, &OutboundEvent::assistant_interrupted()).await;
            }
            Err(err) => tracing::error!(client_id, error = %err, "Error interrupting assistant"),
        }
    }

    pub async fn disconnect(&self, client_id: &str) {
        self.registry.disconnect(client_id).await;
    }

    /// Stop every session and tell every client.
    pub async fn shutdown(&self) {
        for client_id in self.registry.session_ids() {
            if let Some(session) = self.registry.remove_session(&client_id) {
                session.release().await;
            }
        }
        self.registry.broadcast(&OutboundEvent::session_stopped()).await;
        tracing::info!("All voice sessions stopped");
    }
}
