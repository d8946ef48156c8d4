//! Notifications sent to the frontend.
//!
//! Every event is a flat JSON object with a `type` tag and a `timestamp` in
//! float seconds since the Unix epoch.

use crate::channel::BoxFuture;
use crate::protocol::models::Item;
use crate::protocol::server_events::ServerEvent;
use serde::{Deserialize, Serialize};

/// Sink for frontend notifications. Delivery is best-effort.
pub trait Notifier: Send + Sync {
    fn notify(&self, event: OutboundEvent) -> BoxFuture<'_, ()>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundEvent {
    #[serde(flatten)]
    pub kind: OutboundKind,
    pub timestamp: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundKind {
    SessionStarted {
        status: String,
        message: String,
        config: SessionInfo,
    },
    SessionStopped {
        status: String,
    },
    SessionError {
        error: String,
    },
    AssistantInterrupted {
        status: String,
    },
    ToolCallStarted {
        function_name: String,
        call_id: String,
    },
    ToolCallArguments {
        function_name: String,
        call_id: String,
        arguments: String,
    },
    ToolCallExecuting {
        function_name: String,
        call_id: String,
    },
    ToolCallCompleted {
        function_name: String,
        call_id: String,
        result: String,
        /// Seconds.
        execution_time: f64,
    },
    ToolCallError {
        function_name: String,
        call_id: String,
        error: String,
    },
    VoiceEvent {
        event_type: String,
        data: EventSummary,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub model: String,
    pub voice: String,
    pub tools_count: usize,
}

const SUCCESS: &str = "success";

impl OutboundEvent {
    #[must_use]
    pub fn new(kind: OutboundKind) -> Self {
        Self { kind, timestamp: unix_timestamp() }
    }

    #[must_use]
    pub fn session_started(model: &str, voice: &str, tools_count: usize) -> Self {
        Self::new(OutboundKind::SessionStarted {
            status: SUCCESS.to_string(),
            message: "Voice session initialized".to_string(),
            config: SessionInfo {
                model: model.to_string(),
                voice: voice.to_string(),
                tools_count,
            },
        })
    }

    #[must_use]
    pub fn session_stopped() -> Self {
        Self::new(OutboundKind::SessionStopped { status: SUCCESS.to_string() })
    }

    #[must_use]
    pub fn session_error(error: impl std::fmt::Display) -> Self {
        Self::new(OutboundKind::SessionError { error: error.to_string() })
    }

    #[must_use]
    pub fn assistant_interrupted() -> Self {
        Self::new(OutboundKind::AssistantInterrupted { status: SUCCESS.to_string() })
    }

    #[must_use]
    pub fn tool_call_started(function_name: &str, call_id: &str) -> Self {
        Self::new(OutboundKind::ToolCallStarted {
            function_name: function_name.to_string(),
            call_id: call_id.to_string(),
        })
    }

    #[must_use]
    pub fn tool_call_arguments(function_name: &str, call_id: &str, arguments: &str) -> Self {
        Self::new(OutboundKind::ToolCallArguments {
            function_name: function_name.to_string(),
            call_id: call_id.to_string(),
            arguments: arguments.to_string(),
        })
    }

    #[must_use]
    pub fn tool_call_executing(function_name: &str, call_id: &str) -> Self {
        Self::new(OutboundKind::ToolCallExecuting {
            function_name: function_name.to_string(),
            call_id: call_id.to_string(),
        })
    }

    #[must_use]
    pub fn tool_call_completed(function_name: &str, call_id: &str, result: &str, execution_time: f64) -> Self {
        Self::new(OutboundKind::ToolCallCompleted {
            function_name: function_name.to_string(),
            call_id: call_id.to_string(),
            result: result.to_string(),
            execution_time,
        })
    }

    #[must_use]
    pub fn tool_call_error(function_name: &str, call_id: &str, error: impl std::fmt::Display) -> Self {
        Self::new(OutboundKind::ToolCallError {
            function_name: function_name.to_string(),
            call_id: call_id.to_string(),
            error: error.to_string(),
        })
    }

    /// Mirror an upstream event for the frontend transcript.
    #[must_use]
    pub fn voice_event(event: &ServerEvent) -> Self {
        let data = EventSummary::from_event(event);
        Self {
            timestamp: data.timestamp,
            kind: OutboundKind::VoiceEvent { event_type: data.event_type.clone(), data },
        }
    }

    /// The wire `type` tag.
    #[must_use]
    pub const fn event_type(&self) -> &'static str {
        match self.kind {
            OutboundKind::SessionStarted { .. } => "session_started",
            OutboundKind::SessionStopped { .. } => "session_stopped",
            OutboundKind::SessionError { .. } => "session_error",
            OutboundKind::AssistantInterrupted { .. } => "assistant_interrupted",
            OutboundKind::ToolCallStarted { .. } => "tool_call_started",
            OutboundKind::ToolCallArguments { .. } => "tool_call_arguments",
            OutboundKind::ToolCallExecuting { .. } => "tool_call_executing",
            OutboundKind::ToolCallCompleted { .. } => "tool_call_completed",
            OutboundKind::ToolCallError { .. } => "tool_call_error",
            OutboundKind::VoiceEvent { .. } => "voice_event",
        }
    }
}

/// Seconds since the Unix epoch, with microsecond resolution.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn unix_timestamp() -> f64 {
    chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

/// Compact view of an upstream event. Audio payloads are never forwarded.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EventSummary {
    #[serde(rename = "type")]
    pub event_type: String,
    pub timestamp: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_audio: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item: Option<ItemSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcript: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemSummary {
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub item_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorSummary {
    pub message: String,
    pub code: Option<String>,
}

impl ItemSummary {
    fn from_item(item: &Item) -> Self {
        let (name, call_id) = match item {
            Item::FunctionCall { name, call_id, .. } => (Some(name.clone()), Some(call_id.clone())),
            Item::FunctionCallOutput { call_id, .. } => (None, Some(call_id.clone())),
            Item::Message { .. } | Item::Unknown(_) => (None, None),
        };
        Self {
            id: item.id().map(str::to_string),
            item_type: item.kind().to_string(),
            name,
            call_id,
        }
    }
}

impl EventSummary {
    #[must_use]
    pub fn from_event(event: &ServerEvent) -> Self {
        let mut summary = Self {
            event_type: event.event_type().to_string(),
            timestamp: unix_timestamp(),
            ..Self::default()
        };

        match event {
            ServerEvent::SessionCreated { session, .. } | ServerEvent::SessionUpdated { session, .. } => {
                summary.session_id = Some(session.id.clone());
            }
            ServerEvent::ConversationItemCreated { item, .. } => {
                summary.item = Some(ItemSummary::from_item(item));
            }
            ServerEvent::Error { error, .. } => {
                summary.error = Some(ErrorSummary {
                    message: error.message.clone(),
                    code: error.code.clone(),
                });
            }
            ServerEvent::InputAudioTranscriptionCompleted { transcript, .. } => {
                summary.transcript = Some(transcript.clone());
            }
            ServerEvent::ResponseCreated { response, .. } | ServerEvent::ResponseDone { response, .. } => {
                summary.response_id = Some(response.id.clone());
            }
            ServerEvent::ResponseTextDelta { response_id, delta, .. } => {
                summary.response_id = Some(response_id.clone());
                summary.text = Some(delta.clone());
            }
            ServerEvent::ResponseAudioDelta { response_id, delta, .. } => {
                summary.response_id = Some(response_id.clone());
                summary.has_audio = Some(true);
                summary.audio_length = Some(delta.len());
            }
            ServerEvent::ResponseAudioTranscriptDone { response_id, transcript, .. } => {
                summary.response_id = Some(response_id.clone());
                summary.transcript = Some(transcript.clone());
            }
            ServerEvent::ResponseAudioDone { response_id, .. }
            | ServerEvent::ResponseAudioTranscriptDelta { response_id, .. }
            | ServerEvent::ResponseFunctionCallArgumentsDelta { response_id, .. }
            | ServerEvent::ResponseFunctionCallArgumentsDone { response_id, .. } => {
                summary.response_id = Some(response_id.clone());
            }
            ServerEvent::InputAudioBufferSpeechStarted { .. }
            | ServerEvent::InputAudioBufferSpeechStopped { .. }
            | ServerEvent::Unknown(_) => {}
        }

        summary
    }
}
