use serde::{Deserialize, Deserializer, Serialize, Serializer};
use super::models::{ArbitraryJson, Item, Response, Session};
use crate::error::ServerError;

#[derive(Debug, Clone)]
pub enum ServerEvent {
    Error {
        event_id: String,
        error: ServerError,
    },
    SessionCreated {
        event_id: String,
        session: Session,
    },
    SessionUpdated {
        event_id: String,
        session: Session,
    },
    ConversationItemCreated {
        event_id: String,
        previous_item_id: Option<String>,
        item: Item,
    },
    InputAudioBufferSpeechStarted {
        event_id: String,
        audio_start_ms: u32,
        item_id: String,
    },
    InputAudioBufferSpeechStopped {
        event_id: String,
        audio_end_ms: u32,
        item_id: String,
    },
    InputAudioTranscriptionCompleted {
        event_id: String,
        item_id: String,
        content_index: u32,
        transcript: String,
    },
    ResponseCreated {
        event_id: String,
        response: Response,
    },
    ResponseDone {
        event_id: String,
        response: Response,
    },
    ResponseTextDelta {
        event_id: String,
        response_id: String,
        item_id: String,
        output_index: u32,
        content_index: u32,
        delta: String,
    },
    ResponseAudioDelta {
        event_id: String,
        response_id: String,
        item_id: String,
        output_index: u32,
        content_index: u32,
        delta: String,
    },
    ResponseAudioDone {
        event_id: String,
        response_id: String,
        item_id: String,
        output_index: u32,
        content_index: u32,
    },
    ResponseAudioTranscriptDelta {
        event_id: String,
        response_id: String,
        item_id: String,
        output_index: u32,
        content_index: u32,
        delta: String,
    },
    ResponseAudioTranscriptDone {
        event_id: String,
        response_id: String,
        item_id: String,
        output_index: u32,
        content_index: u32,
        transcript: String,
    },
    ResponseFunctionCallArgumentsDelta {
        event_id: String,
        response_id: String,
        item_id: String,
        output_index: u32,
        call_id: String,
        delta: String,
    },
    ResponseFunctionCallArgumentsDone {
        event_id: String,
        response_id: String,
        item_id: String,
        output_index: u32,
        call_id: String,
        name: Option<String>,
        arguments: String,
    },
    Unknown(ArbitraryJson),
}

/// Event type discriminant, used to express what a waiter is looking for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Error,
    SessionCreated,
    SessionUpdated,
    ConversationItemCreated,
    InputAudioBufferSpeechStarted,
    InputAudioBufferSpeechStopped,
    InputAudioTranscriptionCompleted,
    ResponseCreated,
    ResponseDone,
    ResponseTextDelta,
    ResponseAudioDelta,
    ResponseAudioDone,
    ResponseAudioTranscriptDelta,
    ResponseAudioTranscriptDone,
    ResponseFunctionCallArgumentsDelta,
    ResponseFunctionCallArgumentsDone,
    Unknown,
}

impl EventKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::SessionCreated => "session.created",
            Self::SessionUpdated => "session.updated",
            Self::ConversationItemCreated => "conversation.item.created",
            Self::InputAudioBufferSpeechStarted => "input_audio_buffer.speech_started",
            Self::InputAudioBufferSpeechStopped => "input_audio_buffer.speech_stopped",
            Self::InputAudioTranscriptionCompleted => "conversation.item.input_audio_transcription.completed",
            Self::ResponseCreated => "response.created",
            Self::ResponseDone => "response.done",
            Self::ResponseTextDelta => "response.text.delta",
            Self::ResponseAudioDelta => "response.audio.delta",
            Self::ResponseAudioDone => "response.audio.done",
            Self::ResponseAudioTranscriptDelta => "response.audio_transcript.delta",
            Self::ResponseAudioTranscriptDone => "response.audio_transcript.done",
            Self::ResponseFunctionCallArgumentsDelta => "response.function_call_arguments.delta",
            Self::ResponseFunctionCallArgumentsDone => "response.function_call_arguments.done",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type")]
enum ServerEventRepr {
    #[serde(rename = "error")]
    Error {
        #[serde(default)]
        event_id: String,
        error: ServerError,
    },
    #[serde(rename = "session.created")]
    SessionCreated {
        #[serde(default)]
        event_id: String,
        session: Session,
    },
    #[serde(rename = "session.updated")]
    SessionUpdated {
        #[serde(default)]
        event_id: String,
        session: Session,
    },
    #[serde(rename = "conversation.item.created")]
    ConversationItemCreated {
        #[serde(default)]
        event_id: String,
        #[serde(default)]
        previous_item_id: Option<String>,
        item: Item,
    },
    #[serde(rename = "input_audio_buffer.speech_started")]
    InputAudioBufferSpeechStarted {
        #[serde(default)]
        event_id: String,
        #[serde(default)]
        audio_start_ms: u32,
        #[serde(default)]
        item_id: String,
    },
    #[serde(rename = "input_audio_buffer.speech_stopped")]
    InputAudioBufferSpeechStopped {
        #[serde(default)]
        event_id: String,
        #[serde(default)]
        audio_end_ms: u32,
        #[serde(default)]
        item_id: String,
    },
    #[serde(rename = "conversation.item.input_audio_transcription.completed")]
    InputAudioTranscriptionCompleted {
        #[serde(default)]
        event_id: String,
        item_id: String,
        #[serde(default)]
        content_index: u32,
        transcript: String,
    },
    #[serde(rename = "response.created")]
    ResponseCreated {
        #[serde(default)]
        event_id: String,
        response: Response,
    },
    #[serde(rename = "response.done")]
    ResponseDone {
        #[serde(default)]
        event_id: String,
        response: Response,
    },
    #[serde(rename = "response.text.delta")]
    ResponseTextDelta {
        #[serde(default)]
        event_id: String,
        response_id: String,
        item_id: String,
        #[serde(default)]
        output_index: u32,
        #[serde(default)]
        content_index: u32,
        delta: String,
    },
    #[serde(rename = "response.audio.delta")]
    ResponseAudioDelta {
        #[serde(default)]
        event_id: String,
        response_id: String,
        item_id: String,
        #[serde(default)]
        output_index: u32,
        #[serde(default)]
        content_index: u32,
        delta: String,
    },
    #[serde(rename = "response.audio.done")]
    ResponseAudioDone {
        #[serde(default)]
        event_id: String,
        response_id: String,
        item_id: String,
        #[serde(default)]
        output_index: u32,
        #[serde(default)]
        content_index: u32,
    },
    #[serde(rename = "response.audio_transcript.delta")]
    ResponseAudioTranscriptDelta {
        #[serde(default)]
        event_id: String,
        response_id: String,
        item_id: String,
        #[serde(default)]
        output_index: u32,
        #[serde(default)]
        content_index: u32,
        delta: String,
    },
    #[serde(rename = "response.audio_transcript.done")]
    ResponseAudioTranscriptDone {
        #[serde(default)]
        event_id: String,
        response_id: String,
        item_id: String,
        #[serde(default)]
        output_index: u32,
        #[serde(default)]
        content_index: u32,
        transcript: String,
    },
    #[serde(rename = "response.function_call_arguments.delta")]
    ResponseFunctionCallArgumentsDelta {
        #[serde(default)]
        event_id: String,
        response_id: String,
        item_id: String,
        #[serde(default)]
        output_index: u32,
        call_id: String,
        delta: String,
    },
    #[serde(rename = "response.function_call_arguments.done")]
    ResponseFunctionCallArgumentsDone {
        #[serde(default)]
        event_id: String,
        response_id: String,
        item_id: String,
        #[serde(default)]
        output_index: u32,
        call_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        arguments: String,
    },
}

impl From<ServerEventRepr> for ServerEvent {
    fn from(repr: ServerEventRepr) -> Self {
        match repr {
            ServerEventRepr::Error { event_id, error } => Self::Error { event_id, error },
            ServerEventRepr::SessionCreated { event_id, session } => Self::SessionCreated { event_id, session },
            ServerEventRepr::SessionUpdated { event_id, session } => Self::SessionUpdated { event_id, session },
            ServerEventRepr::ConversationItemCreated { event_id, previous_item_id, item } => Self::ConversationItemCreated { event_id, previous_item_id, item },
            ServerEventRepr::InputAudioBufferSpeechStarted { event_id, audio_start_ms, item_id } => Self::InputAudioBufferSpeechStarted { event_id, audio_start_ms, item_id },
            ServerEventRepr::InputAudioBufferSpeechStopped { event_id, audio_end_ms, item_id } => Self::InputAudioBufferSpeechStopped { event_id, audio_end_ms, item_id },
            ServerEventRepr::InputAudioTranscriptionCompleted { event_id, item_id, content_index, transcript } => Self::InputAudioTranscriptionCompleted { event_id, item_id, content_index, transcript },
            ServerEventRepr::ResponseCreated { event_id, response } => Self::ResponseCreated { event_id, response },
            ServerEventRepr::ResponseDone { event_id, response } => Self::ResponseDone { event_id, response },
            ServerEventRepr::ResponseTextDelta { event_id, response_id, item_id, output_index, content_index, delta } => Self::ResponseTextDelta { event_id, response_id, item_id, output_index, content_index, delta },
            ServerEventRepr::ResponseAudioDelta { event_id, response_id, item_id, output_index, content_index, delta } => Self::ResponseAudioDelta { event_id, response_id, item_id, output_index, content_index, delta },
            ServerEventRepr::ResponseAudioDone { event_id, response_id, item_id, output_index, content_index } => Self::ResponseAudioDone { event_id, response_id, item_id, output_index, content_index },
            ServerEventRepr::ResponseAudioTranscriptDelta { event_id, response_id, item_id, output_index, content_index, delta } => Self::ResponseAudioTranscriptDelta { event_id, response_id, item_id, output_index, content_index, delta },
            ServerEventRepr::ResponseAudioTranscriptDone { event_id, response_id, item_id, output_index, content_index, transcript } => Self::ResponseAudioTranscriptDone { event_id, response_id, item_id, output_index, content_index, transcript },
            ServerEventRepr::ResponseFunctionCallArgumentsDelta { event_id, response_id, item_id, output_index, call_id, delta } => Self::ResponseFunctionCallArgumentsDelta { event_id, response_id, item_id, output_index, call_id, delta },
            ServerEventRepr::ResponseFunctionCallArgumentsDone { event_id, response_id, item_id, output_index, call_id, name, arguments } => Self::ResponseFunctionCallArgumentsDone { event_id, response_id, item_id, output_index, call_id, name, arguments },
        }
    }
}

impl Serialize for ServerEvent {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if let Self::Unknown(value) = self {
            value.serialize(serializer)
        } else {
            let repr = match self.clone() {
                Self::Error { event_id, error } => ServerEventRepr::Error { event_id, error },
                Self::SessionCreated { event_id, session } => ServerEventRepr::SessionCreated { event_id, session },
                Self::SessionUpdated { event_id, session } => ServerEventRepr::SessionUpdated { event_id, session },
                Self::ConversationItemCreated { event_id, previous_item_id, item } => ServerEventRepr::ConversationItemCreated { event_id, previous_item_id, item },
                Self::InputAudioBufferSpeechStarted { event_id, audio_start_ms, item_id } => ServerEventRepr::InputAudioBufferSpeechStarted { event_id, audio_start_ms, item_id },
                Self::InputAudioBufferSpeechStopped { event_id, audio_end_ms, item_id } => ServerEventRepr::InputAudioBufferSpeechStopped { event_id, audio_end_ms, item_id },
                Self::InputAudioTranscriptionCompleted { event_id, item_id, content_index, transcript } => ServerEventRepr::InputAudioTranscriptionCompleted { event_id, item_id, content_index, transcript },
                Self::ResponseCreated { event_id, response } => ServerEventRepr::ResponseCreated { event_id, response },
                Self::ResponseDone { event_id, response } => ServerEventRepr::ResponseDone { event_id, response },
                Self::ResponseTextDelta { event_id, response_id, item_id, output_index, content_index, delta } => ServerEventRepr::ResponseTextDelta { event_id, response_id, item_id, output_index, content_index, delta },
                Self::ResponseAudioDelta { event_id, response_id, item_id, output_index, content_index, delta } => ServerEventRepr::ResponseAudioDelta { event_id, response_id, item_id, output_index, content_index, delta },
                Self::ResponseAudioDone { event_id, response_id, item_id, output_index, content_index } => ServerEventRepr::ResponseAudioDone { event_id, response_id, item_id, output_index, content_index },
                Self::ResponseAudioTranscriptDelta { event_id, response_id, item_id, output_index, content_index, delta } => ServerEventRepr::ResponseAudioTranscriptDelta { event_id, response_id, item_id, output_index, content_index, delta },
                Self::ResponseAudioTranscriptDone { event_id, response_id, item_id, output_index, content_index, transcript } => ServerEventRepr::ResponseAudioTranscriptDone { event_id, response_id, item_id, output_index, content_index, transcript },
                Self::ResponseFunctionCallArgumentsDelta { event_id, response_id, item_id, output_index, call_id, delta } => ServerEventRepr::ResponseFunctionCallArgumentsDelta { event_id, response_id, item_id, output_index, call_id, delta },
                Self::ResponseFunctionCallArgumentsDone { event_id, response_id, item_id, output_index, call_id, name, arguments } => ServerEventRepr::ResponseFunctionCallArgumentsDone { event_id, response_id, item_id, output_index, call_id, name, arguments },
                Self::Unknown(_) => unreachable!("handled above"),
            };
            repr.serialize(serializer)
        }
    }
}

impl<'de> Deserialize<'de> for ServerEvent {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = ArbitraryJson::deserialize(deserializer)?;
        match ServerEventRepr::deserialize(value.clone()) {
            Ok(repr) => Ok(repr.into()),
            Err(err) => {
                tracing::debug!("Failed to parse ServerEvent: {err}");
                Ok(Self::Unknown(value))
            }
        }
    }
}

impl ServerEvent {
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::Error { .. } => EventKind::Error,
            Self::SessionCreated { .. } => EventKind::SessionCreated,
            Self::SessionUpdated { .. } => EventKind::SessionUpdated,
            Self::ConversationItemCreated { .. } => EventKind::ConversationItemCreated,
            Self::InputAudioBufferSpeechStarted { .. } => EventKind::InputAudioBufferSpeechStarted,
            Self::InputAudioBufferSpeechStopped { .. } => EventKind::InputAudioBufferSpeechStopped,
            Self::InputAudioTranscriptionCompleted { .. } => EventKind::InputAudioTranscriptionCompleted,
            Self::ResponseCreated { .. } => EventKind::ResponseCreated,
            Self::ResponseDone { .. } => EventKind::ResponseDone,
            Self::ResponseTextDelta { .. } => EventKind::ResponseTextDelta,
            Self::ResponseAudioDelta { .. } => EventKind::ResponseAudioDelta,
            Self::ResponseAudioDone { .. } => EventKind::ResponseAudioDone,
            Self::ResponseAudioTranscriptDelta { .. } => EventKind::ResponseAudioTranscriptDelta,
            Self::ResponseAudioTranscriptDone { .. } => EventKind::ResponseAudioTranscriptDone,
            Self::ResponseFunctionCallArgumentsDelta { .. } => EventKind::ResponseFunctionCallArgumentsDelta,
            Self::ResponseFunctionCallArgumentsDone { .. } => EventKind::ResponseFunctionCallArgumentsDone,
            Self::Unknown(_) => EventKind::Unknown,
        }
    }

    /// Wire `type` tag, including the raw tag of unknown events.
    #[must_use]
    pub fn event_type(&self) -> &str {
        match self {
            Self::Unknown(value) => value.get("type").and_then(|v| v.as_str()).unwrap_or("unknown"),
            other => other.kind().as_str(),
        }
    }

    #[must_use]
    pub fn event_id(&self) -> Option<&str> {
        macro_rules! extract {
            ($($variant:ident),*) => {
                match self {
                    $(Self::$variant { event_id, .. } => Some(event_id.as_str()),)*
                    Self::Unknown(value) => value.get("event_id").and_then(|v| v.as_str()),
                }
            };
        }
        extract!(
            Error, SessionCreated, SessionUpdated, ConversationItemCreated,
            InputAudioBufferSpeechStarted, InputAudioBufferSpeechStopped,
            InputAudioTranscriptionCompleted, ResponseCreated, ResponseDone,
            ResponseTextDelta, ResponseAudioDelta, ResponseAudioDone,
            ResponseAudioTranscriptDelta, ResponseAudioTranscriptDone,
            ResponseFunctionCallArgumentsDelta, ResponseFunctionCallArgumentsDone
        )
    }
}
