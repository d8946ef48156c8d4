//! Tool-call handshake.
//!
//! A function-call item announced by the service is driven through:
//! arguments done, response done, local execution, result submission and a
//! fresh `response.create`. Each step is reported to the frontend.

use crate::channel::EventChannel;
use crate::events::{Notifier, OutboundEvent};
use crate::protocol::models::Item;
use crate::protocol::server_events::{EventKind, ServerEvent};
use crate::session::SessionHandle;
use crate::tools::ToolRegistry;
use crate::{Error, Result};
use serde_json::Value;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallStatus {
    Detected,
    ArgumentsStreaming,
    ArgumentsComplete,
    Executing,
    Completed,
    Failed,
    TimedOut,
}

#[derive(Debug, Clone)]
pub struct ToolCall {
    pub call_id: String,
    pub function_name: String,
    /// Id of the function-call item; the output item is inserted after it.
    pub item_id: Option<String>,
    /// Raw JSON text, decoded only when the tool runs.
    pub arguments: String,
    pub status: CallStatus,
    /// Calls announced while this one was live; they are refused, never run.
    pub overlapping: Vec<String>,
}

impl ToolCall {
    #[must_use]
    pub fn from_item(item: &Item) -> Option<Self> {
        match item {
            Item::FunctionCall { id, name, call_id, arguments, .. } => Some(Self {
                call_id: call_id.clone(),
                function_name: name.clone(),
                item_id: id.clone(),
                arguments: arguments.clone(),
                status: CallStatus::Detected,
                overlapping: Vec::new(),
            }),
            _ => None,
        }
    }
}

/// Tracks the single tool call a session may have in flight.
#[derive(Debug, Default, Clone)]
pub struct CallTracker {
    active: Arc<Mutex<Option<String>>>,
}

impl CallTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self) -> MutexGuard<'_, Option<String>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Mark `call_id` as in progress. The marker is released when the guard drops.
    ///
    /// # Errors
    /// Returns [`Error::ProtocolViolation`] if another call is already live.
    #[allow(clippy::result_large_err)]
    pub fn begin(&self, call_id: &str) -> Result<CallGuard> {
        let mut slot = self.slot();
        if let Some(live) = slot.as_deref() {
            return Err(Error::ProtocolViolation(format!(
                "function call {call_id} detected while {live} is still in progress"
            )));
        }
        *slot = Some(call_id.to_string());
        drop(slot);
        Ok(CallGuard { tracker: self.clone(), call_id: call_id.to_string() })
    }

    #[must_use]
    pub fn active_call(&self) -> Option<String> {
        self.slot().clone()
    }

    #[must_use]
    pub fn in_progress(&self) -> bool {
        self.slot().is_some()
    }

    /// Forget any live call.
    pub fn clear(&self) {
        self.slot().take();
    }
}

#[must_use = "the call is released as soon as the guard is dropped"]
#[derive(Debug)]
pub struct CallGuard {
    tracker: CallTracker,
    call_id: String,
}

impl Drop for CallGuard {
    fn drop(&mut self) {
        let mut slot = self.tracker.slot();
        if slot.as_deref() == Some(self.call_id.as_str()) {
            slot.take();
        }
    }
}

pub struct FunctionCallHandler {
    tools: Arc<ToolRegistry>,
    notifier: Arc<dyn Notifier>,
    tracker: CallTracker,
    timeout: Duration,
}

impl FunctionCallHandler {
    #[must_use]
    pub fn new(
        tools: Arc<ToolRegistry>,
        notifier: Arc<dyn Notifier>,
        tracker: CallTracker,
        timeout: Duration,
    ) -> Self {
        Self { tools, notifier, tracker, timeout }
    }

    /// Drive the handshake for a function-call item.
    ///
    /// Returns the call in its final state, or `None` when the item was not a
    /// well-formed function call or another call is already in flight. Errors
    /// are reported to the frontend and never propagate.
    pub async fn handle(&self, channel: &mut EventChannel, item: &Item) -> Option<ToolCall> {
        let Some(mut call) = ToolCall::from_item(item) else {
            tracing::warn!(item = %item, "Ignoring item that is not a function call");
            return None;
        };

        let _guard = match self.tracker.begin(&call.call_id) {
            Ok(guard) => guard,
            Err(err) => {
                tracing::warn!(call_id = %call.call_id, function = %call.function_name, "{err}");
                return None;
            }
        };

        tracing::info!(call_id = %call.call_id, function = %call.function_name, "Function call detected");
        self.notifier
            .notify(OutboundEvent::tool_call_started(&call.function_name, &call.call_id))
            .await;

        if !self.tools.contains(&call.function_name) {
            let err = Error::UnknownFunction(call.function_name.clone());
            tracing::error!(call_id = %call.call_id, "{err}");
            call.status = CallStatus::Failed;
            self.notifier
                .notify(OutboundEvent::tool_call_error(&call.function_name, &call.call_id, &err))
                .await;
            return Some(call);
        }

        match self.drive(channel, &mut call).await {
            Ok(()) => call.status = CallStatus::Completed,
            Err(err) => {
                let message = match &err {
                    Error::Timeout { .. } => {
                        call.status = CallStatus::TimedOut;
                        format!("Timeout waiting for function call completion for {}", call.function_name)
                    }
                    other => {
                        call.status = CallStatus::Failed;
                        other.to_string()
                    }
                };
                tracing::error!(call_id = %call.call_id, function = %call.function_name, error = %err, "Function call failed");
                self.notifier
                    .notify(OutboundEvent::tool_call_error(&call.function_name, &call.call_id, message))
                    .await;
            }
        }

        Some(call)
    }

    async fn drive(&self, channel: &mut EventChannel, call: &mut ToolCall) -> Result<()> {
        // Both waits share one deadline.
        let deadline = Instant::now() + self.timeout;

        call.status = CallStatus::ArgumentsStreaming;
        call.arguments = self.await_arguments(channel, call, deadline).await?;
        call.status = CallStatus::ArgumentsComplete;
        tracing::debug!(call_id = %call.call_id, arguments = %call.arguments, "Function arguments received");
        self.notifier
            .notify(OutboundEvent::tool_call_arguments(&call.function_name, &call.call_id, &call.arguments))
            .await;

        self.next_of(channel, call, &[EventKind::ResponseDone], deadline).await?;

        call.status = CallStatus::Executing;
        self.notifier
            .notify(OutboundEvent::tool_call_executing(&call.function_name, &call.call_id))
            .await;

        let started = Instant::now();
        let result = self
            .tools
            .invoke(&call.function_name, Value::String(call.arguments.clone()))
            .await?;
        let execution_time = started.elapsed().as_secs_f64();
        tracing::info!(call_id = %call.call_id, function = %call.function_name, execution_time, "Function executed");
        self.notifier
            .notify(OutboundEvent::tool_call_completed(&call.function_name, &call.call_id, &result, execution_time))
            .await;

        let output = Item::FunctionCallOutput {
            id: None,
            call_id: call.call_id.clone(),
            output: serde_json::to_string(&result)?,
        };
        let upstream = SessionHandle::new(channel.sender());
        upstream.create_item(call.item_id.clone(), output).await?;
        upstream.create_response().await?;
        tracing::debug!(call_id = %call.call_id, "Function result submitted");
        Ok(())
    }

    /// Wait for the arguments of this call, skipping completions for other calls.
    async fn await_arguments(&self, channel: &mut EventChannel, call: &mut ToolCall, deadline: Instant) -> Result<String> {
        loop {
            let event = self
                .next_of(channel, call, &[EventKind::ResponseFunctionCallArgumentsDone], deadline)
                .await?;
            if let ServerEvent::ResponseFunctionCallArgumentsDone { call_id, arguments, .. } = event {
                if call_id == call.call_id {
                    return Ok(arguments);
                }
                tracing::warn!(expected = %call.call_id, got = %call_id, "Call ID mismatch, still waiting");
            }
        }
    }

    /// Next event of one of `kinds` before `deadline`. Function calls announced
    /// in the meantime are refused while this call is live.
    async fn next_of(
        &self,
        channel: &mut EventChannel,
        call: &mut ToolCall,
        kinds: &[EventKind],
        deadline: Instant,
    ) -> Result<ServerEvent> {
        let mut watched = kinds.to_vec();
        watched.push(EventKind::ConversationItemCreated);
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let event = channel.wait_for(&watched, remaining).await.map_err(|err| match err {
                Error::Timeout { waiting_for, .. } => Error::Timeout { waiting_for, after: self.timeout },
                other => other,
            })?;
            match event {
                ServerEvent::ConversationItemCreated { item, .. } if !kinds.contains(&EventKind::ConversationItemCreated) => {
                    self.refuse_overlap(call, &item);
                }
                other => return Ok(other),
            }
        }
    }

    fn refuse_overlap(&self, call: &mut ToolCall, item: &Item) {
        let Some(overlap) = ToolCall::from_item(item) else {
            return;
        };
        match self.tracker.begin(&overlap.call_id) {
            Err(err) => {
                tracing::warn!(call_id = %overlap.call_id, function = %overlap.function_name, live = %call.call_id, "{err}");
            }
            Ok(_released) => {
                tracing::warn!(
                    call_id = %overlap.call_id,
                    function = %overlap.function_name,
                    live = %call.call_id,
                    "Function call detected while another call was being driven"
                );
            }
        }
        call.overlapping.push(overlap.call_id);
    }
}
