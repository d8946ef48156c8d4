//! Event channel adapter over an upstream realtime connection.
//!
//! The connection is split into a shareable sending half and a single
//! receiving half. The receiving half is owned by the session run loop; the
//! tool-call handshake borrows it to wait for specific events, which is why a
//! channel never has two concurrent waiters.

use crate::events::{Notifier, OutboundEvent};
use crate::protocol::client_events::ClientEvent;
use crate::protocol::server_events::{EventKind, ServerEvent};
use crate::{Error, Result};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub trait UpstreamSender: Send + Sync {
    fn send(&self, event: ClientEvent) -> BoxFuture<'_, Result<()>>;
    fn close(&self) -> BoxFuture<'_, Result<()>>;
}

pub trait UpstreamReceiver: Send + Sync {
    fn next_event(&mut self) -> BoxFuture<'_, Result<Option<ServerEvent>>>;
}

pub struct EventChannel {
    sender: Arc<dyn UpstreamSender>,
    receiver: Box<dyn UpstreamReceiver>,
    mirror: Option<Arc<dyn Notifier>>,
}

impl EventChannel {
    #[must_use]
    pub fn new(sender: Arc<dyn UpstreamSender>, receiver: Box<dyn UpstreamReceiver>) -> Self {
        Self { sender, receiver, mirror: None }
    }

    /// Mirror every received event to `notifier` as a `voice_event`.
    #[must_use]
    pub fn with_mirror(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.mirror = Some(notifier);
        self
    }

    #[must_use]
    pub fn sender(&self) -> Arc<dyn UpstreamSender> {
        Arc::clone(&self.sender)
    }

    /// Push a client event upstream.
    ///
    /// # Errors
    /// Returns an error if the connection is closed or the send fails.
    pub async fn send(&self, event: ClientEvent) -> Result<()> {
        self.sender.send(event).await
    }

    /// Next upstream event, or `None` once the connection has closed.
    ///
    /// # Errors
    /// Returns an error if the transport fails.
    pub async fn receive(&mut self) -> Result<Option<ServerEvent>> {
        let event = self.receiver.next_event().await?;
        if let (Some(evt), Some(mirror)) = (&event, &self.mirror) {
            mirror.notify(OutboundEvent::voice_event(evt)).await;
        }
        Ok(event)
    }

    /// Consume events until one whose kind is in `kinds` arrives.
    ///
    /// Non-matching events are discarded (after mirroring).
    ///
    /// # Errors
    /// Returns [`Error::Timeout`] when nothing matched within `timeout`, or
    /// [`Error::ConnectionClosed`] if the stream ended first.
    pub async fn wait_for(&mut self, kinds: &[EventKind], timeout: Duration) -> Result<ServerEvent> {
        let wait = async {
            loop {
                match self.receive().await? {
                    Some(evt) if kinds.contains(&evt.kind()) => return Ok(evt),
                    Some(evt) => {
                        tracing::trace!(event_type = evt.event_type(), "Discarding event while waiting");
                    }
                    None => return Err(Error::ConnectionClosed),
                }
            }
        };

        tokio::time::timeout(timeout, wait).await.unwrap_or_else(|_| {
            let waiting_for = kinds.iter().map(|k| k.as_str()).collect::<Vec<_>>().join(" | ");
            Err(Error::Timeout { waiting_for, after: timeout })
        })
    }
}

/// In-process transport, handy for embedding and tests.
pub mod memory {
    use super::{AtomicBool, Arc, BoxFuture, ClientEvent, Error, Ordering, Result, ServerEvent, UpstreamReceiver, UpstreamSender, mpsc};

    pub struct MemorySender {
        outgoing: mpsc::UnboundedSender<ClientEvent>,
        closed: Arc<AtomicBool>,
    }

    pub struct MemoryReceiver {
        incoming: mpsc::UnboundedReceiver<ServerEvent>,
    }

    /// The far end of a memory transport: feeds server events, observes client events.
    pub struct MemoryRemote {
        pub events: mpsc::UnboundedSender<ServerEvent>,
        pub sent: mpsc::UnboundedReceiver<ClientEvent>,
        closed: Arc<AtomicBool>,
    }

    impl MemoryRemote {
        #[must_use]
        pub fn is_closed(&self) -> bool {
            self.closed.load(Ordering::SeqCst)
        }

        /// Queue a server event for the local receiver.
        pub fn push(&self, event: ServerEvent) {
            let _ = self.events.send(event);
        }

        /// Drain the client events sent so far.
        pub fn drain(&mut self) -> Vec<ClientEvent> {
            let mut out = Vec::new();
            while let Ok(evt) = self.sent.try_recv() {
                out.push(evt);
            }
            out
        }
    }

    #[must_use]
    pub fn pair() -> (Arc<MemorySender>, Box<MemoryReceiver>, MemoryRemote) {
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        let closed = Arc::new(AtomicBool::new(false));
        (
            Arc::new(MemorySender { outgoing: out_tx, closed: Arc::clone(&closed) }),
            Box::new(MemoryReceiver { incoming: in_rx }),
            MemoryRemote { events: in_tx, sent: out_rx, closed },
        )
    }

    impl UpstreamSender for MemorySender {
        fn send(&self, event: ClientEvent) -> BoxFuture<'_, Result<()>> {
            Box::pin(async move {
                if self.closed.load(Ordering::SeqCst) {
                    return Err(Error::ConnectionClosed);
                }
                self.outgoing.send(event).map_err(|_| Error::ConnectionClosed)
            })
        }

        fn close(&self) -> BoxFuture<'_, Result<()>> {
            Box::pin(async move {
                self.closed.store(true, Ordering::SeqCst);
                Ok(())
            })
        }
    }

    impl UpstreamReceiver for MemoryReceiver {
        fn next_event(&mut self) -> BoxFuture<'_, Result<Option<ServerEvent>>> {
            Box::pin(async move { Ok(self.incoming.recv().await) })
        }
    }
}
