//! The channel listener.
//!
//! The client delivers channel events on its own thread. The callback
//! registered by [`ChannelListener::join`] only forwards each event into a
//! bounded queue with `blocking_send`; a tokio task drains the queue,
//! drives the [`SessionState`] machine, prints the events and reacts to
//! live-session messages. A full queue blocks the client's delivery thread
//! rather than dropping events.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::message::{MessageType, SessionMessage};
use super::payload::Payload;
use super::state::{ListenerState, SessionState};
use crate::client::uri::Uri;
use crate::client::{ChannelCallback, ChannelEvent, ChannelEventKind, ChannelHandle, LiveClient, Peer};
use crate::console::Console;
use crate::error::SampleError;
use crate::live::Latch;

/// Line printed when a merge notification ends the session.
pub const MERGE_EXIT_NOTICE: &str = "Exiting since a merge is happening in another client";

/// How long a stopped listener waits for the client to close its queue.
const DRAIN_LIMIT: Duration = Duration::from_secs(2);

type SharedState = Arc<Mutex<SessionState>>;

fn lock(state: &SharedState) -> MutexGuard<'_, SessionState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug)]
struct Joined {
    uri: Uri,
    handle: ChannelHandle,
    stop: Latch,
    task: JoinHandle<()>,
}

/// Owns the single joined channel of the process.
#[derive(Debug)]
pub struct ChannelListener {
    client: Arc<dyn LiveClient>,
    console: Console,
    session: SharedState,
    joined: tokio::sync::Mutex<Option<Joined>>,
    session_ending: Latch,
    capacity: usize,
}

impl ChannelListener {
    /// Creates a disconnected listener. `session_ending` is set when a merge
    /// notification arrives.
    #[must_use]
    pub fn new(
        client: Arc<dyn LiveClient>,
        console: Console,
        session_ending: Latch,
        capacity: usize,
    ) -> Self {
        Self {
            client,
            console,
            session: Arc::default(),
            joined: tokio::sync::Mutex::new(None),
            session_ending,
            capacity: capacity.max(1),
        }
    }

    /// Current listener state.
    #[must_use]
    pub fn state(&self) -> ListenerState {
        lock(&self.session).state()
    }

    /// Other participants seen on the joined channel.
    #[must_use]
    pub fn peers(&self) -> Vec<Peer> {
        lock(&self.session).peers()
    }

    /// Number of events the listener task has processed.
    #[must_use]
    pub fn processed(&self) -> u64 {
        lock(&self.session).processed()
    }

    /// URL of the joined channel.
    pub async fn channel(&self) -> Option<Uri> {
        self.joined.lock().await.as_ref().map(|j| j.uri.clone())
    }

    /// Joins `uri`, leaving any previously joined channel first.
    ///
    /// # Errors
    ///
    /// Whatever [`LiveClient::join_channel`] returns; the listener is left
    /// disconnected.
    pub async fn join(&self, uri: &Uri) -> Result<ChannelHandle, SampleError> {
        let mut joined = self.joined.lock().await;
        if let Some(previous) = joined.take() {
            self.teardown(previous).await;
        }

        let (tx, rx) = mpsc::channel(self.capacity);
        lock(&self.session).begin_join(self.client.peer().client_id);
        let callback: ChannelCallback = Box::new(move |event: ChannelEvent| {
            if tx.blocking_send(event).is_err() {
                tracing::trace!("listener gone; channel event discarded");
            }
        });
        let handle = match self.client.join_channel(uri, callback) {
            Ok(handle) => handle,
            Err(e) => {
                lock(&self.session).reset();
                return Err(e);
            }
        };

        let stop = Latch::new();
        let consumer = EventConsumer {
            client: Arc::clone(&self.client),
            console: self.console.clone(),
            session: Arc::clone(&self.session),
            session_ending: self.session_ending.clone(),
            handle,
        };
        let task = tokio::spawn(consumer.run(rx, stop.clone()));
        tracing::info!(%uri, %handle, "channel joined");
        *joined = Some(Joined {
            uri: uri.clone(),
            handle,
            stop,
            task,
        });
        Ok(handle)
    }

    /// Leaves the joined channel. Returns `false` if none was joined.
    pub async fn leave(&self) -> bool {
        let previous = self.joined.lock().await.take();
        match previous {
            Some(previous) => {
                self.teardown(previous).await;
                true
            }
            None => false,
        }
    }

    async fn teardown(&self, joined: Joined) {
        self.client.leave_channel(joined.handle);
        joined.stop.set();
        if let Err(e) = joined.task.await {
            tracing::warn!(error = %e, "listener task did not finish cleanly");
        }
        lock(&self.session).reset();
        tracing::info!(uri = %joined.uri, handle = %joined.handle, "channel left");
    }

    /// Publishes raw bytes on the joined channel.
    ///
    /// # Errors
    ///
    /// [`SampleError::NotJoined`] without a joined channel, otherwise the
    /// client's error.
    pub async fn send(&self, content: &[u8]) -> Result<(), SampleError> {
        let handle = self
            .joined
            .lock()
            .await
            .as_ref()
            .map(|j| j.handle)
            .ok_or(SampleError::NotJoined)?;
        self.client.send_message(handle, content)
    }

    /// Publishes a live-session message from this client.
    ///
    /// # Errors
    ///
    /// See [`ChannelListener::send`].
    pub async fn announce(&self, message_type: MessageType) -> Result<(), SampleError> {
        let bytes = SessionMessage::new(message_type, self.client.peer()).to_bytes()?;
        self.send(&bytes).await
    }
}

/// State moved into the listener task.
struct EventConsumer {
    client: Arc<dyn LiveClient>,
    console: Console,
    session: SharedState,
    session_ending: Latch,
    handle: ChannelHandle,
}

impl EventConsumer {
    async fn run(self, mut rx: mpsc::Receiver<ChannelEvent>, stop: Latch) {
        loop {
            let event = tokio::select! {
                event = rx.recv() => event,
                () = stop.wait() => break,
            };
            let Some(event) = event else {
                break;
            };
            self.handle_event(&event);
        }

        // Events queued before the leave, our own `Left` included, are
        // still handled; the sender closes once the client lets go of it.
        let mut drained = 0_u64;
        let drain = async {
            while let Some(event) = rx.recv().await {
                self.handle_event(&event);
                drained += 1;
            }
        };
        let closed = tokio::time::timeout(DRAIN_LIMIT, drain).await.is_ok();
        if !closed {
            while let Ok(event) = rx.try_recv() {
                self.handle_event(&event);
                drained += 1;
            }
            tracing::warn!(handle = %self.handle, "channel events still open after leaving");
        }
        tracing::debug!(handle = %self.handle, drained, "listener task finished");
    }

    fn handle_event(&self, event: &ChannelEvent) {
        let (before, after) = lock(&self.session).apply(event);
        if before != after {
            tracing::info!(%before, %after, "listener state changed");
        }

        let from = &event.from;
        match event.kind {
            ChannelEventKind::Hello => self.console.line(format!("Channel Hello from {from}")),
            ChannelEventKind::Join => self.console.line(format!("Channel Join from {from}")),
            ChannelEventKind::Left => self.console.line(format!("Channel Left from {from}")),
            ChannelEventKind::Deleted => self.console.line("Channel Deleted"),
            ChannelEventKind::Error => self.console.line("Channel Error"),
            ChannelEventKind::Message => self.handle_message(event),
        }
    }

    fn handle_message(&self, event: &ChannelEvent) {
        let payload = Payload::sniff(&event.content);
        let Some(message) = payload.as_text().and_then(SessionMessage::from_text) else {
            self.console.line(format!(
                "Channel Message from {}: {payload}",
                event.from.user_name
            ));
            return;
        };

        self.console.line(format!(
            "Channel Message: {} {} - {}",
            message.message_type.as_str(),
            message.from_user_name,
            message.app
        ));
        if message.message_type.is_merge() {
            tracing::warn!(from = %message.from_user_name, "merge notification received");
            self.console.line(MERGE_EXIT_NOTICE);
            self.session_ending.set();
        } else if message.message_type == MessageType::GetUsers
            && event.from.client_id != self.client.peer().client_id
        {
            self.reply_hello();
        }
    }

    fn reply_hello(&self) {
        let result = SessionMessage::new(MessageType::Hello, self.client.peer())
            .to_bytes()
            .and_then(|bytes| self.client.send_message(self.handle, &bytes));
        if let Err(e) = result {
            tracing::warn!(error = %e, "cannot answer GET_USERS");
        }
    }
}
