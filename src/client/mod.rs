//! External collaborators: the content/channel client and the documents it
//! serves.
//!
//! Everything the sample loop needs from a content server is expressed by
//! two traits. [`LiveClient`] opens documents, runs file-style operations
//! and manages pub/sub channels; [`LiveDocument`] is an open scene-graph
//! document with a local edit queue. Callbacks registered on either are
//! invoked on threads owned by the client, never on the caller's thread.
//!
//! [`memory`] provides an in-process implementation used by the binary
//! and by the tests.

pub mod memory;
pub mod prim;
pub mod uri;

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::SampleError;
use prim::{Prim, PrimPath};
use uri::Uri;

/// Invoked when remote edits have been queued for a document.
pub type UpdateCallback = Arc<dyn Fn() + Send + Sync>;

/// Invoked for every event on a joined channel. Moved onto the client's
/// delivery thread.
pub type ChannelCallback = Box<dyn Fn(ChannelEvent) + Send + 'static>;

/// Invoked when the connection status to a server changes.
pub type StatusCallback = Arc<dyn Fn(&Uri, ConnectionStatus) + Send + Sync>;

/// Opaque identifier of a joined channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ChannelHandle(u64);

impl ChannelHandle {
    /// Wraps a raw handle value.
    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw handle value.
    #[must_use]
    pub const fn as_raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ChannelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Connection status reported through a [`StatusCallback`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    /// A connection attempt is in progress.
    Connecting,
    /// The connection is established.
    Connected,
    /// The server could not be reached.
    ConnectError,
    /// The server closed the connection.
    Disconnected,
    /// The host name does not resolve to a server.
    InvalidHost,
}

impl ConnectionStatus {
    /// Returns `true` for every failure state.
    #[must_use]
    pub const fn is_error(self) -> bool {
        !matches!(self, Self::Connecting | Self::Connected)
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::ConnectError => "connect error",
            Self::Disconnected => "disconnected",
            Self::InvalidHost => "invalid host",
        };
        f.write_str(text)
    }
}

/// Identity of a channel participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Peer {
    /// Unique client instance id.
    pub client_id: uuid::Uuid,
    /// User name the client authenticated as.
    pub user_name: String,
    /// Application name.
    pub app: String,
}

impl Peer {
    /// Creates a peer with a fresh client id.
    #[must_use]
    pub fn new(user_name: &str, app: &str) -> Self {
        Self {
            client_id: uuid::Uuid::new_v4(),
            user_name: user_name.to_string(),
            app: app.to_string(),
        }
    }
}

impl fmt::Display for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.user_name, self.app)
    }
}

/// Kind of a channel event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelEventKind {
    /// A member answered a join with a greeting.
    Hello,
    /// A member joined (including ourselves).
    Join,
    /// A member left (including ourselves).
    Left,
    /// A member published a payload.
    Message,
    /// The channel was deleted on the server.
    Deleted,
    /// The channel failed.
    Error,
}

/// One event delivered on a joined channel.
#[derive(Debug, Clone, Serialize)]
pub struct ChannelEvent {
    /// Event kind.
    pub kind: ChannelEventKind,
    /// Participant the event originates from.
    pub from: Peer,
    /// Raw payload; empty for everything but [`ChannelEventKind::Message`].
    pub content: Vec<u8>,
    /// Server-side delivery time.
    pub timestamp: DateTime<Utc>,
}

impl ChannelEvent {
    /// Creates an event without payload.
    #[must_use]
    pub fn new(kind: ChannelEventKind, from: Peer) -> Self {
        Self {
            kind,
            from,
            content: Vec::new(),
            timestamp: Utc::now(),
        }
    }

    /// Creates a [`ChannelEventKind::Message`] event.
    #[must_use]
    pub fn message(from: Peer, content: Vec<u8>) -> Self {
        Self {
            kind: ChannelEventKind::Message,
            from,
            content,
            timestamp: Utc::now(),
        }
    }
}

/// Outcome of [`LiveDocument::flush`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FlushReport {
    /// Local edits pushed to the server.
    pub pushed: usize,
    /// Remote updates pulled into the local view.
    pub pulled: usize,
    /// Server version after the flush.
    pub version: u64,
}

impl FlushReport {
    /// Returns `true` if the flush neither pushed nor pulled anything.
    #[must_use]
    pub const fn is_noop(&self) -> bool {
        self.pushed == 0 && self.pulled == 0
    }
}

/// Kind of a listed item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    /// A folder, created explicitly or implied by documents below it.
    Folder,
    /// A live document.
    Document,
    /// A pub/sub channel.
    Channel,
}

/// Metadata of a folder, document or channel.
#[derive(Debug, Clone, Serialize)]
pub struct ListEntry {
    /// Absolute URL.
    pub uri: Uri,
    /// Kind of item.
    pub kind: EntryKind,
    /// Number of prims (documents) or members (channels).
    pub size: usize,
    /// Document version; zero for folders and channels.
    pub version: u64,
    /// Creator user name.
    pub created_by: String,
    /// Last writer user name.
    pub modified_by: String,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub modified_at: DateTime<Utc>,
}

/// An open scene-graph document with a local edit queue.
///
/// Mutations apply to the local view immediately and are queued;
/// [`LiveDocument::flush`] pushes the queue and pulls remote updates.
pub trait LiveDocument: Send + fmt::Debug {
    /// URL the document was opened from.
    fn uri(&self) -> &Uri;

    /// Defines (or retypes) a prim, creating typeless ancestors.
    ///
    /// # Errors
    ///
    /// Implementations return [`SampleError`] if the edit is rejected.
    fn define(&mut self, path: &PrimPath, type_name: &str) -> Result<(), SampleError>;

    /// Sets one property on an existing prim.
    ///
    /// # Errors
    ///
    /// Returns [`SampleError::PrimNotFound`] if the prim does not exist.
    fn mutate(
        &mut self,
        path: &PrimPath,
        property: &str,
        value: serde_json::Value,
    ) -> Result<(), SampleError>;

    /// Pushes queued edits and pulls remote updates. A no-op when there is
    /// nothing to do.
    ///
    /// # Errors
    ///
    /// Returns [`SampleError::Connection`] if the server is unreachable or
    /// [`SampleError::NotFound`] if the document was deleted.
    ///
    /// A busy server answers with [`SampleError::TransientServer`] and the
    /// queue is kept for the next attempt.
    fn flush(&mut self) -> Result<FlushReport, SampleError>;

    /// Moves a prim and everything below it to `to`.
    ///
    /// # Errors
    ///
    /// [`SampleError::PrimNotFound`] if `from` does not exist,
    /// [`SampleError::InvalidArgument`] if `to` is taken or lies below
    /// `from`.
    fn rename_prim(&mut self, from: &PrimPath, to: &PrimPath) -> Result<(), SampleError>;

    /// Returns `true` if local edits are waiting to be flushed.
    fn has_pending(&self) -> bool;

    /// Looks up a prim in the local view.
    fn prim(&self, path: &PrimPath) -> Option<&Prim>;

    /// All prim paths in the local view, in path order.
    fn prim_paths(&self) -> Vec<PrimPath>;

    /// Registers the callback fired when remote updates are queued.
    fn set_update_callback(&mut self, callback: UpdateCallback);

    /// Reads one property from the local view.
    fn get(&self, path: &PrimPath, property: &str) -> Option<&serde_json::Value> {
        self.prim(path).and_then(|p| p.properties.get(property))
    }

    /// First mesh prim in path order.
    fn first_mesh(&self) -> Option<PrimPath> {
        self.prim_paths()
            .into_iter()
            .find(|p| self.prim(p).is_some_and(Prim::is_mesh))
    }
}

/// Content and channel client for one user.
pub trait LiveClient: Send + Sync + fmt::Debug {
    /// Identity announced to channel peers.
    fn peer(&self) -> &Peer;

    /// Client library version string.
    fn version(&self) -> String;

    /// Opens an existing document.
    ///
    /// # Errors
    ///
    /// [`SampleError::Connection`] if the server is unreachable,
    /// [`SampleError::NotFound`] if the document does not exist.
    fn open(&self, uri: &Uri) -> Result<Box<dyn LiveDocument>, SampleError>;

    /// Creates an empty document, replacing any existing one.
    ///
    /// # Errors
    ///
    /// [`SampleError::Connection`] if the server is unreachable.
    fn create(&self, uri: &Uri) -> Result<Box<dyn LiveDocument>, SampleError>;

    /// Lists the direct children of a folder.
    ///
    /// # Errors
    ///
    /// [`SampleError::Connection`] or [`SampleError::NotFound`].
    fn list(&self, folder: &Uri) -> Result<Vec<ListEntry>, SampleError>;

    /// Returns metadata of one item.
    ///
    /// # Errors
    ///
    /// [`SampleError::Connection`] or [`SampleError::NotFound`].
    fn stat(&self, uri: &Uri) -> Result<ListEntry, SampleError>;

    /// Reads the serialized content of a document.
    ///
    /// # Errors
    ///
    /// [`SampleError::Connection`] or [`SampleError::NotFound`].
    fn read(&self, uri: &Uri) -> Result<Vec<u8>, SampleError>;

    /// Copies a document, overwriting the destination.
    ///
    /// # Errors
    ///
    /// [`SampleError::Connection`] or [`SampleError::NotFound`].
    fn copy(&self, src: &Uri, dst: &Uri) -> Result<(), SampleError>;

    /// Deletes a document, a folder and everything below it, or a channel.
    ///
    /// # Errors
    ///
    /// [`SampleError::Connection`] or [`SampleError::NotFound`].
    fn delete(&self, uri: &Uri) -> Result<(), SampleError>;

    /// Creates an empty folder.
    ///
    /// # Errors
    ///
    /// [`SampleError::Connection`], or [`SampleError::InvalidArgument`] if
    /// a folder or document already exists there.
    fn create_folder(&self, uri: &Uri) -> Result<(), SampleError>;

    /// Moves a document, or a folder with everything below it. An
    /// existing folder as destination receives the source under its own
    /// name.
    ///
    /// # Errors
    ///
    /// [`SampleError::Connection`] or [`SampleError::NotFound`].
    fn move_item(&self, src: &Uri, dst: &Uri) -> Result<(), SampleError>;

    /// Joins a channel; `on_event` runs on a client-owned thread.
    ///
    /// # Errors
    ///
    /// [`SampleError::Connection`] if the server is unreachable.
    fn join_channel(&self, uri: &Uri, on_event: ChannelCallback)
    -> Result<ChannelHandle, SampleError>;

    /// Publishes a payload on a joined channel.
    ///
    /// # Errors
    ///
    /// [`SampleError::NotJoined`] for unknown handles,
    /// [`SampleError::Connection`] if the server is unreachable.
    fn send_message(&self, handle: ChannelHandle, content: &[u8]) -> Result<(), SampleError>;

    /// Leaves a channel. Unknown handles are ignored.
    fn leave_channel(&self, handle: ChannelHandle);

    /// Registers the connection status callback.
    fn set_status_callback(&self, callback: StatusCallback);
}
