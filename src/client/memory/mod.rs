//! In-process content server and client.
//!
//! [`MemoryServer`] hosts documents and channels under `memory://<host>/`.
//! Several [`MemoryClient`]s (one per simulated user) can share a server,
//! which is how the tests exercise multi-writer and multi-peer behaviour.
//! Callbacks fire on server-owned threads: one delivery thread per joined
//! channel member, and the flushing thread for document update notices.
//!
//! # Concurrency
//!
//! - Documents, explicit folders and channels each sit behind their own
//!   `std::sync::Mutex`. When two are needed, documents are locked first.
//! - Callbacks are collected under a lock and invoked after releasing it.

mod channel;
mod document;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};

use channel::{ChannelRoom, Member};
pub use document::MemoryDocument;
use document::StoredDocument;

use super::prim::{Prim, PrimPath};
use super::uri::Uri;
use super::{
    ChannelCallback, ChannelEventKind, ChannelHandle, ConnectionStatus, EntryKind, ListEntry,
    LiveClient, LiveDocument, Peer, StatusCallback,
};
use crate::error::SampleError;

/// URL scheme served by [`MemoryServer`].
pub const SCHEME: &str = "memory";

/// A folder created with [`LiveClient::create_folder`]. Folders implied by
/// documents below them are not recorded.
#[derive(Debug, Clone)]
struct FolderRecord {
    created_by: String,
    created_at: DateTime<Utc>,
}

struct ServerState {
    host: String,
    server_peer: Peer,
    online: AtomicBool,
    busy: AtomicBool,
    next_id: AtomicU64,
    documents: Mutex<BTreeMap<Uri, StoredDocument>>,
    folders: Mutex<BTreeMap<Uri, FolderRecord>>,
    channels: Mutex<BTreeMap<Uri, ChannelRoom>>,
    status_callbacks: Mutex<Vec<StatusCallback>>,
}

impl fmt::Debug for ServerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerState")
            .field("host", &self.host)
            .field("online", &self.online.load(Ordering::Relaxed))
            .field("busy", &self.busy.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl ServerState {
    fn documents(&self) -> MutexGuard<'_, BTreeMap<Uri, StoredDocument>> {
        self.documents.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn folders(&self) -> MutexGuard<'_, BTreeMap<Uri, FolderRecord>> {
        self.folders.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn channels(&self) -> MutexGuard<'_, BTreeMap<Uri, ChannelRoom>> {
        self.channels.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn ensure_reachable(&self, uri: &Uri) -> Result<(), SampleError> {
        if uri.scheme() != SCHEME {
            return Err(SampleError::Connection(format!(
                "unsupported URL scheme {}://",
                uri.scheme()
            )));
        }
        if uri.host() != self.host {
            return Err(SampleError::Connection(format!(
                "cannot connect to {}",
                uri.host()
            )));
        }
        if !self.online.load(Ordering::Acquire) {
            return Err(SampleError::Connection(format!(
                "server {} is offline",
                self.host
            )));
        }
        Ok(())
    }

    /// [`ServerState::ensure_reachable`], plus a refusal while the server
    /// is busy. Every write goes through here.
    fn ensure_writable(&self, uri: &Uri) -> Result<(), SampleError> {
        self.ensure_reachable(uri)?;
        if self.busy.load(Ordering::Acquire) {
            return Err(SampleError::TransientServer(format!(
                "server {} is busy, try again",
                self.host
            )));
        }
        Ok(())
    }

    /// Returns `true` if `folder` was created explicitly or holds a
    /// document.
    fn folder_exists(
        &self,
        documents: &BTreeMap<Uri, StoredDocument>,
        folder: &Uri,
    ) -> bool {
        folder.path() == "/"
            || self.folders().contains_key(folder)
            || documents.keys().any(|u| folder.contains(u))
    }
}

/// Shared in-process server. Cheap to clone.
#[derive(Debug, Clone)]
pub struct MemoryServer {
    state: Arc<ServerState>,
}

impl MemoryServer {
    /// Creates an empty, online server for `memory://<host>/`. Host names
    /// match case-insensitively.
    #[must_use]
    pub fn new(host: &str) -> Self {
        Self {
            state: Arc::new(ServerState {
                host: host.to_ascii_lowercase(),
                server_peer: Peer::new("server", "memory-server"),
                online: AtomicBool::new(true),
                busy: AtomicBool::new(false),
                next_id: AtomicU64::new(1),
                documents: Mutex::new(BTreeMap::new()),
                folders: Mutex::new(BTreeMap::new()),
                channels: Mutex::new(BTreeMap::new()),
                status_callbacks: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Creates a client for one user of this server.
    #[must_use]
    pub fn connect(&self, user_name: &str, app: &str) -> MemoryClient {
        MemoryClient {
            server: self.clone(),
            peer: Peer::new(user_name, app),
        }
    }

    /// Root URL of the server.
    ///
    /// # Errors
    ///
    /// [`SampleError::InvalidArgument`] if the host is not valid in a URL.
    pub fn root(&self) -> Result<Uri, SampleError> {
        Uri::root(SCHEME, &self.state.host)
    }

    /// Takes the server on or offline. Going offline fails every joined
    /// channel with an `Error` event; both transitions are reported to the
    /// registered status callbacks.
    pub fn set_online(&self, online: bool) {
        let was_online = self.state.online.swap(online, Ordering::AcqRel);
        if was_online == online {
            return;
        }
        if !online {
            let rooms = std::mem::take(&mut *self.state.channels());
            for room in rooms.into_values() {
                room.close(ChannelEventKind::Error, &self.state.server_peer);
            }
        }
        let status = if online {
            ConnectionStatus::Connected
        } else {
            ConnectionStatus::ConnectError
        };
        let callbacks = self
            .state
            .status_callbacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        tracing::info!(host = %self.state.host, %status, "memory server status changed");
        match self.root() {
            Ok(root) => {
                for callback in callbacks {
                    callback(&root, status);
                }
            }
            Err(e) => tracing::warn!(error = %e, "status change not reported"),
        }
    }

    /// Marks the server busy. While busy, every write (create, flush with
    /// pending edits, copy, move, delete, mkdir) fails with
    /// [`SampleError::TransientServer`]; reads keep working.
    pub fn set_busy(&self, busy: bool) {
        if self.state.busy.swap(busy, Ordering::AcqRel) != busy {
            tracing::info!(host = %self.state.host, busy, "memory server load changed");
        }
    }

    /// Current version of a stored document.
    #[must_use]
    pub fn document_version(&self, uri: &Uri) -> Option<u64> {
        self.state.documents().get(uri).map(|d| d.version)
    }

    fn next_id(&self) -> u64 {
        self.state.next_id.fetch_add(1, Ordering::Relaxed)
    }
}

/// Client of a [`MemoryServer`] acting as one user.
#[derive(Debug, Clone)]
pub struct MemoryClient {
    server: MemoryServer,
    peer: Peer,
}

impl MemoryClient {
    /// Server this client talks to.
    #[must_use]
    pub fn server(&self) -> &MemoryServer {
        &self.server
    }

    fn state(&self) -> &ServerState {
        &self.server.state
    }
}

fn document_entry(uri: Uri, doc: &StoredDocument) -> ListEntry {
    ListEntry {
        uri,
        kind: EntryKind::Document,
        size: doc.prims.len(),
        version: doc.version,
        created_by: doc.created_by.clone(),
        modified_by: doc.modified_by.clone(),
        created_at: doc.created_at,
        modified_at: doc.modified_at,
    }
}

fn folder_entry(uri: Uri, doc: &StoredDocument) -> ListEntry {
    ListEntry {
        uri,
        kind: EntryKind::Folder,
        size: 0,
        version: 0,
        created_by: doc.created_by.clone(),
        modified_by: doc.modified_by.clone(),
        created_at: doc.created_at,
        modified_at: doc.modified_at,
    }
}

fn empty_folder_entry(uri: Uri, record: &FolderRecord) -> ListEntry {
    ListEntry {
        uri,
        kind: EntryKind::Folder,
        size: 0,
        version: 0,
        created_by: record.created_by.clone(),
        modified_by: record.created_by.clone(),
        created_at: record.created_at,
        modified_at: record.created_at,
    }
}

fn channel_entry(uri: Uri, room: &ChannelRoom, owner: &Peer) -> ListEntry {
    let now = chrono::Utc::now();
    ListEntry {
        uri,
        kind: EntryKind::Channel,
        size: room.len(),
        version: 0,
        created_by: owner.user_name.clone(),
        modified_by: owner.user_name.clone(),
        created_at: now,
        modified_at: now,
    }
}

/// Folds a document below a folder into the folder's aggregate entry.
fn absorb(folder: &mut ListEntry, doc: &StoredDocument) {
    folder.size += 1;
    if doc.modified_at > folder.modified_at {
        folder.modified_at = doc.modified_at;
        folder.modified_by = doc.modified_by.clone();
    }
}

/// Where `uri` ends up when the folder `from` moves to `to`.
fn rebased(uri: &Uri, from: &Uri, to: &Uri) -> Result<Uri, SampleError> {
    match from.relative_path(uri) {
        Some(rel) => to.join(rel),
        None => Ok(to.clone()),
    }
}

impl LiveClient for MemoryClient {
    fn peer(&self) -> &Peer {
        &self.peer
    }

    fn version(&self) -> String {
        format!("memory-client {}", env!("CARGO_PKG_VERSION"))
    }

    fn open(&self, uri: &Uri) -> Result<Box<dyn LiveDocument>, SampleError> {
        self.state().ensure_reachable(uri)?;
        let mut documents = self.state().documents();
        let Some(stored) = documents.get_mut(uri) else {
            return Err(SampleError::NotFound(uri.to_string()));
        };
        let doc = MemoryDocument::attach(&self.server, uri.clone(), stored, &self.peer.user_name);
        tracing::debug!(%uri, user = %self.peer.user_name, "document opened");
        Ok(Box::new(doc))
    }

    fn create(&self, uri: &Uri) -> Result<Box<dyn LiveDocument>, SampleError> {
        self.state().ensure_writable(uri)?;
        if uri.is_folder() {
            return Err(SampleError::InvalidArgument(format!(
                "{uri} names a folder, not a document"
            )));
        }
        let mut documents = self.state().documents();
        // Replacing drops the old watchers, so stale handles see NotFound.
        documents.insert(uri.clone(), StoredDocument::new(&self.peer.user_name));
        let Some(stored) = documents.get_mut(uri) else {
            return Err(SampleError::Internal(format!("{uri} vanished after create")));
        };
        let doc = MemoryDocument::attach(&self.server, uri.clone(), stored, &self.peer.user_name);
        tracing::info!(%uri, user = %self.peer.user_name, "document created");
        Ok(Box::new(doc))
    }

    fn list(&self, folder: &Uri) -> Result<Vec<ListEntry>, SampleError> {
        self.state().ensure_reachable(folder)?;
        let folder = folder.as_folder();
        let mut entries: BTreeMap<String, ListEntry> = BTreeMap::new();

        for (uri, doc) in self.state().documents().iter() {
            let Some(rel) = folder.relative_path(uri) else {
                continue;
            };
            match rel.split_once('/') {
                Some((dir, _)) => {
                    if let Some(entry) = entries.get_mut(dir) {
                        absorb(entry, doc);
                    } else {
                        let mut entry = folder_entry(folder.join(dir)?.as_folder(), doc);
                        absorb(&mut entry, doc);
                        entries.insert(dir.to_string(), entry);
                    }
                }
                None => {
                    entries.insert(rel.to_string(), document_entry(uri.clone(), doc));
                }
            }
        }
        let explicit = self.state().folders().contains_key(&folder);
        for (uri, record) in self.state().folders().iter() {
            if let Some(rel) = folder.relative_path(uri)
                && let Some((dir, _)) = rel.split_once('/')
                && !entries.contains_key(dir)
            {
                let entry = empty_folder_entry(folder.join(dir)?.as_folder(), record);
                entries.insert(dir.to_string(), entry);
            }
        }
        for (uri, room) in self.state().channels().iter() {
            if let Some(rel) = folder.relative_path(uri)
                && !rel.contains('/')
            {
                entries.insert(
                    rel.to_string(),
                    channel_entry(uri.clone(), room, &self.state().server_peer),
                );
            }
        }

        if entries.is_empty() && !explicit && folder.path() != "/" {
            return Err(SampleError::NotFound(folder.to_string()));
        }
        Ok(entries.into_values().collect())
    }

    fn stat(&self, uri: &Uri) -> Result<ListEntry, SampleError> {
        self.state().ensure_reachable(uri)?;
        {
            let documents = self.state().documents();
            if let Some(doc) = documents.get(uri) {
                return Ok(document_entry(uri.clone(), doc));
            }
            let folder = uri.as_folder();
            let mut aggregate: Option<ListEntry> = None;
            for (_, doc) in documents.iter().filter(|(u, _)| folder.contains(u)) {
                match aggregate.as_mut() {
                    Some(entry) => absorb(entry, doc),
                    None => {
                        let mut entry = folder_entry(folder.clone(), doc);
                        absorb(&mut entry, doc);
                        aggregate = Some(entry);
                    }
                }
            }
            if let Some(entry) = aggregate {
                return Ok(entry);
            }
            if let Some(record) = self.state().folders().get(&folder) {
                return Ok(empty_folder_entry(folder, record));
            }
        }
        self.state()
            .channels()
            .get(uri)
            .map(|room| channel_entry(uri.clone(), room, &self.state().server_peer))
            .ok_or_else(|| SampleError::NotFound(uri.to_string()))
    }

    fn read(&self, uri: &Uri) -> Result<Vec<u8>, SampleError> {
        self.state().ensure_reachable(uri)?;
        let documents = self.state().documents();
        let doc = documents
            .get(uri)
            .ok_or_else(|| SampleError::NotFound(uri.to_string()))?;
        Ok(serde_json::to_vec_pretty(&doc.prims)?)
    }

    fn copy(&self, src: &Uri, dst: &Uri) -> Result<(), SampleError> {
        self.state().ensure_reachable(src)?;
        self.state().ensure_writable(dst)?;
        let callbacks = {
            let mut documents = self.state().documents();
            let prims: BTreeMap<PrimPath, Prim> = documents
                .get(src)
                .map(|d| d.prims.clone())
                .ok_or_else(|| SampleError::NotFound(src.to_string()))?;
            documents
                .entry(dst.clone())
                .or_insert_with(|| StoredDocument::new(&self.peer.user_name))
                .replace(prims, &self.peer.user_name)
        };
        for callback in callbacks {
            callback();
        }
        tracing::info!(%src, %dst, "document copied");
        Ok(())
    }

    fn delete(&self, uri: &Uri) -> Result<(), SampleError> {
        self.state().ensure_writable(uri)?;
        let removed_docs = {
            let mut documents = self.state().documents();
            if documents.remove(uri).is_some() {
                1
            } else {
                let folder = uri.as_folder();
                let before = documents.len();
                documents.retain(|u, _| !folder.contains(u));
                let mut folders = self.state().folders();
                let folders_before = folders.len();
                folders.retain(|u, _| *u != folder && !folder.contains(u));
                before - documents.len() + folders_before - folders.len()
            }
        };
        let removed_room = self.state().channels().remove(uri);
        let removed_channel = removed_room.is_some();
        if let Some(room) = removed_room {
            room.close(ChannelEventKind::Deleted, &self.state().server_peer);
        }
        if removed_docs == 0 && !removed_channel {
            return Err(SampleError::NotFound(uri.to_string()));
        }
        tracing::info!(%uri, documents = removed_docs, channel = removed_channel, "deleted");
        Ok(())
    }

    fn create_folder(&self, uri: &Uri) -> Result<(), SampleError> {
        self.state().ensure_writable(uri)?;
        let folder = uri.as_folder();
        let documents = self.state().documents();
        if documents.contains_key(&uri.as_file()) || self.state().folder_exists(&documents, &folder)
        {
            return Err(SampleError::InvalidArgument(format!("{uri} already exists")));
        }
        self.state().folders().insert(
            folder.clone(),
            FolderRecord {
                created_by: self.peer.user_name.clone(),
                created_at: Utc::now(),
            },
        );
        drop(documents);
        tracing::info!(%folder, user = %self.peer.user_name, "folder created");
        Ok(())
    }

    fn move_item(&self, src: &Uri, dst: &Uri) -> Result<(), SampleError> {
        self.state().ensure_writable(src)?;
        self.state().ensure_writable(dst)?;
        let mut callbacks = Vec::new();
        let moved = {
            let mut documents = self.state().documents();
            let dst = if self.state().folder_exists(&documents, &dst.as_folder()) {
                dst.as_folder().join(src.file_name())?
            } else {
                dst.as_file()
            };
            let plan = if documents.contains_key(src) {
                vec![(src.clone(), dst.clone())]
            } else {
                let from = src.as_folder();
                let to = dst.as_folder();
                if from == to || from.contains(&to) {
                    return Err(SampleError::InvalidArgument(format!(
                        "cannot move {from} into itself"
                    )));
                }
                let plan = documents
                    .keys()
                    .filter(|u| from.contains(u))
                    .map(|u| Ok((u.clone(), rebased(u, &from, &to)?)))
                    .collect::<Result<Vec<_>, SampleError>>()?;
                let mut folders = self.state().folders();
                let explicit = folders
                    .keys()
                    .filter(|u| **u == from || from.contains(u))
                    .map(|u| Ok((u.clone(), rebased(u, &from, &to)?)))
                    .collect::<Result<Vec<_>, SampleError>>()?;
                for (uri, target) in &explicit {
                    if let Some(record) = folders.remove(uri) {
                        folders.insert(target.clone(), record);
                    }
                }
                if plan.is_empty() && explicit.is_empty() {
                    return Err(SampleError::NotFound(src.to_string()));
                }
                plan
            };
            for (uri, target) in &plan {
                if uri == target {
                    continue;
                }
                // Open handles on the source lose their document, as on delete.
                if let Some(stored) = documents.remove(uri) {
                    callbacks.extend(
                        documents
                            .entry(target.clone())
                            .or_insert_with(|| StoredDocument::new(&self.peer.user_name))
                            .replace(stored.prims, &self.peer.user_name),
                    );
                }
            }
            plan.len()
        };
        for callback in callbacks {
            callback();
        }
        tracing::info!(%src, %dst, documents = moved, "moved");
        Ok(())
    }

    fn join_channel(
        &self,
        uri: &Uri,
        on_event: ChannelCallback,
    ) -> Result<ChannelHandle, SampleError> {
        self.state().ensure_reachable(uri)?;
        let handle = ChannelHandle::from_raw(self.server.next_id());
        let member = Member::spawn(handle, self.peer.clone(), on_event)?;
        self.state()
            .channels()
            .entry(uri.clone())
            .or_default()
            .join(member);
        tracing::debug!(%uri, %handle, user = %self.peer.user_name, "channel joined");
        Ok(handle)
    }

    fn send_message(&self, handle: ChannelHandle, content: &[u8]) -> Result<(), SampleError> {
        let channels = self.state().channels();
        let Some((uri, room)) = channels
            .iter()
            .find(|(_, room)| room.member(handle).is_some())
        else {
            return Err(SampleError::NotJoined);
        };
        self.state().ensure_reachable(uri)?;
        if let Some(member) = room.member(handle) {
            room.broadcast(&member.peer, content);
        }
        Ok(())
    }

    fn leave_channel(&self, handle: ChannelHandle) {
        let mut channels = self.state().channels();
        let left = channels
            .iter_mut()
            .find_map(|(uri, room)| room.leave(handle).then(|| uri.clone()));
        if let Some(uri) = left {
            if channels.get(&uri).is_some_and(ChannelRoom::is_empty) {
                channels.remove(&uri);
            }
            tracing::debug!(%uri, %handle, "channel left");
        }
    }

    fn set_status_callback(&self, callback: StatusCallback) {
        self.state()
            .status_callbacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(callback);
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::client::ChannelEvent;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn uri(text: &str) -> Uri {
        let Ok(uri) = Uri::parse(text) else {
            panic!("valid uri");
        };
        uri
    }

    fn path(text: &str) -> PrimPath {
        let Ok(path) = PrimPath::parse(text) else {
            panic!("valid path");
        };
        path
    }

    fn created(client: &MemoryClient, text: &str) -> Box<dyn LiveDocument> {
        let Ok(doc) = client.create(&uri(text)) else {
            panic!("create failed");
        };
        doc
    }

    #[test]
    fn flush_is_noop_without_changes() {
        let server = MemoryServer::new("localhost");
        let alice = server.connect("alice", "test");
        let mut doc = created(&alice, "memory://localhost/a.live");
        let Ok(report) = doc.flush() else {
            panic!("flush failed");
        };
        assert!(report.is_noop());
        assert_eq!(report.version, 0);
    }

    #[test]
    fn flush_pushes_edits_and_peer_pulls_them() {
        let server = MemoryServer::new("localhost");
        let alice = server.connect("alice", "test");
        let bob = server.connect("bob", "test");
        let mut doc_a = created(&alice, "memory://localhost/a.live");
        let Ok(mut doc_b) = bob.open(&uri("memory://localhost/a.live")) else {
            panic!("open failed");
        };

        let signals = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&signals);
        doc_b.set_update_callback(Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        assert!(doc_a.define(&path("/World/box"), "Mesh").is_ok());
        assert!(
            doc_a
                .mutate(&path("/World/box"), "size", serde_json::json!(2.0))
                .is_ok()
        );
        assert!(doc_a.has_pending());
        let Ok(report) = doc_a.flush() else {
            panic!("flush failed");
        };
        assert_eq!(report.pushed, 2);
        assert_eq!(report.version, 1);
        assert_eq!(signals.load(Ordering::SeqCst), 1);

        assert!(doc_b.prim(&path("/World/box")).is_none());
        let Ok(pulled) = doc_b.flush() else {
            panic!("flush failed");
        };
        assert_eq!(pulled.pulled, 1);
        assert_eq!(
            doc_b.get(&path("/World/box"), "size"),
            Some(&serde_json::json!(2.0))
        );
        assert_eq!(doc_b.first_mesh(), Some(path("/World/box")));
    }

    #[test]
    fn mutate_unknown_prim_is_not_found() {
        let server = MemoryServer::new("localhost");
        let alice = server.connect("alice", "test");
        let mut doc = created(&alice, "memory://localhost/a.live");
        let result = doc.mutate(&path("/Missing"), "x", serde_json::json!(1));
        assert!(matches!(result, Err(SampleError::PrimNotFound(_))));
    }

    #[test]
    fn open_missing_and_foreign_host() {
        let server = MemoryServer::new("localhost");
        let alice = server.connect("alice", "test");
        assert!(matches!(
            alice.open(&uri("memory://localhost/none.live")),
            Err(SampleError::NotFound(_))
        ));
        assert!(matches!(
            alice.open(&uri("memory://elsewhere/none.live")),
            Err(SampleError::Connection(_))
        ));
        assert!(matches!(
            alice.open(&uri("omniverse://localhost/none.live")),
            Err(SampleError::Connection(_))
        ));
    }

    #[test]
    fn offline_server_refuses_and_reports_status() {
        let server = MemoryServer::new("localhost");
        let alice = server.connect("alice", "test");
        let seen: Arc<Mutex<Vec<ConnectionStatus>>> = Arc::default();
        let sink = Arc::clone(&seen);
        alice.set_status_callback(Arc::new(move |_uri: &Uri, status: ConnectionStatus| {
            sink.lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(status);
        }));
        let mut doc = created(&alice, "memory://localhost/a.live");

        server.set_online(false);
        assert!(matches!(doc.flush(), Err(SampleError::Connection(_))));
        server.set_online(true);
        assert!(doc.flush().is_ok());

        let statuses = seen.lock().unwrap_or_else(PoisonError::into_inner).clone();
        assert_eq!(
            statuses,
            vec![ConnectionStatus::ConnectError, ConnectionStatus::Connected]
        );
    }

    #[test]
    fn list_groups_folders_and_stat_aggregates() {
        let server = MemoryServer::new("localhost");
        let alice = server.connect("alice", "test");
        let _a = created(&alice, "memory://localhost/Projects/a.live");
        let _b = created(&alice, "memory://localhost/Projects/Sub/b.live");
        let _c = created(&alice, "memory://localhost/Projects/Sub/c.live");

        let Ok(entries) = alice.list(&uri("memory://localhost/Projects")) else {
            panic!("list failed");
        };
        let names: Vec<(String, EntryKind)> = entries
            .iter()
            .map(|e| (e.uri.file_name().to_string(), e.kind))
            .collect();
        assert_eq!(
            names,
            vec![
                ("Sub".to_string(), EntryKind::Folder),
                ("a.live".to_string(), EntryKind::Document),
            ]
        );

        let Ok(folder) = alice.stat(&uri("memory://localhost/Projects/Sub")) else {
            panic!("stat failed");
        };
        assert_eq!(folder.kind, EntryKind::Folder);
        assert_eq!(folder.size, 2);

        assert!(alice.list(&uri("memory://localhost/Nothing")).is_err());
    }

    #[test]
    fn copy_read_and_delete() {
        let server = MemoryServer::new("localhost");
        let alice = server.connect("alice", "test");
        let mut doc = created(&alice, "memory://localhost/a.live");
        assert!(doc.define(&path("/World"), "Xform").is_ok());
        assert!(doc.flush().is_ok());

        let src = uri("memory://localhost/a.live");
        let dst = uri("memory://localhost/b.live");
        assert!(alice.copy(&src, &dst).is_ok());
        let Ok(bytes) = alice.read(&dst) else {
            panic!("read failed");
        };
        let text = String::from_utf8(bytes).unwrap_or_default();
        assert!(text.contains("/World"));

        assert!(alice.delete(&src).is_ok());
        assert!(matches!(doc.flush(), Ok(_)));
        assert!(doc.define(&path("/Other"), "Xform").is_ok());
        assert!(matches!(doc.flush(), Err(SampleError::NotFound(_))));
        assert!(matches!(alice.delete(&src), Err(SampleError::NotFound(_))));
    }

    #[test]
    fn host_names_match_without_case() {
        let server = MemoryServer::new("LocalHost");
        let alice = server.connect("alice", "test");
        let _doc = created(&alice, "memory://localhost/a%20b.live");
        let Ok(entry) = alice.stat(&uri("memory://LOCALHOST/a b.live?rev=3")) else {
            panic!("stat through an upper-case host");
        };
        assert_eq!(entry.kind, EntryKind::Document);
        assert_eq!(entry.uri.to_string(), "memory://localhost/a%20b.live");
        let Ok(root) = server.root() else {
            panic!("valid root");
        };
        assert_eq!(root.to_string(), "memory://localhost/");
    }

    #[test]
    fn mkdir_lists_empty_folders() {
        let server = MemoryServer::new("localhost");
        let alice = server.connect("alice", "test");
        assert!(alice.create_folder(&uri("memory://localhost/Projects/Empty")).is_ok());
        assert!(matches!(
            alice.create_folder(&uri("memory://localhost/Projects/Empty/")),
            Err(SampleError::InvalidArgument(_))
        ));
        let _doc = created(&alice, "memory://localhost/Projects/a.live");
        assert!(matches!(
            alice.create_folder(&uri("memory://localhost/Projects/a.live")),
            Err(SampleError::InvalidArgument(_))
        ));

        let Ok(entries) = alice.list(&uri("memory://localhost/Projects/")) else {
            panic!("list failed");
        };
        let names: Vec<(&str, EntryKind)> =
            entries.iter().map(|e| (e.uri.file_name(), e.kind)).collect();
        assert_eq!(
            names,
            vec![("Empty", EntryKind::Folder), ("a.live", EntryKind::Document)]
        );
        let Ok(empty) = alice.list(&uri("memory://localhost/Projects/Empty")) else {
            panic!("an empty folder lists");
        };
        assert!(empty.is_empty());
        let Ok(stat) = alice.stat(&uri("memory://localhost/Projects/Empty")) else {
            panic!("stat failed");
        };
        assert_eq!((stat.kind, stat.created_by.as_str()), (EntryKind::Folder, "alice"));

        assert!(alice.delete(&uri("memory://localhost/Projects")).is_ok());
        assert!(alice.stat(&uri("memory://localhost/Projects/Empty")).is_err());
    }

    #[test]
    fn move_documents_and_folders() {
        let server = MemoryServer::new("localhost");
        let alice = server.connect("alice", "test");
        let mut doc = created(&alice, "memory://localhost/a.live");
        assert!(doc.define(&path("/World"), "Xform").is_ok());
        assert!(doc.flush().is_ok());

        assert!(alice.move_item(&uri("memory://localhost/a.live"), &uri("memory://localhost/b.live")).is_ok());
        assert!(alice.stat(&uri("memory://localhost/a.live")).is_err());
        let Ok(bytes) = alice.read(&uri("memory://localhost/b.live")) else {
            panic!("moved document readable");
        };
        assert!(String::from_utf8(bytes).unwrap_or_default().contains("/World"));
        assert!(doc.define(&path("/Other"), "Xform").is_ok());
        assert!(matches!(doc.flush(), Err(SampleError::NotFound(_))));

        assert!(alice.create_folder(&uri("memory://localhost/Archive")).is_ok());
        assert!(alice.move_item(&uri("memory://localhost/b.live"), &uri("memory://localhost/Archive")).is_ok());
        assert!(alice.stat(&uri("memory://localhost/Archive/b.live")).is_ok());

        assert!(alice.move_item(&uri("memory://localhost/Archive"), &uri("memory://localhost/Old")).is_ok());
        assert!(alice.stat(&uri("memory://localhost/Old/b.live")).is_ok());
        assert!(alice.stat(&uri("memory://localhost/Archive")).is_err());
        assert!(matches!(
            alice.move_item(&uri("memory://localhost/Old"), &uri("memory://localhost/Old/Inner")),
            Err(SampleError::InvalidArgument(_))
        ));
        assert!(matches!(
            alice.move_item(&uri("memory://localhost/none.live"), &uri("memory://localhost/x.live")),
            Err(SampleError::NotFound(_))
        ));
    }

    #[test]
    fn busy_server_refuses_writes_until_released() {
        let server = MemoryServer::new("localhost");
        let alice = server.connect("alice", "test");
        let mut doc = created(&alice, "memory://localhost/a.live");
        assert!(doc.define(&path("/World"), "Xform").is_ok());

        server.set_busy(true);
        let Err(err) = doc.flush() else {
            panic!("flush must be refused while busy");
        };
        assert_eq!(err.kind(), crate::error::ErrorKind::TransientServer);
        assert!(!err.is_fatal());
        assert!(doc.has_pending());
        assert!(matches!(
            alice.copy(&uri("memory://localhost/a.live"), &uri("memory://localhost/b.live")),
            Err(SampleError::TransientServer(_))
        ));
        assert!(alice.stat(&uri("memory://localhost/a.live")).is_ok());

        server.set_busy(false);
        let Ok(report) = doc.flush() else {
            panic!("flush after the server recovered");
        };
        assert_eq!(report.pushed, 1);
    }

    #[test]
    fn renamed_prims_reach_peers() {
        let server = MemoryServer::new("localhost");
        let alice = server.connect("alice", "test");
        let bob = server.connect("bob", "test");
        let mut doc_a = created(&alice, "memory://localhost/a.live");
        assert!(doc_a.define(&path("/World/box"), "Mesh").is_ok());
        assert!(doc_a.flush().is_ok());
        let Ok(mut doc_b) = bob.open(&uri("memory://localhost/a.live")) else {
            panic!("open failed");
        };

        assert!(matches!(
            doc_a.rename_prim(&path("/World/missing"), &path("/World/x")),
            Err(SampleError::PrimNotFound(_))
        ));
        assert!(matches!(
            doc_a.rename_prim(&path("/World"), &path("/World/box")),
            Err(SampleError::InvalidArgument(_))
        ));
        assert!(doc_a.rename_prim(&path("/World/box"), &path("/World/crate")).is_ok());
        assert!(doc_a.flush().is_ok());
        assert!(doc_b.flush().is_ok());
        assert!(doc_b.prim(&path("/World/box")).is_none());
        assert_eq!(doc_b.first_mesh(), Some(path("/World/crate")));
    }

    #[test]
    fn channel_messages_reach_all_members() {
        let server = MemoryServer::new("localhost");
        let alice = server.connect("alice", "test");
        let bob = server.connect("bob", "test");
        let chat = uri("memory://localhost/chat.channel");

        let (tx, rx) = std::sync::mpsc::channel::<ChannelEvent>();
        let Ok(handle_a) = alice.join_channel(
            &chat,
            Box::new(move |event| {
                let _ = tx.send(event);
            }),
        ) else {
            panic!("join failed");
        };
        let Ok(handle_b) = bob.join_channel(&chat, Box::new(|_| {})) else {
            panic!("join failed");
        };

        assert!(bob.send_message(handle_b, b"hello").is_ok());
        let mut kinds = Vec::new();
        while let Ok(event) = rx.recv_timeout(Duration::from_secs(1)) {
            kinds.push(event.kind);
            if event.kind == ChannelEventKind::Message {
                assert_eq!(event.content, b"hello".to_vec());
                break;
            }
        }
        assert_eq!(
            kinds,
            vec![
                ChannelEventKind::Join,
                ChannelEventKind::Join,
                ChannelEventKind::Message
            ]
        );

        alice.leave_channel(handle_a);
        alice.leave_channel(handle_a);
        assert!(matches!(
            alice.send_message(handle_a, b"x"),
            Err(SampleError::NotJoined)
        ));
    }
}
