//! Documents of the in-process server.
//!
//! The server keeps one [`StoredDocument`] per URL. Every open handle is a
//! [`MemoryDocument`] with its own local view, an edit queue, and an inbox
//! of update notices fed by other handles' flushes. Flushing pushes the
//! queue, then resynchronizes the local view from the stored state, so a
//! flush observes every edit queued before it.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::mpsc;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};

use super::{MemoryServer, ServerState};
use crate::client::prim::{Prim, PrimPath};
use crate::client::uri::Uri;
use crate::client::{FlushReport, LiveDocument, UpdateCallback};
use crate::error::SampleError;

/// One queued edit.
#[derive(Debug, Clone, PartialEq)]
pub(super) enum Edit {
    Define {
        path: PrimPath,
        type_name: String,
    },
    Set {
        path: PrimPath,
        property: String,
        value: serde_json::Value,
    },
    Rename {
        from: PrimPath,
        to: PrimPath,
    },
}

/// Notice sent to other handles after a flush.
#[derive(Debug, Clone)]
pub(super) struct UpdateNotice {
    pub(super) version: u64,
    pub(super) author: String,
}

type CallbackSlot = Arc<Mutex<Option<UpdateCallback>>>;

/// Registration of one open handle.
pub(super) struct Watcher {
    pub(super) id: u64,
    tx: mpsc::Sender<UpdateNotice>,
    callback: CallbackSlot,
}

impl fmt::Debug for Watcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Watcher").field("id", &self.id).finish_non_exhaustive()
    }
}

impl Watcher {
    /// Queues a notice and returns the callback to fire once the server
    /// lock is released.
    pub(super) fn notify(&self, notice: UpdateNotice) -> Option<UpdateCallback> {
        if self.tx.send(notice).is_err() {
            return None;
        }
        self.callback
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Authoritative state of one document.
#[derive(Debug)]
pub(super) struct StoredDocument {
    pub(super) prims: BTreeMap<PrimPath, Prim>,
    pub(super) version: u64,
    pub(super) created_by: String,
    pub(super) modified_by: String,
    pub(super) created_at: DateTime<Utc>,
    pub(super) modified_at: DateTime<Utc>,
    pub(super) watchers: Vec<Watcher>,
}

impl StoredDocument {
    pub(super) fn new(author: &str) -> Self {
        let now = Utc::now();
        Self {
            prims: BTreeMap::new(),
            version: 0,
            created_by: author.to_string(),
            modified_by: author.to_string(),
            created_at: now,
            modified_at: now,
            watchers: Vec::new(),
        }
    }

    /// Applies edits as one new version and notifies every watcher except
    /// `origin`. Returns the callbacks to fire.
    pub(super) fn commit(
        &mut self,
        edits: &[Edit],
        author: &str,
        origin: Option<u64>,
    ) -> Vec<UpdateCallback> {
        for edit in edits {
            apply(&mut self.prims, edit);
        }
        self.touch(author);
        self.notify_others(author, origin)
    }

    /// Replaces the whole content, notifying every watcher.
    pub(super) fn replace(
        &mut self,
        prims: BTreeMap<PrimPath, Prim>,
        author: &str,
    ) -> Vec<UpdateCallback> {
        self.prims = prims;
        self.touch(author);
        self.notify_others(author, None)
    }

    fn touch(&mut self, author: &str) {
        self.version = self.version.saturating_add(1);
        self.modified_by = author.to_string();
        self.modified_at = Utc::now();
    }

    fn notify_others(&mut self, author: &str, origin: Option<u64>) -> Vec<UpdateCallback> {
        let notice = UpdateNotice {
            version: self.version,
            author: author.to_string(),
        };
        self.watchers
            .iter()
            .filter(|w| Some(w.id) != origin)
            .filter_map(|w| w.notify(notice.clone()))
            .collect()
    }
}

/// Applies one edit to a prim map, creating typeless ancestors as needed.
pub(super) fn apply(prims: &mut BTreeMap<PrimPath, Prim>, edit: &Edit) {
    match edit {
        Edit::Define { path, type_name } => {
            define_ancestors(prims, path);
            prims.entry(path.clone()).or_default().type_name = type_name.clone();
        }
        Edit::Set {
            path,
            property,
            value,
        } => {
            prims
                .entry(path.clone())
                .or_default()
                .properties
                .insert(property.clone(), value.clone());
        }
        Edit::Rename { from, to } => {
            *prims = std::mem::take(prims)
                .into_iter()
                .map(|(path, prim)| (path.rebase(from, to).unwrap_or(path), prim))
                .collect();
            define_ancestors(prims, to);
        }
    }
}

fn define_ancestors(prims: &mut BTreeMap<PrimPath, Prim>, path: &PrimPath) {
    let mut ancestor = path.parent();
    while let Some(parent) = ancestor {
        ancestor = parent.parent();
        prims.entry(parent).or_default();
    }
}

/// Open handle on a server document.
pub struct MemoryDocument {
    uri: Uri,
    server: Arc<ServerState>,
    author: String,
    watcher_id: u64,
    local: BTreeMap<PrimPath, Prim>,
    pending: Vec<Edit>,
    inbox: mpsc::Receiver<UpdateNotice>,
    callback: CallbackSlot,
    version: u64,
}

impl fmt::Debug for MemoryDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryDocument")
            .field("uri", &self.uri)
            .field("author", &self.author)
            .field("version", &self.version)
            .field("prims", &self.local.len())
            .field("pending", &self.pending.len())
            .finish_non_exhaustive()
    }
}

impl MemoryDocument {
    /// Registers a watcher on `stored` and snapshots its content.
    pub(super) fn attach(
        server: &MemoryServer,
        uri: Uri,
        stored: &mut StoredDocument,
        author: &str,
    ) -> Self {
        let (tx, inbox) = mpsc::channel();
        let callback: CallbackSlot = Arc::default();
        let watcher_id = server.next_id();
        stored.watchers.push(Watcher {
            id: watcher_id,
            tx,
            callback: Arc::clone(&callback),
        });
        Self {
            uri,
            server: Arc::clone(&server.state),
            author: author.to_string(),
            watcher_id,
            local: stored.prims.clone(),
            pending: Vec::new(),
            inbox,
            callback,
            version: stored.version,
        }
    }

    fn drain_inbox(&mut self) -> usize {
        let mut pulled = 0;
        while let Ok(notice) = self.inbox.try_recv() {
            tracing::trace!(
                uri = %self.uri,
                version = notice.version,
                author = %notice.author,
                "remote update"
            );
            pulled += 1;
        }
        pulled
    }
}

impl LiveDocument for MemoryDocument {
    fn uri(&self) -> &Uri {
        &self.uri
    }

    fn define(&mut self, path: &PrimPath, type_name: &str) -> Result<(), SampleError> {
        let edit = Edit::Define {
            path: path.clone(),
            type_name: type_name.to_string(),
        };
        apply(&mut self.local, &edit);
        self.pending.push(edit);
        Ok(())
    }

    fn mutate(
        &mut self,
        path: &PrimPath,
        property: &str,
        value: serde_json::Value,
    ) -> Result<(), SampleError> {
        if !self.local.contains_key(path) {
            return Err(SampleError::PrimNotFound(path.to_string()));
        }
        let edit = Edit::Set {
            path: path.clone(),
            property: property.to_string(),
            value,
        };
        apply(&mut self.local, &edit);
        self.pending.push(edit);
        Ok(())
    }

    fn rename_prim(&mut self, from: &PrimPath, to: &PrimPath) -> Result<(), SampleError> {
        if !self.local.contains_key(from) {
            return Err(SampleError::PrimNotFound(from.to_string()));
        }
        if self.local.contains_key(to) {
            return Err(SampleError::InvalidArgument(format!("{to} already exists")));
        }
        if from.covers(to) {
            return Err(SampleError::InvalidArgument(format!(
                "cannot move {from} below itself"
            )));
        }
        let edit = Edit::Rename {
            from: from.clone(),
            to: to.clone(),
        };
        apply(&mut self.local, &edit);
        self.pending.push(edit);
        Ok(())
    }

    fn flush(&mut self) -> Result<FlushReport, SampleError> {
        if self.pending.is_empty() {
            self.server.ensure_reachable(&self.uri)?;
        } else {
            self.server.ensure_writable(&self.uri)?;
        }
        let pulled = self.drain_inbox();
        if self.pending.is_empty() && pulled == 0 {
            return Ok(FlushReport {
                pushed: 0,
                pulled: 0,
                version: self.version,
            });
        }

        let (pushed, callbacks) = {
            let mut documents = self.server.documents();
            let Some(stored) = documents.get_mut(&self.uri) else {
                return Err(SampleError::NotFound(self.uri.to_string()));
            };
            let pending = std::mem::take(&mut self.pending);
            let callbacks = if pending.is_empty() {
                Vec::new()
            } else {
                stored.commit(&pending, &self.author, Some(self.watcher_id))
            };
            self.local = stored.prims.clone();
            self.version = stored.version;
            (pending.len(), callbacks)
        };
        for callback in callbacks {
            callback();
        }

        tracing::debug!(uri = %self.uri, pushed, pulled, version = self.version, "flushed");
        Ok(FlushReport {
            pushed,
            pulled,
            version: self.version,
        })
    }

    fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    fn prim(&self, path: &PrimPath) -> Option<&Prim> {
        self.local.get(path)
    }

    fn prim_paths(&self) -> Vec<PrimPath> {
        self.local.keys().cloned().collect()
    }

    fn set_update_callback(&mut self, callback: UpdateCallback) {
        *self
            .callback
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(callback);
    }
}

impl Drop for MemoryDocument {
    fn drop(&mut self) {
        if let Some(stored) = self.server.documents().get_mut(&self.uri) {
            stored.watchers.retain(|w| w.id != self.watcher_id);
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    fn path(text: &str) -> PrimPath {
        let Ok(path) = PrimPath::parse(text) else {
            panic!("valid path");
        };
        path
    }

    #[test]
    fn define_creates_typeless_ancestors() {
        let mut prims = BTreeMap::new();
        apply(
            &mut prims,
            &Edit::Define {
                path: path("/World/Geo/box"),
                type_name: "Mesh".to_string(),
            },
        );
        assert_eq!(prims.len(), 3);
        assert_eq!(prims.get(&path("/World")).map(|p| p.type_name.as_str()), Some(""));
        assert_eq!(
            prims.get(&path("/World/Geo/box")).map(|p| p.type_name.as_str()),
            Some("Mesh")
        );
    }

    #[test]
    fn rename_carries_the_subtree() {
        let mut prims = BTreeMap::new();
        for (p, t) in [("/World/box", "Mesh"), ("/World/box/lid", "Mesh"), ("/World/boxes", "Xform")] {
            apply(
                &mut prims,
                &Edit::Define {
                    path: path(p),
                    type_name: t.to_string(),
                },
            );
        }
        apply(
            &mut prims,
            &Edit::Rename {
                from: path("/World/box"),
                to: path("/World/crate"),
            },
        );
        let paths: Vec<&str> = prims.keys().map(PrimPath::as_str).collect();
        assert_eq!(paths, ["/World", "/World/boxes", "/World/crate", "/World/crate/lid"]);
    }

    #[test]
    fn commit_bumps_version_and_skips_origin() {
        let mut stored = StoredDocument::new("alice");
        let (tx_a, rx_a) = mpsc::channel();
        let (tx_b, rx_b) = mpsc::channel();
        stored.watchers.push(Watcher {
            id: 1,
            tx: tx_a,
            callback: Arc::default(),
        });
        stored.watchers.push(Watcher {
            id: 2,
            tx: tx_b,
            callback: Arc::default(),
        });

        let edits = [Edit::Define {
            path: path("/World"),
            type_name: "Xform".to_string(),
        }];
        let callbacks = stored.commit(&edits, "alice", Some(1));
        assert!(callbacks.is_empty());
        assert_eq!(stored.version, 1);
        assert!(rx_a.try_recv().is_err());
        assert_eq!(rx_b.try_recv().map(|n| n.version).ok(), Some(1));
    }
}
