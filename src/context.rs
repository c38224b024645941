//! Process-wide state shared by every command.
//!
//! [`SampleContext`] replaces the globals of a classic sample program: it
//! owns the client, the live-update pump and its workers, the channel
//! listener, the base-URL stack and the process flags. Tear it down with
//! [`SampleContext::shutdown`] on every exit path.
//!
//! While a document is loaded two pump workers run: `updates` processes
//! remote edits as soon as the document signals them, and `live` flushes
//! every `live_period` so local edits queued outside a command reach the
//! server.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::client::uri::Uri;
use crate::client::{ConnectionStatus, LiveClient, LiveDocument};
use crate::config::SampleConfig;
use crate::console::Console;
use crate::error::SampleError;
use crate::live::{Latch, LivePump, PumpWorker};
use crate::logging::LogHandle;
use crate::scene::Spin;
use crate::session::ChannelListener;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Shared state of the interactive sample.
#[derive(Debug)]
pub struct SampleContext {
    config: SampleConfig,
    client: Arc<dyn LiveClient>,
    console: Console,
    pump: LivePump,
    workers: tokio::sync::Mutex<Vec<PumpWorker>>,
    listener: ChannelListener,
    base_urls: Mutex<Vec<Uri>>,
    spin: Mutex<Spin>,
    session_ending: Latch,
    fatal: Latch,
    interrupted: Latch,
    log: Option<LogHandle>,
}

impl SampleContext {
    /// Builds the context and registers the connection status callback,
    /// which sets the fatal flag on any error status.
    #[must_use]
    pub fn new(config: SampleConfig, client: Arc<dyn LiveClient>, console: Console) -> Self {
        let fatal = Latch::new();
        let status_fatal = fatal.clone();
        client.set_status_callback(Arc::new(move |uri: &Uri, status: ConnectionStatus| {
            if status.is_error() {
                tracing::error!(%uri, %status, "connection problem; exiting");
                status_fatal.set();
            } else {
                tracing::debug!(%uri, %status, "connection status");
            }
        }));

        let session_ending = Latch::new();
        let listener = ChannelListener::new(
            Arc::clone(&client),
            console.clone(),
            session_ending.clone(),
            config.event_queue_capacity,
        );
        let base_urls = Mutex::new(vec![config.server_url.as_folder()]);
        Self {
            pump: LivePump::new(console.clone()),
            workers: tokio::sync::Mutex::new(Vec::new()),
            listener,
            base_urls,
            spin: Mutex::new(Spin::default()),
            session_ending,
            fatal,
            interrupted: Latch::new(),
            log: None,
            config,
            client,
            console,
        }
    }

    /// Attaches the handle used by the `log` command.
    #[must_use]
    pub fn with_log_handle(mut self, handle: LogHandle) -> Self {
        self.log = Some(handle);
        self
    }

    /// Loaded configuration.
    #[must_use]
    pub const fn config(&self) -> &SampleConfig {
        &self.config
    }

    /// Content and channel client.
    #[must_use]
    pub fn client(&self) -> &dyn LiveClient {
        self.client.as_ref()
    }

    /// User-facing output.
    #[must_use]
    pub const fn console(&self) -> &Console {
        &self.console
    }

    /// The live-update pump guarding the loaded document.
    #[must_use]
    pub const fn pump(&self) -> &LivePump {
        &self.pump
    }

    /// The channel listener.
    #[must_use]
    pub const fn listener(&self) -> &ChannelListener {
        &self.listener
    }

    /// Set when a merge notification ends the session.
    #[must_use]
    pub const fn session_ending(&self) -> &Latch {
        &self.session_ending
    }

    /// Set when the connection to the server fails.
    #[must_use]
    pub const fn fatal(&self) -> &Latch {
        &self.fatal
    }

    /// Set when the user presses Ctrl-C. The binary installs the only
    /// signal listener; everything else waits on this latch.
    #[must_use]
    pub const fn interrupted(&self) -> &Latch {
        &self.interrupted
    }

    /// Log level handle, if logging was initialised by this process.
    #[must_use]
    pub const fn log_handle(&self) -> Option<&LogHandle> {
        self.log.as_ref()
    }

    /// Advances the transform angle and returns it.
    pub fn next_angle(&self) -> f64 {
        lock(&self.spin).advance()
    }

    /// Current base URL (top of the stack).
    #[must_use]
    pub fn base_url(&self) -> Uri {
        let stack = lock(&self.base_urls);
        stack
            .last()
            .cloned()
            .unwrap_or_else(|| self.config.server_url.as_folder())
    }

    /// Resolves `reference` against the base URL; `None` yields the base.
    ///
    /// # Errors
    ///
    /// Returns [`SampleError::InvalidArgument`] for malformed references.
    pub fn resolve(&self, reference: Option<&str>) -> Result<Uri, SampleError> {
        let base = self.base_url();
        match reference {
            Some(reference) => base.join(reference),
            None => Ok(base),
        }
    }

    /// Replaces the top of the base-URL stack.
    pub fn set_base_url(&self, uri: Uri) {
        let mut stack = lock(&self.base_urls);
        stack.pop();
        stack.push(uri.as_folder());
    }

    /// Pushes a new base URL.
    pub fn push_base_url(&self, uri: Uri) {
        lock(&self.base_urls).push(uri.as_folder());
    }

    /// Pops the base URL, keeping the bottom entry. Returns the new base,
    /// or `None` if the stack was already at its bottom.
    pub fn pop_base_url(&self) -> Option<Uri> {
        let mut stack = lock(&self.base_urls);
        if stack.len() <= 1 {
            return None;
        }
        stack.pop();
        stack.last().cloned()
    }

    /// Installs `doc` as the loaded document and makes sure the `updates`
    /// and `live` workers run. A previously loaded document is dropped.
    pub async fn load_document(&self, doc: Box<dyn LiveDocument>) {
        if let Some(previous) = self.pump.load(doc).await {
            tracing::debug!(uri = %previous.uri(), "previous document closed");
        }
        let mut workers = self.workers.lock().await;
        if workers.is_empty() || workers.iter().any(PumpWorker::is_finished) {
            for worker in workers.drain(..) {
                worker.shutdown().await;
            }
            workers.push(self.pump.spawn_on_signal());
            workers.push(
                self.pump
                    .spawn_periodic("live", self.config.live_period, |_| Ok(())),
            );
        }
    }

    /// Names of the running pump workers.
    pub async fn worker_names(&self) -> Vec<String> {
        self.workers
            .lock()
            .await
            .iter()
            .filter(|w| !w.is_finished())
            .map(|w| w.name().to_string())
            .collect()
    }

    /// Stops the pump workers and closes the loaded document.
    ///
    /// # Errors
    ///
    /// [`SampleError::NoDocument`] if nothing is loaded.
    pub async fn close_document(&self) -> Result<Uri, SampleError> {
        self.stop_workers().await;
        let doc = self.pump.unload().await.ok_or(SampleError::NoDocument)?;
        Ok(doc.uri().clone())
    }

    async fn stop_workers(&self) {
        let workers = std::mem::take(&mut *self.workers.lock().await);
        for worker in workers {
            let name = worker.name().to_string();
            let cycles = worker.shutdown().await;
            tracing::debug!(worker = %name, cycles, "pump worker stopped");
        }
    }

    /// Leaves the channel, stops workers and flushes and closes the
    /// document. Safe to call more than once.
    pub async fn shutdown(&self) {
        self.listener.leave().await;
        self.stop_workers().await;
        if let Some(mut doc) = self.pump.unload().await {
            if doc.has_pending() {
                if let Err(e) = doc.flush() {
                    tracing::warn!(uri = %doc.uri(), error = %e, "final flush failed");
                }
            }
        }
        tracing::debug!("sample context shut down");
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::client::memory::MemoryServer;

    fn context(server: &MemoryServer) -> SampleContext {
        let Ok(root) = server.root() else {
            panic!("valid server root");
        };
        let client: Arc<dyn LiveClient> = Arc::new(server.connect("alice", "test"));
        SampleContext::new(SampleConfig::new(root), client, Console::buffer().0)
    }

    #[test]
    fn base_url_stack_keeps_its_root() {
        let server = MemoryServer::new("localhost");
        let ctx = context(&server);
        assert_eq!(ctx.base_url().to_string(), "memory://localhost/");

        let Ok(projects) = ctx.resolve(Some("Projects")) else {
            panic!("resolvable");
        };
        ctx.push_base_url(projects);
        assert_eq!(ctx.base_url().to_string(), "memory://localhost/Projects/");
        let Ok(scene) = ctx.resolve(Some("scene.live")) else {
            panic!("resolvable");
        };
        assert_eq!(scene.to_string(), "memory://localhost/Projects/scene.live");

        assert!(ctx.pop_base_url().is_some());
        assert!(ctx.pop_base_url().is_none());
        assert_eq!(ctx.base_url().to_string(), "memory://localhost/");
    }

    #[test]
    fn status_errors_set_the_fatal_flag() {
        let server = MemoryServer::new("localhost");
        let ctx = context(&server);
        assert!(!ctx.fatal().is_set());
        server.set_online(false);
        assert!(ctx.fatal().is_set());
    }

    #[tokio::test]
    async fn load_close_and_shutdown() {
        let server = MemoryServer::new("localhost");
        let ctx = context(&server);
        let Ok(uri) = ctx.resolve(Some("doc.live")) else {
            panic!("resolvable");
        };
        let Ok(doc) = ctx.client().create(&uri) else {
            panic!("create");
        };
        ctx.load_document(doc).await;
        assert!(ctx.pump().is_loaded().await);
        assert_eq!(ctx.worker_names().await, ["updates", "live"]);

        let closed = ctx.close_document().await;
        assert!(ctx.worker_names().await.is_empty());
        assert_eq!(closed.ok(), Some(uri));
        assert!(matches!(
            ctx.close_document().await,
            Err(SampleError::NoDocument)
        ));
        ctx.shutdown().await;
        ctx.shutdown().await;
    }

    #[tokio::test]
    async fn live_worker_flushes_queued_edits() {
        let server = MemoryServer::new("localhost");
        let ctx = context(&server);
        let Ok(uri) = ctx.resolve(Some("queued.live")) else {
            panic!("resolvable");
        };
        let Ok(mut doc) = ctx.client().create(&uri) else {
            panic!("create");
        };
        let Ok(world) = crate::client::prim::PrimPath::parse("/World") else {
            panic!("valid path");
        };
        assert!(doc.define(&world, "Xform").is_ok());
        assert_eq!(server.document_version(&uri), Some(0));

        ctx.load_document(doc).await;
        let mut flushed = false;
        for _ in 0..200 {
            if server.document_version(&uri) == Some(1) {
                flushed = true;
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        assert!(flushed, "the live worker never pushed the queued edit");
        ctx.shutdown().await;
    }
}
