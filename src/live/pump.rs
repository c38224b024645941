//! The live-update pump.
//!
//! A [`LivePump`] owns the slot holding the currently loaded document.
//! Every access goes through one async mutex, so a mutation and the flush
//! that publishes it form a single critical section no matter whether they
//! come from a command ([`LivePump::edit`]), a periodic worker
//! ([`LivePump::spawn_periodic`]) or the signal-driven worker
//! ([`LivePump::spawn_on_signal`]).
//!
//! Workers are stopped through a [`Latch`] and joined; they are never
//! aborted mid-flush.
//!
//! Every flush that pulls remote updates publishes the new document
//! version on a `tokio::sync::watch` channel; see [`LivePump::subscribe`].

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;

use super::signal::{Latch, UpdateSignal};
use crate::client::{FlushReport, LiveDocument};
use crate::console::Console;
use crate::error::SampleError;

type DocumentSlot = Arc<Mutex<Option<Box<dyn LiveDocument>>>>;

/// Serializes all access to the loaded document.
#[derive(Debug, Clone)]
pub struct LivePump {
    slot: DocumentSlot,
    signal: Arc<UpdateSignal>,
    pulled: Arc<watch::Sender<u64>>,
    console: Console,
}

/// Publishes the version reached by a flush that pulled remote updates.
fn publish(pulled: &watch::Sender<u64>, report: &FlushReport) {
    if report.pulled > 0 {
        pulled.send_replace(report.version);
    }
}

impl LivePump {
    /// Creates a pump with an empty slot.
    #[must_use]
    pub fn new(console: Console) -> Self {
        Self {
            slot: Arc::default(),
            signal: Arc::new(UpdateSignal::new()),
            pulled: Arc::new(watch::channel(0).0),
            console,
        }
    }

    /// The pending-update flag raised by the loaded document.
    #[must_use]
    pub fn signal(&self) -> &Arc<UpdateSignal> {
        &self.signal
    }

    /// Receives the document version after every flush that pulled remote
    /// updates, whichever worker or command ran it.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.pulled.subscribe()
    }

    /// Installs `doc`, returning the previously loaded document.
    ///
    /// The document's update callback is pointed at this pump's signal.
    pub async fn load(&self, mut doc: Box<dyn LiveDocument>) -> Option<Box<dyn LiveDocument>> {
        let signal = Arc::clone(&self.signal);
        let console = self.console.clone();
        doc.set_update_callback(Arc::new(move || {
            console.line("Live update queued");
            signal.raise();
        }));
        tracing::info!(uri = %doc.uri(), "document loaded");
        self.slot.lock().await.replace(doc)
    }

    /// Removes and returns the loaded document.
    pub async fn unload(&self) -> Option<Box<dyn LiveDocument>> {
        let doc = self.slot.lock().await.take();
        if let Some(doc) = &doc {
            tracing::info!(uri = %doc.uri(), "document unloaded");
        }
        doc
    }

    /// Returns `true` if a document is loaded.
    pub async fn is_loaded(&self) -> bool {
        self.slot.lock().await.is_some()
    }

    /// Runs `f` against the loaded document without flushing.
    ///
    /// # Errors
    ///
    /// [`SampleError::NoDocument`] if nothing is loaded.
    pub async fn read<T>(&self, f: impl FnOnce(&dyn LiveDocument) -> T) -> Result<T, SampleError> {
        let guard = self.slot.lock().await;
        let doc = guard.as_deref().ok_or(SampleError::NoDocument)?;
        Ok(f(doc))
    }

    /// Applies `f` and flushes, holding the lock across both.
    ///
    /// # Errors
    ///
    /// [`SampleError::NoDocument`] if nothing is loaded, otherwise the
    /// first error of `f` or of the flush.
    pub async fn edit<T>(
        &self,
        f: impl FnOnce(&mut dyn LiveDocument) -> Result<T, SampleError>,
    ) -> Result<(T, FlushReport), SampleError> {
        let mut guard = self.slot.lock().await;
        let doc = guard.as_deref_mut().ok_or(SampleError::NoDocument)?;
        let value = f(&mut *doc)?;
        let report = doc.flush()?;
        publish(&self.pulled, &report);
        Ok((value, report))
    }

    /// Flushes the loaded document.
    ///
    /// # Errors
    ///
    /// [`SampleError::NoDocument`] if nothing is loaded, otherwise the
    /// flush error.
    pub async fn process(&self) -> Result<FlushReport, SampleError> {
        let mut guard = self.slot.lock().await;
        let doc = guard.as_deref_mut().ok_or(SampleError::NoDocument)?;
        let report = doc.flush()?;
        publish(&self.pulled, &report);
        Ok(report)
    }

    /// Spawns a worker that sleeps `period`, then applies `tick` and
    /// flushes, until stopped. Cycles without a loaded document are
    /// skipped; a connection error ends the worker. Other failures are
    /// logged once per run of consecutive failures.
    pub fn spawn_periodic<F>(&self, name: impl Into<String>, period: Duration, mut tick: F) -> PumpWorker
    where
        F: FnMut(&mut dyn LiveDocument) -> Result<(), SampleError> + Send + 'static,
    {
        let name = name.into();
        let slot = Arc::clone(&self.slot);
        let pulled = Arc::clone(&self.pulled);
        let stop = Latch::new();
        let worker_stop = stop.clone();
        let worker_name = name.clone();

        let handle = tokio::spawn(async move {
            let mut cycles = 0_u64;
            let mut failing = false;
            while !worker_stop.is_set() {
                tokio::select! {
                    () = tokio::time::sleep(period) => {}
                    () = worker_stop.wait() => break,
                }
                let mut guard = slot.lock().await;
                let Some(doc) = guard.as_deref_mut() else {
                    continue;
                };
                let result = tick(&mut *doc).and_then(|()| doc.flush());
                drop(guard);
                match result {
                    Ok(report) => {
                        publish(&pulled, &report);
                        failing = false;
                        cycles += 1;
                    }
                    Err(e) if e.is_fatal() => {
                        tracing::error!(worker = %worker_name, error = %e, "worker stopping");
                        break;
                    }
                    Err(e) if failing => tracing::debug!(worker = %worker_name, error = %e, "tick failed again"),
                    Err(e) => {
                        failing = true;
                        tracing::warn!(worker = %worker_name, error = %e, "tick failed");
                    }
                }
            }
            cycles
        });

        tracing::debug!(worker = %name, ?period, "periodic worker started");
        PumpWorker { name, stop, handle }
    }

    /// Spawns a worker that processes updates once per coalesced raise of
    /// [`LivePump::signal`].
    pub fn spawn_on_signal(&self) -> PumpWorker {
        let pump = self.clone();
        let stop = Latch::new();
        let worker_stop = stop.clone();

        let handle = tokio::spawn(async move {
            let mut cycles = 0_u64;
            while !worker_stop.is_set() {
                tokio::select! {
                    () = pump.signal.wait() => {}
                    () = worker_stop.wait() => break,
                }
                match pump.process().await {
                    Ok(report) => {
                        cycles += 1;
                        tracing::debug!(
                            pushed = report.pushed,
                            pulled = report.pulled,
                            version = report.version,
                            "live updates processed"
                        );
                    }
                    Err(SampleError::NoDocument) => {}
                    Err(e) if e.is_fatal() => {
                        tracing::error!(error = %e, "update worker stopping");
                        break;
                    }
                    Err(e) => tracing::warn!(error = %e, "processing live updates failed"),
                }
            }
            cycles
        });

        PumpWorker {
            name: "updates".to_string(),
            stop,
            handle,
        }
    }
}

/// Handle on a running pump worker.
#[derive(Debug)]
pub struct PumpWorker {
    name: String,
    stop: Latch,
    handle: JoinHandle<u64>,
}

impl PumpWorker {
    /// Worker name used in logs.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns `true` once the worker has exited on its own.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Sets the stop flag, waits for the worker and returns how many
    /// cycles it completed.
    pub async fn shutdown(self) -> u64 {
        self.stop.set();
        match self.handle.await {
            Ok(cycles) => {
                tracing::debug!(worker = %self.name, cycles, "worker joined");
                cycles
            }
            Err(e) => {
                tracing::warn!(worker = %self.name, error = %e, "worker did not finish cleanly");
                0
            }
        }
    }
}
