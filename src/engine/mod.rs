//! Capture engine
//!
//! A single task owns the history and everything that mutates it:
//! ownership-change events are debounced (trailing edge, 300 ms), the
//! winning event triggers one asynchronous clipboard read, and the result
//! is deduplicated and inserted. Promotion of an existing entry writes it
//! back to the clipboard behind a one-shot suppress gate so the engine
//! never re-captures its own write.
//!
//! The actor model gives the single-threaded guarantees the engine needs
//! with no locks: commands and events are serialized through channels, at
//! most one capture is in flight, and subscribers observe mutations only
//! at completed-operation boundaries via snapshot broadcasts.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

use crate::clipboard::{
    has_image_mime, ClipboardBackend, ClipboardError, ClipboardWatcher, Selection, IMAGE_MIME,
};
use crate::history::{History, HistorySnapshot};

/// Trailing-edge debounce applied to ownership-change bursts.
pub const DEBOUNCE_MS: u64 = 300;

/// Engine handle errors
#[derive(Debug, Error)]
pub enum EngineError {
    /// The engine task has shut down
    #[error("capture engine is no longer running")]
    Closed,
}

/// Suppress-next-capture state machine. `Suppressed` swallows exactly one
/// capture cycle, the one triggered by the engine's own promotional write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CaptureGate {
    Armed,
    Suppressed,
}

enum Command {
    Select(usize),
    Clear,
    SetMaxSize(usize),
    SetStoreImages(bool),
    Snapshot(oneshot::Sender<HistorySnapshot>),
    Shutdown(oneshot::Sender<History>),
}

struct CaptureEngine {
    backend: Arc<dyn ClipboardBackend>,
    history: History,
    store_images: bool,
    gate: CaptureGate,
    changes: broadcast::Sender<HistorySnapshot>,
}

impl CaptureEngine {
    fn notify(&self) {
        // No receivers is fine; subscribers come and go.
        let _ = self.changes.send(self.history.snapshot());
    }

    /// Read the clipboard and insert the result. Called once per settled
    /// debounce window. A failed read aborts this cycle only.
    async fn capture_now(&mut self) {
        if self.gate == CaptureGate::Suppressed {
            self.gate = CaptureGate::Armed;
            debug!("skipping capture of our own clipboard write");
            return;
        }

        let mime_types = match self.backend.mime_types().await {
            Ok(mime_types) => mime_types,
            Err(e) => {
                warn!("failed to inspect clipboard targets: {}", e);
                return;
            }
        };

        let changed = if has_image_mime(&mime_types) && self.store_images {
            match self.backend.read_image(IMAGE_MIME).await {
                Ok(payload) => self.history.push_image(payload),
                Err(e) => {
                    warn!("failed to read clipboard image: {}", e);
                    false
                }
            }
        } else {
            match self.backend.read_text().await {
                Ok(text) => self.history.push_text(&text),
                Err(ClipboardError::NoContent) => false,
                Err(e) => {
                    warn!("failed to read clipboard text: {}", e);
                    false
                }
            }
        };

        if changed {
            debug!("captured clipboard entry, history length {}", self.history.len());
            self.notify();
        }
    }

    /// Promote the entry at `index` and write it back to the clipboard.
    async fn select(&mut self, index: usize) {
        let Some(entry) = self.history.select(index) else {
            debug!("select index {} out of range", index);
            return;
        };
        let entry = entry.clone();

        // Arm the gate before writing: the write hands us clipboard
        // ownership, and that change event must not become a new entry.
        self.gate = CaptureGate::Suppressed;

        let result = if entry.is_text() {
            match entry.content.as_deref() {
                Some(text) => self.backend.write_text(text).await,
                None => Ok(()),
            }
        } else if !entry.payload.is_empty() {
            self.backend.write_image(IMAGE_MIME, entry.payload.clone()).await
        } else {
            // Released payload with no bytes left in memory; promotion
            // still reorders the history.
            Ok(())
        };

        if let Err(e) = result {
            warn!("failed to write selection to clipboard: {}", e);
        }

        // Subscribers see the promotion whether or not the write landed.
        self.notify();
    }
}

async fn run(mut engine: CaptureEngine, mut commands: mpsc::Receiver<Command>, mut watcher: ClipboardWatcher) {
    let mut deadline: Option<Instant> = None;
    let mut watching = true;

    loop {
        tokio::select! {
            event = watcher.receiver.recv(), if watching => {
                match event {
                    Some(event) if event.selection == Selection::Clipboard => {
                        // Trailing-edge debounce: every event restarts the
                        // window, only the last one in a burst fires.
                        deadline = Some(Instant::now() + Duration::from_millis(DEBOUNCE_MS));
                    }
                    Some(_) => {} // primary selection, not captured
                    None => {
                        debug!("clipboard watcher closed");
                        watching = false;
                    }
                }
            }

            // The guard keeps this arm inert until a debounce is pending,
            // so the unwrap cannot observe None.
            _ = async move { sleep_until(deadline.unwrap()).await }, if deadline.is_some() => {
                deadline = None;
                engine.capture_now().await;
            }

            command = commands.recv() => {
                match command {
                    Some(Command::Select(index)) => engine.select(index).await,
                    Some(Command::Clear) => {
                        engine.history.clear();
                        engine.notify();
                    }
                    Some(Command::SetMaxSize(max_size)) => engine.history.set_max_size(max_size),
                    Some(Command::SetStoreImages(enabled)) => engine.store_images = enabled,
                    Some(Command::Snapshot(reply)) => {
                        let _ = reply.send(engine.history.snapshot());
                    }
                    Some(Command::Shutdown(reply)) => {
                        let history =
                            std::mem::replace(&mut engine.history, History::new(1));
                        let _ = reply.send(history);
                        break;
                    }
                    None => break,
                }
            }
        }
    }

    // Dropping the watcher detaches the listener; a transfer completing
    // after this point has nobody to deliver to and is safely discarded.
    info!("capture engine stopped");
}

/// Command-and-subscription handle to a running capture engine.
#[derive(Clone)]
pub struct EngineHandle {
    commands: mpsc::Sender<Command>,
    changes: broadcast::Sender<HistorySnapshot>,
}

impl EngineHandle {
    /// Receive a history snapshot after every observable mutation.
    pub fn subscribe(&self) -> broadcast::Receiver<HistorySnapshot> {
        self.changes.subscribe()
    }

    /// Current history snapshot.
    pub async fn snapshot(&self) -> Result<HistorySnapshot, EngineError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(Command::Snapshot(tx))
            .await
            .map_err(|_| EngineError::Closed)?;
        rx.await.map_err(|_| EngineError::Closed)
    }

    /// Promote the entry at `index` and restore it to the clipboard.
    /// Out-of-range indices are a no-op.
    pub async fn select_item(&self, index: usize) -> Result<(), EngineError> {
        self.commands
            .send(Command::Select(index))
            .await
            .map_err(|_| EngineError::Closed)
    }

    /// Drop all entries. Disk cleanup happens at the next reconciliation.
    pub async fn clear_all(&self) -> Result<(), EngineError> {
        self.commands
            .send(Command::Clear)
            .await
            .map_err(|_| EngineError::Closed)
    }

    /// Update the history capacity, trimming immediately if smaller.
    pub async fn set_max_size(&self, max_size: usize) -> Result<(), EngineError> {
        self.commands
            .send(Command::SetMaxSize(max_size))
            .await
            .map_err(|_| EngineError::Closed)
    }

    /// Toggle future image capture. Existing image entries are untouched.
    pub async fn set_store_images(&self, enabled: bool) -> Result<(), EngineError> {
        self.commands
            .send(Command::SetStoreImages(enabled))
            .await
            .map_err(|_| EngineError::Closed)
    }

    /// Stop the engine and take back the history for persistence.
    /// Any pending debounce is cancelled.
    pub async fn shutdown(self) -> Result<History, EngineError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(Command::Shutdown(tx))
            .await
            .map_err(|_| EngineError::Closed)?;
        rx.await.map_err(|_| EngineError::Closed)
    }
}

/// Attach to the backend's change events and start the engine task.
pub async fn spawn(
    backend: Arc<dyn ClipboardBackend>,
    history: History,
    store_images: bool,
) -> Result<EngineHandle, ClipboardError> {
    let watcher = backend.watch().await?;
    let (command_tx, command_rx) = mpsc::channel(32);
    let (changes, _) = broadcast::channel(32);

    info!(
        "capture engine starting on {} backend, capacity {}",
        backend.name(),
        history.max_size()
    );

    let engine = CaptureEngine {
        backend,
        history,
        store_images,
        gate: CaptureGate::Armed,
        changes: changes.clone(),
    };
    tokio::spawn(run(engine, command_rx, watcher));

    Ok(EngineHandle {
        commands: command_tx,
        changes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clipboard::memory::MemoryClipboard;
    use bytes::Bytes;

    fn engine_over(clipboard: &MemoryClipboard, store_images: bool) -> CaptureEngine {
        let (changes, _) = broadcast::channel(8);
        CaptureEngine {
            backend: Arc::new(clipboard.clone()),
            history: History::new(10),
            store_images,
            gate: CaptureGate::Armed,
            changes,
        }
    }

    #[tokio::test]
    async fn captures_text() {
        let clipboard = MemoryClipboard::new();
        clipboard.copy_text_external("hello");

        let mut engine = engine_over(&clipboard, true);
        engine.capture_now().await;

        assert_eq!(engine.history.len(), 1);
        assert!(engine.history.head().unwrap().matches_text("hello"));
    }

    #[tokio::test]
    async fn prefers_image_when_offered() {
        let clipboard = MemoryClipboard::new();
        clipboard.copy_image_external(Bytes::from_static(b"pngbytes"));

        let mut engine = engine_over(&clipboard, true);
        engine.capture_now().await;

        let head = engine.history.head().unwrap();
        assert!(head.is_image());
        assert_eq!(head.payload.as_ref(), b"pngbytes");
    }

    #[tokio::test]
    async fn store_images_off_falls_back_to_text() {
        let clipboard = MemoryClipboard::new();
        clipboard.copy_image_external(Bytes::from_static(b"pngbytes"));

        let mut engine = engine_over(&clipboard, false);
        engine.capture_now().await;

        // Image-only clipboard with image capture disabled: the text read
        // finds nothing and the cycle is a clean no-op.
        assert!(engine.history.is_empty());
    }

    #[tokio::test]
    async fn suppressed_gate_skips_one_cycle() {
        let clipboard = MemoryClipboard::new();
        clipboard.copy_text_external("own write");

        let mut engine = engine_over(&clipboard, true);
        engine.gate = CaptureGate::Suppressed;

        engine.capture_now().await;
        assert!(engine.history.is_empty());
        assert_eq!(engine.gate, CaptureGate::Armed);

        // The gate re-armed: the next cycle captures normally.
        engine.capture_now().await;
        assert_eq!(engine.history.len(), 1);
    }

    #[tokio::test]
    async fn select_writes_back_and_suppresses() {
        let clipboard = MemoryClipboard::new();
        let mut engine = engine_over(&clipboard, true);
        engine.history.push_text("older");
        engine.history.push_text("newer");

        engine.select(1).await;

        assert!(engine.history.head().unwrap().matches_text("older"));
        assert_eq!(clipboard.text().as_deref(), Some("older"));
        assert_eq!(engine.gate, CaptureGate::Suppressed);
    }

    #[tokio::test]
    async fn select_out_of_range_leaves_gate_armed() {
        let clipboard = MemoryClipboard::new();
        let mut engine = engine_over(&clipboard, true);
        engine.history.push_text("only");

        engine.select(7).await;

        assert_eq!(engine.gate, CaptureGate::Armed);
        assert!(clipboard.text().is_none());
    }

    #[tokio::test]
    async fn select_image_restores_bytes() {
        let clipboard = MemoryClipboard::new();
        let mut engine = engine_over(&clipboard, true);
        engine.history.push_image(Bytes::from_static(b"imgdata"));
        engine.history.push_text("top");

        engine.select(1).await;

        assert_eq!(clipboard.image().unwrap().as_ref(), b"imgdata");
    }

    #[tokio::test]
    async fn capture_failure_leaves_history_intact() {
        let clipboard = MemoryClipboard::new();
        let mut engine = engine_over(&clipboard, true);
        engine.history.push_text("existing");

        // Empty clipboard: the read reports no content.
        engine.capture_now().await;

        assert_eq!(engine.history.len(), 1);
    }
}
