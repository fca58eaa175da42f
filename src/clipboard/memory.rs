//! In-memory clipboard backend
//!
//! Holds text or image content in process memory and emits ownership
//! events to attached watchers on every write, external or internal.
//! Used by the engine integration tests and for headless runs where no
//! system clipboard is reachable.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use super::{
    ClipboardBackend, ClipboardError, ClipboardWatcher, OwnershipEvent, Selection, IMAGE_MIME,
};

#[derive(Default)]
struct MemoryState {
    text: Option<String>,
    image: Option<Bytes>,
    watchers: Vec<mpsc::Sender<OwnershipEvent>>,
}

impl MemoryState {
    fn notify(&mut self, selection: Selection) {
        self.watchers
            .retain(|tx| tx.try_send(OwnershipEvent { selection }).is_ok());
    }
}

/// Clipboard backend backed by process memory.
#[derive(Clone, Default)]
pub struct MemoryClipboard {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryClipboard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate an external application copying text.
    pub fn copy_text_external(&self, text: &str) {
        let mut state = self.state.lock().unwrap();
        state.text = Some(text.to_string());
        state.image = None;
        state.notify(Selection::Clipboard);
    }

    /// Simulate an external application copying an image.
    pub fn copy_image_external(&self, data: Bytes) {
        let mut state = self.state.lock().unwrap();
        state.image = Some(data);
        state.text = None;
        state.notify(Selection::Clipboard);
    }

    /// Emit a primary-selection ownership change without touching the
    /// clipboard content.
    pub fn touch_primary_external(&self) {
        self.state.lock().unwrap().notify(Selection::Primary);
    }

    /// Current text content, if any.
    pub fn text(&self) -> Option<String> {
        self.state.lock().unwrap().text.clone()
    }

    /// Current image content, if any.
    pub fn image(&self) -> Option<Bytes> {
        self.state.lock().unwrap().image.clone()
    }
}

#[async_trait]
impl ClipboardBackend for MemoryClipboard {
    async fn mime_types(&self) -> Result<Vec<String>, ClipboardError> {
        let state = self.state.lock().unwrap();
        let mut mimes = Vec::new();
        if state.image.is_some() {
            mimes.push(IMAGE_MIME.to_string());
        }
        if state.text.is_some() {
            mimes.push("text/plain".to_string());
        }
        Ok(mimes)
    }

    async fn read_text(&self) -> Result<String, ClipboardError> {
        self.state
            .lock()
            .unwrap()
            .text
            .clone()
            .ok_or(ClipboardError::NoContent)
    }

    async fn read_image(&self, mime: &str) -> Result<Bytes, ClipboardError> {
        if mime != IMAGE_MIME {
            return Err(ClipboardError::UnsupportedType(mime.to_string()));
        }
        self.state
            .lock()
            .unwrap()
            .image
            .clone()
            .ok_or(ClipboardError::NoContent)
    }

    async fn write_text(&self, text: &str) -> Result<(), ClipboardError> {
        let mut state = self.state.lock().unwrap();
        state.text = Some(text.to_string());
        state.image = None;
        // Writing takes ownership, which echoes back as a change event,
        // exactly like a real clipboard. The engine's suppress gate is
        // what keeps this from being re-captured.
        state.notify(Selection::Clipboard);
        Ok(())
    }

    async fn write_image(&self, mime: &str, data: Bytes) -> Result<(), ClipboardError> {
        if mime != IMAGE_MIME {
            return Err(ClipboardError::UnsupportedType(mime.to_string()));
        }
        let mut state = self.state.lock().unwrap();
        state.image = Some(data);
        state.text = None;
        state.notify(Selection::Clipboard);
        Ok(())
    }

    async fn watch(&self) -> Result<ClipboardWatcher, ClipboardError> {
        let (tx, rx) = mpsc::channel(100);
        self.state.lock().unwrap().watchers.push(tx);
        Ok(ClipboardWatcher::new(rx, ()))
    }

    fn name(&self) -> &str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn external_copy_emits_event() {
        let clipboard = MemoryClipboard::new();
        let mut watcher = clipboard.watch().await.unwrap();

        clipboard.copy_text_external("hello");
        let event = watcher.receiver.recv().await.unwrap();
        assert_eq!(event.selection, Selection::Clipboard);
        assert_eq!(clipboard.read_text().await.unwrap(), "hello");
    }

    #[tokio::test]
    async fn image_replaces_text() {
        let clipboard = MemoryClipboard::new();
        clipboard.copy_text_external("soon gone");
        clipboard.copy_image_external(Bytes::from_static(b"png"));

        let mimes = clipboard.mime_types().await.unwrap();
        assert_eq!(mimes, vec![IMAGE_MIME.to_string()]);
        assert!(clipboard.read_text().await.is_err());
    }

    #[tokio::test]
    async fn read_image_checks_mime() {
        let clipboard = MemoryClipboard::new();
        clipboard.copy_image_external(Bytes::from_static(b"png"));
        assert!(clipboard.read_image("image/webp").await.is_err());
        assert!(clipboard.read_image(IMAGE_MIME).await.is_ok());
    }
}
