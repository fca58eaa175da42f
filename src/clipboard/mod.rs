//! Clipboard abstraction layer
//!
//! This module provides the seam between the capture engine and the host
//! clipboard: MIME inspection, asynchronous text/image reads, writes, and
//! a change-event stream. The system implementation lives in [`system`];
//! [`memory`] is an in-process backend for headless use and tests.

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use tokio::sync::mpsc;

pub mod memory;
pub mod system;

/// The single image MIME type captured and restored by the engine.
pub const IMAGE_MIME: &str = "image/png";

/// Which selection a change event refers to. Only the clipboard selection
/// is captured; primary-selection events are ignored by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    /// Middle-click selection on Linux
    Primary,
    /// Ctrl+C/V clipboard
    Clipboard,
}

/// Clipboard-ownership change notification.
#[derive(Debug, Clone, Copy)]
pub struct OwnershipEvent {
    /// Which selection changed owner
    pub selection: Selection,
}

/// Stream of ownership-change events plus the resource keeping the
/// underlying listener alive. Dropping the watcher detaches it.
pub struct ClipboardWatcher {
    /// Channel receiver for ownership-change events
    pub receiver: mpsc::Receiver<OwnershipEvent>,
    /// Handle that keeps the event source running
    _handle: Box<dyn Send + Sync>,
}

impl ClipboardWatcher {
    /// Create a new watcher with the given receiver
    pub fn new(
        receiver: mpsc::Receiver<OwnershipEvent>,
        handle: impl Send + Sync + 'static,
    ) -> Self {
        Self {
            receiver,
            _handle: Box::new(handle),
        }
    }
}

/// Clipboard errors
#[derive(Debug, Error)]
pub enum ClipboardError {
    /// Platform-specific error
    #[error("Platform error: {0}")]
    Platform(String),

    /// No content available for the requested format
    #[error("No clipboard content available")]
    NoContent,

    /// Unsupported content type
    #[error("Unsupported content type: {0}")]
    UnsupportedType(String),

    /// Failed to encode or decode image bytes
    #[error("Image conversion failed: {0}")]
    ImageConversion(String),

    /// Watch error
    #[error("Failed to watch clipboard: {0}")]
    WatchError(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Host clipboard capability consumed by the capture engine.
#[async_trait]
pub trait ClipboardBackend: Send + Sync {
    /// MIME types currently offered by the clipboard owner.
    async fn mime_types(&self) -> Result<Vec<String>, ClipboardError>;

    /// Read the current clipboard as text.
    async fn read_text(&self) -> Result<String, ClipboardError>;

    /// Read the current clipboard as encoded bytes for `mime`.
    async fn read_image(&self, mime: &str) -> Result<Bytes, ClipboardError>;

    /// Write text to the clipboard.
    async fn write_text(&self, text: &str) -> Result<(), ClipboardError>;

    /// Write encoded image bytes to the clipboard.
    async fn write_image(&self, mime: &str, data: Bytes) -> Result<(), ClipboardError>;

    /// Start observing ownership changes.
    async fn watch(&self) -> Result<ClipboardWatcher, ClipboardError>;

    /// Backend name, for logs.
    fn name(&self) -> &str;
}

/// True if any offered MIME type is an image format.
pub fn has_image_mime(mime_types: &[String]) -> bool {
    mime_types.iter().any(|m| m.starts_with("image/"))
}
