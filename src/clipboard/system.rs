//! System clipboard backend over `arboard`
//!
//! `arboard` hands images over as raw RGBA, so captures are re-encoded to
//! PNG on the way in and decoded on the way out. It also exposes no native
//! change events; the watcher polls and fingerprints the content to detect
//! ownership changes. Deduplication authority stays with the engine; the
//! fingerprint only gates event emission.

use std::borrow::Cow;
use std::io::Cursor;
use std::time::Duration;

use arboard::{Clipboard, ImageData};
use async_trait::async_trait;
use bytes::Bytes;
use image::ImageOutputFormat;
use tokio::sync::mpsc;
use tokio::time::interval;
use tracing::trace;

use super::{
    ClipboardBackend, ClipboardError, ClipboardWatcher, OwnershipEvent, Selection, IMAGE_MIME,
};

/// Poll period for the change watcher.
const WATCH_INTERVAL: Duration = Duration::from_millis(200);

/// System clipboard provider.
///
/// `arboard::Clipboard` is neither `Sync` nor cheap to hold across await
/// points, so each operation opens a fresh handle on a blocking thread.
pub struct SystemClipboard;

impl SystemClipboard {
    /// Create the system backend, probing the clipboard once so headless
    /// sessions fail fast instead of on first capture.
    pub fn new() -> Result<Self, ClipboardError> {
        Clipboard::new()
            .map_err(|e| ClipboardError::Platform(format!("failed to open clipboard: {e}")))?;
        Ok(Self)
    }
}

async fn with_clipboard<T, F>(op: F) -> Result<T, ClipboardError>
where
    T: Send + 'static,
    F: FnOnce(&mut Clipboard) -> Result<T, ClipboardError> + Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let mut clipboard = Clipboard::new()
            .map_err(|e| ClipboardError::Platform(format!("failed to open clipboard: {e}")))?;
        op(&mut clipboard)
    })
    .await
    .map_err(|e| ClipboardError::Platform(format!("clipboard task failed: {e}")))?
}

/// Encode an arboard RGBA image as PNG.
fn encode_png(image: ImageData<'_>) -> Result<Bytes, ClipboardError> {
    let buffer = image::ImageBuffer::<image::Rgba<u8>, _>::from_raw(
        image.width as u32,
        image.height as u32,
        image.bytes.into_owned(),
    )
    .ok_or_else(|| ClipboardError::ImageConversion("invalid RGBA buffer".to_string()))?;

    let mut out = Vec::new();
    buffer
        .write_to(&mut Cursor::new(&mut out), ImageOutputFormat::Png)
        .map_err(|e| ClipboardError::ImageConversion(e.to_string()))?;
    Ok(Bytes::from(out))
}

/// Decode PNG bytes into the RGBA form arboard expects.
fn decode_png(data: &[u8]) -> Result<ImageData<'static>, ClipboardError> {
    let decoded = image::load_from_memory(data)
        .map_err(|e| ClipboardError::ImageConversion(e.to_string()))?
        .to_rgba8();
    Ok(ImageData {
        width: decoded.width() as usize,
        height: decoded.height() as usize,
        bytes: Cow::from(decoded.into_raw()),
    })
}

/// Cheap content identity used by the polling watcher.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Fingerprint {
    Empty,
    Text(String),
    Image {
        width: usize,
        height: usize,
        bytes: Vec<u8>,
    },
}

fn read_fingerprint(clipboard: &mut Clipboard) -> Fingerprint {
    if let Ok(image) = clipboard.get_image() {
        return Fingerprint::Image {
            width: image.width,
            height: image.height,
            bytes: image.bytes.into_owned(),
        };
    }
    match clipboard.get_text() {
        Ok(text) if !text.is_empty() => Fingerprint::Text(text),
        _ => Fingerprint::Empty,
    }
}

#[async_trait]
impl ClipboardBackend for SystemClipboard {
    async fn mime_types(&self) -> Result<Vec<String>, ClipboardError> {
        // arboard cannot enumerate offered targets; probe image first,
        // then text, matching the engine's capture preference.
        with_clipboard(|clipboard| {
            if clipboard.get_image().is_ok() {
                return Ok(vec![IMAGE_MIME.to_string()]);
            }
            match clipboard.get_text() {
                Ok(text) if !text.is_empty() => Ok(vec!["text/plain".to_string()]),
                _ => Ok(Vec::new()),
            }
        })
        .await
    }

    async fn read_text(&self) -> Result<String, ClipboardError> {
        with_clipboard(|clipboard| clipboard.get_text().map_err(|_| ClipboardError::NoContent))
            .await
    }

    async fn read_image(&self, mime: &str) -> Result<Bytes, ClipboardError> {
        if mime != IMAGE_MIME {
            return Err(ClipboardError::UnsupportedType(mime.to_string()));
        }
        with_clipboard(|clipboard| {
            let image = clipboard.get_image().map_err(|_| ClipboardError::NoContent)?;
            encode_png(image)
        })
        .await
    }

    async fn write_text(&self, text: &str) -> Result<(), ClipboardError> {
        let text = text.to_string();
        with_clipboard(move |clipboard| {
            clipboard
                .set_text(text)
                .map_err(|e| ClipboardError::Platform(format!("failed to set text: {e}")))
        })
        .await
    }

    async fn write_image(&self, mime: &str, data: Bytes) -> Result<(), ClipboardError> {
        if mime != IMAGE_MIME {
            return Err(ClipboardError::UnsupportedType(mime.to_string()));
        }
        with_clipboard(move |clipboard| {
            let image = decode_png(&data)?;
            clipboard
                .set_image(image)
                .map_err(|e| ClipboardError::Platform(format!("failed to set image: {e}")))
        })
        .await
    }

    async fn watch(&self) -> Result<ClipboardWatcher, ClipboardError> {
        let (tx, rx) = mpsc::channel(100);

        let handle = tokio::spawn(async move {
            let mut ticker = interval(WATCH_INTERVAL);
            // Baseline from whatever is on the clipboard at attach time;
            // pre-existing content is not re-announced.
            let mut last: Option<Fingerprint> = None;

            loop {
                ticker.tick().await;

                let current = tokio::task::spawn_blocking(|| {
                    Clipboard::new().ok().map(|mut c| read_fingerprint(&mut c))
                })
                .await
                .ok()
                .flatten();

                let Some(current) = current else { continue };

                let changed = last.as_ref().is_some_and(|prev| *prev != current);
                if last.is_none() {
                    last = Some(current);
                    continue;
                }
                if changed {
                    trace!("clipboard content changed");
                    last = Some(current);
                    let event = OwnershipEvent {
                        selection: Selection::Clipboard,
                    };
                    if tx.send(event).await.is_err() {
                        break;
                    }
                }
            }
        });

        Ok(ClipboardWatcher::new(rx, handle))
    }

    fn name(&self) -> &str {
        "system"
    }
}
