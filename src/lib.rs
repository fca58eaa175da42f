//! # ClipKeep
//!
//! Clipboard history engine for desktop sessions.
//!
//! ClipKeep watches the clipboard for ownership changes, captures new text
//! or image content, deduplicates it into a bounded most-recent-first
//! history, and persists that history across sessions as a JSON manifest
//! with out-of-band PNG files.

pub mod cli;
pub mod clipboard;
pub mod config;
pub mod engine;
pub mod history;
pub mod store;

pub use config::Config;

/// Result type alias for ClipKeep operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for ClipKeep operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// Clipboard operation error
    #[error("Clipboard error: {0}")]
    Clipboard(#[from] clipboard::ClipboardError),

    /// Persistence error
    #[error("Store error: {0}")]
    Store(#[from] store::StoreError),

    /// Engine handle error
    #[error("Engine error: {0}")]
    Engine(#[from] engine::EngineError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Library version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
