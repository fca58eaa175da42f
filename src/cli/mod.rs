//! Command-line interface for ClipKeep

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use crate::clipboard::system::SystemClipboard;
use crate::config::Config;
use crate::engine;
use crate::history::{Entry, EntryKind, History};
use crate::store::HistoryStore;

#[derive(Parser)]
#[command(name = "clipkeep")]
#[command(about = "Clipboard history daemon with deduplication and persistence")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(short, long)]
    pub config: Option<PathBuf>,

    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Run the capture daemon until interrupted")]
    Start,

    #[command(about = "Show the persisted clipboard history")]
    Show {
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    #[command(about = "Clear the persisted history and its image files")]
    Clear,

    #[command(about = "Configuration management")]
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
pub enum ConfigAction {
    #[command(about = "Show current configuration")]
    Show,

    #[command(about = "Generate example configuration")]
    Init {
        #[arg(long)]
        force: bool,
    },

    #[command(about = "Validate configuration")]
    Validate,
}

pub struct CliHandler {
    config: Config,
    store: HistoryStore,
}

impl CliHandler {
    pub fn new(config_path: Option<PathBuf>) -> Result<Self> {
        let config = Config::load_config(config_path)?;
        let store = HistoryStore::new(&config.history.cache_dir);
        Ok(Self { config, store })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub async fn handle_command(&self, command: Commands) -> Result<()> {
        match command {
            Commands::Start => self.run_daemon().await,
            Commands::Show { limit } => self.show_history(limit),
            Commands::Clear => self.clear_history(),
            Commands::Config { action } => self.handle_config(action),
        }
    }

    /// Capture until SIGINT, then persist and garbage-collect images.
    async fn run_daemon(&self) -> Result<()> {
        let backend =
            Arc::new(SystemClipboard::new().context("system clipboard unavailable")?);

        let history = self.store.load(self.config.history.max_size);
        info!("loaded {} persisted entries", history.len());

        let handle =
            engine::spawn(backend, history, self.config.history.store_images).await?;

        tokio::signal::ctrl_c()
            .await
            .context("failed to listen for shutdown signal")?;
        info!("shutting down");

        let mut history = handle.shutdown().await?;
        self.store.save(&mut history)?;
        // Only after the manifest is on disk is it safe to delete
        // unreferenced image files.
        self.store.reconcile_orphans(&history);
        Ok(())
    }

    fn show_history(&self, limit: usize) -> Result<()> {
        let history = self.store.load(self.config.history.max_size);
        if history.is_empty() {
            println!("History is empty");
            return Ok(());
        }
        for (index, entry) in history.entries().iter().take(limit).enumerate() {
            println!("{index:3}  {}", describe(entry));
        }
        Ok(())
    }

    fn clear_history(&self) -> Result<()> {
        let mut empty = History::new(self.config.history.max_size);
        self.store.save(&mut empty)?;
        self.store.reconcile_orphans(&empty);
        println!("History cleared");
        Ok(())
    }

    fn handle_config(&self, action: ConfigAction) -> Result<()> {
        match action {
            ConfigAction::Show => {
                println!("{}", toml::to_string_pretty(&self.config)?);
            }
            ConfigAction::Init { force } => {
                let path = Config::generate_example_config(force)?;
                println!("Wrote {}", path.display());
            }
            ConfigAction::Validate => {
                // Loading in new() already parsed and validated.
                println!("Configuration OK");
            }
        }
        Ok(())
    }
}

/// One-line rendering of an entry for `show`.
fn describe(entry: &Entry) -> String {
    let time = chrono::DateTime::from_timestamp_millis(entry.timestamp)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| entry.timestamp.to_string());

    match entry.kind {
        EntryKind::Text => {
            let content = entry.content.as_deref().unwrap_or("");
            let flattened = content.replace(['\n', '\r'], " ");
            let mut preview: String = flattened.chars().take(60).collect();
            if flattened.chars().count() > 60 {
                preview.push_str("...");
            }
            format!("{time}  text   {preview}")
        }
        EntryKind::Image => match &entry.image_path {
            Some(path) => format!("{time}  image  {}", path.display()),
            None => format!("{time}  image  {} bytes", entry.payload.len()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn describe_truncates_long_text() {
        let entry = Entry::text("x".repeat(100), 0);
        let line = describe(&entry);
        assert!(line.contains("text"));
        assert!(line.ends_with("..."));
    }

    #[test]
    fn describe_flattens_newlines() {
        let entry = Entry::text("line one\nline two", 0);
        assert!(!describe(&entry).contains('\n'));
    }

    #[test]
    fn describe_image_without_path_shows_size() {
        let entry = Entry::image(Bytes::from_static(b"12345"), 0);
        assert!(describe(&entry).contains("5 bytes"));
    }
}
