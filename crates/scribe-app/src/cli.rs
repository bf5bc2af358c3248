//! CLI argument definitions for the `scribe` binary.
//!
//! Priority resolution: CLI args > env vars > config file > defaults.

use clap::Parser;
use scribe_core::types::ConversationMode;
use std::path::PathBuf;

/// Scribe: a spoken study companion that answers from a curated corpus.
#[derive(Parser, Debug)]
#[command(name = "scribe", version, about)]
pub struct CliArgs {
    /// Path to the configuration file.
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// JSON file holding the corpus chunks.
    #[arg(long = "corpus")]
    pub corpus: Option<PathBuf>,

    /// Conversation mode for the session (study, quiz).
    #[arg(short = 'm', long = "mode")]
    pub mode: Option<ConversationMode>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short = 'l', long = "log-level")]
    pub log_level: Option<String>,

    /// Build the embedding index at startup and answer with it.
    #[arg(long = "advanced")]
    pub advanced: bool,
}

impl CliArgs {
    /// Resolve the configuration file path.
    ///
    /// Priority: --config flag > SCRIBE_CONFIG env var > platform default (~/.scribe/config.toml).
    pub fn resolve_config_path(&self) -> PathBuf {
        if let Some(ref p) = self.config {
            return p.clone();
        }
        if let Ok(p) = std::env::var("SCRIBE_CONFIG") {
            return PathBuf::from(p);
        }
        default_config_path()
    }

    /// Resolve the corpus file.
    ///
    /// Priority: --corpus flag > SCRIBE_CORPUS env var > config file value.
    /// `None` selects the built-in administrator corpus.
    pub fn resolve_corpus_path(&self, config_path: Option<&str>) -> Option<PathBuf> {
        if let Some(ref p) = self.corpus {
            return Some(p.clone());
        }
        if let Ok(p) = std::env::var("SCRIBE_CORPUS") {
            if !p.trim().is_empty() {
                return Some(PathBuf::from(p));
            }
        }
        config_path.map(PathBuf::from)
    }

    pub fn resolve_mode(&self, config_mode: ConversationMode) -> ConversationMode {
        self.mode.unwrap_or(config_mode)
    }

    /// Resolve the log level.
    ///
    /// Priority: --log-level flag > config file value.
    pub fn resolve_log_level(&self, config_level: &str) -> String {
        self.log_level
            .clone()
            .unwrap_or_else(|| config_level.to_string())
    }
}

/// Default config file path for the current platform.
fn default_config_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    if let Ok(home) = std::env::var("USERPROFILE") {
        return PathBuf::from(home).join(".scribe").join("config.toml");
    }
    #[cfg(not(target_os = "windows"))]
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".scribe").join("config.toml");
    }
    PathBuf::from("config.toml")
}
