use crate::output::OutputFormat;
use crate::watcher::{Delivery, ParseErrorPolicy, WatcherOptions};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_BUFFER: usize = 64;
const DEFAULT_POLL_INTERVAL_MS: u64 = 100;

/// How events reach the printer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeliveryMode {
    Blocking,
    DropWhenFull,
}

#[derive(Debug, Deserialize, Default)]
pub struct Config {
    /// `"fail-fast"` (default) or `"skip"`
    pub parse_errors: Option<ParseErrorPolicy>,
    /// `"blocking"` (default) or `"drop-when-full"`
    pub delivery: Option<DeliveryMode>,
    /// Queue size when delivery is `"drop-when-full"`. Default: 64
    pub buffer: Option<usize>,
    /// Cancellation check interval in milliseconds. Default: 100
    pub poll_interval_ms: Option<u64>,
    /// Log filter used when `RUST_LOG` is unset, e.g. `"info"`
    pub log_level: Option<String>,
    /// `"text"` (default) or `"json"`
    pub format: Option<OutputFormat>,
}

impl Config {
    /// Load configuration from ~/.config/reflog-watch/config.toml
    ///
    /// - File missing: returns default config (Ok)
    /// - File exists but invalid TOML: returns Err so caller can show warning
    pub fn load() -> Result<Self> {
        match Self::config_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(Self::default()),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    pub fn watcher_options(&self) -> WatcherOptions {
        let delivery = match self.delivery {
            Some(DeliveryMode::DropWhenFull) => Delivery::DropWhenFull {
                capacity: self.buffer.unwrap_or(DEFAULT_BUFFER).max(1),
            },
            Some(DeliveryMode::Blocking) | None => Delivery::Blocking,
        };

        WatcherOptions {
            parse_errors: self.parse_errors.unwrap_or_default(),
            delivery,
            poll_interval: Duration::from_millis(
                self.poll_interval_ms.unwrap_or(DEFAULT_POLL_INTERVAL_MS).max(1),
            ),
        }
    }

    pub fn output_format(&self) -> OutputFormat {
        self.format.unwrap_or_default()
    }

    fn config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|d| d.join(".config").join("reflog-watch").join("config.toml"))
    }
}
