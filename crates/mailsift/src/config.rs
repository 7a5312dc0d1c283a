//! Configuration loading.
//!
//! One TOML file, read once at startup: daemon-level connection defaults
//! plus an `[[accounts]]` entry per mailbox. Account entries may override
//! any of the defaults.
//!
//! ```toml
//! host = "imap.example.com"
//! port = 993
//! use_tls = true
//! timeout_secs = 10
//!
//! [[accounts]]
//! name = "work"
//! username = "me@example.com"
//! password = "app-password"
//! ```

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use mailsift_core::Account;
use serde::Deserialize;

/// Environment variable naming the configuration file.
pub const CONFIG_ENV: &str = "MAILSIFT_CONFIG";

/// Top-level configuration.
#[derive(Debug, Deserialize)]
pub struct Config {
    /// Default IMAP server hostname.
    pub host: String,
    /// Default IMAP server port.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Default TLS flag.
    #[serde(default = "default_use_tls")]
    pub use_tls: bool,
    /// Default connection timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Directory for the pid marker, logs and weight tables.
    #[serde(default)]
    pub state_dir: Option<PathBuf>,
    /// Monitored accounts.
    #[serde(default)]
    pub accounts: Vec<AccountEntry>,
}

/// One `[[accounts]]` entry; unset fields inherit the daemon defaults.
#[derive(Debug, Deserialize)]
pub struct AccountEntry {
    /// Login username.
    pub username: String,
    /// Login password.
    pub password: String,
    /// Display name for logs.
    #[serde(default)]
    pub name: Option<String>,
    /// Per-account host override.
    #[serde(default)]
    pub host: Option<String>,
    /// Per-account port override.
    #[serde(default)]
    pub port: Option<u16>,
    /// Per-account TLS override.
    #[serde(default)]
    pub use_tls: Option<bool>,
    /// Per-account timeout override.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

const fn default_port() -> u16 {
    993
}

const fn default_use_tls() -> bool {
    true
}

const fn default_timeout_secs() -> u64 {
    10
}

impl Config {
    /// Loads the configuration from the given path, the `MAILSIFT_CONFIG`
    /// environment variable, or the user config directory, in that order.
    ///
    /// # Errors
    ///
    /// Returns an error if no path can be resolved, the file cannot be read
    /// or parsed, or no accounts are configured.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let path = resolve_path(path)?;
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("reading configuration from {}", path.display()))?;
        let config = Self::parse(&text)
            .with_context(|| format!("parsing configuration from {}", path.display()))?;
        Ok(config)
    }

    /// Parses a configuration document.
    ///
    /// # Errors
    ///
    /// Returns an error on malformed TOML or an empty account list.
    pub fn parse(text: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(text)?;
        if config.accounts.is_empty() {
            anyhow::bail!("no accounts configured");
        }
        Ok(config)
    }

    /// Resolves every account entry against the daemon defaults.
    #[must_use]
    pub fn resolved_accounts(&self) -> Vec<Account> {
        self.accounts
            .iter()
            .map(|entry| Account {
                name: entry.name.clone(),
                host: entry.host.clone().unwrap_or_else(|| self.host.clone()),
                port: entry.port.unwrap_or(self.port),
                username: entry.username.clone(),
                password: entry.password.clone(),
                use_tls: entry.use_tls.unwrap_or(self.use_tls),
                timeout_secs: entry.timeout_secs.unwrap_or(self.timeout_secs),
            })
            .collect()
    }

    /// The state directory for this daemon instance.
    #[must_use]
    pub fn state_dir(&self) -> PathBuf {
        self.state_dir.clone().unwrap_or_else(default_state_dir)
    }
}

/// Fallback state directory when none is configured.
pub fn default_state_dir() -> PathBuf {
    dirs::state_dir()
        .or_else(dirs::data_local_dir)
        .map_or_else(
            || std::env::temp_dir().join("mailsift"),
            |dir| dir.join("mailsift"),
        )
}

/// Picks the configuration path: CLI flag, environment, user config dir.
fn resolve_path(cli: Option<&Path>) -> anyhow::Result<PathBuf> {
    if let Some(path) = cli {
        return Ok(path.to_path_buf());
    }
    if let Ok(env) = std::env::var(CONFIG_ENV) {
        return Ok(PathBuf::from(env));
    }
    dirs::config_dir()
        .map(|dir| dir.join("mailsift").join("config.toml"))
        .context("could not determine a configuration directory")
}
