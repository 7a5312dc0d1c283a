//! Account model types.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// A monitored mailbox account, fully resolved.
///
/// Loaded once at startup from configuration and never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    /// Display name; falls back to the username in logs.
    #[serde(default)]
    pub name: Option<String>,
    /// IMAP server hostname.
    pub host: String,
    /// IMAP server port (default: 993).
    #[serde(default = "default_port")]
    pub port: u16,
    /// Username for authentication.
    pub username: String,
    /// Password for authentication.
    pub password: String,
    /// Whether to connect with implicit TLS.
    #[serde(default = "default_use_tls")]
    pub use_tls: bool,
    /// Connection timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
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

impl Account {
    /// Connection timeout as a duration.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Name used in log lines for this account.
    #[must_use]
    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.username)
    }
}
