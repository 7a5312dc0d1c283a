//! Error types and failure classification for the core library.

use thiserror::Error;

/// Errors that can occur in core operations.
#[derive(Debug, Error)]
pub enum Error {
    /// IMAP operation failed.
    #[error("IMAP error: {0}")]
    Imap(#[from] mailsift_imap::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

/// How a failure affects the account it occurred on.
///
/// Transient failures are retried with capped backoff; fatal failures stop
/// the account's supervisor. Nothing stops the daemon itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Retry with backoff.
    Transient,
    /// Stop supervising the affected account.
    Fatal,
}

impl Error {
    /// Classifies the failure for the connection supervisor.
    ///
    /// Network-level trouble (refused connects, resets, timeouts, a server
    /// BYE) is transient. TLS negotiation failures, rejected credentials and
    /// anything unrecognized are fatal for the account: fail closed rather
    /// than retry blindly.
    #[must_use]
    pub const fn severity(&self) -> Severity {
        use mailsift_imap::Error as Imap;
        match self {
            Self::Imap(Imap::Io(_) | Imap::Bye(_) | Imap::Timeout(_)) | Self::Io(_) => {
                Severity::Transient
            }
            _ => Severity::Fatal,
        }
    }

    /// True for server refusals of a single operation (NO/BAD completions).
    ///
    /// The triage pipeline recovers from these locally: log, leave the
    /// message where it is, keep going.
    #[must_use]
    pub const fn is_operation_refusal(&self) -> bool {
        use mailsift_imap::Error as Imap;
        matches!(self, Self::Imap(Imap::No(_) | Imap::Bad(_)))
    }

    /// True when the server rejected the credentials.
    #[must_use]
    pub const fn is_auth(&self) -> bool {
        matches!(self, Self::Imap(mailsift_imap::Error::Auth(_)))
    }

    /// True for transport-security negotiation failures.
    #[must_use]
    pub const fn is_security(&self) -> bool {
        use mailsift_imap::Error as Imap;
        matches!(self, Self::Imap(Imap::Tls(_) | Imap::InvalidDnsName(_)))
    }
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_errors_are_transient() {
        let err = Error::Imap(mailsift_imap::Error::Io(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "refused",
        )));
        assert_eq!(err.severity(), Severity::Transient);
    }

    #[test]
    fn auth_rejection_is_fatal() {
        let err = Error::Imap(mailsift_imap::Error::Auth("bad credentials".into()));
        assert_eq!(err.severity(), Severity::Fatal);
        assert!(err.is_auth());
    }

    #[test]
    fn operation_refusals_are_recognized() {
        let err = Error::Imap(mailsift_imap::Error::No("no such mailbox".into()));
        assert!(err.is_operation_refusal());
        let err = Error::Imap(mailsift_imap::Error::Bye("going down".into()));
        assert!(!err.is_operation_refusal());
        assert_eq!(err.severity(), Severity::Transient);
    }
}
