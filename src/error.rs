//! Error types for the epistle engine.
//!
//! Wire-facing failures never surface here; they become numeric replies at the
//! event-engine boundary. These types cover the library-facing failures:
//! extension registration, connection I/O, and TLS upgrades.

use std::io;

use thiserror::Error;

/// Errors returned synchronously from [`Engine::register`](crate::Engine::register).
#[derive(Debug, Error)]
pub enum RegistrationError {
    /// Only MAIL and RCPT accept option subscriptions.
    #[error("can't subscribe to option for verb '{0}'")]
    OptionVerb(String),

    /// The option key is already claimed by another extension.
    #[error("already subscribed '{0}'")]
    DuplicateOption(String),

    /// Reply filters may only attach to verbs present in the verb table.
    #[error("trying to subscribe to an unsupported verb '{0}'")]
    UnknownVerb(String),
}

/// Errors that can occur during connection operations.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// I/O error during connection operations.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Errors that can occur during TLS operations.
#[derive(Debug, Error)]
pub enum TlsError {
    /// I/O error during TLS operations.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Failed to load TLS certificate.
    #[error("Failed to load TLS certificate from {path}: {source}")]
    CertificateLoad {
        path: String,
        #[source]
        source: io::Error,
    },

    /// Failed to load TLS private key.
    #[error("Failed to load TLS private key from {path}: {reason}")]
    KeyLoad { path: String, reason: String },

    /// TLS handshake or upgrade failed.
    #[error("TLS upgrade failed: {0}")]
    UpgradeFailed(String),

    /// Negotiated connection details were not available after the handshake.
    #[error("TLS protocol info missing: {0}")]
    ProtocolInfoMissing(String),

    /// Rustls library error.
    #[error("TLS error: {0}")]
    Rustls(String),
}

impl From<tokio_rustls::rustls::Error> for TlsError {
    fn from(err: tokio_rustls::rustls::Error) -> Self {
        Self::Rustls(err.to_string())
    }
}

/// Errors that can occur while a session is running.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Connection error occurred.
    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),

    /// TLS upgrade failed after STARTTLS.
    #[error(transparent)]
    Tls(#[from] TlsError),

    /// Session timed out.
    #[error("Session timed out after {0} seconds")]
    Timeout(u64),
}

impl SessionError {
    /// Returns `true` if the error is a client-side issue.
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

/// Specialized `Result` type for connection operations.
pub type ConnectionResult<T> = std::result::Result<T, ConnectionError>;

/// Specialized `Result` type for TLS operations.
pub type TlsResult<T> = std::result::Result<T, TlsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registration_error_display() {
        let err = RegistrationError::OptionVerb("DATA".to_string());
        assert_eq!(err.to_string(), "can't subscribe to option for verb 'DATA'");

        let err = RegistrationError::DuplicateOption("BODY".to_string());
        assert_eq!(err.to_string(), "already subscribed 'BODY'");
    }

    #[test]
    fn tls_error_display() {
        let err = TlsError::KeyLoad {
            path: "/path/to/key.pem".to_string(),
            reason: "invalid format".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Failed to load TLS private key from /path/to/key.pem: invalid format"
        );
    }

    #[test]
    fn io_error_conversion() {
        let io_err = io::Error::new(io::ErrorKind::ConnectionReset, "connection reset");
        let conn_err: ConnectionError = io_err.into();
        assert!(matches!(conn_err, ConnectionError::Io(_)));
    }
}
