//! Connection layer for the MySQL X protocol
//!
//! This crate handles:
//! * Connection descriptor parsing (URI forms, bracketed IPv6, Unix socket
//!   paths, prioritized router lists) into one canonical [`SessionSettings`]
//! * Failover across candidate routers in priority order
//! * A root/dependent session hierarchy with cascading closure
//!
//! The wire protocol itself (handshake, message framing, statement
//! execution) is consumed through the [`TransportOpener`] seam and is not
//! part of this crate.
//!
//! # Examples
//!
//! ```no_run
//! # async fn example() -> mysqlx_connect::Result<()> {
//! use mysqlx_connect::Session;
//!
//! // Single endpoint
//! let session = Session::connect("user:password@127.0.0.1:33060/app").await?;
//!
//! // Router farm with priorities; the highest priority is tried first
//! let session = Session::connect(
//!     "mysqlx://user:password@[(address=db1:33060, priority=100), \
//!      (address=db2:33060, priority=90)]",
//! )
//! .await?;
//!
//! let bound = session.bind_dependent()?;
//! assert!(bound.is_open());
//! session.close();
//! assert!(!bound.is_open());
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod connection;
pub mod session;

pub use client::{ConnectTarget, RouterCandidate, Routing, SessionSettings, TlsMaterial};
pub use connection::{connect, Connected, NetOpener, Transport, TransportOpener};
pub use session::{DependentSession, Session};

/// Mixed priority presence within one router list.
pub const ERR_MIXED_PRIORITIES: u16 = 4000;
/// Every candidate router failed with a network error.
pub const ERR_NO_ROUTER_AVAILABLE: u16 = 4001;
/// A router priority outside the `[0, 100]` range.
pub const ERR_PRIORITY_OUT_OF_RANGE: u16 = 4007;

/// Crate-wide error type
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Syntax error in a connection descriptor. Never involves network I/O.
    #[error("malformed connection descriptor: {0}")]
    MalformedDescriptor(String),

    /// Structurally valid but semantically invalid settings, detected before
    /// any connection attempt. Carries a stable error code (4000, 4007).
    #[error("invalid connection settings (code {code}): {message}")]
    Configuration {
        /// Stable, externally visible error code
        code: u16,
        /// Human-readable description
        message: String,
    },

    /// Reachability failure (refused, unreachable, timed out). Retryable
    /// within a failover loop.
    #[error("network error: {0}")]
    Network(#[source] std::io::Error),

    /// The server was reached but actively rejected the connection
    /// (authentication, protocol mismatch, policy). Never retried.
    #[error("connection rejected: {0}")]
    Fatal(String),

    /// Every candidate router failed with a network error (code 4001).
    #[error("unable to connect to any of the {attempts} router(s) (code 4001)")]
    Exhausted {
        /// Number of candidates tried
        attempts: usize,
        /// Per-candidate failure descriptions, in attempt order
        failures: Vec<String>,
    },

    /// Operation attempted on a session that is already closed or was
    /// discovered broken. Surfacing this has no side effects.
    #[error("session state: {0}")]
    SessionState(String),

    /// TLS material could not be loaded or compiled
    #[error("TLS error: {0}")]
    Tls(String),

    /// Other I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Stable error code, when this error defines one.
    ///
    /// Callers can branch on the code without parsing message text.
    pub fn code(&self) -> Option<u16> {
        match self {
            Error::Configuration { code, .. } => Some(*code),
            Error::Exhausted { .. } => Some(ERR_NO_ROUTER_AVAILABLE),
            _ => None,
        }
    }

    /// Whether this failure is attributable to reachability rather than to
    /// the server rejecting the connection. Network-classified failures make
    /// the failover loop advance to the next candidate; everything else
    /// short-circuits it.
    pub fn is_network(&self) -> bool {
        matches!(self, Error::Network(_))
    }

    pub(crate) fn malformed(message: impl Into<String>) -> Self {
        Error::MalformedDescriptor(message.into())
    }

    pub(crate) fn configuration(code: u16, message: impl Into<String>) -> Self {
        Error::Configuration {
            code,
            message: message.into(),
        }
    }
}

/// Crate-wide result type
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let err = Error::configuration(ERR_MIXED_PRIORITIES, "mixed priorities");
        assert_eq!(err.code(), Some(4000));

        let err = Error::configuration(ERR_PRIORITY_OUT_OF_RANGE, "priority 101");
        assert_eq!(err.code(), Some(4007));

        let err = Error::Exhausted {
            attempts: 2,
            failures: vec![],
        };
        assert_eq!(err.code(), Some(4001));

        let err = Error::malformed("bad descriptor");
        assert_eq!(err.code(), None);
    }

    #[test]
    fn test_network_classification() {
        let refused = Error::Network(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "refused",
        ));
        assert!(refused.is_network());

        assert!(!Error::Fatal("access denied".into()).is_network());
        assert!(!Error::malformed("x").is_network());
        assert!(!Error::configuration(ERR_MIXED_PRIORITIES, "x").is_network());
    }

    #[test]
    fn test_exhausted_display_mentions_code() {
        let err = Error::Exhausted {
            attempts: 3,
            failures: vec!["a".into(), "b".into(), "c".into()],
        };
        let msg = err.to_string();
        assert!(msg.contains("4001"));
        assert!(msg.contains('3'));
    }
}
