use std::io;

use thiserror::Error;

/// Result type alias for client operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by the client, its configuration layer and the cluster router.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// An IO error occurred.
    #[error("IO error: {source}")]
    Io {
        /// The underlying IO error.
        #[from]
        source: io::Error,
    },

    /// A protocol error occurred.
    #[error("protocol error: {message}")]
    Protocol {
        /// Description of the error.
        message: String,
    },

    /// The server returned an error.
    #[error("server error: {message}")]
    Server {
        /// Error message from server.
        message: String,
    },

    /// Authentication failed.
    #[error("authentication failed")]
    Auth,

    /// Invalid argument provided.
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// Description of invalid argument.
        message: String,
    },

    /// Connecting or waiting for a reply took longer than the configured timeout.
    #[error("operation timed out")]
    Timeout,

    /// A required environment variable is not set.
    #[error("missing environment variable {name}")]
    MissingVar {
        /// Variable name, e.g. `REDIS_STARTUP_NODES_READER`.
        name: String,
    },

    /// An environment variable holds a value that cannot be used.
    #[error("invalid value {value:?} for {name}: {reason}")]
    InvalidVar {
        /// Variable name.
        name: String,
        /// The rejected value.
        value: String,
        /// Why the value was rejected.
        reason: String,
    },

    /// Redis Cluster: key moved to another node (permanent redirect).
    #[error("MOVED to slot {slot} at {address}")]
    Moved {
        /// The slot number (0-16383).
        slot: u16,
        /// The address of the node owning this slot (e.g., "127.0.0.1:7001").
        address: String,
    },

    /// Redis Cluster: temporary redirect during slot migration.
    ///
    /// The command must be retried on `address` preceded by `ASKING`,
    /// without updating the slot map.
    #[error("ASK to slot {slot} at {address}")]
    Ask {
        /// The slot number (0-16383).
        slot: u16,
        /// The address of the node temporarily handling this slot.
        address: String,
    },

    /// Redis Cluster is down or unavailable.
    #[error("CLUSTERDOWN cluster is down")]
    ClusterDown,

    /// Multi-key operation with keys in different slots.
    #[error("CROSSSLOT keys in multi-key operation map to different slots")]
    CrossSlot,

    /// The cluster kept redirecting or failing past the retry budget.
    #[error("too many cluster redirects ({attempts} attempts)")]
    RedirectLimit {
        /// Number of attempts made.
        attempts: usize,
    },
}

impl Error {
    /// Returns true for errors that mean the connection itself is unusable.
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Error::Io { .. } | Error::Timeout)
    }

    pub(crate) fn protocol(message: impl Into<String>) -> Self {
        Error::Protocol {
            message: message.into(),
        }
    }

    pub(crate) fn closed() -> Self {
        Error::Io {
            source: io::Error::new(io::ErrorKind::BrokenPipe, "connection closed"),
        }
    }
}
