// Error types for the relay.
//
// `SessionError` covers session-state invariant violations; the dispatcher
// returns it and the server drops the offending connection. `RelayError` is
// what `start_relay` and config loading can fail with.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::transport::ClientId;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// Both slots are already taken.
    #[error("session is full")]
    SessionFull,

    /// The client already sits in a session.
    #[error("{0} is already seated")]
    AlreadySeated(ClientId),
}

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("failed to read config {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid config {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid listen address {0:?}")]
    BadAddress(String),
}
