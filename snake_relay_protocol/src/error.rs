// Protocol-level decode errors.
//
// None of these are fatal to a connection: the relay logs them and drops the
// offending frame. I/O problems in the framing layer are reported as plain
// `std::io::Error` and are handled by the transport instead.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// Frame is not `KIND|payload` text.
    #[error("malformed frame: {0:?}")]
    Malformed(String),

    /// Frame is well-formed but names a command this protocol doesn't know.
    #[error("unknown command type: {0}")]
    UnknownKind(String),

    /// Payload doesn't parse as the type the command requires.
    #[error("invalid {what} payload: {payload:?}")]
    InvalidPayload { what: &'static str, payload: String },
}

impl ProtocolError {
    pub fn invalid_payload(what: &'static str, payload: &str) -> Self {
        ProtocolError::InvalidPayload {
            what,
            payload: payload.to_owned(),
        }
    }
}
