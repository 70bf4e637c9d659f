//! Session-level error glue atop `val_protocol`'s wire error taxonomy.

use std::io;

pub use val_protocol::error::{Code, Detail, LastError};

/// Top-level session error: either a wire/protocol error, or an I/O
/// failure from a transport or filesystem adapter, tagged with the
/// public operation name it occurred under.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// A protocol-level failure (handshake, CRC, malformed frame, ...).
    #[error("{0}")]
    Protocol(#[from] val_protocol::error::ProtocolError),

    /// An adapter (transport or filesystem) reported an I/O failure.
    #[error("{op}: {source}")]
    Io {
        /// Which adapter call failed.
        op: &'static str,
        /// The underlying error.
        #[source]
        source: io::Error,
    },

    /// The session is terminal (cancelled or previously aborted); no
    /// further operations are permitted.
    #[error("session is aborted")]
    Aborted,
}

impl SessionError {
    /// Tag an I/O error with the adapter operation it occurred under.
    #[must_use]
    pub fn io(op: &'static str, source: io::Error) -> Self {
        SessionError::Io { op, source }
    }

    /// The [`Code`]/[`Detail`] pair this error maps to, for recording as
    /// the session's [`LastError`].
    #[must_use]
    pub fn to_last_error(&self, op: &'static str) -> LastError {
        match self {
            SessionError::Protocol(e) => LastError::new(e.code, e.detail, op),
            SessionError::Io { .. } => LastError::new(Code::Io, Detail(Detail::SEND_FAILED), op),
            SessionError::Aborted => LastError::new(Code::Aborted, Detail::NONE, op),
        }
    }
}

/// Convenience `Result` alias used throughout `val-core`.
pub type Result<T> = std::result::Result<T, SessionError>;

#[cfg(test)]
mod tests {
    use super::*;
    use val_protocol::error::ProtocolError;

    #[test]
    fn protocol_error_converts_via_from() {
        let err: SessionError = ProtocolError::new(Code::Crc, Detail::CRC_TRAILER).into();
        let last = err.to_last_error("recv_data");
        assert_eq!(last.code, Some(Code::Crc));
        assert_eq!(last.op, Some("recv_data"));
    }

    #[test]
    fn io_error_maps_to_io_code() {
        let err = SessionError::io(
            "transport_send",
            io::Error::new(io::ErrorKind::BrokenPipe, "pipe closed"),
        );
        let last = err.to_last_error("transport_send");
        assert_eq!(last.code, Some(Code::Io));
    }
}
