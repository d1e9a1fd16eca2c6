use mcsmux_pdu::PduError;
use mcsmux_transport::TransportError;

/// Errors that can occur in session operations.
///
/// Protocol violations and malformed PDUs are always fatal: the
/// connection that produced one is torn down before the error is
/// returned. Unknown channels and refused static channels are not
/// errors at all; they are logged and counted instead.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// A PDU arrived out of sequence, with the wrong tag, or with a
    /// size that does not match its framing.
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// A PDU is structurally broken (truncated or inconsistent lengths).
    #[error("malformed pdu: {0}")]
    MalformedPdu(PduError),

    /// The server declined to allocate a user.
    #[error("server rejected user attachment (result {0})")]
    UserRejected(u8),

    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// The connection is closed.
    #[error("connection closed")]
    Closed,
}

impl From<PduError> for SessionError {
    fn from(err: PduError) -> Self {
        if err.is_protocol_violation() {
            SessionError::Protocol(err.to_string())
        } else {
            SessionError::MalformedPdu(err)
        }
    }
}

pub type Result<T> = std::result::Result<T, SessionError>;
