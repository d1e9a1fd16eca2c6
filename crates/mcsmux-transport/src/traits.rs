use crate::error::Result;

/// A connected chunk-oriented transport.
///
/// Each `send` delivers one whole chunk to the peer; the peer's receive
/// side yields the same chunk boundaries. The MCS session layer relies on
/// this: every inbound chunk carries exactly one PDU, so the state
/// machines never reassemble across reads.
pub trait Transport {
    /// Send one chunk to the peer.
    fn send(&mut self, chunk: &[u8]) -> Result<()>;

    /// Close the transport. Further sends fail with [`TransportError::Closed`].
    ///
    /// [`TransportError::Closed`]: crate::TransportError::Closed
    fn close(&mut self) -> Result<()>;

    /// Whether this end has been closed.
    fn is_closed(&self) -> bool;
}
