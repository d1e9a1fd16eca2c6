//! Multiplexed channel-establishment and data-routing session layer.
//!
//! mcsmux negotiates a shared domain between a client and a server over
//! one byte-stream transport, attaches a user, joins a global channel, a
//! per-user channel, and named static channels, then routes application
//! payloads across those channels.
//!
//! # Crate Structure
//!
//! - [`transport`] — Chunk-oriented transport abstraction (memory pair, UDS)
//! - [`asn1`] — BER/PER primitive encoders for the wire format
//! - [`pdu`] — Wire codecs for every session PDU
//! - [`session`] — Client/server state machines and channel routing

/// Re-export transport types.
pub mod transport {
    pub use mcsmux_transport::*;
}

/// Re-export ASN.1 primitives.
pub mod asn1 {
    pub use mcsmux_asn1::*;
}

/// Re-export PDU codecs.
pub mod pdu {
    pub use mcsmux_pdu::*;
}

/// Re-export session types.
pub mod session {
    pub use mcsmux_session::*;
}
