//! BER and PER primitive encoders for the MCS wire format.
//!
//! The session PDUs mix two ITU-T encoding rule sets: connect-phase
//! structures use Basic Encoding Rules (X.690) tag-length-value triples,
//! while the per-PDU fields after connect use the aligned Packed Encoding
//! Rules (X.691) fragments the protocol needs — bounded 16-bit integers,
//! short lengths, single-byte enumerations.
//!
//! Only the primitives the session layer invokes are implemented; this is
//! not a general ASN.1 library.

pub mod ber;
pub mod error;
pub mod per;

pub use error::{Asn1Error, Result};
