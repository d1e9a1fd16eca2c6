//! Send-data framing: the wrapper around every channel payload after
//! negotiation completes.
//!
//! Wire layout:
//!
//! ```text
//! ┌────────────┬──────────────┬──────────────┬──────────┬────────────┬─────────┐
//! │ Header (1) │ User id (2)  │ Channel (2)  │ 0x70 (1) │ PER length │ Payload │
//! └────────────┴──────────────┴──────────────┴──────────┴────────────┴─────────┘
//! ```
//!
//! Clients emit send-data-request, servers send-data-indication; the
//! receiving role checks for its expected opcode before routing.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use mcsmux_asn1::per;

use crate::channel::{user_channel_id, USER_CHANNEL_BASE};
use crate::error::{PduError, Result};
use crate::header::{decode_header, encode_header, Opcode};

/// The fixed priority/segmentation byte every data PDU carries.
pub const DATA_SEGMENTATION: u8 = 0x70;

/// A decoded data PDU.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataFrame {
    /// The sender's user id (offset form).
    pub user_id: u16,
    /// The channel the payload is addressed to.
    pub channel_id: u16,
    /// The application payload.
    pub payload: Bytes,
}

/// Encode a data PDU.
pub fn encode_data(
    dst: &mut BytesMut,
    opcode: Opcode,
    user_id: u16,
    channel_id: u16,
    payload: &[u8],
) -> Result<()> {
    debug_assert!(matches!(
        opcode,
        Opcode::SendDataRequest | Opcode::SendDataIndication
    ));
    dst.put_u8(encode_header(opcode, 0));
    per::write_u16(dst, user_channel_id(user_id), USER_CHANNEL_BASE)?;
    per::write_u16(dst, channel_id, 0)?;
    dst.put_u8(DATA_SEGMENTATION);
    per::write_length(dst, payload.len())?;
    dst.put_slice(payload);
    Ok(())
}

/// Decode a data PDU, requiring the role's expected opcode.
pub fn decode_data(src: &mut Bytes, expected: Opcode) -> Result<DataFrame> {
    if src.is_empty() {
        return Err(PduError::Malformed("empty pdu".into()));
    }
    let (found, _options) = decode_header(src.get_u8());
    if found != expected.as_u8() {
        return Err(PduError::UnexpectedOpcode {
            expected: expected.as_u8(),
            found,
        });
    }

    let user_id = per::read_u16(src, USER_CHANNEL_BASE)? - USER_CHANNEL_BASE;
    let channel_id = per::read_u16(src, 0)?;

    if src.is_empty() {
        return Err(PduError::Malformed("data pdu missing segmentation byte".into()));
    }
    let _segmentation = src.get_u8();

    let len = per::read_length(src)?;
    if len > src.len() {
        return Err(PduError::Malformed(format!(
            "data pdu payload length {len} exceeds remaining {}",
            src.len()
        )));
    }
    let payload = src.split_to(len);

    Ok(DataFrame {
        user_id,
        channel_id,
        payload,
    })
}
