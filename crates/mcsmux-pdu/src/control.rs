//! Negotiation control PDUs: erect-domain, attach-user, channel-join,
//! and the disconnect-provider ultimatum.
//!
//! User ids travel as PER integers bounded below by [`USER_CHANNEL_BASE`];
//! what crosses the wire is the offset the server allocated.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use mcsmux_asn1::per;

use crate::channel::{user_channel_id, USER_CHANNEL_BASE};
use crate::error::{PduError, Result};
use crate::header::{decode_header, encode_header, Opcode, CONFIRM_OPTIONS};

/// Ultimatum reason: the user asked for the session to end.
pub const REASON_USER_REQUESTED: u8 = 3;

/// Attach-user-confirm contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttachUserConfirm {
    pub result: u8,
    pub user_id: u16,
}

/// Channel-join-request contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelJoinRequest {
    pub user_id: u16,
    pub channel_id: u16,
}

/// Channel-join-confirm contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelJoinConfirm {
    pub result: u8,
    pub user_id: u16,
    pub channel_id: u16,
}

fn expect_opcode(src: &mut Bytes, expected: Opcode) -> Result<()> {
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
    Ok(())
}

fn write_user_id(dst: &mut BytesMut, user_id: u16) -> Result<()> {
    per::write_u16(dst, user_channel_id(user_id), USER_CHANNEL_BASE)?;
    Ok(())
}

fn read_user_id(src: &mut Bytes) -> Result<u16> {
    let absolute = per::read_u16(src, USER_CHANNEL_BASE)?;
    Ok(absolute - USER_CHANNEL_BASE)
}

pub fn encode_erect_domain_request(dst: &mut BytesMut, sub_height: u32, sub_interleave: u32) -> Result<()> {
    dst.put_u8(encode_header(Opcode::ErectDomainRequest, 0));
    per::write_integer(dst, sub_height)?;
    per::write_integer(dst, sub_interleave)?;
    Ok(())
}

pub fn decode_erect_domain_request(src: &mut Bytes) -> Result<(u32, u32)> {
    expect_opcode(src, Opcode::ErectDomainRequest)?;
    let sub_height = per::read_integer(src)?;
    let sub_interleave = per::read_integer(src)?;
    Ok((sub_height, sub_interleave))
}

pub fn encode_attach_user_request(dst: &mut BytesMut) {
    dst.put_u8(encode_header(Opcode::AttachUserRequest, 0));
}

pub fn decode_attach_user_request(src: &mut Bytes) -> Result<()> {
    expect_opcode(src, Opcode::AttachUserRequest)
}

pub fn encode_attach_user_confirm(dst: &mut BytesMut, result: u8, user_id: u16) -> Result<()> {
    dst.put_u8(encode_header(Opcode::AttachUserConfirm, CONFIRM_OPTIONS));
    per::write_enumerated(dst, result);
    write_user_id(dst, user_id)
}

pub fn decode_attach_user_confirm(src: &mut Bytes) -> Result<AttachUserConfirm> {
    expect_opcode(src, Opcode::AttachUserConfirm)?;
    let result = per::read_enumerated(src)?;
    let user_id = read_user_id(src)?;
    Ok(AttachUserConfirm { result, user_id })
}

pub fn encode_channel_join_request(dst: &mut BytesMut, user_id: u16, channel_id: u16) -> Result<()> {
    dst.put_u8(encode_header(Opcode::ChannelJoinRequest, 0));
    write_user_id(dst, user_id)?;
    per::write_u16(dst, channel_id, 0)?;
    Ok(())
}

pub fn decode_channel_join_request(src: &mut Bytes) -> Result<ChannelJoinRequest> {
    expect_opcode(src, Opcode::ChannelJoinRequest)?;
    let user_id = read_user_id(src)?;
    let channel_id = per::read_u16(src, 0)?;
    Ok(ChannelJoinRequest { user_id, channel_id })
}

pub fn encode_channel_join_confirm(
    dst: &mut BytesMut,
    result: u8,
    user_id: u16,
    channel_id: u16,
) -> Result<()> {
    dst.put_u8(encode_header(Opcode::ChannelJoinConfirm, CONFIRM_OPTIONS));
    per::write_enumerated(dst, result);
    write_user_id(dst, user_id)?;
    per::write_u16(dst, channel_id, 0)?;
    Ok(())
}

pub fn decode_channel_join_confirm(src: &mut Bytes) -> Result<ChannelJoinConfirm> {
    expect_opcode(src, Opcode::ChannelJoinConfirm)?;
    let result = per::read_enumerated(src)?;
    let user_id = read_user_id(src)?;
    let channel_id = per::read_u16(src, 0)?;
    Ok(ChannelJoinConfirm {
        result,
        user_id,
        channel_id,
    })
}

pub fn encode_disconnect_ultimatum(dst: &mut BytesMut, reason: u8) {
    dst.put_u8(encode_header(Opcode::DisconnectProviderUltimatum, 0));
    dst.put_u8(reason);
}
