//! The conference-configuration collaborator.
//!
//! Connect-Initial and Connect-Response carry an opaque blob produced
//! and consumed outside this layer: the client's requested static
//! channels travel out in the request blob, the server's assigned ids
//! travel back in the response blob. The session state machines only see
//! the [`ConferenceCodec`] trait; [`BasicConferenceCodec`] is the
//! compact binary default used by the shipped tooling and tests.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use mcsmux_pdu::{ChannelDef, PduError};

/// Most static channels a single request may carry.
pub const MAX_STATIC_CHANNELS: usize = 31;

/// Encodes and decodes the conference blobs embedded in the connect PDUs.
pub trait ConferenceCodec {
    /// Build the request blob announcing the client's static channels.
    fn encode_request(&self, channels: &[ChannelDef]) -> Result<Bytes, PduError>;

    /// Recover the requested static channels from a request blob.
    fn decode_request(&self, blob: &[u8]) -> Result<Vec<ChannelDef>, PduError>;

    /// Build the response blob announcing the assigned channel ids.
    fn encode_response(&self, channel_ids: &[u16]) -> Result<Bytes, PduError>;

    /// Recover the assigned channel ids from a response blob.
    fn decode_response(&self, blob: &[u8]) -> Result<Vec<u16>, PduError>;
}

/// Compact binary conference codec.
///
/// Request blob: count byte, then per channel a length-prefixed name and
/// big-endian option flags. Response blob: count byte, then big-endian
/// channel ids.
#[derive(Debug, Clone, Copy, Default)]
pub struct BasicConferenceCodec;

impl ConferenceCodec for BasicConferenceCodec {
    fn encode_request(&self, channels: &[ChannelDef]) -> Result<Bytes, PduError> {
        if channels.len() > MAX_STATIC_CHANNELS {
            return Err(PduError::Malformed(format!(
                "{} static channels requested (max {MAX_STATIC_CHANNELS})",
                channels.len()
            )));
        }
        let mut dst = BytesMut::new();
        dst.put_u8(channels.len() as u8);
        for def in channels {
            dst.put_u8(def.name().len() as u8);
            dst.put_slice(def.name().as_bytes());
            dst.put_u32(def.options());
        }
        Ok(dst.freeze())
    }

    fn decode_request(&self, blob: &[u8]) -> Result<Vec<ChannelDef>, PduError> {
        let mut src = Bytes::copy_from_slice(blob);
        if src.is_empty() {
            return Err(PduError::Malformed("empty conference request".into()));
        }
        let count = src.get_u8() as usize;
        if count > MAX_STATIC_CHANNELS {
            return Err(PduError::Malformed(format!(
                "{count} static channels announced (max {MAX_STATIC_CHANNELS})"
            )));
        }

        let mut channels = Vec::with_capacity(count);
        for _ in 0..count {
            if src.is_empty() {
                return Err(PduError::Malformed("conference request truncated".into()));
            }
            let name_len = src.get_u8() as usize;
            if src.len() < name_len + 4 {
                return Err(PduError::Malformed("conference request truncated".into()));
            }
            let name_bytes = src.split_to(name_len);
            let name = std::str::from_utf8(&name_bytes)
                .map_err(|_| PduError::Malformed("channel name is not utf-8".into()))?;
            let options = src.get_u32();
            channels.push(ChannelDef::new(name, options)?);
        }
        Ok(channels)
    }

    fn encode_response(&self, channel_ids: &[u16]) -> Result<Bytes, PduError> {
        if channel_ids.len() > MAX_STATIC_CHANNELS {
            return Err(PduError::Malformed(format!(
                "{} channel ids assigned (max {MAX_STATIC_CHANNELS})",
                channel_ids.len()
            )));
        }
        let mut dst = BytesMut::new();
        dst.put_u8(channel_ids.len() as u8);
        for &id in channel_ids {
            dst.put_u16(id);
        }
        Ok(dst.freeze())
    }

    fn decode_response(&self, blob: &[u8]) -> Result<Vec<u16>, PduError> {
        let mut src = Bytes::copy_from_slice(blob);
        if src.is_empty() {
            return Err(PduError::Malformed("empty conference response".into()));
        }
        let count = src.get_u8() as usize;
        if count > MAX_STATIC_CHANNELS {
            return Err(PduError::Malformed(format!(
                "{count} channel ids announced (max {MAX_STATIC_CHANNELS})"
            )));
        }
        if src.len() < count * 2 {
            return Err(PduError::Malformed("conference response truncated".into()));
        }

        let mut ids = Vec::with_capacity(count);
        for _ in 0..count {
            ids.push(src.get_u16());
        }
        Ok(ids)
    }
}
