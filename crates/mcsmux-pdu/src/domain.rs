//! Domain parameters: the bounded-integer 8-tuple describing the limits
//! a negotiated domain operates under.
//!
//! Encoded as a BER SEQUENCE of eight INTEGERs in fixed order. The client
//! proposes three alternative sets (minimum, target, maximum); the server
//! answers with exactly one set inside all three.

use bytes::{Bytes, BytesMut};
use mcsmux_asn1::{ber, Asn1Error};

use crate::error::{PduError, Result};

const FIELD_COUNT: usize = 8;

/// The 8-tuple of domain limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DomainParameters {
    /// Highest number of channel ids the domain may use.
    pub max_channel_ids: u32,
    /// Highest number of attached users.
    pub max_user_ids: u32,
    /// Highest number of token ids.
    pub max_token_ids: u32,
    /// Reserved; always 0 on the wire.
    pub min_throughput: u32,
    /// Reserved; always 0 on the wire.
    pub max_height: u32,
    /// Data priority levels; always 1 in this profile.
    pub num_priorities: u32,
    /// Largest PDU the domain will carry.
    pub max_pdu_size: u32,
    /// Protocol version tag; always 2.
    pub protocol_version: u32,
}

impl DomainParameters {
    /// Build a parameter set with this profile's fixed reserved fields.
    pub fn new(max_channel_ids: u32, max_user_ids: u32, max_token_ids: u32, max_pdu_size: u32) -> Self {
        Self {
            max_channel_ids,
            max_user_ids,
            max_token_ids,
            min_throughput: 0,
            max_height: 0,
            num_priorities: 1,
            max_pdu_size,
            protocol_version: 2,
        }
    }

    /// Default target proposal.
    pub fn target() -> Self {
        Self::new(34, 2, 0, 0xFFFF)
    }

    /// Default minimum proposal.
    pub fn minimum() -> Self {
        Self::new(1, 1, 1, 0x420)
    }

    /// Default maximum proposal.
    pub fn maximum() -> Self {
        Self::new(0xFFFF, 0xFC17, 0xFFFF, 0xFFFF)
    }

    /// Merge the three client proposals into one negotiated set: every
    /// target field clamped into its [minimum, maximum] interval.
    pub fn negotiate(minimum: &Self, target: &Self, maximum: &Self) -> Self {
        let clamp = |value: u32, lo: u32, hi: u32| value.min(hi).max(lo);
        Self {
            max_channel_ids: clamp(
                target.max_channel_ids,
                minimum.max_channel_ids,
                maximum.max_channel_ids,
            ),
            max_user_ids: clamp(target.max_user_ids, minimum.max_user_ids, maximum.max_user_ids),
            max_token_ids: clamp(
                target.max_token_ids,
                minimum.max_token_ids,
                maximum.max_token_ids,
            ),
            min_throughput: clamp(
                target.min_throughput,
                minimum.min_throughput,
                maximum.min_throughput,
            ),
            max_height: clamp(target.max_height, minimum.max_height, maximum.max_height),
            num_priorities: clamp(
                target.num_priorities,
                minimum.num_priorities,
                maximum.num_priorities,
            ),
            max_pdu_size: clamp(target.max_pdu_size, minimum.max_pdu_size, maximum.max_pdu_size),
            protocol_version: target.protocol_version,
        }
    }

    /// Encode as a BER SEQUENCE of eight INTEGERs.
    pub fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        let mut body = BytesMut::new();
        for value in self.fields() {
            ber::write_integer(&mut body, value)?;
        }
        ber::write_tag(dst, ber::SEQUENCE_TAG);
        ber::write_length(dst, body.len())?;
        dst.extend_from_slice(&body);
        Ok(())
    }

    /// Decode a BER SEQUENCE of eight INTEGERs.
    pub fn decode(src: &mut Bytes) -> Result<Self> {
        match ber::expect_tag(src, ber::SEQUENCE_TAG) {
            Ok(()) => {}
            Err(Asn1Error::UnexpectedTag { found, .. }) => {
                return Err(PduError::Malformed(format!(
                    "domain parameters: unexpected leading tag 0x{found:02X}"
                )));
            }
            Err(err) => return Err(err.into()),
        }

        let len = ber::read_length(src)?;
        if len > src.len() {
            return Err(PduError::Malformed(format!(
                "domain parameters: declared length {len} exceeds remaining {}",
                src.len()
            )));
        }
        let mut body = src.split_to(len);

        let mut fields = [0u32; FIELD_COUNT];
        for (index, field) in fields.iter_mut().enumerate() {
            *field = ber::read_integer(&mut body).map_err(|err| match err {
                Asn1Error::Truncated { .. } => PduError::Malformed(format!(
                    "domain parameters: {index} of {FIELD_COUNT} integers present"
                )),
                other => other.into(),
            })?;
        }

        Ok(Self {
            max_channel_ids: fields[0],
            max_user_ids: fields[1],
            max_token_ids: fields[2],
            min_throughput: fields[3],
            max_height: fields[4],
            num_priorities: fields[5],
            max_pdu_size: fields[6],
            protocol_version: fields[7],
        })
    }

    fn fields(&self) -> [u32; FIELD_COUNT] {
        [
            self.max_channel_ids,
            self.max_user_ids,
            self.max_token_ids,
            self.min_throughput,
            self.max_height,
            self.num_priorities,
            self.max_pdu_size,
            self.protocol_version,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_default_proposals() {
        for params in [
            DomainParameters::minimum(),
            DomainParameters::target(),
            DomainParameters::maximum(),
            DomainParameters::new(2, 1, 0, 8192),
        ] {
            let mut dst = BytesMut::new();
            params.encode(&mut dst).unwrap();
            let mut src = dst.freeze();
            assert_eq!(DomainParameters::decode(&mut src).unwrap(), params);
            assert!(src.is_empty());
        }
    }

    #[test]
    fn encode_starts_with_sequence_tag() {
        let mut dst = BytesMut::new();
        DomainParameters::target().encode(&mut dst).unwrap();
        assert_eq!(dst[0], ber::SEQUENCE_TAG);
    }

    #[test]
    fn decode_rejects_non_sequence_tag() {
        let mut src = Bytes::from_static(&[0x04, 0x00]);
        assert!(matches!(
            DomainParameters::decode(&mut src),
            Err(PduError::Malformed(_))
        ));
    }

    #[test]
    fn decode_rejects_short_field_list() {
        // A sequence holding only three integers.
        let mut body = BytesMut::new();
        for value in [1u32, 2, 3] {
            ber::write_integer(&mut body, value).unwrap();
        }
        let mut dst = BytesMut::new();
        ber::write_tag(&mut dst, ber::SEQUENCE_TAG);
        ber::write_length(&mut dst, body.len()).unwrap();
        dst.extend_from_slice(&body);

        let mut src = dst.freeze();
        let err = DomainParameters::decode(&mut src).unwrap_err();
        assert!(matches!(err, PduError::Malformed(_)), "{err}");
    }

    #[test]
    fn negotiate_clamps_each_field() {
        let minimum = DomainParameters::new(4, 2, 1, 1024);
        let target = DomainParameters::new(100, 1, 0, 0xFFFF);
        let maximum = DomainParameters::new(32, 8, 16, 8192);

        let negotiated = DomainParameters::negotiate(&minimum, &target, &maximum);
        assert_eq!(negotiated.max_channel_ids, 32); // clamped down
        assert_eq!(negotiated.max_user_ids, 2); // clamped up
        assert_eq!(negotiated.max_token_ids, 1); // clamped up
        assert_eq!(negotiated.max_pdu_size, 8192); // clamped down
        assert_eq!(negotiated.protocol_version, 2);
    }

    #[test]
    fn negotiate_passes_through_in_range_target() {
        let negotiated = DomainParameters::negotiate(
            &DomainParameters::minimum(),
            &DomainParameters::target(),
            &DomainParameters::maximum(),
        );
        assert_eq!(negotiated, DomainParameters::target());
    }
}
