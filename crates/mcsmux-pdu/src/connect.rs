//! Connect-phase PDUs: the application-tagged Connect-Initial and
//! Connect-Response wrappers.
//!
//! Both wrappers embed their contents length; Connect-Response decoding
//! requires that length to equal the remaining buffer exactly, and the
//! same for the trailing user-data OCTET STRING. A mismatch of even one
//! byte is rejected.

use bytes::{Bytes, BytesMut};
use mcsmux_asn1::ber;

use crate::domain::DomainParameters;
use crate::error::{PduError, Result};

/// BER application tag carried by Connect-Initial.
pub const CONNECT_INITIAL_TAG: u8 = 101;

/// BER application tag carried by Connect-Response.
pub const CONNECT_RESPONSE_TAG: u8 = 102;

/// Fixed domain selector both roles use.
const DOMAIN_SELECTOR: &[u8] = &[0x01];

/// The client's opening PDU: three domain-parameter proposals plus the
/// opaque conference-request blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectInitial {
    pub calling_domain_selector: Bytes,
    pub called_domain_selector: Bytes,
    pub upward_flag: bool,
    pub minimum: DomainParameters,
    pub target: DomainParameters,
    pub maximum: DomainParameters,
    pub user_data: Bytes,
}

impl ConnectInitial {
    /// Build a Connect-Initial with this profile's fixed selectors and
    /// the default proposal sets.
    pub fn new(user_data: impl Into<Bytes>) -> Self {
        Self {
            calling_domain_selector: Bytes::from_static(DOMAIN_SELECTOR),
            called_domain_selector: Bytes::from_static(DOMAIN_SELECTOR),
            upward_flag: true,
            minimum: DomainParameters::minimum(),
            target: DomainParameters::target(),
            maximum: DomainParameters::maximum(),
            user_data: user_data.into(),
        }
    }

    pub fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        let mut body = BytesMut::new();
        ber::write_octet_string(&mut body, &self.calling_domain_selector)?;
        ber::write_octet_string(&mut body, &self.called_domain_selector)?;
        ber::write_boolean(&mut body, self.upward_flag)?;
        self.minimum.encode(&mut body)?;
        self.target.encode(&mut body)?;
        self.maximum.encode(&mut body)?;
        ber::write_octet_string(&mut body, &self.user_data)?;

        ber::write_application_tag(dst, CONNECT_INITIAL_TAG, body.len())?;
        dst.extend_from_slice(&body);
        Ok(())
    }

    pub fn decode(src: &mut Bytes) -> Result<Self> {
        let len = ber::read_application_tag(src, CONNECT_INITIAL_TAG)?;
        if len > src.len() {
            return Err(PduError::Malformed(format!(
                "connect initial: declared length {len} exceeds remaining {}",
                src.len()
            )));
        }
        let mut body = src.split_to(len);

        let calling_domain_selector = ber::read_octet_string(&mut body)?;
        let called_domain_selector = ber::read_octet_string(&mut body)?;
        let upward_flag = ber::read_boolean(&mut body)?;
        let minimum = DomainParameters::decode(&mut body)?;
        let target = DomainParameters::decode(&mut body)?;
        let maximum = DomainParameters::decode(&mut body)?;
        let user_data = ber::read_octet_string(&mut body)?;

        Ok(Self {
            calling_domain_selector,
            called_domain_selector,
            upward_flag,
            minimum,
            target,
            maximum,
            user_data,
        })
    }
}

/// The server's answer: one negotiated parameter set plus the opaque
/// conference-response blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectResponse {
    pub result: u8,
    pub called_connect_id: u32,
    pub parameters: DomainParameters,
    pub user_data: Bytes,
}

impl ConnectResponse {
    /// Build a successful response.
    pub fn new(parameters: DomainParameters, user_data: impl Into<Bytes>) -> Self {
        Self {
            result: 0,
            called_connect_id: 0,
            parameters,
            user_data: user_data.into(),
        }
    }

    pub fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        let mut body = BytesMut::new();
        ber::write_enumerated(&mut body, self.result)?;
        ber::write_integer(&mut body, self.called_connect_id)?;
        self.parameters.encode(&mut body)?;
        ber::write_octet_string(&mut body, &self.user_data)?;

        ber::write_application_tag(dst, CONNECT_RESPONSE_TAG, body.len())?;
        dst.extend_from_slice(&body);
        Ok(())
    }

    /// Decode a Connect-Response.
    ///
    /// The embedded wrapper length must equal the remaining buffer
    /// exactly, and the user-data OCTET STRING must consume every byte
    /// that follows it.
    pub fn decode(src: &mut Bytes) -> Result<Self> {
        let len = ber::read_application_tag(src, CONNECT_RESPONSE_TAG)?;
        if len != src.len() {
            return Err(PduError::Malformed(format!(
                "connect response: declared length {len} != remaining {}",
                src.len()
            )));
        }

        let result = ber::read_enumerated(src)?;
        let called_connect_id = ber::read_integer(src)?;
        let parameters = DomainParameters::decode(src)?;

        let declared = ber::read_octet_string_header(src)?;
        if declared != src.len() {
            return Err(PduError::Malformed(format!(
                "connect response: user data length {declared} != remaining {}",
                src.len()
            )));
        }
        let user_data = src.split_to(declared);

        Ok(Self {
            result,
            called_connect_id,
            parameters,
            user_data,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_initial_roundtrip() {
        let initial = ConnectInitial::new(Bytes::from_static(b"conference-request"));
        let mut dst = BytesMut::new();
        initial.encode(&mut dst).unwrap();

        let mut src = dst.freeze();
        let decoded = ConnectInitial::decode(&mut src).unwrap();
        assert_eq!(decoded, initial);
        assert!(src.is_empty());
    }

    #[test]
    fn connect_initial_carries_three_proposals() {
        let initial = ConnectInitial::new(Bytes::new());
        assert_eq!(initial.minimum, DomainParameters::minimum());
        assert_eq!(initial.target, DomainParameters::target());
        assert_eq!(initial.maximum, DomainParameters::maximum());
        assert!(initial.upward_flag);
    }

    #[test]
    fn connect_initial_rejects_wrong_tag() {
        let response = ConnectResponse::new(DomainParameters::target(), Bytes::new());
        let mut dst = BytesMut::new();
        response.encode(&mut dst).unwrap();

        let mut src = dst.freeze();
        let err = ConnectInitial::decode(&mut src).unwrap_err();
        assert!(err.is_protocol_violation(), "{err}");
    }

    #[test]
    fn connect_response_roundtrip() {
        let response = ConnectResponse::new(
            DomainParameters::new(2, 1, 0, 8192),
            Bytes::from_static(b"conference-response"),
        );
        let mut dst = BytesMut::new();
        response.encode(&mut dst).unwrap();

        let mut src = dst.freeze();
        let decoded = ConnectResponse::decode(&mut src).unwrap();
        assert_eq!(decoded, response);
        assert!(src.is_empty());
    }

    #[test]
    fn connect_response_rejects_trailing_garbage() {
        let response = ConnectResponse::new(DomainParameters::target(), Bytes::new());
        let mut dst = BytesMut::new();
        response.encode(&mut dst).unwrap();
        dst.extend_from_slice(&[0x00]);

        let mut src = dst.freeze();
        assert!(matches!(
            ConnectResponse::decode(&mut src),
            Err(PduError::Malformed(_))
        ));
    }

    #[test]
    fn connect_response_rejects_truncation() {
        let response = ConnectResponse::new(
            DomainParameters::target(),
            Bytes::from_static(b"conference-response"),
        );
        let mut dst = BytesMut::new();
        response.encode(&mut dst).unwrap();
        let truncated = dst.freeze().slice(..dst_len_minus_one(&response));

        let mut src = truncated;
        assert!(matches!(
            ConnectResponse::decode(&mut src),
            Err(PduError::Malformed(_))
        ));
    }

    fn dst_len_minus_one(response: &ConnectResponse) -> usize {
        let mut dst = BytesMut::new();
        response.encode(&mut dst).unwrap();
        dst.len() - 1
    }

    #[test]
    fn connect_response_user_data_length_must_be_exact() {
        // Hand-build a response whose user-data octet string claims one
        // byte more than is present.
        let mut body = BytesMut::new();
        ber::write_enumerated(&mut body, 0).unwrap();
        ber::write_integer(&mut body, 0).unwrap();
        DomainParameters::target().encode(&mut body).unwrap();
        ber::write_tag(&mut body, ber::OCTET_STRING_TAG);
        ber::write_length(&mut body, 4).unwrap();
        body.extend_from_slice(b"abc");

        let mut dst = BytesMut::new();
        ber::write_application_tag(&mut dst, CONNECT_RESPONSE_TAG, body.len()).unwrap();
        dst.extend_from_slice(&body);

        let mut src = dst.freeze();
        assert!(matches!(
            ConnectResponse::decode(&mut src),
            Err(PduError::Malformed(_))
        ));
    }
}
