use mcsmux_asn1::Asn1Error;

/// Errors that can occur while encoding or decoding MCS PDUs.
#[derive(Debug, thiserror::Error)]
pub enum PduError {
    /// An ASN.1 primitive failed to encode or decode.
    #[error("asn.1 error: {0}")]
    Asn1(#[from] Asn1Error),

    /// The PDU is structurally invalid (inconsistent or truncated fields).
    #[error("malformed pdu: {0}")]
    Malformed(String),

    /// The PDU header carries an opcode other than the expected one.
    #[error("unexpected opcode {found} (expected {expected})")]
    UnexpectedOpcode { expected: u8, found: u8 },
}

impl PduError {
    /// Whether this error represents a sequencing/tag violation rather
    /// than a structurally broken encoding. The session layer reports the
    /// former as protocol violations and the latter as malformed PDUs.
    pub fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            PduError::UnexpectedOpcode { .. } | PduError::Asn1(Asn1Error::UnexpectedTag { .. })
        )
    }
}

pub type Result<T> = std::result::Result<T, PduError>;
