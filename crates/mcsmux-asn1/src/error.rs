/// Errors that can occur while encoding or decoding ASN.1 primitives.
#[derive(Debug, thiserror::Error)]
pub enum Asn1Error {
    /// The next byte is not the expected tag.
    #[error("unexpected tag 0x{found:02X} (expected 0x{expected:02X})")]
    UnexpectedTag { expected: u8, found: u8 },

    /// The buffer ended before the encoding was complete.
    #[error("truncated encoding ({needed} bytes needed, {remaining} remaining)")]
    Truncated { needed: usize, remaining: usize },

    /// A length field uses a form this profile does not accept.
    #[error("unsupported length form 0x{0:02X}")]
    InvalidLength(u8),

    /// An integer encoding is wider than the 32 bits this profile carries.
    #[error("integer too wide ({0} bytes)")]
    IntegerTooWide(usize),

    /// A value does not fit the declared bounds of its field.
    #[error("value {value} outside field bounds [{min}, {max}]")]
    OutOfBounds { value: u64, min: u64, max: u64 },
}

pub type Result<T> = std::result::Result<T, Asn1Error>;
