//! Channel identifiers and static channel definitions.
//!
//! Two ids are reserved by convention: the global channel every session
//! joins, and the base from which per-user channel ids are derived.
//! Static channel ids are assigned by the server, sequentially from
//! `GLOBAL_CHANNEL_ID + 1`.

use crate::error::{PduError, Result};

/// The mandatory global channel id.
pub const GLOBAL_CHANNEL_ID: u16 = 1003;

/// Base for per-user channel ids; a session's user channel is
/// `USER_CHANNEL_BASE + user_id`.
pub const USER_CHANNEL_BASE: u16 = 1001;

/// Longest accepted static channel name.
pub const MAX_CHANNEL_NAME_LEN: usize = 8;

/// The channel id belonging to an attached user.
pub const fn user_channel_id(user_id: u16) -> u16 {
    USER_CHANNEL_BASE + user_id
}

/// A named static channel requested by the client.
///
/// The name identifies the channel to the presentation layer on both
/// sides; the option flags are carried but not interpreted here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelDef {
    name: String,
    options: u32,
}

impl ChannelDef {
    /// Create a channel definition.
    ///
    /// Names must be 1..=8 bytes of printable ASCII.
    pub fn new(name: impl Into<String>, options: u32) -> Result<Self> {
        let name = name.into();
        if name.is_empty() || name.len() > MAX_CHANNEL_NAME_LEN {
            return Err(PduError::Malformed(format!(
                "channel name length {} outside 1..={MAX_CHANNEL_NAME_LEN}",
                name.len()
            )));
        }
        if !name.bytes().all(|b| b.is_ascii_graphic()) {
            return Err(PduError::Malformed(format!(
                "channel name {name:?} contains non-printable bytes"
            )));
        }
        Ok(Self { name, options })
    }

    /// The channel name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The option flags.
    pub fn options(&self) -> u32 {
        self.options
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserved_ids_do_not_collide_with_assigned_range() {
        assert!(USER_CHANNEL_BASE < GLOBAL_CHANNEL_ID);
        // First assigned static id sits above the global channel.
        assert_eq!(GLOBAL_CHANNEL_ID + 1, 1004);
    }

    #[test]
    fn user_channel_derivation() {
        assert_eq!(user_channel_id(0), 1001);
        assert_eq!(user_channel_id(1), 1002);
        assert_eq!(user_channel_id(5), 1006);
    }

    #[test]
    fn accepts_typical_names() {
        for name in ["cliprdr", "rdpsnd", "a", "12345678"] {
            assert!(ChannelDef::new(name, 0).is_ok());
        }
    }

    #[test]
    fn rejects_bad_names() {
        assert!(ChannelDef::new("", 0).is_err());
        assert!(ChannelDef::new("toolongname", 0).is_err());
        assert!(ChannelDef::new("with space", 0).is_err());
        assert!(ChannelDef::new("\u{7}bell", 0).is_err());
    }
}
