//! Wire codecs for the MCS session PDUs.
//!
//! Every message crossing the session layer is encoded and decoded here:
//! the one-byte opcode/options header, the domain-parameter sequence, the
//! application-tagged Connect-Initial/Connect-Response wrappers, the
//! control PDUs driving negotiation, and the send-data framing that
//! carries channel payloads after connect.
//!
//! Codecs never touch a transport; they work against in-memory buffers
//! and leave sequencing decisions to the session state machines.

pub mod channel;
pub mod connect;
pub mod control;
pub mod data;
pub mod domain;
pub mod error;
pub mod header;

pub use channel::{user_channel_id, ChannelDef, GLOBAL_CHANNEL_ID, USER_CHANNEL_BASE};
pub use connect::{ConnectInitial, ConnectResponse, CONNECT_INITIAL_TAG, CONNECT_RESPONSE_TAG};
pub use control::{AttachUserConfirm, ChannelJoinConfirm, ChannelJoinRequest, REASON_USER_REQUESTED};
pub use data::{DataFrame, DATA_SEGMENTATION};
pub use domain::DomainParameters;
pub use error::{PduError, Result};
pub use header::{decode_header, encode_header, matches, Opcode, CONFIRM_OPTIONS};
