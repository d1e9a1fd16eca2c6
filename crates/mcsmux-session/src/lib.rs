//! Client and server MCS session state machines with channel routing.
//!
//! This is the core layer of mcsmux. A [`ClientConnection`] and a
//! [`ServerConnection`] negotiate a domain over one transport, attach a
//! user, join the global channel, the per-user channel, and any named
//! static channels, then multiplex application payloads by channel id.
//!
//! Both state machines are single-threaded and event-driven: the caller
//! owns the event loop and feeds one PDU-sized chunk per `on_data` call.

pub mod client;
pub mod conference;
pub mod error;
pub mod handler;
pub mod mux;
pub mod registry;
pub mod server;

pub use client::{ClientConfig, ClientConnection, ClientState};
pub use conference::{BasicConferenceCodec, ConferenceCodec, MAX_STATIC_CHANNELS};
pub use error::{Result, SessionError};
pub use handler::{ChannelHandler, ChannelSender};
pub use mux::SessionStats;
pub use registry::ChannelRegistry;
pub use server::{ServerConnection, ServerState};
