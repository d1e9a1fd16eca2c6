use std::cell::RefCell;
use std::rc::Rc;

use bytes::BytesMut;
use mcsmux_pdu::{data, Opcode};
use mcsmux_transport::Transport;

use crate::error::Result;

/// A presentation-layer endpoint bound to one channel.
///
/// Implementations receive their [`ChannelSender`] once, when the
/// session reaches the connected state, and a call per payload routed to
/// their channel afterwards. Handlers run on the session's thread and
/// must not re-enter the state machine; sending through the provided
/// sender is always safe.
pub trait ChannelHandler {
    /// The session has joined every channel; `sender` transmits on this
    /// handler's channel for the lifetime of the connection.
    fn on_connected(&mut self, sender: ChannelSender);

    /// A payload addressed to this handler's channel arrived.
    fn on_data(&mut self, payload: &[u8]);
}

/// Sending proxy bound to one channel of one connection.
///
/// The connection owns the transport; senders hold a shared, non-owning
/// handle back to it plus the channel id they speak for.
#[derive(Clone)]
pub struct ChannelSender {
    transport: Rc<RefCell<dyn Transport>>,
    user_id: u16,
    channel_id: u16,
    data_opcode: Opcode,
}

impl ChannelSender {
    pub(crate) fn new(
        transport: Rc<RefCell<dyn Transport>>,
        user_id: u16,
        channel_id: u16,
        data_opcode: Opcode,
    ) -> Self {
        Self {
            transport,
            user_id,
            channel_id,
            data_opcode,
        }
    }

    /// The channel this sender transmits on.
    pub fn channel_id(&self) -> u16 {
        self.channel_id
    }

    /// Send a payload on the bound channel.
    pub fn send(&self, payload: &[u8]) -> Result<()> {
        let mut dst = BytesMut::with_capacity(payload.len() + 16);
        data::encode_data(
            &mut dst,
            self.data_opcode,
            self.user_id,
            self.channel_id,
            payload,
        )?;
        self.transport.borrow_mut().send(&dst)?;
        Ok(())
    }

    /// Close the shared transport.
    pub fn close(&self) -> Result<()> {
        self.transport.borrow_mut().close()?;
        Ok(())
    }
}

impl std::fmt::Debug for ChannelSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelSender")
            .field("user_id", &self.user_id)
            .field("channel_id", &self.channel_id)
            .field("data_opcode", &self.data_opcode)
            .finish()
    }
}
