//! Server-side connection state machine.
//!
//! The mirror of the client sequence: answer Connect-Initial with a
//! negotiated parameter set and assigned static channel ids, absorb
//! Erect-Domain, allocate a user on Attach-User, confirm (or reject)
//! each Channel-Join-Request, then route data.

use std::cell::RefCell;
use std::rc::Rc;

use bytes::{Bytes, BytesMut};
use mcsmux_pdu::{
    channel::user_channel_id, connect::ConnectResponse, control, data, header, ChannelDef,
    ConnectInitial, DomainParameters, Opcode, GLOBAL_CHANNEL_ID, REASON_USER_REQUESTED,
};
use mcsmux_transport::Transport;
use tracing::{debug, info, warn};

use crate::conference::{BasicConferenceCodec, ConferenceCodec};
use crate::error::{Result, SessionError};
use crate::handler::{ChannelHandler, ChannelSender};
use crate::mux::{dispatch_data, SessionStats};
use crate::registry::ChannelRegistry;

/// Server negotiation states, entered in order. `AwaitChannelJoins`
/// is re-entered until the expected join count reaches zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    AwaitConnectInitial,
    AwaitErectDomain,
    AwaitAttachUser,
    AwaitChannelJoins,
    Connected,
    Closed,
}

struct AnnouncedChannel {
    def: ChannelDef,
    channel_id: u16,
}

/// One server connection over one accepted transport.
pub struct ServerConnection {
    transport: Rc<RefCell<dyn Transport>>,
    conference: Box<dyn ConferenceCodec>,
    state: ServerState,
    registry: ChannelRegistry,
    stats: SessionStats,
    global_handler: Option<Box<dyn ChannelHandler>>,
    static_handlers: Vec<(String, Option<Box<dyn ChannelHandler>>)>,
    announced: Vec<AnnouncedChannel>,
    parameters: Option<DomainParameters>,
    user_id: Option<u16>,
    next_user_id: u16,
    expected_joins: usize,
}

impl ServerConnection {
    /// Create a connection with the default conference codec.
    pub fn new(transport: impl Transport + 'static) -> Self {
        Self::with_conference(transport, Box::new(BasicConferenceCodec))
    }

    /// Create a connection with an explicit conference codec.
    pub fn with_conference(
        transport: impl Transport + 'static,
        conference: Box<dyn ConferenceCodec>,
    ) -> Self {
        Self {
            transport: Rc::new(RefCell::new(transport)),
            conference,
            state: ServerState::AwaitConnectInitial,
            registry: ChannelRegistry::new(),
            stats: SessionStats::default(),
            global_handler: None,
            static_handlers: Vec::new(),
            announced: Vec::new(),
            parameters: None,
            user_id: None,
            next_user_id: 1,
            expected_joins: 0,
        }
    }

    /// Register the handler for the mandatory global channel.
    pub fn register_global(&mut self, handler: Box<dyn ChannelHandler>) {
        self.global_handler = Some(handler);
    }

    /// Register the handler for a static channel by name.
    ///
    /// The handler is bound once a client requests that name and joins
    /// the assigned id.
    pub fn register_static(&mut self, name: impl Into<String>, handler: Box<dyn ChannelHandler>) {
        self.static_handlers.push((name.into(), Some(handler)));
    }

    /// Feed one inbound PDU chunk into the state machine.
    pub fn on_data(&mut self, chunk: &[u8]) -> Result<()> {
        if chunk.is_empty() {
            self.shutdown();
            return Err(SessionError::MalformedPdu(mcsmux_pdu::PduError::Malformed(
                "empty chunk".into(),
            )));
        }

        if header::matches(chunk[0], Opcode::DisconnectProviderUltimatum) {
            debug!(state = ?self.state, "received disconnect ultimatum");
            self.shutdown();
            return Ok(());
        }

        let mut src = Bytes::copy_from_slice(chunk);
        let result = match self.state {
            ServerState::AwaitConnectInitial => self.handle_connect_initial(&mut src),
            ServerState::AwaitErectDomain => self.handle_erect_domain(&mut src),
            ServerState::AwaitAttachUser => self.handle_attach_user(&mut src),
            ServerState::AwaitChannelJoins => self.handle_channel_join(&mut src),
            ServerState::Connected => self.handle_data(&mut src),
            ServerState::Closed => Err(SessionError::Closed),
        };

        if result.is_err() {
            self.shutdown();
        }
        result
    }

    /// Send a payload to the client on a channel (data phase only).
    pub fn send(&mut self, channel_id: u16, payload: &[u8]) -> Result<()> {
        if self.state != ServerState::Connected {
            return Err(SessionError::Protocol(format!(
                "send in state {:?}",
                self.state
            )));
        }
        let user_id = self.require_user_id()?;
        let mut dst = BytesMut::with_capacity(payload.len() + 16);
        data::encode_data(
            &mut dst,
            Opcode::SendDataIndication,
            user_id,
            channel_id,
            payload,
        )?;
        self.send_chunk(&dst)
    }

    /// A sender proxy for a bound channel, available once connected.
    pub fn sender(&self, channel_id: u16) -> Option<ChannelSender> {
        if self.state != ServerState::Connected || !self.registry.contains(channel_id) {
            return None;
        }
        let user_id = self.user_id?;
        Some(ChannelSender::new(
            Rc::clone(&self.transport),
            user_id,
            channel_id,
            Opcode::SendDataIndication,
        ))
    }

    /// Send a disconnect ultimatum and close the connection.
    pub fn disconnect(&mut self) -> Result<()> {
        if self.state != ServerState::Closed {
            let mut dst = BytesMut::new();
            control::encode_disconnect_ultimatum(&mut dst, REASON_USER_REQUESTED);
            if let Err(err) = self.send_chunk(&dst) {
                debug!(error = %err, "ultimatum not delivered");
            }
            self.shutdown();
        }
        Ok(())
    }

    pub fn state(&self) -> ServerState {
        self.state
    }

    /// The negotiated domain parameters, once Connect-Initial arrived.
    pub fn parameters(&self) -> Option<&DomainParameters> {
        self.parameters.as_ref()
    }

    /// The user id issued at attach.
    pub fn user_id(&self) -> Option<u16> {
        self.user_id
    }

    /// Channel ids announced for the client's static channel requests,
    /// in request order.
    pub fn announced_ids(&self) -> Vec<u16> {
        self.announced.iter().map(|a| a.channel_id).collect()
    }

    /// Data-path counters.
    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    fn handle_connect_initial(&mut self, src: &mut Bytes) -> Result<()> {
        let initial = ConnectInitial::decode(src)?;
        let requested = self.conference.decode_request(&initial.user_data)?;

        let parameters =
            DomainParameters::negotiate(&initial.minimum, &initial.target, &initial.maximum);

        self.announced.clear();
        let mut next_id = GLOBAL_CHANNEL_ID + 1;
        for def in requested {
            self.announced.push(AnnouncedChannel {
                def,
                channel_id: next_id,
            });
            next_id += 1;
        }

        let ids: Vec<u16> = self.announced.iter().map(|a| a.channel_id).collect();
        let blob = self.conference.encode_response(&ids)?;
        let response = ConnectResponse::new(parameters, blob);
        let mut dst = BytesMut::new();
        response.encode(&mut dst)?;
        self.send_chunk(&dst)?;

        info!(
            max_channel_ids = parameters.max_channel_ids,
            max_pdu_size = parameters.max_pdu_size,
            static_channels = ids.len(),
            "connect initial accepted"
        );
        self.parameters = Some(parameters);
        self.state = ServerState::AwaitErectDomain;
        Ok(())
    }

    fn handle_erect_domain(&mut self, src: &mut Bytes) -> Result<()> {
        let (sub_height, sub_interleave) = control::decode_erect_domain_request(src)?;
        debug!(sub_height, sub_interleave, "domain erected");
        self.state = ServerState::AwaitAttachUser;
        Ok(())
    }

    fn handle_attach_user(&mut self, src: &mut Bytes) -> Result<()> {
        control::decode_attach_user_request(src)?;

        let user_id = self.next_user_id;
        self.next_user_id += 1;
        self.user_id = Some(user_id);

        let mut dst = BytesMut::new();
        control::encode_attach_user_confirm(&mut dst, 0, user_id)?;
        self.send_chunk(&dst)?;

        self.expected_joins = 2 + self.announced.len();
        info!(
            user_id,
            expected_joins = self.expected_joins,
            "user attached"
        );
        self.state = ServerState::AwaitChannelJoins;
        Ok(())
    }

    fn handle_channel_join(&mut self, src: &mut Bytes) -> Result<()> {
        let request = control::decode_channel_join_request(src)?;
        let user_id = self.require_user_id()?;

        if request.user_id != user_id {
            warn!(
                user_id = request.user_id,
                expected = user_id,
                "join request carries unexpected user id"
            );
        }

        let valid = request.channel_id == GLOBAL_CHANNEL_ID
            || request.channel_id == user_channel_id(user_id)
            || self
                .announced
                .iter()
                .any(|a| a.channel_id == request.channel_id);
        let result = if valid { 0 } else { 1 };

        let mut dst = BytesMut::new();
        control::encode_channel_join_confirm(&mut dst, result, user_id, request.channel_id)?;
        self.send_chunk(&dst)?;

        if valid {
            debug!(channel_id = request.channel_id, "confirmed channel join");
            self.bind_joined(request.channel_id);
        } else {
            warn!(channel_id = request.channel_id, "rejected channel join");
        }

        // Every request consumes one expected join, confirmed or not.
        self.expected_joins = self.expected_joins.saturating_sub(1);
        if self.expected_joins == 0 {
            let user_id = self.require_user_id()?;
            self.state = ServerState::Connected;
            info!(
                user_id,
                channels = self.registry.len(),
                "all channels connected"
            );
            self.notify_connected(user_id);
        }
        Ok(())
    }

    fn bind_joined(&mut self, channel_id: u16) {
        if channel_id == GLOBAL_CHANNEL_ID {
            if let Some(handler) = self.global_handler.take() {
                self.registry.bind(GLOBAL_CHANNEL_ID, handler);
            }
            return;
        }

        let Some(announced) = self.announced.iter().find(|a| a.channel_id == channel_id) else {
            return;
        };
        let name = announced.def.name().to_string();
        if let Some(handler) = self
            .static_handlers
            .iter_mut()
            .find(|(handler_name, slot)| *handler_name == name && slot.is_some())
            .and_then(|(_, slot)| slot.take())
        {
            self.registry.bind(channel_id, handler);
        }
    }

    fn handle_data(&mut self, src: &mut Bytes) -> Result<()> {
        let frame = data::decode_data(src, Opcode::SendDataRequest)?;
        let user_id = self.require_user_id()?;
        dispatch_data(&mut self.registry, &mut self.stats, &frame, user_id);
        Ok(())
    }

    fn notify_connected(&mut self, user_id: u16) {
        let transport = &self.transport;
        for (channel_id, handler) in self.registry.iter_mut() {
            handler.on_connected(ChannelSender::new(
                Rc::clone(transport),
                user_id,
                channel_id,
                Opcode::SendDataIndication,
            ));
        }
    }

    fn require_user_id(&self) -> Result<u16> {
        self.user_id
            .ok_or_else(|| SessionError::Protocol("no user attached".into()))
    }

    fn send_chunk(&mut self, chunk: &[u8]) -> Result<()> {
        self.transport.borrow_mut().send(chunk)?;
        Ok(())
    }

    fn shutdown(&mut self) {
        if self.state == ServerState::Closed {
            return;
        }
        let _ = self.transport.borrow_mut().close();
        self.registry.clear();
        self.state = ServerState::Closed;
    }
}

impl std::fmt::Debug for ServerConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConnection")
            .field("state", &self.state)
            .field("user_id", &self.user_id)
            .field("expected_joins", &self.expected_joins)
            .finish()
    }
}
