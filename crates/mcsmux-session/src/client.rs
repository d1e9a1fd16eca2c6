//! Client-side connection state machine.
//!
//! Drives the negotiation sequence: Connect-Initial, Erect-Domain and
//! Attach-User, then one Channel-Join round-trip per channel in fixed
//! order (global, user, announced statics), and finally the data phase.
//! Each inbound chunk carries exactly one PDU; the current state decides
//! how it is parsed.

use std::cell::RefCell;
use std::collections::VecDeque;
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

/// Client negotiation states, entered in order. `AwaitJoinConfirm` is
/// re-entered once per joined channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Idle,
    AwaitConnectResponse,
    AwaitAttachConfirm,
    AwaitJoinConfirm,
    Connected,
    Closed,
}

/// The three domain-parameter sets a client proposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientConfig {
    pub minimum: DomainParameters,
    pub target: DomainParameters,
    pub maximum: DomainParameters,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            minimum: DomainParameters::minimum(),
            target: DomainParameters::target(),
            maximum: DomainParameters::maximum(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JoinTarget {
    Global,
    User,
    Static { index: usize, channel_id: u16 },
}

struct StaticChannel {
    def: ChannelDef,
    handler: Option<Box<dyn ChannelHandler>>,
}

/// One client connection over one transport.
pub struct ClientConnection {
    transport: Rc<RefCell<dyn Transport>>,
    conference: Box<dyn ConferenceCodec>,
    config: ClientConfig,
    state: ClientState,
    registry: ChannelRegistry,
    stats: SessionStats,
    global_handler: Option<Box<dyn ChannelHandler>>,
    static_channels: Vec<StaticChannel>,
    parameters: Option<DomainParameters>,
    user_id: Option<u16>,
    announced_ids: Vec<u16>,
    join_queue: VecDeque<JoinTarget>,
    current_join: Option<JoinTarget>,
}

impl ClientConnection {
    /// Create a connection with the default conference codec and
    /// proposal sets.
    pub fn new(transport: impl Transport + 'static) -> Self {
        Self::with_parts(
            transport,
            Box::new(BasicConferenceCodec),
            ClientConfig::default(),
        )
    }

    /// Create a connection with an explicit conference codec and config.
    pub fn with_parts(
        transport: impl Transport + 'static,
        conference: Box<dyn ConferenceCodec>,
        config: ClientConfig,
    ) -> Self {
        Self {
            transport: Rc::new(RefCell::new(transport)),
            conference,
            config,
            state: ClientState::Idle,
            registry: ChannelRegistry::new(),
            stats: SessionStats::default(),
            global_handler: None,
            static_channels: Vec::new(),
            parameters: None,
            user_id: None,
            announced_ids: Vec::new(),
            join_queue: VecDeque::new(),
            current_join: None,
        }
    }

    /// Register the handler for the mandatory global channel.
    ///
    /// Must be called before [`connect`](Self::connect).
    pub fn register_global(&mut self, handler: Box<dyn ChannelHandler>) {
        self.global_handler = Some(handler);
    }

    /// Request a named static channel and register its handler.
    ///
    /// Channels are requested in registration order; the server assigns
    /// their ids.
    pub fn register_static(&mut self, def: ChannelDef, handler: Box<dyn ChannelHandler>) {
        self.static_channels.push(StaticChannel {
            def,
            handler: Some(handler),
        });
    }

    /// Begin negotiation by sending Connect-Initial.
    pub fn connect(&mut self) -> Result<()> {
        if self.state != ClientState::Idle {
            return Err(SessionError::Protocol(format!(
                "connect in state {:?}",
                self.state
            )));
        }

        let defs: Vec<ChannelDef> = self
            .static_channels
            .iter()
            .map(|entry| entry.def.clone())
            .collect();
        let blob = self.conference.encode_request(&defs)?;

        let mut initial = ConnectInitial::new(blob);
        initial.minimum = self.config.minimum;
        initial.target = self.config.target;
        initial.maximum = self.config.maximum;

        let mut dst = BytesMut::new();
        initial.encode(&mut dst)?;
        self.send_chunk(&dst)?;

        debug!(static_channels = defs.len(), "sent connect initial");
        self.state = ClientState::AwaitConnectResponse;
        Ok(())
    }

    /// Feed one inbound PDU chunk into the state machine.
    ///
    /// A fatal error tears the connection down before it is returned; a
    /// disconnect ultimatum closes the connection and returns `Ok`.
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
            ClientState::AwaitConnectResponse => self.handle_connect_response(&mut src),
            ClientState::AwaitAttachConfirm => self.handle_attach_confirm(&mut src),
            ClientState::AwaitJoinConfirm => self.handle_join_confirm(&mut src),
            ClientState::Connected => self.handle_data(&mut src),
            ClientState::Idle => Err(SessionError::Protocol(
                "data received before connect".into(),
            )),
            ClientState::Closed => Err(SessionError::Closed),
        };

        if result.is_err() {
            self.shutdown();
        }
        result
    }

    /// Send a payload on a joined channel (data phase only).
    pub fn send(&mut self, channel_id: u16, payload: &[u8]) -> Result<()> {
        if self.state != ClientState::Connected {
            return Err(SessionError::Protocol(format!(
                "send in state {:?}",
                self.state
            )));
        }
        let user_id = self.require_user_id()?;
        let mut dst = BytesMut::with_capacity(payload.len() + 16);
        data::encode_data(&mut dst, Opcode::SendDataRequest, user_id, channel_id, payload)?;
        self.send_chunk(&dst)
    }

    /// A sender proxy for a bound channel, available once connected.
    pub fn sender(&self, channel_id: u16) -> Option<ChannelSender> {
        if self.state != ClientState::Connected || !self.registry.contains(channel_id) {
            return None;
        }
        let user_id = self.user_id?;
        Some(ChannelSender::new(
            Rc::clone(&self.transport),
            user_id,
            channel_id,
            Opcode::SendDataRequest,
        ))
    }

    /// Send a disconnect ultimatum and close the connection.
    pub fn disconnect(&mut self) -> Result<()> {
        if self.state != ClientState::Closed {
            let mut dst = BytesMut::new();
            control::encode_disconnect_ultimatum(&mut dst, REASON_USER_REQUESTED);
            if let Err(err) = self.send_chunk(&dst) {
                debug!(error = %err, "ultimatum not delivered");
            }
            self.shutdown();
        }
        Ok(())
    }

    pub fn state(&self) -> ClientState {
        self.state
    }

    /// The negotiated domain parameters, once the server has answered.
    pub fn parameters(&self) -> Option<&DomainParameters> {
        self.parameters.as_ref()
    }

    /// The server-assigned user id, once attached.
    pub fn user_id(&self) -> Option<u16> {
        self.user_id
    }

    /// Channel ids the server announced for requested static channels.
    pub fn announced_ids(&self) -> &[u16] {
        &self.announced_ids
    }

    /// Data-path counters.
    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    fn handle_connect_response(&mut self, src: &mut Bytes) -> Result<()> {
        let response = ConnectResponse::decode(src)?;
        if response.result != 0 {
            return Err(SessionError::Protocol(format!(
                "connect refused (result {})",
                response.result
            )));
        }

        self.announced_ids = self.conference.decode_response(&response.user_data)?;
        debug!(
            max_channel_ids = response.parameters.max_channel_ids,
            max_pdu_size = response.parameters.max_pdu_size,
            announced = self.announced_ids.len(),
            "connect response accepted"
        );
        self.parameters = Some(response.parameters);

        let mut dst = BytesMut::new();
        control::encode_erect_domain_request(&mut dst, 0, 0)?;
        self.send_chunk(&dst)?;

        let mut dst = BytesMut::new();
        control::encode_attach_user_request(&mut dst);
        self.send_chunk(&dst)?;

        self.state = ClientState::AwaitAttachConfirm;
        Ok(())
    }

    fn handle_attach_confirm(&mut self, src: &mut Bytes) -> Result<()> {
        let confirm = control::decode_attach_user_confirm(src)?;
        if confirm.result != 0 {
            return Err(SessionError::UserRejected(confirm.result));
        }

        info!(user_id = confirm.user_id, "user attached");
        self.user_id = Some(confirm.user_id);

        self.join_queue.clear();
        self.join_queue.push_back(JoinTarget::Global);
        self.join_queue.push_back(JoinTarget::User);
        for (index, &channel_id) in self.announced_ids.iter().enumerate() {
            self.join_queue
                .push_back(JoinTarget::Static { index, channel_id });
        }

        self.send_next_join()
    }

    fn handle_join_confirm(&mut self, src: &mut Bytes) -> Result<()> {
        let confirm = control::decode_channel_join_confirm(src)?;
        let target = self.current_join.take().ok_or_else(|| {
            SessionError::Protocol("join confirm without outstanding request".into())
        })?;
        let user_id = self.require_user_id()?;

        if confirm.user_id != user_id {
            return Err(SessionError::Protocol(format!(
                "join confirm for user {} (expected {user_id})",
                confirm.user_id
            )));
        }
        let expected_id = self.target_channel_id(target, user_id);
        if confirm.channel_id != expected_id {
            return Err(SessionError::Protocol(format!(
                "join confirm for channel {} (expected {expected_id})",
                confirm.channel_id
            )));
        }

        match target {
            JoinTarget::Global | JoinTarget::User => {
                if confirm.result != 0 {
                    return Err(SessionError::Protocol(format!(
                        "server refused mandatory channel {expected_id} (result {})",
                        confirm.result
                    )));
                }
                debug!(channel_id = expected_id, "joined mandatory channel");
                if target == JoinTarget::Global {
                    if let Some(handler) = self.global_handler.take() {
                        self.registry.bind(GLOBAL_CHANNEL_ID, handler);
                    }
                }
            }
            JoinTarget::Static { index, channel_id } => {
                if confirm.result == 0 {
                    debug!(channel_id, "joined static channel");
                    if let Some(handler) = self
                        .static_channels
                        .get_mut(index)
                        .and_then(|entry| entry.handler.take())
                    {
                        self.registry.bind(channel_id, handler);
                    }
                } else {
                    warn!(
                        channel_id,
                        result = confirm.result,
                        "static channel refused; leaving unbound"
                    );
                }
            }
        }

        self.send_next_join()
    }

    fn handle_data(&mut self, src: &mut Bytes) -> Result<()> {
        let frame = data::decode_data(src, Opcode::SendDataIndication)?;
        let user_id = self.require_user_id()?;
        dispatch_data(&mut self.registry, &mut self.stats, &frame, user_id);
        Ok(())
    }

    fn send_next_join(&mut self) -> Result<()> {
        let user_id = self.require_user_id()?;
        match self.join_queue.pop_front() {
            Some(target) => {
                let channel_id = self.target_channel_id(target, user_id);
                let mut dst = BytesMut::new();
                control::encode_channel_join_request(&mut dst, user_id, channel_id)?;
                self.send_chunk(&dst)?;
                debug!(channel_id, "requested channel join");
                self.current_join = Some(target);
                self.state = ClientState::AwaitJoinConfirm;
                Ok(())
            }
            None => {
                self.state = ClientState::Connected;
                info!(
                    user_id,
                    channels = self.registry.len(),
                    "all channels connected"
                );
                self.notify_connected(user_id);
                Ok(())
            }
        }
    }

    fn notify_connected(&mut self, user_id: u16) {
        let transport = &self.transport;
        for (channel_id, handler) in self.registry.iter_mut() {
            handler.on_connected(ChannelSender::new(
                Rc::clone(transport),
                user_id,
                channel_id,
                Opcode::SendDataRequest,
            ));
        }
    }

    fn target_channel_id(&self, target: JoinTarget, user_id: u16) -> u16 {
        match target {
            JoinTarget::Global => GLOBAL_CHANNEL_ID,
            JoinTarget::User => user_channel_id(user_id),
            JoinTarget::Static { channel_id, .. } => channel_id,
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
        if self.state == ClientState::Closed {
            return;
        }
        let _ = self.transport.borrow_mut().close();
        self.registry.clear();
        self.state = ClientState::Closed;
    }
}

impl std::fmt::Debug for ClientConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConnection")
            .field("state", &self.state)
            .field("user_id", &self.user_id)
            .field("announced_ids", &self.announced_ids)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use mcsmux_pdu::connect::ConnectResponse;
    use mcsmux_pdu::ChannelJoinRequest;
    use mcsmux_transport::MemoryTransport;

    use super::*;

    /// Plays the server side by hand: holds the server endpoint plus a
    /// clone of the client endpoint for popping chunks the "server"
    /// sent toward the client.
    struct FakeServer {
        server_end: MemoryTransport,
        client_inbound: MemoryTransport,
    }

    impl FakeServer {
        fn reply(&mut self, chunk: &[u8]) -> Bytes {
            self.server_end.send(chunk).unwrap();
            self.client_inbound.recv().expect("chunk queued for client")
        }

        fn sent_by_client(&mut self) -> Option<Bytes> {
            self.server_end.recv()
        }
    }

    fn setup() -> (ClientConnection, FakeServer) {
        let (client_end, server_end) = MemoryTransport::pair();
        let client_inbound = client_end.clone();
        let client = ClientConnection::new(client_end);
        (
            client,
            FakeServer {
                server_end,
                client_inbound,
            },
        )
    }

    fn connect_response_chunk(announced: &[u16]) -> BytesMut {
        let blob = BasicConferenceCodec.encode_response(announced).unwrap();
        let response = ConnectResponse::new(DomainParameters::new(2, 1, 0, 8192), blob);
        let mut dst = BytesMut::new();
        response.encode(&mut dst).unwrap();
        dst
    }

    fn attach_confirm_chunk(result: u8, user_id: u16) -> BytesMut {
        let mut dst = BytesMut::new();
        control::encode_attach_user_confirm(&mut dst, result, user_id).unwrap();
        dst
    }

    fn join_confirm_chunk(result: u8, user_id: u16, channel_id: u16) -> BytesMut {
        let mut dst = BytesMut::new();
        control::encode_channel_join_confirm(&mut dst, result, user_id, channel_id).unwrap();
        dst
    }

    fn decode_join_request(chunk: &mut Bytes) -> ChannelJoinRequest {
        control::decode_channel_join_request(chunk).unwrap()
    }

    /// Drive a client through the connect/attach phases so the next
    /// outbound PDU is the first join request.
    fn negotiate_to_joins(
        client: &mut ClientConnection,
        server: &mut FakeServer,
        announced: &[u16],
    ) {
        client.connect().unwrap();
        let _connect_initial = server.sent_by_client().unwrap();

        let chunk = server.reply(&connect_response_chunk(announced));
        client.on_data(&chunk).unwrap();
        let _erect = server.sent_by_client().unwrap();
        let _attach = server.sent_by_client().unwrap();

        let chunk = server.reply(&attach_confirm_chunk(0, 1));
        client.on_data(&chunk).unwrap();
    }

    struct Discard;

    impl ChannelHandler for Discard {
        fn on_connected(&mut self, _sender: ChannelSender) {}
        fn on_data(&mut self, _payload: &[u8]) {}
    }

    #[test]
    fn join_loop_runs_in_fixed_order() {
        let (mut client, mut server) = setup();
        client.register_global(Box::new(Discard));
        client.register_static(ChannelDef::new("cliprdr", 0).unwrap(), Box::new(Discard));
        client.register_static(ChannelDef::new("rdpsnd", 0).unwrap(), Box::new(Discard));
        negotiate_to_joins(&mut client, &mut server, &[1004, 1005]);

        // global, user, cliprdr, rdpsnd — one round-trip each, exactly
        // this order.
        for expected in [1003u16, 1002, 1004, 1005] {
            let mut request = server.sent_by_client().expect("join request pending");
            assert_eq!(decode_join_request(&mut request).channel_id, expected);
            assert!(
                server.sent_by_client().is_none(),
                "client must wait for each confirm before the next request"
            );
            let chunk = server.reply(&join_confirm_chunk(0, 1, expected));
            client.on_data(&chunk).unwrap();
        }

        assert_eq!(client.state(), ClientState::Connected);
        assert_eq!(client.user_id(), Some(1));
    }

    #[test]
    fn refused_global_channel_is_fatal() {
        let (mut client, mut server) = setup();
        client.register_global(Box::new(Discard));
        negotiate_to_joins(&mut client, &mut server, &[]);

        let _global_request = server.sent_by_client().unwrap();
        let chunk = server.reply(&join_confirm_chunk(1, 1, GLOBAL_CHANNEL_ID));
        let err = client.on_data(&chunk).unwrap_err();

        assert!(matches!(err, SessionError::Protocol(_)), "{err}");
        assert_eq!(client.state(), ClientState::Closed);
        assert!(server.server_end.peer_closed());
    }

    #[test]
    fn refused_static_channel_left_unbound() {
        let (mut client, mut server) = setup();
        client.register_global(Box::new(Discard));
        client.register_static(ChannelDef::new("cliprdr", 0).unwrap(), Box::new(Discard));
        negotiate_to_joins(&mut client, &mut server, &[1004]);

        for (channel_id, result) in [(1003u16, 0u8), (1002, 0), (1004, 1)] {
            let _request = server.sent_by_client().unwrap();
            let chunk = server.reply(&join_confirm_chunk(result, 1, channel_id));
            client.on_data(&chunk).unwrap();
        }

        assert_eq!(client.state(), ClientState::Connected);
        assert!(client.sender(GLOBAL_CHANNEL_ID).is_some());
        assert!(client.sender(1004).is_none());
    }

    #[test]
    fn attach_rejection_is_fatal() {
        let (mut client, mut server) = setup();
        client.connect().unwrap();
        let _connect_initial = server.sent_by_client().unwrap();

        let chunk = server.reply(&connect_response_chunk(&[]));
        client.on_data(&chunk).unwrap();
        let _erect = server.sent_by_client().unwrap();
        let _attach = server.sent_by_client().unwrap();

        let chunk = server.reply(&attach_confirm_chunk(2, 0));
        let err = client.on_data(&chunk).unwrap_err();
        assert!(matches!(err, SessionError::UserRejected(2)));
        assert_eq!(client.state(), ClientState::Closed);
    }

    #[test]
    fn out_of_sequence_opcode_is_fatal() {
        let (mut client, mut server) = setup();
        client.connect().unwrap();
        let _connect_initial = server.sent_by_client().unwrap();

        // A join confirm while still awaiting the connect response.
        let chunk = server.reply(&join_confirm_chunk(0, 1, GLOBAL_CHANNEL_ID));
        let err = client.on_data(&chunk).unwrap_err();
        assert!(matches!(err, SessionError::Protocol(_)), "{err}");
        assert_eq!(client.state(), ClientState::Closed);
    }

    #[test]
    fn ultimatum_closes_cleanly_in_every_state() {
        let mut ultimatum = BytesMut::new();
        control::encode_disconnect_ultimatum(&mut ultimatum, REASON_USER_REQUESTED);

        // Mid-negotiation: right after connect.
        let (mut client, mut server) = setup();
        client.connect().unwrap();
        let _ = server.sent_by_client();
        let chunk = server.reply(&ultimatum);
        client.on_data(&chunk).unwrap();
        assert_eq!(client.state(), ClientState::Closed);

        // Mid-join.
        let (mut client, mut server) = setup();
        client.register_global(Box::new(Discard));
        negotiate_to_joins(&mut client, &mut server, &[]);
        let _ = server.sent_by_client();
        let chunk = server.reply(&ultimatum);
        client.on_data(&chunk).unwrap();
        assert_eq!(client.state(), ClientState::Closed);
    }

    #[test]
    fn connect_twice_rejected() {
        let (mut client, _server) = setup();
        client.connect().unwrap();
        assert!(matches!(
            client.connect(),
            Err(SessionError::Protocol(_))
        ));
    }

    #[test]
    fn send_before_connected_rejected() {
        let (mut client, _server) = setup();
        assert!(matches!(
            client.send(GLOBAL_CHANNEL_ID, b"early"),
            Err(SessionError::Protocol(_))
        ));
    }

    #[test]
    fn join_confirm_channel_mismatch_is_fatal() {
        let (mut client, mut server) = setup();
        client.register_global(Box::new(Discard));
        negotiate_to_joins(&mut client, &mut server, &[]);

        let _global_request = server.sent_by_client().unwrap();
        // Confirm names the wrong channel.
        let chunk = server.reply(&join_confirm_chunk(0, 1, 1999));
        let err = client.on_data(&chunk).unwrap_err();
        assert!(matches!(err, SessionError::Protocol(_)), "{err}");
    }
}
