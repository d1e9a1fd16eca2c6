//! Routing of decoded data frames into the channel registry.

use mcsmux_pdu::DataFrame;
use tracing::{debug, warn};

use crate::registry::ChannelRegistry;

/// Counters for the data path.
///
/// These are the observability hook for events the protocol tolerates
/// silently: a frame for an unbound channel is dropped, a frame carrying
/// a foreign user id is routed anyway, and both only show up here and in
/// the logs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// Frames delivered to a bound handler.
    pub frames_routed: u64,
    /// Frames dropped because no handler was bound to their channel.
    pub frames_dropped: u64,
    /// Frames whose source user id differed from the session's own.
    pub user_id_mismatches: u64,
}

/// Route one decoded frame to its bound handler, if any.
pub(crate) fn dispatch_data(
    registry: &mut ChannelRegistry,
    stats: &mut SessionStats,
    frame: &DataFrame,
    local_user_id: u16,
) {
    if frame.user_id != local_user_id {
        stats.user_id_mismatches += 1;
        warn!(
            user_id = frame.user_id,
            expected = local_user_id,
            channel_id = frame.channel_id,
            "data pdu carries unexpected user id"
        );
    }

    match registry.lookup_mut(frame.channel_id) {
        Some(handler) => {
            stats.frames_routed += 1;
            handler.on_data(&frame.payload);
        }
        None => {
            stats.frames_dropped += 1;
            debug!(
                channel_id = frame.channel_id,
                size = frame.payload.len(),
                "dropping data for unbound channel"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use crate::handler::{ChannelHandler, ChannelSender};

    use super::*;

    #[derive(Default)]
    struct Sink {
        received: Vec<Vec<u8>>,
    }

    impl ChannelHandler for Sink {
        fn on_connected(&mut self, _sender: ChannelSender) {}
        fn on_data(&mut self, payload: &[u8]) {
            self.received.push(payload.to_vec());
        }
    }

    fn frame(user_id: u16, channel_id: u16, payload: &[u8]) -> DataFrame {
        DataFrame {
            user_id,
            channel_id,
            payload: Bytes::copy_from_slice(payload),
        }
    }

    #[test]
    fn routes_to_bound_handler() {
        let mut registry = ChannelRegistry::new();
        registry.bind(1003, Box::<Sink>::default());
        let mut stats = SessionStats::default();

        dispatch_data(&mut registry, &mut stats, &frame(1, 1003, b"hi"), 1);

        assert_eq!(stats.frames_routed, 1);
        assert_eq!(stats.frames_dropped, 0);
        assert_eq!(stats.user_id_mismatches, 0);
    }

    #[test]
    fn unknown_channel_dropped_and_counted() {
        let mut registry = ChannelRegistry::new();
        let mut stats = SessionStats::default();

        dispatch_data(&mut registry, &mut stats, &frame(1, 1999, b"lost"), 1);

        assert_eq!(stats.frames_routed, 0);
        assert_eq!(stats.frames_dropped, 1);
    }

    #[test]
    fn foreign_user_id_counted_but_still_routed() {
        let mut registry = ChannelRegistry::new();
        registry.bind(1003, Box::<Sink>::default());
        let mut stats = SessionStats::default();

        dispatch_data(&mut registry, &mut stats, &frame(9, 1003, b"hi"), 1);

        assert_eq!(stats.user_id_mismatches, 1);
        assert_eq!(stats.frames_routed, 1);
    }
}
