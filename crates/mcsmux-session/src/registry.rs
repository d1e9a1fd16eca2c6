use std::collections::HashMap;

use mcsmux_pdu::{GLOBAL_CHANNEL_ID, USER_CHANNEL_BASE};

use crate::handler::ChannelHandler;

/// Channel id to handler bindings for one connection.
///
/// Rebinding an id silently replaces the previous handler. Lookup
/// misses are not errors; the data path drops and counts them.
#[derive(Default)]
pub struct ChannelRegistry {
    handlers: HashMap<u16, Box<dyn ChannelHandler>>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The two ids reserved by convention: the global channel and the
    /// base per-user channel ids derive from.
    pub fn reserved_ids() -> (u16, u16) {
        (GLOBAL_CHANNEL_ID, USER_CHANNEL_BASE)
    }

    /// Bind a handler to a channel id, replacing any previous binding.
    pub fn bind(&mut self, channel_id: u16, handler: Box<dyn ChannelHandler>) {
        self.handlers.insert(channel_id, handler);
    }

    /// The handler bound to `channel_id`, if any.
    pub fn lookup_mut(&mut self, channel_id: u16) -> Option<&mut (dyn ChannelHandler + 'static)> {
        self.handlers.get_mut(&channel_id).map(|h| h.as_mut())
    }

    /// Whether a handler is bound to `channel_id`.
    pub fn contains(&self, channel_id: u16) -> bool {
        self.handlers.contains_key(&channel_id)
    }

    /// Iterate over all bindings.
    pub fn iter_mut(
        &mut self,
    ) -> impl Iterator<Item = (u16, &mut Box<dyn ChannelHandler>)> + '_ {
        self.handlers.iter_mut().map(|(id, handler)| (*id, handler))
    }

    /// Bound channel ids, ascending.
    pub fn ids(&self) -> Vec<u16> {
        let mut ids: Vec<u16> = self.handlers.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Drop every binding (connection teardown).
    pub fn clear(&mut self) {
        self.handlers.clear();
    }
}

impl std::fmt::Debug for ChannelRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelRegistry")
            .field("channels", &self.ids())
            .finish()
    }
}
