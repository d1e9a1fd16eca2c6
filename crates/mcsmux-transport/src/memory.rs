use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use bytes::Bytes;

use crate::error::{Result, TransportError};
use crate::traits::Transport;

/// An in-process transport pair.
///
/// Two endpoints share a pair of chunk queues; what one end sends, the
/// other pops with [`MemoryTransport::recv`]. Single-threaded by design —
/// the session layer is event-driven and the test harness pumps chunks
/// between the two state machines itself.
///
/// Cloning an endpoint yields a second handle onto the same queues, which
/// lets a test hand one clone to a connection and keep another for pumping.
#[derive(Clone)]
pub struct MemoryTransport {
    shared: Rc<RefCell<Shared>>,
    side: Side,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Side {
    A,
    B,
}

#[derive(Default)]
struct Shared {
    to_a: VecDeque<Bytes>,
    to_b: VecDeque<Bytes>,
    a_closed: bool,
    b_closed: bool,
}

impl MemoryTransport {
    /// Create a connected pair of endpoints.
    pub fn pair() -> (Self, Self) {
        let shared = Rc::new(RefCell::new(Shared::default()));
        (
            Self {
                shared: Rc::clone(&shared),
                side: Side::A,
            },
            Self {
                shared,
                side: Side::B,
            },
        )
    }

    /// Pop the next chunk delivered to this endpoint, if any.
    pub fn recv(&mut self) -> Option<Bytes> {
        let mut shared = self.shared.borrow_mut();
        match self.side {
            Side::A => shared.to_a.pop_front(),
            Side::B => shared.to_b.pop_front(),
        }
    }

    /// Number of chunks waiting to be received on this endpoint.
    pub fn pending(&self) -> usize {
        let shared = self.shared.borrow();
        match self.side {
            Side::A => shared.to_a.len(),
            Side::B => shared.to_b.len(),
        }
    }

    /// Whether the peer endpoint has closed.
    pub fn peer_closed(&self) -> bool {
        let shared = self.shared.borrow();
        match self.side {
            Side::A => shared.b_closed,
            Side::B => shared.a_closed,
        }
    }
}

impl Transport for MemoryTransport {
    fn send(&mut self, chunk: &[u8]) -> Result<()> {
        let mut shared = self.shared.borrow_mut();
        if shared.a_closed || shared.b_closed {
            return Err(TransportError::Closed);
        }
        let chunk = Bytes::copy_from_slice(chunk);
        match self.side {
            Side::A => shared.to_b.push_back(chunk),
            Side::B => shared.to_a.push_back(chunk),
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        let mut shared = self.shared.borrow_mut();
        match self.side {
            Side::A => shared.a_closed = true,
            Side::B => shared.b_closed = true,
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        let shared = self.shared.borrow();
        match self.side {
            Side::A => shared.a_closed,
            Side::B => shared.b_closed,
        }
    }
}

impl std::fmt::Debug for MemoryTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryTransport")
            .field("side", &self.side)
            .field("closed", &self.is_closed())
            .finish()
    }
}
