//! One end of an in-process connection pair.
//!
//! A [`ConnectionPeer`] is created unbound on the client side, bound exactly
//! once to a freshly created server-side peer by the listener, and marked
//! accepted when the server's accept loop picks it up. Half-close state is
//! tracked as an [`EofState`] so that only the four legal combinations of
//! "sent EOF" and "received EOF" exist.

use crate::error::{Result, TransportError};
use parking_lot::{Condvar, Mutex};
use std::any::Any;
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, OnceLock, Weak};
use tracing::{debug, trace};
use uuid::Uuid;

const OUTBOUND_BIT: u8 = 0b01;
const INBOUND_BIT: u8 = 0b10;

/// Unique identifier for a connection peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerId(pub Uuid);

impl PeerId {
    /// Creates a new random peer ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PeerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Half-close state of a single peer.
///
/// `HalfClosedLocal` means this side will send nothing more (outbound EOF).
/// `HalfClosedRemote` means this side will receive nothing more (inbound EOF).
/// Transitions only ever add a direction; nothing reopens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EofState {
    Open,
    HalfClosedLocal,
    HalfClosedRemote,
    FullyClosed,
}

impl EofState {
    fn from_bits(bits: u8) -> Self {
        match bits & (OUTBOUND_BIT | INBOUND_BIT) {
            0 => Self::Open,
            OUTBOUND_BIT => Self::HalfClosedLocal,
            INBOUND_BIT => Self::HalfClosedRemote,
            _ => Self::FullyClosed,
        }
    }

    fn bits(self) -> u8 {
        match self {
            Self::Open => 0,
            Self::HalfClosedLocal => OUTBOUND_BIT,
            Self::HalfClosedRemote => INBOUND_BIT,
            Self::FullyClosed => OUTBOUND_BIT | INBOUND_BIT,
        }
    }

    /// The state after this side stops sending.
    pub fn with_outbound_eof(self) -> Self {
        Self::from_bits(self.bits() | OUTBOUND_BIT)
    }

    /// The state after this side stops receiving.
    pub fn with_inbound_eof(self) -> Self {
        Self::from_bits(self.bits() | INBOUND_BIT)
    }

    pub fn is_out_eof(self) -> bool {
        self.bits() & OUTBOUND_BIT != 0
    }

    pub fn is_in_eof(self) -> bool {
        self.bits() & INBOUND_BIT != 0
    }
}

/// One endpoint of a bound in-process connection pair.
///
/// Messages are opaque values of type `M`; a message sent on one side lands
/// in the opposite side's inbound queue in order. Peers are always handled
/// through `Arc`, and each side only keeps a weak reference to its opposite,
/// so dropping one end is observed by the other as the remote going away.
pub struct ConnectionPeer<M> {
    id: PeerId,
    name: String,
    opposite: OnceLock<Weak<ConnectionPeer<M>>>,
    accepted: AtomicBool,
    eof: AtomicU8,
    /// Guards the inbound queue and serializes every wake-up of this peer.
    inbound: Mutex<VecDeque<M>>,
    signal: Condvar,
    app_data: Mutex<Option<Arc<dyn Any + Send + Sync>>>,
}

impl<M> ConnectionPeer<M> {
    /// Creates a new unbound peer.
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            id: PeerId::new(),
            name: name.into(),
            opposite: OnceLock::new(),
            accepted: AtomicBool::new(false),
            eof: AtomicU8::new(EofState::Open.bits()),
            inbound: Mutex::new(VecDeque::new()),
            signal: Condvar::new(),
            app_data: Mutex::new(None),
        })
    }

    pub fn id(&self) -> PeerId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the opposite peer, if this peer is bound and the opposite is
    /// still alive.
    pub fn opposite(&self) -> Option<Arc<Self>> {
        self.opposite.get().and_then(Weak::upgrade)
    }

    /// True once this peer has been bound to an opposite.
    pub fn is_bound(&self) -> bool {
        self.opposite.get().is_some()
    }

    /// Checks whether `other` is the peer this one is bound to.
    pub fn is_bound_to(&self, other: &Arc<Self>) -> bool {
        self.opposite
            .get()
            .is_some_and(|weak| Weak::ptr_eq(weak, &Arc::downgrade(other)))
    }

    pub fn is_accepted(&self) -> bool {
        self.accepted.load(Ordering::Acquire)
    }

    pub fn eof_state(&self) -> EofState {
        EofState::from_bits(self.eof.load(Ordering::Acquire))
    }

    /// Has this side stopped sending?
    pub fn is_out_eof(&self) -> bool {
        self.eof_state().is_out_eof()
    }

    /// Has this side stopped receiving?
    pub fn is_in_eof(&self) -> bool {
        self.eof_state().is_in_eof()
    }

    /// Bound, accepted, not fully closed, and the opposite still exists.
    pub fn is_connected(&self) -> bool {
        self.is_accepted()
            && self.eof_state() != EofState::FullyClosed
            && self.opposite().is_some()
    }

    /// Binds `client` and `server` to each other.
    ///
    /// `server` must be a freshly created peer that no other thread can see
    /// yet; only the client side can race with another binder.
    pub(crate) fn bind(client: &Arc<Self>, server: &Arc<Self>) -> Result<()> {
        if server.is_bound() {
            return Err(TransportError::AlreadyPeered(server.name.clone()));
        }
        client
            .opposite
            .set(Arc::downgrade(server))
            .map_err(|_| TransportError::AlreadyPeered(client.name.clone()))?;
        if server.opposite.set(Arc::downgrade(client)).is_err() {
            panic!(
                "connection {} was bound while its opposite {} was being peered",
                server.name, client.name
            );
        }
        trace!(client = %client.name, server = %server.name, "bound connection pair");
        Ok(())
    }

    /// Marks this peer accepted without waking anyone.
    ///
    /// Returns false if it already was. Waiters are woken separately with
    /// [`wake`](Self::wake) once the caller has released its own locks.
    pub(crate) fn mark_accepted(&self) -> bool {
        let _inbound = self.inbound.lock();
        !self.accepted.swap(true, Ordering::AcqRel)
    }

    /// Wakes every thread waiting on this peer.
    pub(crate) fn wake(&self) {
        let _inbound = self.inbound.lock();
        self.signal.notify_all();
    }

    /// Blocks until this (server-side) peer is accepted or shut down.
    ///
    /// Returns true if it was accepted.
    pub(crate) fn wait_accepted(&self) -> bool {
        let mut inbound = self.inbound.lock();
        loop {
            if self.is_accepted() {
                return true;
            }
            if self.is_out_eof() {
                return false;
            }
            self.signal.wait(&mut inbound);
        }
    }

    fn wake_opposite(&self) {
        if let Some(opposite) = self.opposite() {
            opposite.wake();
        }
    }

    /// Sets `bits` in the EOF state under the inbound lock and wakes this
    /// peer's waiters. Returns the previous bits.
    fn raise_eof(&self, bits: u8) -> u8 {
        let _inbound = self.inbound.lock();
        let previous = self.eof.fetch_or(bits, Ordering::AcqRel);
        self.signal.notify_all();
        previous
    }

    /// Stops sending from this side. The opposite drains what it already
    /// has and then sees end of stream.
    pub fn set_out_eof(&self) {
        self.raise_eof(OUTBOUND_BIT);
        self.wake_opposite();
    }

    /// Stops receiving on this side; a blocked [`receive`](Self::receive)
    /// returns `None`.
    ///
    /// The application layer calls this once it knows the remote is gone,
    /// which makes the peer eligible for
    /// [`Listener::disconnect_eof_clients`](crate::Listener::disconnect_eof_clients).
    pub fn set_in_eof(&self) {
        self.raise_eof(INBOUND_BIT);
    }

    /// Closes both directions at once and wakes every waiter on both sides.
    pub fn disconnect(&self) {
        let previous = self.raise_eof(OUTBOUND_BIT | INBOUND_BIT);
        if previous != EofState::FullyClosed.bits() {
            debug!(peer = %self.name, "connection disconnected");
        }
        self.wake_opposite();
    }

    /// Delivers `message` into the opposite peer's inbound queue.
    pub fn send(&self, message: M) -> Result<()> {
        let Some(weak) = self.opposite.get() else {
            return Err(TransportError::NotConnected(self.name.clone()));
        };
        if self.is_out_eof() {
            return Err(TransportError::Closed(self.name.clone()));
        }
        let opposite = weak
            .upgrade()
            .ok_or_else(|| TransportError::Closed(self.name.clone()))?;

        let mut queue = opposite.inbound.lock();
        if opposite.is_in_eof() {
            return Err(TransportError::Closed(opposite.name.clone()));
        }
        queue.push_back(message);
        opposite.signal.notify_all();
        Ok(())
    }

    /// Blocks for the next inbound message.
    ///
    /// Returns `Ok(None)` at end of stream: either this side stopped
    /// receiving, or the remote stopped sending (or went away) and every
    /// message it sent has been drained. Reaching the end of stream records
    /// inbound EOF on this side.
    pub fn receive(&self) -> Result<Option<M>> {
        let Some(weak) = self.opposite.get() else {
            return Err(TransportError::NotConnected(self.name.clone()));
        };

        let mut inbound = self.inbound.lock();
        loop {
            if self.is_in_eof() {
                return Ok(None);
            }
            if let Some(message) = inbound.pop_front() {
                return Ok(Some(message));
            }
            let remote_done = weak.upgrade().map_or(true, |remote| remote.is_out_eof());
            if remote_done {
                self.eof.fetch_or(INBOUND_BIT, Ordering::AcqRel);
                self.signal.notify_all();
                trace!(peer = %self.name, "end of inbound stream");
                return Ok(None);
            }
            self.signal.wait(&mut inbound);
        }
    }

    /// Number of received messages not yet taken by [`receive`](Self::receive).
    pub fn pending_messages(&self) -> usize {
        self.inbound.lock().len()
    }

    /// Attaches higher-layer data to this peer, replacing any previous value.
    pub fn set_app_data<T: Any + Send + Sync>(&self, data: T) {
        *self.app_data.lock() = Some(Arc::new(data));
    }

    /// Returns the attached data if it is of type `T`.
    pub fn app_data<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        let data = self.app_data.lock().clone()?;
        data.downcast::<T>().ok()
    }

    pub fn clear_app_data(&self) {
        self.app_data.lock().take();
    }

    pub(crate) fn app_data_slot(&self) -> Option<Arc<dyn Any + Send + Sync>> {
        self.app_data.lock().clone()
    }

    pub(crate) fn set_app_data_slot(&self, data: Option<Arc<dyn Any + Send + Sync>>) {
        *self.app_data.lock() = data;
    }
}

impl<M> fmt::Debug for ConnectionPeer<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionPeer")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("bound", &self.is_bound())
            .field("accepted", &self.is_accepted())
            .field("eof", &self.eof_state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    fn accepted_pair() -> (Arc<ConnectionPeer<String>>, Arc<ConnectionPeer<String>>) {
        let client = ConnectionPeer::new("client");
        let server = ConnectionPeer::new("server");
        ConnectionPeer::bind(&client, &server).unwrap();
        client.mark_accepted();
        server.mark_accepted();
        (client, server)
    }

    #[test]
    fn test_eof_state_transitions() {
        assert_eq!(EofState::Open.with_outbound_eof(), EofState::HalfClosedLocal);
        assert_eq!(EofState::Open.with_inbound_eof(), EofState::HalfClosedRemote);
        assert_eq!(
            EofState::HalfClosedLocal.with_inbound_eof(),
            EofState::FullyClosed
        );
        assert_eq!(
            EofState::HalfClosedRemote.with_outbound_eof(),
            EofState::FullyClosed
        );
        assert_eq!(
            EofState::HalfClosedLocal.with_outbound_eof(),
            EofState::HalfClosedLocal
        );
        assert!(EofState::FullyClosed.is_in_eof());
        assert!(EofState::FullyClosed.is_out_eof());
        assert!(!EofState::Open.is_in_eof());
    }

    #[test]
    fn test_bind_is_symmetric_and_once() {
        let (client, server) = accepted_pair();
        assert!(Arc::ptr_eq(&client.opposite().unwrap(), &server));
        assert!(Arc::ptr_eq(&server.opposite().unwrap(), &client));
        assert!(client.is_bound_to(&server));

        let stranger = ConnectionPeer::new("stranger");
        let err = ConnectionPeer::bind(&client, &stranger).unwrap_err();
        assert_eq!(err, TransportError::AlreadyPeered("client".to_string()));
        assert!(!stranger.is_bound());
        assert!(Arc::ptr_eq(&client.opposite().unwrap(), &server));
    }

    #[test]
    fn test_mark_accepted_twice_is_noop() {
        let peer: Arc<ConnectionPeer<()>> = ConnectionPeer::new("p");
        assert!(peer.mark_accepted());
        assert!(!peer.mark_accepted());
        assert!(peer.is_accepted());
    }

    #[test]
    fn test_messages_arrive_in_order() {
        let (client, server) = accepted_pair();
        client.send("roll".to_string()).unwrap();
        client.send("build".to_string()).unwrap();
        assert_eq!(server.pending_messages(), 2);
        assert_eq!(server.receive().unwrap().as_deref(), Some("roll"));
        assert_eq!(server.receive().unwrap().as_deref(), Some("build"));
    }

    #[test]
    fn test_receive_drains_then_ends_after_remote_out_eof() {
        let (client, server) = accepted_pair();
        client.send("last words".to_string()).unwrap();
        client.set_out_eof();

        assert_eq!(server.receive().unwrap().as_deref(), Some("last words"));
        assert_eq!(server.receive().unwrap(), None);
        assert!(server.is_in_eof());
        assert!(!server.is_out_eof());
        assert_eq!(server.eof_state(), EofState::HalfClosedRemote);
    }

    #[test]
    fn test_send_after_out_eof_fails() {
        let (client, _server) = accepted_pair();
        client.set_out_eof();
        assert!(matches!(
            client.send("late".to_string()),
            Err(TransportError::Closed(_))
        ));
    }

    #[test]
    fn test_send_to_disconnected_remote_fails() {
        let (client, server) = accepted_pair();
        server.disconnect();
        assert_eq!(server.eof_state(), EofState::FullyClosed);
        assert!(matches!(
            client.send("anyone?".to_string()),
            Err(TransportError::Closed(_))
        ));
    }

    #[test]
    fn test_unbound_peer_cannot_exchange() {
        let lonely: Arc<ConnectionPeer<String>> = ConnectionPeer::new("lonely");
        assert!(matches!(
            lonely.send("hi".to_string()),
            Err(TransportError::NotConnected(_))
        ));
        assert!(matches!(lonely.receive(), Err(TransportError::NotConnected(_))));
    }

    #[test]
    fn test_dropped_remote_ends_stream() {
        let (client, server) = accepted_pair();
        drop(server);
        assert!(client.opposite().is_none());
        assert!(!client.is_connected());
        assert_eq!(client.receive().unwrap(), None);
    }

    #[test]
    fn test_disconnect_wakes_blocked_receiver() {
        let (client, server) = accepted_pair();
        let reader = {
            let server = server.clone();
            thread::spawn(move || server.receive())
        };
        thread::sleep(Duration::from_millis(50));
        client.disconnect();
        assert_eq!(reader.join().unwrap().unwrap(), None);
    }

    #[test]
    fn test_app_data_downcast() {
        #[derive(Debug, PartialEq)]
        struct Seat(u8);

        let peer: Arc<ConnectionPeer<()>> = ConnectionPeer::new("bot-1");
        assert!(peer.app_data::<Seat>().is_none());
        peer.set_app_data(Seat(3));
        assert_eq!(*peer.app_data::<Seat>().unwrap(), Seat(3));
        assert!(peer.app_data::<String>().is_none());
        peer.clear_app_data();
        assert!(peer.app_data::<Seat>().is_none());
    }

    #[test]
    fn test_set_in_eof_releases_blocked_receiver() {
        let (client, server) = accepted_pair();
        let reader = {
            let server = server.clone();
            thread::spawn(move || server.receive())
        };
        thread::sleep(Duration::from_millis(50));

        server.set_in_eof();
        assert_eq!(reader.join().unwrap().unwrap(), None);
        assert_eq!(server.eof_state(), EofState::HalfClosedRemote);
        assert!(matches!(
            client.send("too late".to_string()),
            Err(TransportError::Closed(_))
        ));
        assert_eq!(client.eof_state(), EofState::Open);
    }
}
