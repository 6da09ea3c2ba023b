//! In-process listening endpoint.
//!
//! A [`Listener`] behaves like a listening socket without any I/O: connecting
//! threads queue a bound peer pair on its backlog and block, and the server's
//! accept loop takes pairs off the front of the backlog, marks them accepted
//! and releases the connector.
//!
//! # Locking
//!
//! One mutex guards the backlog and the accepted-set. The listener's EOF flag
//! is only written while that mutex is held, so a pair is either accepted
//! before shutdown (and then shut down with the other accepted peers) or
//! refused by it, never both. Peer locks are only taken briefly inside the
//! listener lock and nobody blocks on a peer while holding it; connectors
//! are woken after the listener lock has been released.

use crate::error::{Result, TransportError};
use crate::peer::ConnectionPeer;
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A connector waiting in the backlog, with the server side created for it.
struct PendingPair<M> {
    client: Arc<ConnectionPeer<M>>,
    server: Arc<ConnectionPeer<M>>,
}

struct Queues<M> {
    backlog: VecDeque<PendingPair<M>>,
    accepted: Vec<Arc<ConnectionPeer<M>>>,
}

/// Named rendezvous point that in-process clients connect to.
pub struct Listener<M> {
    name: String,
    capacity: usize,
    queues: Mutex<Queues<M>>,
    /// Signalled when the backlog grows or the listener shuts down
    backlog_ready: Condvar,
    out_eof: AtomicBool,
}

impl<M> Listener<M> {
    /// Creates an open listener whose backlog holds at most `capacity`
    /// waiting connectors.
    pub fn new(name: impl Into<String>, capacity: usize) -> Self {
        Self {
            name: name.into(),
            capacity,
            queues: Mutex::new(Queues {
                backlog: VecDeque::new(),
                accepted: Vec::new(),
            }),
            backlog_ready: Condvar::new(),
            out_eof: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of connectors currently waiting to be accepted.
    pub fn pending(&self) -> usize {
        self.queues.lock().backlog.len()
    }

    /// Number of server-side peers in the accepted-set.
    pub fn accepted_count(&self) -> usize {
        self.queues.lock().accepted.len()
    }

    /// Has this listener been shut down with [`set_eof`](Self::set_eof) or
    /// [`close`](Self::close)?
    pub fn is_out_eof(&self) -> bool {
        self.out_eof.load(Ordering::Acquire)
    }

    fn closed(&self) -> TransportError {
        TransportError::Closed(self.name.clone())
    }

    /// Queues `client` and blocks until the server accepts it.
    ///
    /// On success `client` is bound to the server-side peer handed out by
    /// [`accept`](Self::accept).
    pub(crate) fn connect_client(&self, client: &Arc<ConnectionPeer<M>>) -> Result<()> {
        let server = ConnectionPeer::new(format!("{}<-{}", self.name, client.name()));

        {
            let mut queues = self.queues.lock();
            if self.is_out_eof() {
                return Err(self.closed());
            }
            if queues.backlog.len() >= self.capacity {
                debug!(listener = %self.name, client = %client.name(), "accept queue full");
                return Err(TransportError::QueueFull {
                    name: self.name.clone(),
                    capacity: self.capacity,
                });
            }
            ConnectionPeer::bind(client, &server)?;
            queues.backlog.push_back(PendingPair {
                client: client.clone(),
                server: server.clone(),
            });
            self.backlog_ready.notify_all();
        }
        debug!(listener = %self.name, client = %client.name(), "waiting to be accepted");

        if !server.wait_accepted() {
            debug!(listener = %self.name, client = %client.name(), "closed before accept");
            return Err(self.closed());
        }

        if !client.is_bound_to(&server) || !server.is_bound_to(client) {
            panic!(
                "internal error: connection {} is not linked to its server peer",
                client.name()
            );
        }
        Ok(())
    }

    /// Blocks until a connector is waiting, then accepts it.
    ///
    /// Connectors are accepted strictly in the order they were queued.
    /// Returns the server-side peer of the new connection.
    pub fn accept(&self) -> Result<Arc<ConnectionPeer<M>>> {
        if self.is_out_eof() {
            return Err(self.closed());
        }

        let mut queues = self.queues.lock();
        let pending = loop {
            if let Some(pending) = queues.backlog.pop_front() {
                break pending;
            }
            if self.is_out_eof() {
                return Err(self.closed());
            }
            self.backlog_ready.wait(&mut queues);
        };
        self.complete_accept(queues, pending)
    }

    /// Accepts the oldest waiting connector without blocking.
    ///
    /// Returns `Ok(None)` when nobody is waiting.
    pub fn try_accept(&self) -> Result<Option<Arc<ConnectionPeer<M>>>> {
        if self.is_out_eof() {
            return Err(self.closed());
        }

        let mut queues = self.queues.lock();
        match queues.backlog.pop_front() {
            Some(pending) => self.complete_accept(queues, pending).map(Some),
            None => Ok(None),
        }
    }

    fn complete_accept(
        &self,
        mut queues: MutexGuard<'_, Queues<M>>,
        pending: PendingPair<M>,
    ) -> Result<Arc<ConnectionPeer<M>>> {
        if self.is_out_eof() {
            drop(queues);
            warn!(listener = %self.name, client = %pending.client.name(), "listener closed, dropping queued connection");
            pending.server.disconnect();
            pending.client.disconnect();
            return Err(self.closed());
        }

        pending.client.mark_accepted();
        pending.server.mark_accepted();
        queues.accepted.push(pending.server.clone());
        drop(queues);

        pending.server.wake();
        debug!(listener = %self.name, client = %pending.client.name(), "accepted connection");
        Ok(pending.server)
    }

    /// Snapshot of the server-side peers of every accepted connection.
    pub fn all_accepted(&self) -> Vec<Arc<ConnectionPeer<M>>> {
        self.queues.lock().accepted.clone()
    }

    /// Drops accepted connections whose client has stopped sending.
    ///
    /// Every accepted peer with inbound EOF is removed from the
    /// accepted-set and has its outbound side closed. The owning server is
    /// expected to call this periodically. Returns the removed peers.
    pub fn disconnect_eof_clients(&self) -> Vec<Arc<ConnectionPeer<M>>> {
        let removed: Vec<_> = {
            let mut queues = self.queues.lock();
            let (removed, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut queues.accepted)
                .into_iter()
                .partition(|peer| peer.is_in_eof());
            queues.accepted = kept;
            removed
        };

        for peer in &removed {
            debug!(listener = %self.name, peer = %peer.name(), "reaping half-closed connection");
            peer.set_out_eof();
        }
        removed
    }

    /// Stops accepting and sends EOF on every accepted connection.
    ///
    /// With `force_disconnect` the accepted connections are torn down in both
    /// directions; otherwise only their outbound side is closed and inbound
    /// data may keep draining. Threads blocked in [`accept`](Self::accept)
    /// fail with `Closed`. Connectors still in the backlog stay queued until
    /// an accept call refuses them or [`close`](Self::close) runs.
    pub fn set_eof(&self, force_disconnect: bool) {
        let accepted = {
            let queues = self.queues.lock();
            self.out_eof.store(true, Ordering::Release);
            self.backlog_ready.notify_all();
            queues.accepted.clone()
        };
        info!(listener = %self.name, force_disconnect, accepted = accepted.len(), "listener at EOF");

        for peer in accepted {
            if force_disconnect {
                peer.disconnect();
            } else {
                peer.set_out_eof();
            }
        }
    }

    /// Shuts the listener down immediately.
    ///
    /// Like `set_eof(true)`, and additionally every connector still waiting
    /// in the backlog is disconnected and woken; it fails with `Closed`.
    pub fn close(&self) {
        let (accepted, refused) = {
            let mut queues = self.queues.lock();
            self.out_eof.store(true, Ordering::Release);
            self.backlog_ready.notify_all();
            let refused: Vec<_> = queues.backlog.drain(..).collect();
            (queues.accepted.clone(), refused)
        };
        info!(
            listener = %self.name,
            accepted = accepted.len(),
            refused = refused.len(),
            "listener closed"
        );

        for peer in accepted {
            peer.disconnect();
        }
        for pending in refused {
            pending.server.disconnect();
            pending.client.disconnect();
        }
    }
}

impl<M> fmt::Debug for Listener<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let queues = self.queues.lock();
        f.debug_struct("Listener")
            .field("name", &self.name)
            .field("capacity", &self.capacity)
            .field("pending", &queues.backlog.len())
            .field("accepted", &queues.accepted.len())
            .field("out_eof", &self.is_out_eof())
            .finish()
    }
}
