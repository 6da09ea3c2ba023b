//! Transport-neutral connection contract.
//!
//! Game-server code talks to clients through [`Connection`] and never needs
//! to know whether the far end is a socket or a bot thread in the same
//! process. [`ConnectionPeer`] is the in-process implementation.

use crate::error::Result;
use crate::peer::ConnectionPeer;
use std::any::Any;
use std::sync::Arc;

/// A bidirectional, message-oriented connection to one client.
pub trait Connection<M>: Send + Sync {
    /// Human-readable name for logging.
    fn name(&self) -> &str;

    /// Sends one message to the far end.
    fn send(&self, message: M) -> Result<()>;

    /// Blocks for the next message; `None` once the stream has ended.
    fn receive(&self) -> Result<Option<M>>;

    /// Whether the connection can still carry traffic.
    fn is_connected(&self) -> bool;

    /// Gracefully stops sending; the far end drains and then sees EOF.
    fn close(&self);

    /// Data attached by the protocol layer, if any.
    fn app_data(&self) -> Option<Arc<dyn Any + Send + Sync>>;

    fn set_app_data(&self, data: Option<Arc<dyn Any + Send + Sync>>);
}

impl<M: Send + 'static> Connection<M> for ConnectionPeer<M> {
    fn name(&self) -> &str {
        ConnectionPeer::name(self)
    }

    fn send(&self, message: M) -> Result<()> {
        ConnectionPeer::send(self, message)
    }

    fn receive(&self) -> Result<Option<M>> {
        ConnectionPeer::receive(self)
    }

    fn is_connected(&self) -> bool {
        ConnectionPeer::is_connected(self)
    }

    fn close(&self) {
        self.set_out_eof();
    }

    fn app_data(&self) -> Option<Arc<dyn Any + Send + Sync>> {
        self.app_data_slot()
    }

    fn set_app_data(&self, data: Option<Arc<dyn Any + Send + Sync>>) {
        self.set_app_data_slot(data);
    }
}
