//! Directory of in-process listeners.
//!
//! A [`Registry`] maps listener names to [`Listener`]s and is the entry point
//! for connecting clients. It is an ordinary value: the server that owns the
//! listeners shares it (usually behind an `Arc`) with whatever needs to
//! connect, and its lifetime ends with that server or test harness.

use crate::config::{DuplicatePolicy, TransportConfig};
use crate::error::{Result, TransportError};
use crate::listener::Listener;
use crate::peer::{ConnectionPeer, EofState};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Name → listener directory plus the client-side `connect` entry point.
pub struct Registry<M> {
    listeners: DashMap<String, Arc<Listener<M>>>,
    config: TransportConfig,
    next_client: AtomicU64,
}

impl<M> Registry<M> {
    pub fn new() -> Self {
        Self::with_config(TransportConfig::default())
    }

    pub fn with_config(config: TransportConfig) -> Self {
        Self {
            listeners: DashMap::new(),
            config,
            next_client: AtomicU64::new(1),
        }
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// Registers `listener` under its own name.
    ///
    /// Under [`DuplicatePolicy::Replace`] an existing entry is replaced and
    /// returned; under [`DuplicatePolicy::Reject`] registration fails instead.
    /// Entries are never removed when a listener closes.
    pub fn register(&self, listener: Arc<Listener<M>>) -> Result<Option<Arc<Listener<M>>>> {
        let name = listener.name().to_string();
        if name.is_empty() {
            return Err(TransportError::InvalidName);
        }

        match self.config.duplicate_policy {
            DuplicatePolicy::Replace => {
                let previous = self.listeners.insert(name.clone(), listener);
                if previous.is_some() {
                    warn!(listener = %name, "replaced existing listener registration");
                }
                Ok(previous)
            }
            DuplicatePolicy::Reject => match self.listeners.entry(name) {
                Entry::Occupied(entry) => {
                    Err(TransportError::AlreadyRegistered(entry.key().clone()))
                }
                Entry::Vacant(entry) => {
                    entry.insert(listener);
                    Ok(None)
                }
            },
        }
    }

    /// Creates and registers a listener with the configured backlog capacity.
    pub fn create_listener(&self, name: impl Into<String>) -> Result<Arc<Listener<M>>> {
        self.create_listener_with_capacity(name, self.config.backlog_capacity)
    }

    pub fn create_listener_with_capacity(
        &self,
        name: impl Into<String>,
        capacity: usize,
    ) -> Result<Arc<Listener<M>>> {
        let listener = Arc::new(Listener::new(name, capacity));
        self.register(listener.clone())?;
        info!(listener = %listener.name(), capacity, "created listener");
        Ok(listener)
    }

    /// Finds the listener registered under `name`. Never blocks on the
    /// listener itself.
    pub fn lookup(&self, name: &str) -> Option<Arc<Listener<M>>> {
        self.listeners.get(name).map(|entry| entry.value().clone())
    }

    /// Removes the entry for `name`; the listener itself is left untouched.
    pub fn remove(&self, name: &str) -> Option<Arc<Listener<M>>> {
        self.listeners.remove(name).map(|(_, listener)| listener)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.listeners.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    /// Connects a new client to the listener named `name`.
    ///
    /// Blocks until the server accepts the connection or the listener shuts
    /// down. Returns the client side of the connected pair.
    pub fn connect(&self, name: &str) -> Result<Arc<ConnectionPeer<M>>> {
        let n = self.next_client.fetch_add(1, Ordering::Relaxed);
        self.connect_with(name, ConnectionPeer::new(format!("{name}#{n}")))
    }

    /// Connects an existing, unused client peer to the listener named `name`.
    pub fn connect_with(
        &self,
        name: &str,
        client: Arc<ConnectionPeer<M>>,
    ) -> Result<Arc<ConnectionPeer<M>>> {
        if name.is_empty() {
            return Err(TransportError::InvalidName);
        }
        if client.is_bound() {
            return Err(TransportError::AlreadyPeered(client.name().to_string()));
        }
        if client.eof_state() != EofState::Open {
            return Err(TransportError::Closed(client.name().to_string()));
        }

        let listener = self
            .lookup(name)
            .ok_or_else(|| TransportError::NotFound(name.to_string()))?;
        if listener.is_out_eof() {
            return Err(TransportError::Closed(name.to_string()));
        }

        debug!(listener = %name, client = %client.name(), "connecting");
        listener.connect_client(&client)?;
        Ok(client)
    }
}

impl<M> Default for Registry<M> {
    fn default() -> Self {
        Self::new()
    }
}
