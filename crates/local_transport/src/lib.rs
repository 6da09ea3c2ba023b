//! # Local Transport - In-Process Connections for the Game Server
//!
//! Bots and test clients that live in the same process as the game server
//! attach to it through this crate instead of opening real sockets. The
//! server sees the same accept/connect/half-close behaviour it would get from
//! a listening socket, including a bounded accept queue and blocking
//! handshakes.
//!
//! ## Architecture Overview
//!
//! * **Registry** - Directory from listener name to [`Listener`]; the entry
//!   point for connecting clients
//! * **Listener** - Bounded FIFO backlog of waiting connectors plus the set
//!   of accepted connections
//! * **ConnectionPeer** - One end of a bound pair, carrying opaque messages
//!   of type `M` to its opposite
//! * **Connection** - Transport-neutral trait the server codes against
//!
//! ### Handshake
//!
//! 1. A client thread calls [`Registry::connect`] with a listener name
//! 2. A server-side peer is created, bound to the client, and the pair is
//!    queued on the listener's backlog; the client thread blocks
//! 3. The server thread calls [`Listener::accept`], which takes the oldest
//!    pair, marks it accepted and wakes the client
//! 4. Each thread now holds its end of the connected pair
//!
//! ```rust
//! use local_transport::Registry;
//! use std::sync::Arc;
//! use std::thread;
//!
//! let registry: Arc<Registry<String>> = Arc::new(Registry::new());
//! let listener = registry.create_listener("table-1").unwrap();
//!
//! let bot = {
//!     let registry = registry.clone();
//!     thread::spawn(move || {
//!         let conn = registry.connect("table-1").unwrap();
//!         conn.send("sit down".to_string()).unwrap();
//!         conn.set_out_eof();
//!     })
//! };
//!
//! let server_side = listener.accept().unwrap();
//! assert_eq!(server_side.receive().unwrap().as_deref(), Some("sit down"));
//! bot.join().unwrap();
//! ```
//!
//! ## Shutdown
//!
//! [`Listener::set_eof`] stops accepting and half-closes every accepted
//! connection; [`Listener::close`] also tears down accepted connections and
//! refuses every connector still waiting in the backlog. Connections whose
//! client has stopped sending are reaped with
//! [`Listener::disconnect_eof_clients`], which the server calls on its own
//! schedule.
//!
//! ## Error Handling
//!
//! Every operation reports failures synchronously as a [`TransportError`]
//! naming the precise cause (unknown listener, full queue, closed, already
//! peered). There are no timeouts; callers that need one wrap the blocking
//! calls themselves.

pub use config::{DuplicatePolicy, TransportConfig, DEFAULT_BACKLOG_CAPACITY};
pub use connection::Connection;
pub use error::{Result, TransportError};
pub use listener::Listener;
pub use peer::{ConnectionPeer, EofState, PeerId};
pub use registry::Registry;

pub mod config;
pub mod connection;
pub mod error;
pub mod listener;
pub mod peer;
pub mod registry;
