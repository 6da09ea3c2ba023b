//! Server side of the hosted table.
//!
//! The accept loop runs on its own blocking thread and starts one seat
//! thread per accepted connection. Seats answer a tiny JSON protocol
//! (`sit_down`, `roll`, `leave`); game rules live elsewhere.

use local_transport::{Connection, ConnectionPeer, Listener, TransportError};
use serde_json::{json, Value};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, info, warn};

/// Per-seat data attached to the server side of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeatInfo {
    pub seat: usize,
}

/// Totals reported when the accept loop ends.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TableStats {
    pub seats_served: usize,
    pub messages_handled: usize,
}

/// Deterministic die roll for a seat and round.
pub fn roll_die(seat: usize, round: u64) -> u64 {
    (seat as u64 * 7 + round * 3) % 6 + 1
}

/// Builds the reply to one client message, or `None` if nothing is owed.
pub fn reply_to(seat: usize, message: &Value) -> Option<Value> {
    match message.get("type").and_then(Value::as_str) {
        Some("sit_down") => Some(json!({ "type": "seated", "seat": seat })),
        Some("roll") => {
            let round = message.get("round").and_then(Value::as_u64).unwrap_or(0);
            Some(json!({ "type": "rolled", "seat": seat, "round": round, "value": roll_die(seat, round) }))
        }
        Some("leave") => Some(json!({ "type": "bye", "seat": seat })),
        Some(other) => Some(json!({ "type": "error", "reason": format!("unknown message type: {other}") })),
        None => Some(json!({ "type": "error", "reason": "missing message type" })),
    }
}

/// Serves one seat until its client stops sending. Returns the number of
/// messages handled.
fn serve_seat(conn: Arc<ConnectionPeer<Value>>, seat: usize) -> usize {
    conn.set_app_data(SeatInfo { seat });
    let mut handled = 0;

    loop {
        let message = match conn.receive() {
            Ok(Some(message)) => message,
            Ok(None) => break,
            Err(e) => {
                warn!(seat, "receive failed: {}", e);
                break;
            }
        };
        handled += 1;
        debug!(seat, %message, "seat message");

        if let Some(reply) = reply_to(seat, &message) {
            if let Err(e) = Connection::send(conn.as_ref(), reply) {
                debug!(seat, "client gone before reply: {}", e);
                break;
            }
        }
    }

    info!(seat, handled, "seat closed by client");
    handled
}

/// Accepts connections until the listener shuts down.
///
/// Blocks the calling thread; run it on a dedicated or blocking thread.
pub fn run_accept_loop(listener: Arc<Listener<Value>>) -> anyhow::Result<TableStats> {
    let mut seats: Vec<JoinHandle<usize>> = Vec::new();

    loop {
        let conn = match listener.accept() {
            Ok(conn) => conn,
            Err(TransportError::Closed(_)) => break,
            Err(e) => return Err(e.into()),
        };

        let seat = seats.len() + 1;
        info!(table = %listener.name(), seat, client = %conn.name(), "seat taken");
        let handle = thread::Builder::new()
            .name(format!("seat-{seat}"))
            .spawn(move || serve_seat(conn, seat))?;
        seats.push(handle);
    }

    let mut stats = TableStats {
        seats_served: seats.len(),
        ..Default::default()
    };
    for handle in seats {
        match handle.join() {
            Ok(handled) => stats.messages_handled += handled,
            Err(_) => warn!("seat thread panicked"),
        }
    }

    info!(
        table = %listener.name(),
        seats = stats.seats_served,
        messages = stats.messages_handled,
        "accept loop finished"
    );
    Ok(stats)
}

/// Drops seats whose client has left. Returns how many were reaped.
pub fn reap_departed(listener: &Listener<Value>) -> usize {
    let reaped = listener.disconnect_eof_clients();
    for peer in &reaped {
        let seat = peer.app_data::<SeatInfo>().map(|info| info.seat);
        info!(table = %listener.name(), ?seat, "seat released");
    }
    reaped.len()
}
