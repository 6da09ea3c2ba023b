//! Bot clients attached through the in-process transport.
//!
//! Each bot runs on its own thread: it connects to the table by name, takes
//! a seat, plays a few dice rounds and leaves. Connection failures that may
//! clear up on their own (unknown table, full accept queue) are retried a
//! few times; anything else ends the bot.

use local_transport::{Registry, TransportError};
use serde_json::{json, Value};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

const CONNECT_ATTEMPTS: u32 = 5;
const RETRY_DELAY: Duration = Duration::from_millis(20);

/// What a bot saw during its session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotReport {
    pub name: String,
    pub seat: u64,
    pub rolls: Vec<u64>,
}

#[derive(Debug, thiserror::Error)]
pub enum BotError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Table closed the connection during {0}")]
    Hangup(&'static str),

    #[error("Unexpected reply during {stage}: {reply}")]
    UnexpectedReply { stage: &'static str, reply: Value },
}

fn expect_reply(
    conn: &local_transport::ConnectionPeer<Value>,
    stage: &'static str,
    expected: &str,
) -> Result<Value, BotError> {
    let reply = conn.receive()?.ok_or(BotError::Hangup(stage))?;
    if reply.get("type").and_then(Value::as_str) == Some(expected) {
        Ok(reply)
    } else {
        Err(BotError::UnexpectedReply { stage, reply })
    }
}

/// Runs one bot session to completion on the calling thread.
pub fn play(registry: &Registry<Value>, table: &str, name: &str, rounds: u32) -> Result<BotReport, BotError> {
    let mut attempt = 1;
    let conn = loop {
        match registry.connect(table) {
            Ok(conn) => break conn,
            Err(e) if e.is_retryable() && attempt < CONNECT_ATTEMPTS => {
                debug!(bot = name, attempt, "connect failed, retrying: {}", e);
                attempt += 1;
                thread::sleep(RETRY_DELAY * attempt);
            }
            Err(e) => return Err(e.into()),
        }
    };
    info!(bot = name, conn = %conn.name(), "connected");

    conn.send(json!({ "type": "sit_down", "name": name }))?;
    let seated = expect_reply(&conn, "sit_down", "seated")?;
    let seat = seated.get("seat").and_then(Value::as_u64).unwrap_or(0);

    let mut rolls = Vec::with_capacity(rounds as usize);
    for round in 0..rounds {
        conn.send(json!({ "type": "roll", "round": round }))?;
        let rolled = expect_reply(&conn, "roll", "rolled")?;
        rolls.push(rolled.get("value").and_then(Value::as_u64).unwrap_or(0));
    }

    conn.send(json!({ "type": "leave" }))?;
    expect_reply(&conn, "leave", "bye")?;
    conn.set_out_eof();

    info!(bot = name, seat, ?rolls, "left the table");
    Ok(BotReport {
        name: name.to_string(),
        seat,
        rolls,
    })
}

/// Starts `count` bot threads against `table`.
pub fn spawn_bots(
    registry: &Arc<Registry<Value>>,
    table: &str,
    count: usize,
    rounds: u32,
) -> std::io::Result<Vec<JoinHandle<Result<BotReport, BotError>>>> {
    (1..=count)
        .map(|i| {
            let registry = registry.clone();
            let table = table.to_string();
            let name = format!("bot-{i}");
            thread::Builder::new().name(name.clone()).spawn(move || {
                let result = play(&registry, &table, &name, rounds);
                if let Err(e) = &result {
                    warn!(bot = %name, "bot session failed: {}", e);
                }
                result
            })
        })
        .collect()
}

/// Reports of the bots that completed, and how many did not.
#[derive(Debug, Default)]
pub struct BotOutcome {
    pub reports: Vec<BotReport>,
    /// Sessions that ended in an error or a panicked thread.
    pub failed: usize,
}

/// Waits for every bot thread and tallies the results.
pub fn join_bots(handles: Vec<JoinHandle<Result<BotReport, BotError>>>) -> BotOutcome {
    let mut outcome = BotOutcome::default();
    for handle in handles {
        match handle.join() {
            Ok(Ok(report)) => outcome.reports.push(report),
            Ok(Err(_)) => outcome.failed += 1,
            Err(_) => {
                warn!("bot thread panicked");
                outcome.failed += 1;
            }
        }
    }
    outcome
}
