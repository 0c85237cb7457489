//! Relay CLI - forwards build events from stdin to the editor.
//!
//! ```text
//! build tool --(JSON lines on stdin)--> relay --(NDJSON over TCP)--> editor plugin
//! ```
//!
//! Session options come from `~/.relay/config.toml` (`[session]`) with
//! `RELAY_PORT` overriding the port. The process exits when stdin closes or on
//! Ctrl-C, after flushing anything already queued for the editor.

mod events;

use std::io::stderr;
use std::time::Duration;

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader, stdin};
use tokio::{signal, time};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use relay_session::Session;

use crate::events::Bridge;

/// Upper bound on waiting for the editor connection to close at exit.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    // stdout may be piped somewhere; keep logs on stderr.
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(stderr))
        .with(env_filter)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let options = relay_config::session_options();
    let mut session = Session::start(options)?;
    tracing::info!(session = %session.session_id(), "Relay started");

    let mut bridge = Bridge::new();
    let mut lines = BufReader::new(stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => match line? {
                Some(line) => bridge.handle_line(&mut session, &line),
                None => break,
            },
            () = session.tick() => {}
            result = signal::ctrl_c() => {
                if let Err(e) = result {
                    tracing::warn!("Failed to listen for Ctrl-C: {e}");
                }
                break;
            }
        }
    }

    session.shutdown();
    if time::timeout(SHUTDOWN_GRACE, session.wait_closed())
        .await
        .is_err()
    {
        tracing::warn!("Timed out waiting for the editor connection to close");
    }
    Ok(())
}
