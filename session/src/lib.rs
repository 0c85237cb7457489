//! Editor session client for build-tool integrations.
//!
//! Maintains a single newline-delimited JSON connection to an editor plugin,
//! reconnects with a fixed delay, and turns build events into editor commands.

pub mod codec;
pub mod types;

pub(crate) mod queue;
pub(crate) mod transport;

mod error;
mod session;

pub use error::{SessionError, TransportError};
pub use queue::CommandQueue;
pub use session::{DisconnectCallback, Reporter, Session};
pub use transport::resolve_port;
pub use types::{
    ConnectionState, DEFAULT_HOST, DEFAULT_MAX_RECONNECT_TRIES, DEFAULT_PORT,
    DEFAULT_RECONNECT_TIMEOUT_MS, HANDSHAKE_NAMESPACE, SessionEvent, keys, session_settings,
};
