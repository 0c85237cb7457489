//! Public types consumed by the build-tool integration.
//!
//! The integration constructs a [`Session`](crate::Session) from a settings
//! map whose keys are listed here, observes [`SessionEvent`]s, and reads
//! [`ConnectionState`].

use relay_types::settings::validators;
use relay_types::{Command, Settings};
use serde_json::{Map, Value};

/// Handshake ids take the form `"<namespace>#<session id>"`.
pub const HANDSHAKE_NAMESPACE: &str = "gulp";

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 30048;
pub const DEFAULT_MAX_RECONNECT_TRIES: u64 = 10;
pub const DEFAULT_RECONNECT_TIMEOUT_MS: u64 = 2000;

/// Setting names understood by the session.
pub mod keys {
    pub const HOST: &str = "host";
    pub const PORT: &str = "port";
    pub const MAX_RECONNECT_TRIES: &str = "maxReconnectTries";
    pub const RECONNECT_TIMEOUT_MS: &str = "reconnectTimeoutMs";
    pub const AUTOMATIC_RECONNECT: &str = "automaticReconnect";
    pub const DISABLE_LOGGING: &str = "disableLogging";
    pub const DEFER_CONNECT: &str = "deferConnect";
}

/// Settings store pre-loaded with session defaults and validators.
#[must_use]
pub fn session_settings() -> Settings {
    let mut defaults = Map::new();
    defaults.insert(keys::HOST.into(), Value::from(DEFAULT_HOST));
    defaults.insert(keys::PORT.into(), Value::from(DEFAULT_PORT));
    defaults.insert(
        keys::MAX_RECONNECT_TRIES.into(),
        Value::from(DEFAULT_MAX_RECONNECT_TRIES),
    );
    defaults.insert(
        keys::RECONNECT_TIMEOUT_MS.into(),
        Value::from(DEFAULT_RECONNECT_TIMEOUT_MS),
    );
    defaults.insert(keys::AUTOMATIC_RECONNECT.into(), Value::Bool(true));
    defaults.insert(keys::DISABLE_LOGGING.into(), Value::Bool(false));
    defaults.insert(keys::DEFER_CONNECT.into(), Value::Bool(false));

    Settings::new(defaults)
        .with_validator(keys::HOST, validators::is_non_empty_string)
        .with_validator(keys::PORT, validators::is_port)
        .with_validator(keys::MAX_RECONNECT_TRIES, validators::is_non_negative_integer)
        .with_validator(keys::RECONNECT_TIMEOUT_MS, validators::is_non_negative_integer)
        .with_validator(keys::AUTOMATIC_RECONNECT, validators::is_bool)
        .with_validator(keys::DISABLE_LOGGING, validators::is_bool)
        .with_validator(keys::DEFER_CONNECT, validators::is_bool)
}

/// Connection lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Events observable on a session.
///
/// `RunBefore` and `Run` carry snapshot copies; observers never see the
/// in-flight command.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    ConnectBefore,
    Connect,
    DisconnectBefore,
    Disconnect,
    /// Emitted for every `run` call, including ones dropped while disconnected.
    RunBefore(Command),
    /// Emitted after the command was written to the transport.
    Run(Command),
    Receive(Value),
}

/// Raw notifications from a transport's driver task.
#[derive(Debug)]
pub(crate) enum TransportEvent {
    Connected,
    Data(String),
    Error(String),
    Closed,
}

/// Everything that can wake the session's event loop.
#[derive(Debug)]
pub(crate) enum Signal {
    Transport {
        generation: u64,
        event: TransportEvent,
    },
    ReconnectDue,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn defaults_present() {
        let settings = session_settings();
        assert_eq!(settings.get_str(keys::HOST), Some("localhost"));
        assert_eq!(settings.get_u64(keys::PORT), Some(30048));
        assert_eq!(settings.get_u64(keys::MAX_RECONNECT_TRIES), Some(10));
        assert_eq!(settings.get_u64(keys::RECONNECT_TIMEOUT_MS), Some(2000));
        assert_eq!(settings.get_bool(keys::AUTOMATIC_RECONNECT), Some(true));
        assert_eq!(settings.get_bool(keys::DISABLE_LOGGING), Some(false));
        assert_eq!(settings.get_bool(keys::DEFER_CONNECT), Some(false));
    }

    #[test]
    fn validators_guard_every_key() {
        let mut settings = session_settings();
        let result = settings.set_many(
            json!({
                "host": "",
                "port": "not-a-number",
                "maxReconnectTries": -1,
                "reconnectTimeoutMs": 1.5,
                "automaticReconnect": "yes",
                "disableLogging": 0,
                "deferConnect": null
            })
            .as_object()
            .unwrap()
            .clone(),
        );
        assert!(result.values().all(|passed| !passed));
        assert_eq!(result.len(), 7);
        assert_eq!(settings.get_u64(keys::PORT), Some(30048));
    }
}
