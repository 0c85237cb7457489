//! Session facade — the single logical connection to the editor.
//!
//! Owns the transport exclusively and drives the
//! `Disconnected → Connecting → Connected → Disconnected` lifecycle, including
//! handshake, fixed-delay reconnection, and command dispatch.
//!
//! The session is single-owner: transport drivers and reconnect timers post
//! [`Signal`]s on one channel, and the owner applies them with [`Session::tick`]
//! or [`Session::poll_events`]. Each transport carries a generation number;
//! signals from any generation other than the live one never touch state.

use std::collections::HashMap;
use std::mem;
use std::time::Duration;

use relay_types::{
    Command, Emitter, ListenerId, SessionId, Settings, SettingsEvent, Uid, UidGenerator,
    Validations, normalize,
};
use serde_json::{Map, Value, json};
use tokio::sync::mpsc;
use tokio::time;

use crate::codec;
use crate::error::SessionError;
use crate::queue::CommandQueue;
use crate::transport::Transport;
use crate::types::{
    ConnectionState, DEFAULT_HOST, DEFAULT_MAX_RECONNECT_TRIES, DEFAULT_RECONNECT_TIMEOUT_MS,
    HANDSHAKE_NAMESPACE, SessionEvent, Signal, TransportEvent, keys, session_settings,
};

/// Channel capacity between transport/timer tasks and the session.
const SIGNAL_CHANNEL_CAPACITY: usize = 256;

pub type DisconnectCallback = Box<dyn FnOnce() + Send>;

/// Handle for one streaming reporter. Reports sent through the same handle
/// during a task are flushed as a single `report` command.
#[derive(Debug, Clone)]
pub struct Reporter {
    id: String,
    correlation_id: Uid,
}

impl Reporter {
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn correlation_id(&self) -> Uid {
        self.correlation_id
    }
}

pub struct Session {
    settings: Settings,
    events: Emitter<SessionEvent>,
    session_id: SessionId,
    state: ConnectionState,
    /// The only live transport. `None` whenever disconnected.
    transport: Option<Transport>,
    /// Generations destroyed by `disconnect` whose `Closed` has not arrived
    /// yet, with the `reconnect_after` they were retired with.
    retired: HashMap<u64, bool>,
    next_generation: u64,
    reconnect_attempts: u32,
    should_reconnect: bool,
    /// A `ReconnectDue` timer is outstanding.
    reconnect_pending: bool,
    handshake_acknowledged: bool,
    pending_disconnects: Vec<(u64, DisconnectCallback)>,
    queue: CommandQueue,
    uids: UidGenerator,
    task_initiator: Option<String>,
    signal_tx: mpsc::Sender<Signal>,
    signal_rx: mpsc::Receiver<Signal>,
}

impl Session {
    /// Build a disconnected session. Invalid options are logged and ignored.
    #[must_use]
    pub fn new(options: Map<String, Value>) -> Self {
        let mut settings = session_settings();
        settings.on(warn_on_invalid_settings);
        settings.set_many(options);

        let (signal_tx, signal_rx) = mpsc::channel(SIGNAL_CHANNEL_CAPACITY);

        Self {
            settings,
            events: Emitter::new(),
            session_id: SessionId::generate(),
            state: ConnectionState::Disconnected,
            transport: None,
            retired: HashMap::new(),
            next_generation: 0,
            reconnect_attempts: 0,
            should_reconnect: true,
            reconnect_pending: false,
            handshake_acknowledged: false,
            pending_disconnects: Vec::new(),
            queue: CommandQueue::new(),
            uids: UidGenerator::new(),
            task_initiator: None,
            signal_tx,
            signal_rx,
        }
    }

    /// Build a session and connect right away unless `deferConnect` is set.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(options: Map<String, Value>) -> Result<Self, SessionError> {
        let mut session = Self::new(options);
        if !session.settings.get_bool(keys::DEFER_CONNECT).unwrap_or(false) {
            session.connect()?;
        }
        Ok(session)
    }

    /// Apply settings at any time. New connection tunables take effect on the
    /// next connect attempt.
    pub fn configure(&mut self, options: Map<String, Value>) -> Validations {
        self.settings.set_many(options)
    }

    #[must_use]
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }

    pub fn on(&mut self, listener: impl FnMut(&SessionEvent) + Send + 'static) -> ListenerId {
        self.events.on(listener)
    }

    pub fn remove_listener(&mut self, id: ListenerId) -> bool {
        self.events.remove_listener(id)
    }

    #[must_use]
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    #[must_use]
    pub fn reconnect_attempts(&self) -> u32 {
        self.reconnect_attempts
    }

    #[must_use]
    pub fn should_reconnect(&self) -> bool {
        self.should_reconnect
    }

    /// Whether the editor answered the handshake on the current connection.
    #[must_use]
    pub fn handshake_acknowledged(&self) -> bool {
        self.handshake_acknowledged
    }

    #[must_use]
    pub fn task_initiator(&self) -> Option<&str> {
        self.task_initiator.as_deref()
    }

    // ── Lifecycle ──────────────────────────────────────────────────────

    /// Open a connection unless one is already live or in progress.
    ///
    /// Fails synchronously only on invalid configuration; network failures
    /// surface later through the close/reconnect path.
    pub fn connect(&mut self) -> Result<(), SessionError> {
        if matches!(
            self.state,
            ConnectionState::Connecting | ConnectionState::Connected
        ) {
            return Ok(());
        }

        self.events.emit(&SessionEvent::ConnectBefore);
        self.should_reconnect = true;

        // Invariant: at most one live transport.
        if let Some(stale) = self.transport.take() {
            self.retire(stale, false);
        }

        let host = self
            .settings
            .get_str(keys::HOST)
            .unwrap_or(DEFAULT_HOST)
            .to_string();
        let generation = self.next_generation + 1;
        let transport = Transport::open(
            &host,
            self.settings.get(keys::PORT),
            generation,
            self.signal_tx.clone(),
        )?;
        self.next_generation = generation;

        self.transport = Some(transport);
        self.handshake_acknowledged = false;
        self.state = ConnectionState::Connecting;
        Ok(())
    }

    /// Destroy the transport.
    ///
    /// `on_disconnect` runs exactly once, when the destroyed transport reports
    /// its close. `reconnect_after` decides whether that close triggers the
    /// automatic reconnect. Without a transport this only emits
    /// `DisconnectBefore` and records `reconnect_after`, which still decides
    /// whether an outstanding reconnect timer fires.
    pub fn disconnect(&mut self, on_disconnect: Option<DisconnectCallback>, reconnect_after: bool) {
        self.events.emit(&SessionEvent::DisconnectBefore);
        self.should_reconnect = reconnect_after;

        let Some(transport) = self.transport.take() else {
            return;
        };

        if let Some(callback) = on_disconnect {
            self.pending_disconnects
                .push((transport.generation(), callback));
        }
        self.retire(transport, reconnect_after);
        self.state = ConnectionState::Disconnected;
    }

    /// Disconnect for good: no automatic reconnect afterwards.
    pub fn shutdown(&mut self) {
        self.disconnect(None, false);
    }

    /// Process signals until every destroyed transport has reported its close.
    pub async fn wait_closed(&mut self) {
        while !self.retired.is_empty() {
            self.tick().await;
        }
    }

    fn retire(&mut self, mut transport: Transport, reconnect_after: bool) {
        self.retired.insert(transport.generation(), reconnect_after);
        transport.destroy();
    }

    fn reconnect(&mut self) {
        // One timer at a time; a second close while it is pending is not a
        // new attempt.
        if self.reconnect_pending {
            return;
        }
        self.reconnect_attempts += 1;

        let max_tries = self
            .settings
            .get_u64(keys::MAX_RECONNECT_TRIES)
            .unwrap_or(DEFAULT_MAX_RECONNECT_TRIES);
        if u64::from(self.reconnect_attempts) > max_tries {
            if self.logging_enabled() {
                tracing::warn!(
                    attempts = self.reconnect_attempts,
                    "Max reconnect tries exceeded"
                );
            }
            return;
        }

        let delay_ms = self
            .settings
            .get_u64(keys::RECONNECT_TIMEOUT_MS)
            .unwrap_or(DEFAULT_RECONNECT_TIMEOUT_MS);
        if self.logging_enabled() {
            tracing::info!(attempt = self.reconnect_attempts, delay_ms, "Scheduling reconnect");
        }
        let delay = Duration::from_millis(delay_ms);

        self.reconnect_pending = true;
        let signal_tx = self.signal_tx.clone();
        tokio::spawn(async move {
            time::sleep(delay).await;
            let _ = signal_tx.send(Signal::ReconnectDue).await;
        });
    }

    // ── Event loop ─────────────────────────────────────────────────────

    /// Wait for the next signal and apply it.
    pub async fn tick(&mut self) {
        if let Some(signal) = self.signal_rx.recv().await {
            self.handle_signal(signal);
        }
    }

    /// Apply pending signals without waiting, up to `budget`.
    pub fn poll_events(&mut self, budget: usize) -> usize {
        let mut count = 0;
        while count < budget {
            match self.signal_rx.try_recv() {
                Ok(signal) => {
                    self.handle_signal(signal);
                    count += 1;
                }
                Err(_) => break,
            }
        }
        count
    }

    fn handle_signal(&mut self, signal: Signal) {
        match signal {
            Signal::ReconnectDue => {
                self.reconnect_pending = false;
                // Cancelled by a disconnect that turned reconnecting off.
                if !self.should_reconnect {
                    return;
                }
                if let Err(e) = self.connect() {
                    tracing::warn!("Reconnect failed: {e}");
                }
            }
            Signal::Transport { generation, event } => match event {
                TransportEvent::Connected => self.handle_connected(generation),
                TransportEvent::Data(line) => self.handle_data(generation, &line),
                TransportEvent::Error(message) => self.handle_error(generation, &message),
                TransportEvent::Closed => self.handle_closed(generation),
            },
        }
    }

    fn is_live(&self, generation: u64) -> bool {
        self.transport
            .as_ref()
            .is_some_and(|transport| transport.generation() == generation)
    }

    fn handle_connected(&mut self, generation: u64) {
        let Some(transport) = self.transport.as_ref().filter(|t| t.generation() == generation)
        else {
            tracing::trace!(generation, "Ignoring connect from stale transport");
            return;
        };

        let handshake = json!({ "id": format!("{HANDSHAKE_NAMESPACE}#{}", self.session_id) });
        if let Err(e) = transport.send(&handshake) {
            tracing::warn!("Failed to send handshake: {e}");
        }

        if self.logging_enabled() {
            tracing::info!(session = %self.session_id, "Connected");
        }
        self.state = ConnectionState::Connected;
        self.reconnect_attempts = 0;
        self.events.emit(&SessionEvent::Connect);
    }

    fn handle_data(&mut self, generation: u64, line: &str) {
        if !self.is_live(generation) {
            return;
        }

        let received = match codec::decode_frame(line) {
            Ok(value) => value,
            Err(e) => {
                if self.logging_enabled() {
                    tracing::warn!("Error parsing socket data: {e}");
                }
                return;
            }
        };

        if self.logging_enabled() {
            tracing::debug!(%received, "Received");
        }
        if received.get("handshake").is_some_and(is_truthy) {
            self.handshake_acknowledged = true;
        }
        self.events.emit(&SessionEvent::Receive(received));
    }

    fn handle_error(&mut self, generation: u64, message: &str) {
        if self.logging_enabled() {
            tracing::warn!(generation, "Socket error: {message}");
        }
        if let Some(transport) = self.transport.as_mut().filter(|t| t.generation() == generation) {
            transport.destroy();
            // Nothing more can be written; `Closed` follows.
            self.state = ConnectionState::Disconnected;
        }
    }

    fn handle_closed(&mut self, generation: u64) {
        let (callbacks, remaining): (Vec<_>, Vec<_>) = mem::take(&mut self.pending_disconnects)
            .into_iter()
            .partition(|(owner, _)| *owner == generation);
        self.pending_disconnects = remaining;
        for (_, callback) in callbacks {
            callback();
        }

        let wants_reconnect = if self.is_live(generation) {
            self.transport = None;
            self.state = ConnectionState::Disconnected;
            self.should_reconnect
        } else {
            let Some(reconnect_after) = self.retired.remove(&generation) else {
                return;
            };
            // Only the newest transport may schedule a reconnect; once a later
            // one exists, its own close decides.
            reconnect_after && generation == self.next_generation && self.should_reconnect
        };

        if self.logging_enabled() {
            tracing::info!(generation, "Disconnected");
        }
        self.events.emit(&SessionEvent::Disconnect);

        let automatic = self
            .settings
            .get_bool(keys::AUTOMATIC_RECONNECT)
            .unwrap_or(true);
        if self.transport.is_none() && automatic && wants_reconnect {
            self.reconnect();
        }
    }

    // ── Commands ───────────────────────────────────────────────────────

    /// Send a command to the editor.
    ///
    /// Returns `false` and sends nothing unless connected. A string `args.id`
    /// is rewritten to `"<id>#<session id>"` so several build processes can
    /// share one editor without clobbering each other's regions.
    pub fn run(&mut self, mut command: Command) -> bool {
        self.events.emit(&SessionEvent::RunBefore(command.clone()));

        let Some(transport) = self
            .transport
            .as_ref()
            .filter(|_| self.state == ConnectionState::Connected)
        else {
            return false;
        };

        command.scope_id(|id| self.session_id.scope(id));
        if command.task_initiator().is_none() {
            command.set_task_initiator(self.task_initiator.clone());
        }

        if let Err(e) = transport.send(&command.to_value()) {
            tracing::warn!(command = command.name(), "Failed to queue command: {e}");
            return false;
        }

        self.events.emit(&SessionEvent::Run(command));
        true
    }

    pub fn set_status(&mut self, id: &str, status: &str) -> bool {
        let uid = self.uids.next_uid();
        self.run(Command::set_status(id, status, uid))
    }

    pub fn erase_status(&mut self, id: &str) -> bool {
        let uid = self.uids.next_uid();
        self.run(Command::erase_status(id, uid))
    }

    /// Hide gutters, highlighted regions and error status for `id`.
    pub fn erase_errors(&mut self, id: &str) -> Result<bool, SessionError> {
        require_id(id)?;
        let uid = self.uids.next_uid();
        Ok(self.run(Command::erase_errors(id, uid)))
    }

    /// Normalize an upstream error and show it in views of the failing file.
    pub fn show_error(&mut self, error: &Value, id: &str) -> Result<bool, SessionError> {
        require_id(id)?;
        let normalized = normalize(error, id);
        let uid = self.uids.next_uid();
        Ok(self.run(Command::show_error(id, &normalized, uid)))
    }

    /// Allocate a reporter whose reports are batched per build task.
    pub fn reporter(&mut self, id: &str) -> Result<Reporter, SessionError> {
        require_id(id)?;
        Ok(Reporter {
            id: id.to_string(),
            correlation_id: self.uids.next_uid(),
        })
    }

    /// Queue one report; it is sent when the current task stops.
    pub fn report(&mut self, reporter: &Reporter, report: Value) {
        self.queue
            .add_report(reporter.correlation_id, report, || {
                Command::report(&reporter.id, reporter.correlation_id)
            });
    }

    /// A build task started: drop stale reports, remember who triggered the
    /// task, and clear the task's previous errors.
    pub fn on_task_start(
        &mut self,
        task: &str,
        initiator: Option<String>,
    ) -> Result<(), SessionError> {
        self.queue.start_task();
        self.task_initiator = initiator;
        self.erase_errors(task)?;
        Ok(())
    }

    /// A build task stopped: flush queued reports. Returns how many commands
    /// were sent.
    pub fn on_task_stop(&mut self) -> usize {
        let mut queue = mem::take(&mut self.queue);
        let mut sent = 0;
        queue.flush(|command| {
            if self.run(command) {
                sent += 1;
            }
        });
        self.queue = queue;
        self.task_initiator = None;
        sent
    }

    #[must_use]
    pub fn queued_commands(&self) -> usize {
        self.queue.len()
    }

    fn logging_enabled(&self) -> bool {
        !self
            .settings
            .get_bool(keys::DISABLE_LOGGING)
            .unwrap_or(false)
    }
}

fn require_id(id: &str) -> Result<(), SessionError> {
    if id.trim().is_empty() {
        return Err(SessionError::InvalidArgument(
            "the id passed must be a non-empty string".to_string(),
        ));
    }
    Ok(())
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn warn_on_invalid_settings(event: &SettingsEvent) {
    let SettingsEvent::Changed(change) = event else {
        return;
    };
    let rejected: Vec<String> = change.rejected().map(|name| format!("'{name}'")).collect();
    if !rejected.is_empty() {
        tracing::warn!(
            "Invalid settings were specified for {}",
            rejected.join(", ")
        );
    }
}
