use std::fmt;

use uuid::Uuid;

/// Correlation id carried in a command's `uid` field.
///
/// Streaming reports sharing a `Uid` are merged into one outbound command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct Uid(u64);

impl Uid {
    #[must_use]
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    #[must_use]
    pub fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Monotonic [`Uid`] source owned by a single session or queue.
///
/// Two generators never share state, so separate sessions in one process
/// hand out overlapping ids without interfering.
#[derive(Debug, Default)]
pub struct UidGenerator {
    next: u64,
}

impl UidGenerator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_uid(&mut self) -> Uid {
        let id = Uid(self.next);
        self.next += 1;
        id
    }
}

/// Per-process identifier used to namespace handshake and command ids.
///
/// Always a 36-character UUID v4 string.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().hyphenated().to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `"<id>#<session>"`, the form every outbound id takes on the wire.
    #[must_use]
    pub fn scope(&self, id: &str) -> String {
        format!("{id}#{}", self.0)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
