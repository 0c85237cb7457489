//! Outbound command envelope.
//!
//! Wire shape:
//!
//! ```text
//! {"name": "...", "data": {"args": {...}, "init_args": {...}}, "uid": 7}
//! ```
//!
//! `task_initiator` is appended only when the enclosing build task has one.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::ids::Uid;
use crate::normalize::NormalizedError;

pub const SET_STATUS: &str = "set_status";
pub const ERASE_STATUS: &str = "erase_status";
pub const ERASE_ERRORS: &str = "erase_errors";
pub const SHOW_ERROR: &str = "show_error";
pub const REPORT: &str = "report";

/// `init_args.views` value addressing every open view.
pub const ALL_VIEWS: &str = "<all>";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommandData {
    #[serde(default)]
    pub args: Map<String, Value>,
    #[serde(default)]
    pub init_args: Map<String, Value>,
}

/// A single instruction for the editor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    name: String,
    data: CommandData,
    uid: Uid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    task_initiator: Option<String>,
}

impl Command {
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        args: Map<String, Value>,
        init_args: Map<String, Value>,
        uid: Uid,
    ) -> Self {
        Self {
            name: name.into(),
            data: CommandData { args, init_args },
            uid,
            task_initiator: None,
        }
    }

    #[must_use]
    pub fn set_status(id: &str, status: &str, uid: Uid) -> Self {
        Self::new(
            SET_STATUS,
            object([("id", id.into()), ("status", status.into())]),
            all_views(),
            uid,
        )
    }

    #[must_use]
    pub fn erase_status(id: &str, uid: Uid) -> Self {
        Self::new(ERASE_STATUS, object([("id", id.into())]), all_views(), uid)
    }

    #[must_use]
    pub fn erase_errors(id: &str, uid: Uid) -> Self {
        Self::new(ERASE_ERRORS, object([("id", id.into())]), all_views(), uid)
    }

    /// `show_error` targets only views of the file that failed.
    #[must_use]
    pub fn show_error(id: &str, error: &NormalizedError, uid: Uid) -> Self {
        let views = Value::Array(vec![Value::String(error.file.clone())]);
        let error = serde_json::to_value(error).unwrap_or(Value::Null);
        Self::new(
            SHOW_ERROR,
            object([("id", id.into()), ("error", error)]),
            object([("views", views)]),
            uid,
        )
    }

    /// An empty `report` command; reports are appended with [`Command::push_report`].
    #[must_use]
    pub fn report(id: &str, uid: Uid) -> Self {
        Self::new(
            REPORT,
            object([("id", id.into()), ("reports", Value::Array(Vec::new()))]),
            Map::new(),
            uid,
        )
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn args(&self) -> &Map<String, Value> {
        &self.data.args
    }

    #[must_use]
    pub fn init_args(&self) -> &Map<String, Value> {
        &self.data.init_args
    }

    #[must_use]
    pub fn uid(&self) -> Uid {
        self.uid
    }

    #[must_use]
    pub fn task_initiator(&self) -> Option<&str> {
        self.task_initiator.as_deref()
    }

    /// The string `args.id`, if any.
    #[must_use]
    pub fn id(&self) -> Option<&str> {
        self.data.args.get("id").and_then(Value::as_str)
    }

    #[must_use]
    pub fn reports(&self) -> &[Value] {
        self.data
            .args
            .get("reports")
            .and_then(Value::as_array)
            .map_or(&[][..], Vec::as_slice)
    }

    /// Re-key under a new correlation id.
    #[must_use]
    pub fn with_uid(mut self, uid: Uid) -> Self {
        self.uid = uid;
        self
    }

    /// Append to `args.reports`, replacing any non-array value already there.
    pub fn push_report(&mut self, report: Value) {
        let reports = self
            .data
            .args
            .entry("reports")
            .or_insert_with(|| Value::Array(Vec::new()));
        match reports {
            Value::Array(items) => items.push(report),
            other => *other = Value::Array(vec![report]),
        }
    }

    /// Rewrite a string `args.id` through `scope`. Non-string ids are left alone.
    pub fn scope_id(&mut self, scope: impl FnOnce(&str) -> String) {
        if let Some(Value::String(id)) = self.data.args.get_mut("id") {
            *id = scope(id);
        }
    }

    pub fn set_task_initiator(&mut self, initiator: Option<String>) {
        self.task_initiator = initiator;
    }

    /// Serialize to a JSON value for the transport.
    #[must_use]
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

fn all_views() -> Map<String, Value> {
    object([("views", Value::String(ALL_VIEWS.to_string()))])
}

fn object<const N: usize>(entries: [(&str, Value); N]) -> Map<String, Value> {
    entries
        .into_iter()
        .map(|(key, value)| (key.to_string(), value))
        .collect()
}
