//! Build events read from stdin, one JSON object per line.
//!
//! ```text
//! {"event":"task_start","task":"sass","initiator":"src/app.scss"}
//! {"event":"error","id":"sass","error":{"file":"src/app.scss","line":3,"message":"..."}}
//! {"event":"report","reporter":"jshint","report":{"file":"a.js","errors":[]}}
//! {"event":"task_stop"}
//! ```

use std::collections::HashMap;
use std::collections::hash_map::Entry;

use relay_session::{Reporter, Session, SessionError};
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Deserialize, PartialEq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum BuildEvent {
    TaskStart {
        task: String,
        #[serde(default)]
        initiator: Option<String>,
    },
    TaskStop,
    Status {
        id: String,
        status: String,
    },
    EraseStatus {
        id: String,
    },
    Error {
        id: String,
        error: Value,
    },
    Report {
        reporter: String,
        report: Value,
    },
}

/// Forwards build events to a session, keeping one reporter per name.
#[derive(Debug, Default)]
pub struct Bridge {
    reporters: HashMap<String, Reporter>,
}

impl Bridge {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and apply one stdin line. Bad input is logged and skipped.
    pub fn handle_line(&mut self, session: &mut Session, line: &str) {
        let line = line.trim();
        if line.is_empty() {
            return;
        }

        match serde_json::from_str::<BuildEvent>(line) {
            Ok(event) => {
                if let Err(e) = self.apply(session, event) {
                    tracing::warn!("Build event rejected: {e}");
                }
            }
            Err(e) => tracing::warn!("Ignoring malformed build event: {e}"),
        }
    }

    pub fn apply(&mut self, session: &mut Session, event: BuildEvent) -> Result<(), SessionError> {
        match event {
            BuildEvent::TaskStart { task, initiator } => {
                tracing::debug!(task = %task, "Task started");
                session.on_task_start(&task, initiator)?;
            }
            BuildEvent::TaskStop => {
                let sent = session.on_task_stop();
                tracing::debug!(sent, "Task stopped");
            }
            BuildEvent::Status { id, status } => {
                session.set_status(&id, &status);
            }
            BuildEvent::EraseStatus { id } => {
                session.erase_status(&id);
            }
            BuildEvent::Error { id, error } => {
                session.show_error(&error, &id)?;
            }
            BuildEvent::Report { reporter, report } => {
                let handle = match self.reporters.entry(reporter) {
                    Entry::Occupied(entry) => entry.into_mut(),
                    Entry::Vacant(entry) => {
                        let handle = session.reporter(entry.key())?;
                        entry.insert(handle)
                    }
                };
                session.report(handle, report);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn session() -> Session {
        Session::new(
            json!({"deferConnect": true, "disableLogging": true})
                .as_object()
                .unwrap()
                .clone(),
        )
    }

    #[test]
    fn parses_every_event_kind() {
        let cases = [
            (
                r#"{"event":"task_start","task":"sass","initiator":"a.scss"}"#,
                BuildEvent::TaskStart {
                    task: "sass".into(),
                    initiator: Some("a.scss".into()),
                },
            ),
            (
                r#"{"event":"task_start","task":"sass"}"#,
                BuildEvent::TaskStart {
                    task: "sass".into(),
                    initiator: None,
                },
            ),
            (r#"{"event":"task_stop"}"#, BuildEvent::TaskStop),
            (
                r#"{"event":"status","id":"sass","status":"ok"}"#,
                BuildEvent::Status {
                    id: "sass".into(),
                    status: "ok".into(),
                },
            ),
            (
                r#"{"event":"erase_status","id":"sass"}"#,
                BuildEvent::EraseStatus { id: "sass".into() },
            ),
            (
                r#"{"event":"error","id":"sass","error":{"line":1}}"#,
                BuildEvent::Error {
                    id: "sass".into(),
                    error: json!({"line": 1}),
                },
            ),
            (
                r#"{"event":"report","reporter":"jshint","report":[1]}"#,
                BuildEvent::Report {
                    reporter: "jshint".into(),
                    report: json!([1]),
                },
            ),
        ];

        for (line, expected) in cases {
            assert_eq!(serde_json::from_str::<BuildEvent>(line).unwrap(), expected);
        }
    }

    #[test]
    fn unknown_event_is_rejected() {
        assert!(serde_json::from_str::<BuildEvent>(r#"{"event":"explode"}"#).is_err());
    }

    #[test]
    fn reports_share_one_reporter_per_name() {
        let mut session = session();
        let mut bridge = Bridge::new();

        bridge.handle_line(&mut session, r#"{"event":"report","reporter":"jshint","report":1}"#);
        bridge.handle_line(&mut session, r#"{"event":"report","reporter":"jshint","report":2}"#);
        bridge.handle_line(&mut session, r#"{"event":"report","reporter":"csslint","report":3}"#);

        assert_eq!(bridge.reporters.len(), 2);
        assert_eq!(session.queued_commands(), 2);
    }

    #[test]
    fn task_start_clears_queue_and_records_initiator() {
        let mut session = session();
        let mut bridge = Bridge::new();
        bridge.handle_line(&mut session, r#"{"event":"report","reporter":"jshint","report":1}"#);

        bridge.handle_line(
            &mut session,
            r#"{"event":"task_start","task":"lint","initiator":"a.js"}"#,
        );
        assert_eq!(session.queued_commands(), 0);
        assert_eq!(session.task_initiator(), Some("a.js"));

        bridge.handle_line(&mut session, r#"{"event":"task_stop"}"#);
        assert_eq!(session.task_initiator(), None);
    }

    #[test]
    fn blank_ids_are_reported_not_fatal() {
        let mut session = session();
        let mut bridge = Bridge::new();

        let result = bridge.apply(
            &mut session,
            BuildEvent::Error {
                id: String::new(),
                error: json!({}),
            },
        );
        assert!(matches!(result, Err(SessionError::InvalidArgument(_))));

        bridge.handle_line(&mut session, "garbage");
        bridge.handle_line(&mut session, "   ");
    }
}
