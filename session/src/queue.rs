//! Command queue — accumulates streamed per-file reports into one command per
//! reporter for the duration of a build task.

use relay_types::{Command, Uid};
use serde_json::Value;

#[derive(Debug, Default)]
pub struct CommandQueue {
    commands: Vec<Command>,
}

impl CommandQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Discard everything not yet flushed. Reports from an aborted task never
    /// leak into the next one.
    pub fn start_task(&mut self) {
        if !self.commands.is_empty() {
            tracing::debug!(dropped = self.commands.len(), "Discarding unflushed commands");
        }
        self.commands.clear();
    }

    /// Append `report` to the command keyed by `correlation_id`, creating it
    /// with `factory` on first use. The created command is re-keyed to
    /// `correlation_id` regardless of the uid the factory gave it.
    pub fn add_report(
        &mut self,
        correlation_id: Uid,
        report: Value,
        factory: impl FnOnce() -> Command,
    ) {
        let index = match self
            .commands
            .iter()
            .position(|command| command.uid() == correlation_id)
        {
            Some(index) => index,
            None => {
                self.commands.push(factory().with_uid(correlation_id));
                self.commands.len() - 1
            }
        };
        self.commands[index].push_report(report);
    }

    /// Hand every queued command to `sender` in enqueue order, then clear.
    pub fn flush(&mut self, mut sender: impl FnMut(Command)) {
        for command in self.commands.drain(..) {
            sender(command);
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}
