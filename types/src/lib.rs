//! Core domain types for relay.
//!
//! This crate contains pure domain types with no IO and no async: the command
//! envelope sent to the editor, the error normalizer, per-session ids, and the
//! validated settings store. Everything here can be used from any layer.

// Pedantic lint configuration - these are intentional design choices
#![allow(clippy::missing_errors_doc)] // Result-returning functions are self-explanatory
#![allow(clippy::missing_panics_doc)] // Panics are documented in assertions

mod command;
mod emitter;
mod ids;
mod normalize;
pub mod settings;

pub use command::{
    ALL_VIEWS, Command, CommandData, ERASE_ERRORS, ERASE_STATUS, REPORT, SET_STATUS, SHOW_ERROR,
};
pub use emitter::{Emitter, ListenerId};
pub use ids::{SessionId, Uid, UidGenerator};
pub use normalize::{MAX_MESSAGE_CHARS, NormalizedError, SASS_STDIN_QUIRK, normalize};
pub use settings::{Settings, SettingsChange, SettingsEvent, Validations, Validator};
