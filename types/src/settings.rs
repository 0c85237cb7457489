//! Validated key/value settings with change notification.
//!
//! Values are open JSON so tunables can arrive from a TOML file, an
//! environment override or a caller-supplied map without a schema change.
//! Keys with a registered validator only accept values that pass it; keys
//! without one accept anything.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde_json::{Map, Value};

use crate::emitter::{Emitter, ListenerId};

pub type Validator = Box<dyn Fn(&Value) -> bool + Send + Sync>;

/// Per-key validation outcome of one `set` call. Unvalidated keys are absent.
pub type Validations = BTreeMap<String, bool>;

/// Payload of every settings event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingsChange {
    /// Keys whose value was stored, in application order.
    pub changes: Vec<String>,
    pub validations: Validations,
}

impl SettingsChange {
    /// Keys that were rejected by their validator.
    pub fn rejected(&self) -> impl Iterator<Item = &str> {
        self.validations
            .iter()
            .filter(|(_, passed)| !**passed)
            .map(|(name, _)| name.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettingsEvent {
    /// One per changed key, emitted before [`SettingsEvent::Changed`].
    KeyChanged { name: String, change: SettingsChange },
    /// Exactly one per `set` call, even when nothing changed.
    Changed(SettingsChange),
}

#[derive(Default)]
pub struct Settings {
    values: HashMap<String, Value>,
    validators: HashMap<String, Validator>,
    events: Emitter<SettingsEvent>,
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("values", &self.values)
            .field("validators", &self.validators.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl Settings {
    /// Defaults are stored as-is, without validation.
    #[must_use]
    pub fn new(defaults: Map<String, Value>) -> Self {
        Self {
            values: defaults.into_iter().collect(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_validator(
        mut self,
        name: impl Into<String>,
        validator: impl Fn(&Value) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.validators.insert(name.into(), Box::new(validator));
        self
    }

    pub fn set(&mut self, name: impl Into<String>, value: Value) -> Validations {
        let mut values = Map::new();
        values.insert(name.into(), value);
        self.set_many(values)
    }

    /// Apply every valid entry; invalid ones are reported and skipped.
    pub fn set_many(&mut self, values: Map<String, Value>) -> Validations {
        let mut validations = Validations::new();
        let mut changes = Vec::new();

        for (name, value) in values {
            if let Some(validator) = self.validators.get(&name) {
                let passed = validator(&value);
                validations.insert(name.clone(), passed);
                if !passed {
                    continue;
                }
            }
            self.values.insert(name.clone(), value);
            changes.push(name);
        }

        let change = SettingsChange {
            changes,
            validations: validations.clone(),
        };
        for name in &change.changes {
            self.events.emit(&SettingsEvent::KeyChanged {
                name: name.clone(),
                change: change.clone(),
            });
        }
        self.events.emit(&SettingsEvent::Changed(change));

        validations
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    #[must_use]
    pub fn get_or<'a>(&'a self, name: &str, default: &'a Value) -> &'a Value {
        self.values.get(name).unwrap_or(default)
    }

    #[must_use]
    pub fn get_bool(&self, name: &str) -> Option<bool> {
        self.get(name).and_then(Value::as_bool)
    }

    #[must_use]
    pub fn get_u64(&self, name: &str) -> Option<u64> {
        self.get(name).and_then(Value::as_u64)
    }

    #[must_use]
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_str)
    }

    #[must_use]
    pub fn has(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// `false` for names without a validator.
    #[must_use]
    pub fn is_valid(&self, name: &str, value: &Value) -> bool {
        self.validators
            .get(name)
            .is_some_and(|validator| validator(value))
    }

    pub fn on(&mut self, listener: impl FnMut(&SettingsEvent) + Send + 'static) -> ListenerId {
        self.events.on(listener)
    }

    pub fn remove_listener(&mut self, id: ListenerId) -> bool {
        self.events.remove_listener(id)
    }
}

/// Common validators.
pub mod validators {
    use serde_json::Value;

    #[must_use]
    pub fn is_bool(value: &Value) -> bool {
        value.is_boolean()
    }

    /// Any finite JSON number.
    #[must_use]
    pub fn is_finite(value: &Value) -> bool {
        value.as_f64().is_some_and(f64::is_finite)
    }

    #[must_use]
    pub fn is_non_negative_integer(value: &Value) -> bool {
        value.as_u64().is_some()
    }

    #[must_use]
    pub fn is_port(value: &Value) -> bool {
        value.as_u64().is_some_and(|port| port <= u64::from(u16::MAX))
    }

    #[must_use]
    pub fn is_non_empty_string(value: &Value) -> bool {
        value.as_str().is_some_and(|s| !s.trim().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    fn port_settings() -> Settings {
        let mut defaults = Map::new();
        defaults.insert("port".to_string(), json!(30048));
        Settings::new(defaults).with_validator("port", validators::is_finite)
    }

    fn record(settings: &mut Settings) -> Arc<Mutex<Vec<SettingsEvent>>> {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        settings.on(move |event| sink.lock().unwrap().push(event.clone()));
        events
    }

    #[test]
    fn invalid_value_is_rejected() {
        let mut settings = port_settings();
        let result = settings.set("port", json!("not-a-number"));
        assert_eq!(result, Validations::from([("port".to_string(), false)]));
        assert_eq!(settings.get("port"), Some(&json!(30048)));
    }

    #[test]
    fn valid_value_is_stored_and_announced_once() {
        let mut settings = port_settings();
        let events = record(&mut settings);

        let result = settings.set_many(json!({"port": 9999}).as_object().unwrap().clone());
        assert_eq!(result, Validations::from([("port".to_string(), true)]));
        assert_eq!(settings.get_u64("port"), Some(9999));

        let events = events.lock().unwrap();
        let changed: Vec<_> = events
            .iter()
            .filter_map(|event| match event {
                SettingsEvent::Changed(change) => Some(change.changes.clone()),
                SettingsEvent::KeyChanged { .. } => None,
            })
            .collect();
        assert_eq!(changed, [vec!["port".to_string()]]);
    }

    #[test]
    fn partial_application() {
        let mut settings = port_settings().with_validator("debug", validators::is_bool);
        let result = settings.set_many(
            json!({"port": "x", "debug": true, "extra": [1]})
                .as_object()
                .unwrap()
                .clone(),
        );
        assert_eq!(result.get("port"), Some(&false));
        assert_eq!(result.get("debug"), Some(&true));
        assert!(!result.contains_key("extra"));
        assert_eq!(settings.get_bool("debug"), Some(true));
        assert!(settings.has("extra"));
        assert_eq!(settings.get_u64("port"), Some(30048));
    }

    #[test]
    fn key_events_precede_change_event() {
        let mut settings = port_settings();
        let events = record(&mut settings);
        settings.set("port", json!(1));
        settings.set("port", json!(false));

        let events = events.lock().unwrap();
        assert_eq!(events.len(), 3);
        assert!(matches!(&events[0], SettingsEvent::KeyChanged { name, .. } if name == "port"));
        assert!(matches!(&events[1], SettingsEvent::Changed(c) if c.changes == ["port"]));
        match &events[2] {
            SettingsEvent::Changed(change) => {
                assert!(change.changes.is_empty());
                assert_eq!(change.rejected().collect::<Vec<_>>(), ["port"]);
            }
            other @ SettingsEvent::KeyChanged { .. } => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn get_or_and_has() {
        let settings = port_settings();
        let fallback = json!("none");
        assert_eq!(settings.get_or("missing", &fallback), &fallback);
        assert!(settings.has("port"));
        assert!(!settings.has("missing"));
    }

    #[test]
    fn is_valid_requires_validator() {
        let settings = port_settings();
        assert!(settings.is_valid("port", &json!(1)));
        assert!(!settings.is_valid("port", &json!(null)));
        assert!(!settings.is_valid("unknown", &json!(1)));
    }

    #[test]
    fn port_validator_bounds() {
        assert!(validators::is_port(&json!(0)));
        assert!(validators::is_port(&json!(65535)));
        assert!(!validators::is_port(&json!(65536)));
        assert!(!validators::is_port(&json!(-1)));
        assert!(!validators::is_port(&json!(1.5)));
    }

    #[test]
    fn removed_listener_stops_receiving() {
        let mut settings = port_settings();
        let hits = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&hits);
        let id = settings.on(move |_| *counter.lock().unwrap() += 1);
        settings.set("port", json!(2));
        assert!(settings.remove_listener(id));
        settings.set("port", json!(3));
        assert_eq!(*hits.lock().unwrap(), 2);
    }
}
