//! Canonical error records built from whatever shape an upstream plugin threw.

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Longest message forwarded to the editor, in characters.
pub const MAX_MESSAGE_CHARS: usize = 2000;

/// Plugin whose errors for stdin-piped input name the real file only in the
/// first line of the message, with `file` set to `"stdin"`.
pub const SASS_STDIN_QUIRK: (&str, &str) = ("gulp-sass", "stdin");

const LOCATION_KEYS: [&str; 2] = ["loc", "location"];
const LINE_KEYS: [&str; 2] = ["line", "lineNumber"];
const COLUMN_KEYS: [&str; 3] = ["column", "col", "columnNumber"];
const FILE_KEYS: [&str; 2] = ["file", "fileName"];

/// Read-only projection of an upstream error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedError {
    pub plugin_name: String,
    /// Directory part of `file`.
    pub file_path: String,
    /// Final path component, with extension.
    pub file_name: String,
    /// Final path component, without extension.
    pub file_base_name: String,
    /// Extension including the leading dot, or empty.
    pub file_extension: String,
    /// Same as `file_extension`; older editor plugins read this name.
    pub file_ext: String,
    pub file: String,
    pub line: Option<i64>,
    pub column: Option<i64>,
    pub message: String,
}

/// Normalize `raw` into a [`NormalizedError`], using `fallback_id` as the
/// plugin name when the error does not carry one.
#[must_use]
pub fn normalize(raw: &Value, fallback_id: &str) -> NormalizedError {
    let plugin_name = raw
        .get("plugin")
        .and_then(Value::as_str)
        .filter(|name| !name.is_empty())
        .unwrap_or(fallback_id)
        .to_string();

    let full_message = message_of(raw);

    let mut file = first_str(raw, &FILE_KEYS).unwrap_or_default().to_string();
    let (quirk_plugin, quirk_file) = SASS_STDIN_QUIRK;
    if file == quirk_file && plugin_name == quirk_plugin {
        file = full_message.lines().next().unwrap_or_default().to_string();
    }

    let location = LOCATION_KEYS
        .iter()
        .find_map(|key| raw.get(*key).filter(|loc| loc.is_object()));
    let line = location
        .and_then(|loc| first_number(loc, &LINE_KEYS))
        .or_else(|| first_number(raw, &LINE_KEYS));
    let column = location
        .and_then(|loc| first_number(loc, &COLUMN_KEYS))
        .or_else(|| first_number(raw, &COLUMN_KEYS));

    let parts = PathParts::split(&file);

    NormalizedError {
        plugin_name,
        file_path: parts.dir,
        file_name: parts.name,
        file_base_name: parts.stem,
        file_ext: parts.ext.clone(),
        file_extension: parts.ext,
        file,
        line,
        column,
        message: truncate_chars(&full_message, MAX_MESSAGE_CHARS),
    }
}

fn message_of(raw: &Value) -> String {
    match raw.get("message") {
        Some(Value::String(message)) => message.clone(),
        Some(Value::Null) | None => raw.as_str().unwrap_or_default().to_string(),
        Some(other) => other.to_string(),
    }
}

fn first_str<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .find_map(|key| value.get(*key).and_then(Value::as_str))
        .filter(|s| !s.is_empty())
}

fn first_number(value: &Value, keys: &[&str]) -> Option<i64> {
    keys.iter().find_map(|key| value.get(*key).and_then(as_integer))
}

/// Integers, integral floats and numeric strings resolve; everything else is absent.
fn as_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite() && f.fract() == 0.0).map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((end, _)) => text[..end].to_string(),
        None => text.to_string(),
    }
}

/// Node-style path split: a bare file name has directory `"."`.
struct PathParts {
    dir: String,
    name: String,
    stem: String,
    ext: String,
}

impl PathParts {
    fn split(file: &str) -> Self {
        let path = Path::new(file);
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let dir = match path.parent().map(Path::to_string_lossy) {
            Some(parent) if !parent.is_empty() => parent.into_owned(),
            Some(_) | None if file.starts_with('/') => "/".to_string(),
            _ => ".".to_string(),
        };
        let (stem, ext) = match name.rfind('.') {
            Some(0) | None => (name.clone(), String::new()),
            Some(dot) => (name[..dot].to_string(), name[dot..].to_string()),
        };
        Self {
            dir,
            name,
            stem,
            ext,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn flat_fields_and_plugin() {
        let err = normalize(
            &json!({"line": 5, "col": 3, "file": "a.js", "plugin": "x"}),
            "fallback",
        );
        assert_eq!(err.line, Some(5));
        assert_eq!(err.column, Some(3));
        assert_eq!(err.file_name, "a.js");
        assert_eq!(err.plugin_name, "x");
        assert_eq!(err.file_path, ".");
        assert_eq!(err.file_base_name, "a");
        assert_eq!(err.file_extension, ".js");
    }

    #[test]
    fn location_object_wins_and_plugin_falls_back() {
        let err = normalize(
            &json!({"loc": {"line": 9, "column": 2}, "line": 1, "fileName": "b.sass"}),
            "sass-task",
        );
        assert_eq!(err.line, Some(9));
        assert_eq!(err.column, Some(2));
        assert_eq!(err.plugin_name, "sass-task");
        assert_eq!(err.file, "b.sass");
    }

    #[test]
    fn sass_stdin_reads_file_from_message() {
        let err = normalize(
            &json!({"file": "stdin", "plugin": "gulp-sass", "message": "real/path.sass:1\nerror..."}),
            "id",
        );
        assert_eq!(err.file, "real/path.sass:1");
        assert_eq!(err.file_path, "real");
    }

    #[test]
    fn stdin_from_other_plugins_is_kept() {
        let err = normalize(
            &json!({"file": "stdin", "plugin": "gulp-less", "message": "a.less\nboom"}),
            "id",
        );
        assert_eq!(err.file, "stdin");
    }

    #[test]
    fn missing_location_is_none() {
        let err = normalize(&json!({"message": "boom", "line": "n/a"}), "id");
        assert_eq!(err.line, None);
        assert_eq!(err.column, None);
    }

    #[test]
    fn numeric_strings_and_legacy_names_resolve() {
        let err = normalize(&json!({"lineNumber": "12", "columnNumber": 4.0}), "id");
        assert_eq!(err.line, Some(12));
        assert_eq!(err.column, Some(4));
    }

    #[test]
    fn message_truncated_to_prefix() {
        let long = "é".repeat(MAX_MESSAGE_CHARS + 50);
        let err = normalize(&json!({"message": long}), "id");
        assert_eq!(err.message.chars().count(), MAX_MESSAGE_CHARS);
        assert!(long.starts_with(&err.message));
    }

    #[test]
    fn absolute_path_components() {
        let err = normalize(&json!({"file": "/home/me/src/main.min.js"}), "id");
        assert_eq!(err.file_path, "/home/me/src");
        assert_eq!(err.file_name, "main.min.js");
        assert_eq!(err.file_base_name, "main.min");
        assert_eq!(err.file_extension, ".js");
    }

    #[test]
    fn dotfile_has_no_extension() {
        let err = normalize(&json!({"file": "conf/.babelrc"}), "id");
        assert_eq!(err.file_base_name, ".babelrc");
        assert_eq!(err.file_extension, "");
    }

    #[test]
    fn serializes_snake_case_fields() {
        let err = normalize(&json!({"file": "a.js", "message": "m"}), "p");
        let value = serde_json::to_value(&err).unwrap();
        assert_eq!(value["plugin_name"], "p");
        assert_eq!(value["file_base_name"], "a");
        assert_eq!(value["file_extension"], ".js");
        assert_eq!(value["file_ext"], ".js");
        assert!(value["line"].is_null());
    }
}
