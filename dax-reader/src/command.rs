//! Control documents addressed to a reader
//!
//! A command document lives in the `control` collection and carries:
//! - `host`: the reader it is addressed to
//! - `acknowledged`: readers that have already seen it
//! - `command`: one of `start`, `stop`, `arm`
//! - command-specific fields (`run_identifier`, `user`, `mode`, `options_override`)

use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// Run id reported while no run is active
pub const NO_RUN: &str = "none";

/// Run id used when a start command carries an unusable `run_identifier`
pub const MALFORMED_RUN: &str = "na";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("missing field '{0}'")]
    MissingField(&'static str),
    #[error("field '{field}' is not a {expected}")]
    WrongType {
        field: &'static str,
        expected: &'static str,
    },
    #[error("unknown command '{0}'")]
    Unknown(String),
}

/// Commands understood by the run-control loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Stop,
    Arm,
}

impl FromStr for Command {
    type Err = CommandError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "start" => Ok(Command::Start),
            "stop" => Ok(Command::Stop),
            "arm" => Ok(Command::Arm),
            other => Err(CommandError::Unknown(other.to_string())),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Command::Start => "start",
            Command::Stop => "stop",
            Command::Arm => "arm",
        };
        f.write_str(name)
    }
}

/// One document fetched from the control collection.
///
/// The body is kept as raw JSON; fields are extracted on demand so that a
/// malformed field only affects the operation that needs it.
#[derive(Debug, Clone)]
pub struct CommandDocument {
    pub id: String,
    pub body: Value,
}

impl CommandDocument {
    pub fn new(id: impl Into<String>, body: Value) -> Self {
        Self { id: id.into(), body }
    }

    pub fn command(&self) -> Result<Command, CommandError> {
        self.str_field("command")?.parse()
    }

    pub fn user(&self) -> Result<&str, CommandError> {
        self.str_field("user")
    }

    pub fn mode(&self) -> Result<&str, CommandError> {
        self.str_field("mode")
    }

    pub fn run_identifier(&self) -> String {
        resolve_run_identifier(self.body.get("run_identifier"))
    }

    /// The `options_override` sub-document, if present and an object
    pub fn options_override(&self) -> Option<&Map<String, Value>> {
        self.body.get("options_override").and_then(Value::as_object)
    }

    fn str_field(&self, field: &'static str) -> Result<&str, CommandError> {
        match self.body.get(field) {
            None | Some(Value::Null) => Err(CommandError::MissingField(field)),
            Some(value) => value.as_str().ok_or(CommandError::WrongType {
                field,
                expected: "string",
            }),
        }
    }
}

/// Resolve a run identifier: strings are taken as-is, integers are
/// stringified, anything else falls back to [`MALFORMED_RUN`].
pub fn resolve_run_identifier(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) if n.is_i64() || n.is_u64() => n.to_string(),
        _ => MALFORMED_RUN.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_run_identifier_resolution() {
        assert_eq!(resolve_run_identifier(Some(&json!("abc"))), "abc");
        assert_eq!(resolve_run_identifier(Some(&json!(42))), "42");
        assert_eq!(resolve_run_identifier(Some(&json!(4.5))), "na");
        assert_eq!(resolve_run_identifier(Some(&json!(["abc"]))), "na");
        assert_eq!(resolve_run_identifier(None), "na");
    }

    #[test]
    fn test_command_parsing() {
        let doc = CommandDocument::new("1", json!({"command": "arm", "mode": "bkg"}));
        assert_eq!(doc.command(), Ok(Command::Arm));
        assert_eq!(doc.mode(), Ok("bkg"));

        let doc = CommandDocument::new("2", json!({"command": "reboot"}));
        assert_eq!(doc.command(), Err(CommandError::Unknown("reboot".into())));

        let doc = CommandDocument::new("3", json!({"command": 7}));
        assert!(matches!(doc.command(), Err(CommandError::WrongType { field: "command", .. })));

        let doc = CommandDocument::new("4", json!({"host": "x"}));
        assert_eq!(doc.command(), Err(CommandError::MissingField("command")));
    }

    #[test]
    fn test_options_override_must_be_object() {
        let doc = CommandDocument::new("1", json!({"options_override": {"run_identifier": "r1"}}));
        assert_eq!(doc.options_override().unwrap()["run_identifier"], "r1");

        let doc = CommandDocument::new("2", json!({"options_override": "nope"}));
        assert!(doc.options_override().is_none());
    }
}
