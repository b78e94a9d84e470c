/*!
Builders for control documents

Produces documents shaped like the ones an operator console writes into
the `control` collection.
*/

use serde_json::{json, Map, Value};

#[derive(Debug, Clone)]
pub struct CommandBuilder {
    body: Map<String, Value>,
}

impl CommandBuilder {
    pub fn new(command: &str) -> Self {
        let mut body = Map::new();
        body.insert("command".into(), json!(command));
        body.insert("user".into(), json!("tester"));
        Self { body }
    }

    pub fn arm(mode: &str) -> Self {
        Self::new("arm").field("mode", json!(mode))
    }

    pub fn start(run_identifier: impl Into<Value>) -> Self {
        Self::new("start").field("run_identifier", run_identifier.into())
    }

    pub fn stop() -> Self {
        Self::new("stop")
    }

    /// A document with no `command` field at all
    pub fn malformed() -> Self {
        Self::new("").without("command")
    }

    pub fn user(self, user: &str) -> Self {
        self.field("user", json!(user))
    }

    pub fn options_override(self, overrides: Value) -> Self {
        self.field("options_override", overrides)
    }

    pub fn field(mut self, key: &str, value: Value) -> Self {
        self.body.insert(key.to_string(), value);
        self
    }

    pub fn without(mut self, key: &str) -> Self {
        self.body.remove(key);
        self
    }

    /// Address the document to `host`
    pub fn build_for(self, host: &str) -> Value {
        let mut body = self.body;
        body.insert("host".into(), json!(host));
        body.insert("acknowledged".into(), json!([]));
        Value::Object(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builders() {
        let arm = CommandBuilder::arm("bkg")
            .options_override(json!({"run_identifier": "r7"}))
            .build_for("h");
        assert_eq!(arm["command"], "arm");
        assert_eq!(arm["mode"], "bkg");
        assert_eq!(arm["host"], "h");
        assert_eq!(arm["options_override"]["run_identifier"], "r7");
        assert_eq!(arm["acknowledged"], json!([]));

        let start = CommandBuilder::start(42).user("shifter").build_for("h");
        assert_eq!(start["run_identifier"], 42);
        assert_eq!(start["user"], "shifter");

        let bad = CommandBuilder::malformed().build_for("h");
        assert!(bad.get("command").is_none());
    }
}
