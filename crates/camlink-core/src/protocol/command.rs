//! Outbound command objects.
//!
//! A [`Command`] is an immutable mapping from field name to JSON value
//! describing one requested operation. The command name travels in the
//! `cmdName` field; every other field is command-specific (`cameraId`,
//! `regions`, `outputSurfaces`, …). Commands are built once with the
//! consuming [`Command::arg`] chain and never mutated after being handed to
//! the transport.

use serde_json::{Map, Value};

/// Wire field carrying the command name.
pub const CMD_NAME_FIELD: &str = "cmdName";

/// One outbound operation request.
///
/// # Examples
///
/// ```rust
/// use camlink_core::Command;
///
/// let cmd = Command::new("open").arg("cameraId", "1");
/// assert_eq!(cmd.name(), "open");
/// let json = cmd.to_json();
/// assert_eq!(json["cmdName"], "open");
/// assert_eq!(json["cameraId"], "1");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    name: String,
    fields: Map<String, Value>,
}

impl Command {
    /// Creates a command with the given `cmdName` and no other fields.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Map::new(),
        }
    }

    /// Adds one field, consuming and returning the command.
    pub fn arg(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Adds one field only when `value` is `Some`.
    pub fn arg_opt(self, key: impl Into<String>, value: Option<impl Into<Value>>) -> Self {
        match value {
            Some(v) => self.arg(key, v),
            None => self,
        }
    }

    /// The command name (the `cmdName` field).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the value of a field, if present.
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Renders the full wire object, `cmdName` first.
    pub fn to_json(&self) -> Value {
        let mut obj = Map::with_capacity(self.fields.len() + 1);
        obj.insert(CMD_NAME_FIELD.to_string(), Value::String(self.name.clone()));
        for (k, v) in &self.fields {
            obj.insert(k.clone(), v.clone());
        }
        Value::Object(obj)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_command_carries_name_and_fields() {
        let cmd = Command::new("doCapture")
            .arg("cameraId", "0")
            .arg("captureRequests", json!([{}]));

        assert_eq!(cmd.name(), "doCapture");
        assert_eq!(cmd.field("cameraId"), Some(&json!("0")));
        assert_eq!(cmd.to_json()["cmdName"], "doCapture");
    }

    #[test]
    fn test_arg_opt_none_adds_nothing() {
        let cmd = Command::new("do3A").arg_opt("zoomRatio", None::<f64>);
        assert!(cmd.field("zoomRatio").is_none());
    }

    #[test]
    fn test_arg_opt_some_adds_field() {
        let cmd = Command::new("do3A").arg_opt("zoomRatio", Some(2.0));
        assert_eq!(cmd.field("zoomRatio"), Some(&json!(2.0)));
    }
}
