use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::registry::ToolKind;

/// One parsed tool invocation.
///
/// Serializes as `{"name": ..., "arguments": {...}}`, the shape the
/// execution endpoint and the audit log both expect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    #[serde(rename = "name", with = "kind_as_name")]
    pub kind: ToolKind,
    #[serde(default)]
    pub arguments: Map<String, Value>,
}

impl ToolCall {
    pub fn new(kind: ToolKind, arguments: Map<String, Value>) -> Self {
        Self { kind, arguments }
    }

    pub fn name(&self) -> &str {
        self.kind.name()
    }

    pub fn is_terminate(&self) -> bool {
        self.kind == ToolKind::Terminate
    }

    /// String argument by name.
    pub fn argument_str(&self, key: &str) -> Option<&str> {
        self.arguments.get(key).and_then(Value::as_str)
    }
}

mod kind_as_name {
    use serde::{Deserialize, Deserializer, Serializer};

    use super::ToolKind;

    pub fn serialize<S: Serializer>(kind: &ToolKind, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(kind.name())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<ToolKind, D::Error> {
        String::deserialize(deserializer).map(ToolKind::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wire_shape() {
        let mut args = Map::new();
        args.insert("sql".to_string(), json!("SELECT 1"));
        let call = ToolCall::new(ToolKind::Database("execute_database_sql".into()), args);

        assert_eq!(
            serde_json::to_value(&call).unwrap(),
            json!({"name": "execute_database_sql", "arguments": {"sql": "SELECT 1"}})
        );
        assert_eq!(call.argument_str("sql"), Some("SELECT 1"));
    }

    #[test]
    fn test_terminate_reads_back() {
        let call: ToolCall =
            serde_json::from_value(json!({"name": "terminate", "arguments": {}})).unwrap();
        assert!(call.is_terminate());
    }
}
