//! `intermediate_data:` progress lines -> inline `<intermediatestep>` markers

use serde::Serialize;
use serde_json::{json, Value};

pub const INTERMEDIATE_DATA_PREFIX: &str = "intermediate_data: ";
pub const STEP_OPEN_TAG: &str = "<intermediatestep>";
pub const STEP_CLOSE_TAG: &str = "</intermediatestep>";

const STEP_TYPE: &str = "system_intermediate";

/// Normalized progress event, serialized in this field order
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IntermediateStepEvent {
    pub id: Value,
    pub status: Value,
    pub error: Value,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub parent_id: Value,
    pub intermediate_parent_id: Value,
    pub content: StepContent,
    pub time_stamp: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepContent {
    pub name: Value,
    pub payload: Value,
}

impl IntermediateStepEvent {
    /// Apply defaults for every absent or empty field of a backend step
    pub fn from_payload(payload: &Value) -> Self {
        Self {
            id: field_or(payload, "id", ""),
            status: field_or(payload, "status", "in_progress"),
            error: field_or(payload, "error", ""),
            kind: STEP_TYPE,
            parent_id: field_or(payload, "parent_id", "default"),
            intermediate_parent_id: field_or(payload, "intermediate_parent_id", "default"),
            content: StepContent {
                name: field_or(payload, "name", "Step"),
                payload: field_or(payload, "payload", "No details"),
            },
            time_stamp: field_or(payload, "time_stamp", "default"),
        }
    }

    /// `<intermediatestep>{json}</intermediatestep>`
    pub fn to_marker(&self) -> Option<String> {
        let body = serde_json::to_string(self).ok()?;
        Some(format!("{}{}{}", STEP_OPEN_TAG, body, STEP_CLOSE_TAG))
    }
}

/// Absent, null, false, zero and empty-string values all take the default
fn field_or(payload: &Value, key: &str, default: &str) -> Value {
    match payload.get(key) {
        Some(value) if is_truthy(value) => value.clone(),
        _ => json!(default),
    }
}

pub(crate) fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Parse a line known to start with [`INTERMEDIATE_DATA_PREFIX`].
/// Malformed JSON yields `None`; the caller drops the line.
pub fn parse_intermediate_line(line: &str) -> Option<IntermediateStepEvent> {
    let data = line.strip_prefix(INTERMEDIATE_DATA_PREFIX)?;
    match serde_json::from_str::<Value>(data) {
        Ok(payload) => Some(IntermediateStepEvent::from_payload(&payload)),
        Err(e) => {
            tracing::debug!("Dropping malformed intermediate step: {}", e);
            None
        }
    }
}

/// Full line -> marker text ready to write to the client
pub fn encode_intermediate_line(line: &str) -> Option<String> {
    parse_intermediate_line(line)?.to_marker()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unwrap_marker(marker: &str) -> Value {
        let inner = marker
            .strip_prefix(STEP_OPEN_TAG)
            .and_then(|s| s.strip_suffix(STEP_CLOSE_TAG))
            .expect("marker tags");
        serde_json::from_str(inner).unwrap()
    }

    #[test]
    fn test_encodes_named_step() {
        let marker =
            encode_intermediate_line(r#"intermediate_data: {"id":"step1","name":"Test Step","payload":"data"}"#)
                .unwrap();
        assert!(marker.contains("<intermediatestep>"));
        assert!(marker.contains("\"Test Step\""));

        assert_eq!(
            unwrap_marker(&marker),
            json!({
                "id": "step1",
                "status": "in_progress",
                "error": "",
                "type": "system_intermediate",
                "parent_id": "default",
                "intermediate_parent_id": "default",
                "content": {"name": "Test Step", "payload": "data"},
                "time_stamp": "default"
            })
        );
    }

    #[test]
    fn test_keeps_backend_fields() {
        let line = r#"intermediate_data: {"id":"s2","status":"complete","parent_id":"p","intermediate_parent_id":"ip","name":"Search","payload":{"hits":3},"time_stamp":1712345678.5}"#;
        let event = parse_intermediate_line(line).unwrap();
        assert_eq!(event.status, json!("complete"));
        assert_eq!(event.parent_id, json!("p"));
        assert_eq!(event.intermediate_parent_id, json!("ip"));
        assert_eq!(event.content.payload, json!({"hits": 3}));
        assert_eq!(event.time_stamp, json!(1712345678.5));
    }

    #[test]
    fn test_empty_object_gets_all_defaults() {
        let event = parse_intermediate_line("intermediate_data: {}").unwrap();
        assert_eq!(event.id, json!(""));
        assert_eq!(event.content.name, json!("Step"));
        assert_eq!(event.content.payload, json!("No details"));
    }

    #[test]
    fn test_field_order_on_the_wire() {
        let marker = encode_intermediate_line(r#"intermediate_data: {"id":"a"}"#).unwrap();
        let id = marker.find("\"id\"").unwrap();
        let kind = marker.find("\"type\"").unwrap();
        let stamp = marker.find("\"time_stamp\"").unwrap();
        assert!(id < kind && kind < stamp);
    }

    #[test]
    fn test_malformed_json_is_dropped() {
        assert!(encode_intermediate_line("intermediate_data: {not json").is_none());
        assert!(encode_intermediate_line("intermediate_data: ").is_none());
        assert!(encode_intermediate_line("data: {}").is_none());
    }
}
