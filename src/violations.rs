use serde_json::Value;

use crate::validation::FlatErrors;

// Sole parser of the submit-handler violation payload. Lenient by contract:
// the payload comes straight from a server response, so anything that is not
// an array of `{propertyPath, message}` objects is skipped, never fatal.
pub fn translate(payload: &Value) -> FlatErrors {
    let mut result = FlatErrors::new();
    let Some(entries) = payload.as_array() else {
        return result;
    };
    for entry in entries {
        let Some(object) = entry.as_object() else {
            continue;
        };
        let (Some(path), Some(message)) = (
            object.get("propertyPath").and_then(Value::as_str),
            object.get("message").and_then(Value::as_str),
        ) else {
            continue;
        };
        result
            .entry(path.to_string())
            .or_default()
            .push(message.to_string());
    }
    result
}
