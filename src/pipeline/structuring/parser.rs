use serde_json::Value;

use super::types::Candidate;
use super::StructuringError;

/// Parse the backend's raw text into a candidate object.
///
/// Accepts a bare JSON object, a ```json fenced block, or an object embedded in
/// surrounding prose. A blank or `null` response is `EmptyResponse`; anything
/// that is not a JSON object at the top level is `MalformedResponse`.
pub fn parse_candidate(response: &str) -> Result<Candidate, StructuringError> {
    let trimmed = response.trim();
    if trimmed.is_empty() {
        return Err(StructuringError::EmptyResponse);
    }

    // The whole reply wins over any fragment: string values may contain fences or braces.
    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        return classify(value);
    }

    let json_str = extract_json(trimmed);
    if json_str.is_empty() {
        return Err(StructuringError::EmptyResponse);
    }

    let value: Value = serde_json::from_str(json_str)
        .map_err(|e| StructuringError::MalformedResponse(format!("invalid JSON: {e}")))?;
    classify(value)
}

fn classify(value: Value) -> Result<Candidate, StructuringError> {
    match value {
        Value::Object(fields) => Ok(Candidate::new(fields)),
        Value::Null => Err(StructuringError::EmptyResponse),
        other => Err(StructuringError::MalformedResponse(format!(
            "expected a JSON object, got {}",
            json_type(&other)
        ))),
    }
}

/// Locate the JSON text inside a response that is not JSON as a whole.
fn extract_json(response: &str) -> &str {
    if let Some(start) = response.find("```") {
        let after_fence = &response[start + 3..];
        // Skip the language tag on the opening fence line.
        let body_start = after_fence.find('\n').map(|i| i + 1).unwrap_or(0);
        let body = &after_fence[body_start..];
        let body = match body.find("```") {
            Some(end) => &body[..end],
            None => body,
        };
        return body.trim();
    }

    // A broken top-level array must not be salvaged through one of its elements.
    if response.starts_with('[') {
        return response;
    }

    match (response.find('{'), response.rfind('}')) {
        (Some(start), Some(end)) if start < end => &response[start..=end],
        _ => response,
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
