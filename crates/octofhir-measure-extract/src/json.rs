//! Recovery of JSON payloads from oracle responses
//!
//! Responses often wrap the object in a markdown fence or surround it with
//! prose. The first balanced top-level object is taken, honouring string
//! literals and escapes so braces inside descriptions do not end it early.

use octofhir_measure_diagnostics::{ErrorCode, MeasureError};
use serde::de::DeserializeOwned;

/// Locate the JSON object inside a response
pub fn extract_json(response: &str) -> Option<&str> {
    let trimmed = strip_fence(response.trim());
    if trimmed.starts_with('{') && serde_json::from_str::<serde_json::Value>(trimmed).is_ok() {
        return Some(trimmed);
    }
    let start = trimmed.find('{')?;
    let end = balanced_end(&trimmed[start..])?;
    Some(&trimmed[start..start + end])
}

/// Decode a response into `T`, failing with a parse error carrying `code`
pub fn parse_response<T: DeserializeOwned>(response: &str, code: ErrorCode) -> Result<T, MeasureError> {
    let Some(json) = extract_json(response) else {
        return Err(MeasureError::parse(code, "response contains no JSON object", response));
    };
    serde_json::from_str(json).map_err(|e| MeasureError::parse(code, format!("response JSON is malformed: {e}"), response))
}

fn strip_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // Skip the info string ("json", "JSON", ...)
    let body = rest.split_once('\n').map_or("", |(_, body)| body);
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

/// Byte length of the balanced object starting at `text[0] == '{'`
fn balanced_end(text: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, c) in text.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            _ => {}
        }
    }
    None
}
