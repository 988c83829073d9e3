//! Lenient JSON extraction from model replies.
//!
//! Chat models wrap JSON in markdown fences or chatter around it; the
//! planner, compiler and vision parser all go through here.

/// Strip markdown code fences and isolate the outermost JSON value.
pub fn extract_json(reply: &str) -> &str {
    let trimmed = reply.trim();

    // Fenced block: take the body between the first and last fence.
    if let Some(open) = trimmed.find("```") {
        let after = &trimmed[open + 3..];
        // Skip an optional language tag on the fence line.
        let body_start = after.find('\n').map(|i| i + 1).unwrap_or(0);
        let body = &after[body_start..];
        if let Some(close) = body.rfind("```") {
            return body[..close].trim();
        }
        return body.trim();
    }

    // Bare reply: slice from the first brace/bracket to the last.
    let open = trimmed.find(['{', '[']);
    let close = trimmed.rfind(['}', ']']);
    match (open, close) {
        (Some(a), Some(b)) if b >= a => trimmed[a..=b].trim(),
        _ => trimmed,
    }
}

/// Parse a model reply as `T`, tolerating fences and surrounding prose.
pub fn parse_reply<T: serde::de::DeserializeOwned>(reply: &str) -> anyhow::Result<T> {
    let json = extract_json(reply);
    serde_json::from_str(json)
        .map_err(|e| anyhow::anyhow!("failed to parse JSON reply: {e}; payload: {json:.200}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_json_passes_through() {
        assert_eq!(extract_json(r#"{"a":1}"#), r#"{"a":1}"#);
    }

    #[test]
    fn fenced_json_is_unwrapped() {
        let reply = "Here you go:\n```json\n{\"a\": 1}\n```\nanything else?";
        assert_eq!(extract_json(reply), "{\"a\": 1}");
    }

    #[test]
    fn prose_around_braces_is_trimmed() {
        let reply = "Sure! {\"found\": true} Hope that helps.";
        assert_eq!(extract_json(reply), "{\"found\": true}");
    }

    #[test]
    fn parse_reply_surfaces_payload_on_error() {
        let err = parse_reply::<serde_json::Value>("no json here").unwrap_err();
        assert!(err.to_string().contains("failed to parse"));
    }
}
