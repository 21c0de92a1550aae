//! Event protocol spoken over the agent stream.
//!
//! Every SSE message carries a JSON object tagged by `type`:
//!
//! ```text
//! {"type":"meta","ok":true}
//! {"type":"chunk","text":"..."}
//! {"type":"error","ok":false,"error":"..."}
//! {"type":"done","ok":true,"code":0}
//! ```
//!
//! Anything else is passed through as display text, so a misbehaving server
//! can never take the controller down.

use serde_json::Value;

/// A decoded stream message.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// A line of agent output. `None` when the server omitted `text`.
    Chunk { text: Option<String> },
    /// The turn finished.
    Done,
    /// The server reported a failure for this turn.
    Error { message: Option<String> },
    /// Connection metadata; carried but not acted upon.
    Meta(Value),
    /// Valid JSON without a recognized `type`; shown as a line of text.
    Unrecognized(String),
    /// Not JSON at all; shown verbatim.
    Malformed(String),
}

/// Decodes one raw message. Never fails.
///
/// Known tags win over payload shape: a non-string `text` or `error` is
/// carried as its JSON text.
pub fn decode(raw: &str) -> StreamEvent {
    let Ok(value) = serde_json::from_str::<Value>(raw) else {
        return StreamEvent::Malformed(raw.to_string());
    };

    match value.get("type").and_then(Value::as_str) {
        Some("chunk") => StreamEvent::Chunk {
            text: field_text(&value, "text"),
        },
        Some("done") => StreamEvent::Done,
        Some("error") => StreamEvent::Error {
            message: field_text(&value, "error"),
        },
        Some("meta") => StreamEvent::Meta(value),
        _ => StreamEvent::Unrecognized(raw.to_string()),
    }
}

fn field_text(value: &Value, key: &str) -> Option<String> {
    match value.get(key)? {
        Value::Null => None,
        Value::String(text) => Some(text.clone()),
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_decode_chunk() {
        assert_eq!(
            decode(r#"{"type":"chunk","text":"hello"}"#),
            StreamEvent::Chunk {
                text: Some("hello".to_string())
            }
        );
    }

    #[test]
    fn test_decode_chunk_without_text() {
        assert_eq!(
            decode(r#"{"type":"chunk"}"#),
            StreamEvent::Chunk { text: None }
        );
        assert_eq!(
            decode(r#"{"type":"chunk","text":null}"#),
            StreamEvent::Chunk { text: None }
        );
    }

    #[test]
    fn test_decode_done_ignores_payload() {
        assert_eq!(
            decode(r#"{"type":"done","ok":true,"code":0}"#),
            StreamEvent::Done
        );
    }

    #[test]
    fn test_decode_error_message() {
        assert_eq!(
            decode(r#"{"type":"error","ok":false,"error":"local_agent.py not found"}"#),
            StreamEvent::Error {
                message: Some("local_agent.py not found".to_string())
            }
        );
        assert_eq!(
            decode(r#"{"type":"error"}"#),
            StreamEvent::Error { message: None }
        );
    }

    #[test]
    fn test_decode_meta_keeps_payload() {
        assert_eq!(
            decode(r#"{"type":"meta","ok":true}"#),
            StreamEvent::Meta(json!({"type": "meta", "ok": true}))
        );
    }

    #[test]
    fn test_non_json_is_malformed() {
        assert_eq!(
            decode("plain text"),
            StreamEvent::Malformed("plain text".to_string())
        );
        assert_eq!(
            decode(r#"{"type":"chunk""#),
            StreamEvent::Malformed(r#"{"type":"chunk""#.to_string())
        );
    }

    #[test]
    fn test_unknown_type_is_unrecognized() {
        let raw = r#"{"type":"progress","pct":40}"#;
        assert_eq!(decode(raw), StreamEvent::Unrecognized(raw.to_string()));
    }

    #[test]
    fn test_json_without_type_is_unrecognized() {
        assert_eq!(decode("42"), StreamEvent::Unrecognized("42".to_string()));
        assert_eq!(decode("{}"), StreamEvent::Unrecognized("{}".to_string()));
        assert_eq!(
            decode(r#"{"type":7}"#),
            StreamEvent::Unrecognized(r#"{"type":7}"#.to_string())
        );
    }

    #[test]
    fn test_known_type_with_non_string_payload() {
        assert_eq!(
            decode(r#"{"type":"chunk","text":5}"#),
            StreamEvent::Chunk {
                text: Some("5".to_string())
            }
        );
        assert_eq!(
            decode(r#"{"type":"error","ok":false,"error":{"code":500}}"#),
            StreamEvent::Error {
                message: Some(r#"{"code":500}"#.to_string())
            }
        );
    }

    #[test]
    fn test_type_tag_is_case_sensitive() {
        let raw = r#"{"type":"Chunk","text":"x"}"#;
        assert_eq!(decode(raw), StreamEvent::Unrecognized(raw.to_string()));
    }
}
