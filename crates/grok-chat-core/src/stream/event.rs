use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

/// Prefix marking an SSE data line.
pub const DATA_PREFIX: &str = "data: ";
/// Advisory end marker some servers send before closing the connection.
pub const DONE_SENTINEL: &str = "[DONE]";

/// Meaning of one framed line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProtocolEvent {
    /// Incremental content. A finish reason sent in the same frame rides
    /// along so it is not lost.
    Delta {
        text: String,
        finish_reason: Option<String>,
    },
    /// The first choice reported a completion reason without content.
    Finish { reason: String },
    /// The server embedded an error object in the still-open stream.
    Error { message: String },
    /// Comments, blank lines, the sentinel, unparseable or empty frames.
    Ignorable,
}

#[derive(Debug, Deserialize)]
struct WireFrame {
    #[serde(default)]
    error: Option<Value>,
    #[serde(default)]
    choices: Option<Vec<WireChoice>>,
}

// Scalar fields stay loosely typed so one odd value cannot discard the
// rest of the frame.
#[derive(Debug, Deserialize)]
struct WireChoice {
    #[serde(default)]
    delta: Option<WireDelta>,
    #[serde(default)]
    finish_reason: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct WireDelta {
    #[serde(default)]
    content: Option<Value>,
}

/// Classifies one line of the event stream.
///
/// Never fails: anything that does not decode into a known frame shape is
/// `Ignorable`, so one bad line cannot abort the stream.
pub fn interpret(line: &str) -> ProtocolEvent {
    let Some(payload) = line.trim().strip_prefix(DATA_PREFIX) else {
        return ProtocolEvent::Ignorable;
    };
    let payload = payload.trim();
    if payload.is_empty() {
        return ProtocolEvent::Ignorable;
    }
    if payload.eq_ignore_ascii_case(DONE_SENTINEL) {
        debug!("stream sent done sentinel");
        return ProtocolEvent::Ignorable;
    }

    let frame = match decode_frame(payload) {
        Ok(frame) => frame,
        Err(reason) => {
            debug!(%reason, payload = %truncate(payload, 120), "skipping undecodable stream frame");
            return ProtocolEvent::Ignorable;
        }
    };

    if let Some(error) = frame.error.filter(is_present) {
        return ProtocolEvent::Error {
            message: describe_error(&error),
        };
    }

    let Some(choice) = frame.choices.and_then(|choices| choices.into_iter().next()) else {
        return ProtocolEvent::Ignorable;
    };
    let finish_reason = choice.finish_reason.and_then(non_empty_string);
    let text = choice.delta.and_then(|d| d.content).and_then(non_empty_string);

    match (text, finish_reason) {
        (Some(text), finish_reason) => ProtocolEvent::Delta {
            text,
            finish_reason,
        },
        (None, Some(reason)) => ProtocolEvent::Finish { reason },
        (None, None) => ProtocolEvent::Ignorable,
    }
}

fn decode_frame(payload: &str) -> Result<WireFrame, String> {
    let value: Value = serde_json::from_str(payload).map_err(|e| e.to_string())?;
    if !value.is_object() {
        return Err("frame is not a JSON object".into());
    }
    serde_json::from_value(value).map_err(|e| e.to_string())
}

/// `null`, `false`, `0` and `""` mean "no error".
fn is_present(error: &Value) -> bool {
    match error {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn non_empty_string(value: Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s),
        _ => None,
    }
}

/// Best human-readable text for an `error` value: the value itself when it
/// is a string, its `message` field when present, otherwise the raw JSON.
pub(crate) fn describe_error(error: &Value) -> String {
    match error {
        Value::String(message) => message.clone(),
        Value::Object(fields) => fields
            .get("message")
            .and_then(Value::as_str)
            .filter(|m| !m.is_empty())
            .map(ToOwned::to_owned)
            .unwrap_or_else(|| error.to_string()),
        other => other.to_string(),
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_data_lines_are_ignorable() {
        assert_eq!(interpret(""), ProtocolEvent::Ignorable);
        assert_eq!(interpret(": keep-alive"), ProtocolEvent::Ignorable);
        assert_eq!(interpret("event: message"), ProtocolEvent::Ignorable);
        assert_eq!(interpret("data:"), ProtocolEvent::Ignorable);
    }

    #[test]
    fn done_sentinel_is_case_insensitive_and_ignorable() {
        assert_eq!(interpret("data: [DONE]"), ProtocolEvent::Ignorable);
        assert_eq!(interpret("data:  [done] "), ProtocolEvent::Ignorable);
    }

    #[test]
    fn delta_frame_yields_content() {
        let event = interpret(r#"data: {"choices":[{"delta":{"content":"Hi"}}]}"#);
        assert_eq!(
            event,
            ProtocolEvent::Delta {
                text: "Hi".into(),
                finish_reason: None
            }
        );
    }

    #[test]
    fn content_takes_priority_but_keeps_finish_reason() {
        let event = interpret(
            r#"data: {"choices":[{"delta":{"content":" world"},"finish_reason":"stop"}]}"#,
        );
        assert_eq!(
            event,
            ProtocolEvent::Delta {
                text: " world".into(),
                finish_reason: Some("stop".into())
            }
        );
    }

    #[test]
    fn finish_without_content() {
        let event = interpret(r#"data: {"choices":[{"delta":{},"finish_reason":"length"}]}"#);
        assert_eq!(
            event,
            ProtocolEvent::Finish {
                reason: "length".into()
            }
        );
    }

    #[test]
    fn empty_or_null_fields_are_ignorable() {
        assert_eq!(
            interpret(r#"data: {"choices":[{"delta":{"content":""},"finish_reason":null}]}"#),
            ProtocolEvent::Ignorable
        );
        assert_eq!(interpret(r#"data: {"choices":[]}"#), ProtocolEvent::Ignorable);
        assert_eq!(interpret(r#"data: {"choices":null}"#), ProtocolEvent::Ignorable);
        assert_eq!(interpret(r#"data: {"id":"x"}"#), ProtocolEvent::Ignorable);
    }

    #[test]
    fn malformed_or_non_object_payloads_are_ignorable() {
        assert_eq!(
            interpret(r#"data: {"choices":[{"delta":{"content":"tru"#),
            ProtocolEvent::Ignorable
        );
        assert_eq!(interpret("data: 42"), ProtocolEvent::Ignorable);
        assert_eq!(interpret(r#"data: [null, []]"#), ProtocolEvent::Ignorable);
    }

    #[test]
    fn error_frames_prefer_nested_message() {
        assert_eq!(
            interpret(r#"data: {"error":"rate limited"}"#),
            ProtocolEvent::Error {
                message: "rate limited".into()
            }
        );
        assert_eq!(
            interpret(r#"data: {"error":{"message":"overloaded","code":529}}"#),
            ProtocolEvent::Error {
                message: "overloaded".into()
            }
        );
        assert_eq!(
            interpret(r#"data: {"error":{"code":500}}"#),
            ProtocolEvent::Error {
                message: r#"{"code":500}"#.into()
            }
        );
    }

    #[test]
    fn falsy_error_values_fall_through_to_choices() {
        assert_eq!(
            interpret(r#"data: {"error":"","choices":[{"delta":{"content":"ok"}}]}"#),
            ProtocolEvent::Delta {
                text: "ok".into(),
                finish_reason: None
            }
        );
        assert_eq!(
            interpret(r#"data: {"error":false,"choices":[{"finish_reason":"stop"}]}"#),
            ProtocolEvent::Finish {
                reason: "stop".into()
            }
        );
        assert_eq!(interpret(r#"data: {"error":0}"#), ProtocolEvent::Ignorable);
        assert_eq!(interpret(r#"data: {"error":null}"#), ProtocolEvent::Ignorable);
    }

    #[test]
    fn odd_scalar_fields_do_not_discard_content() {
        assert_eq!(
            interpret(r#"data: {"choices":[{"delta":{"content":"kept"},"finish_reason":0}]}"#),
            ProtocolEvent::Delta {
                text: "kept".into(),
                finish_reason: None
            }
        );
        assert_eq!(
            interpret(r#"data: {"choices":[{"delta":{"content":7},"finish_reason":"stop"}]}"#),
            ProtocolEvent::Finish {
                reason: "stop".into()
            }
        );
    }

    #[test]
    fn error_wins_over_choices() {
        let event = interpret(
            r#"data: {"error":{"message":"bad"},"choices":[{"delta":{"content":"x"}}]}"#,
        );
        assert!(matches!(event, ProtocolEvent::Error { .. }));
    }
}
