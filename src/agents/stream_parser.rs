// Claude Code output parsing
//
// Parses the stream-json format emitted by `claude --print --output-format
// stream-json --verbose`, one JSON object per line.

use serde::Serialize;
use serde_json::Value;

/// A single parsed event from the Claude CLI output stream
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// `system/init`: carries the session ID used for `--resume`
    Init {
        session_id: Option<String>,
        model: Option<String>,
    },
    AssistantText {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    ToolResult {
        tool_id: String,
        content: String,
        is_error: bool,
    },
    /// Final line of a run
    Result {
        subtype: String,
        session_id: Option<String>,
        result_text: Option<String>,
        cost_usd: Option<f64>,
        duration_ms: Option<u64>,
        is_error: bool,
    },
    /// Valid JSON with a type we do not handle
    Unknown {
        msg_type: String,
    },
    /// Non-JSON output line
    Raw {
        text: String,
    },
}

impl StreamEvent {
    pub fn session_id(&self) -> Option<&str> {
        match self {
            StreamEvent::Init { session_id, .. } | StreamEvent::Result { session_id, .. } => {
                session_id.as_deref()
            }
            _ => None,
        }
    }
}

fn str_field(json: &Value, key: &str) -> Option<String> {
    json.get(key).and_then(|v| v.as_str()).map(String::from)
}

/// Parse one output line. A single assistant message may contain several
/// content blocks, so one line can yield several events.
pub fn parse_line(line: &str) -> Vec<StreamEvent> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }

    let json: Value = match serde_json::from_str(trimmed) {
        Ok(json) => json,
        Err(_) => {
            return vec![StreamEvent::Raw {
                text: trimmed.to_string(),
            }]
        }
    };

    let msg_type = json.get("type").and_then(|v| v.as_str()).unwrap_or("");

    match msg_type {
        "system" => {
            let subtype = json.get("subtype").and_then(|v| v.as_str()).unwrap_or("");
            if subtype == "init" {
                vec![StreamEvent::Init {
                    session_id: str_field(&json, "session_id"),
                    model: str_field(&json, "model"),
                }]
            } else {
                vec![StreamEvent::Unknown {
                    msg_type: format!("system/{}", subtype),
                }]
            }
        }
        "assistant" => parse_content_blocks(&json, parse_assistant_block),
        "user" => parse_content_blocks(&json, parse_tool_result_block),
        "result" => {
            let subtype = str_field(&json, "subtype").unwrap_or_default();
            let is_error = json
                .get("is_error")
                .and_then(|v| v.as_bool())
                .unwrap_or(subtype != "success");
            vec![StreamEvent::Result {
                session_id: str_field(&json, "session_id"),
                result_text: str_field(&json, "result"),
                cost_usd: json
                    .get("total_cost_usd")
                    .or_else(|| json.get("cost_usd"))
                    .and_then(|v| v.as_f64()),
                duration_ms: json.get("duration_ms").and_then(|v| v.as_u64()),
                is_error,
                subtype,
            }]
        }
        other => vec![StreamEvent::Unknown {
            msg_type: other.to_string(),
        }],
    }
}

fn parse_content_blocks(
    json: &Value,
    parse_block: fn(&Value) -> Option<StreamEvent>,
) -> Vec<StreamEvent> {
    json.get("message")
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_array())
        .map(|blocks| blocks.iter().filter_map(parse_block).collect())
        .unwrap_or_default()
}

fn parse_assistant_block(item: &Value) -> Option<StreamEvent> {
    match item.get("type").and_then(|t| t.as_str()) {
        Some("text") => item
            .get("text")
            .and_then(|t| t.as_str())
            .filter(|t| !t.is_empty())
            .map(|text| StreamEvent::AssistantText {
                text: text.to_string(),
            }),
        Some("tool_use") => Some(StreamEvent::ToolUse {
            id: str_field(item, "id").unwrap_or_default(),
            name: str_field(item, "name").unwrap_or_else(|| "tool".to_string()),
            input: item.get("input").cloned().unwrap_or(Value::Null),
        }),
        _ => None,
    }
}

fn parse_tool_result_block(item: &Value) -> Option<StreamEvent> {
    if item.get("type").and_then(|t| t.as_str()) != Some("tool_result") {
        return None;
    }

    Some(StreamEvent::ToolResult {
        tool_id: str_field(item, "tool_use_id").unwrap_or_default(),
        content: tool_result_content(item.get("content")),
        is_error: item
            .get("is_error")
            .and_then(|e| e.as_bool())
            .unwrap_or(false),
    })
}

/// Tool result content is either a plain string or a list of text blocks
fn tool_result_content(content: Option<&Value>) -> String {
    match content {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(parts)) => parts
            .iter()
            .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
            .collect::<Vec<_>>()
            .join("\n"),
        Some(other) => other.to_string(),
        None => String::new(),
    }
}

/// Concatenate the assistant text of a run. Falls back to the final result
/// text when the run produced no assistant text blocks.
pub fn collect_text(events: &[StreamEvent]) -> String {
    let texts: Vec<&str> = events
        .iter()
        .filter_map(|e| match e {
            StreamEvent::AssistantText { text } => Some(text.as_str()),
            _ => None,
        })
        .collect();

    if !texts.is_empty() {
        return texts.join("\n");
    }

    events
        .iter()
        .rev()
        .find_map(|e| match e {
            StreamEvent::Result {
                result_text: Some(text),
                ..
            } => Some(text.clone()),
            _ => None,
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_init() {
        let events = parse_line(
            r#"{"type":"system","subtype":"init","session_id":"abc-123","model":"claude-sonnet-4-5","tools":[]}"#,
        );
        assert_eq!(
            events,
            vec![StreamEvent::Init {
                session_id: Some("abc-123".to_string()),
                model: Some("claude-sonnet-4-5".to_string()),
            }]
        );
        assert_eq!(events[0].session_id(), Some("abc-123"));
    }

    #[test]
    fn test_parse_assistant_with_text_and_tool() {
        let events = parse_line(
            r#"{"type":"assistant","message":{"content":[{"type":"text","text":"Reading file"},{"type":"tool_use","id":"toolu_1","name":"Read","input":{"file_path":"src/main.rs"}}]}}"#,
        );
        assert_eq!(events.len(), 2);
        assert_eq!(
            events[0],
            StreamEvent::AssistantText {
                text: "Reading file".to_string()
            }
        );
        match &events[1] {
            StreamEvent::ToolUse { id, name, input } => {
                assert_eq!(id, "toolu_1");
                assert_eq!(name, "Read");
                assert_eq!(input["file_path"], "src/main.rs");
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_parse_tool_result_array_content() {
        let events = parse_line(
            r#"{"type":"user","message":{"content":[{"type":"tool_result","tool_use_id":"toolu_1","content":[{"type":"text","text":"line 1"},{"type":"text","text":"line 2"}],"is_error":true}]}}"#,
        );
        assert_eq!(
            events,
            vec![StreamEvent::ToolResult {
                tool_id: "toolu_1".to_string(),
                content: "line 1\nline 2".to_string(),
                is_error: true,
            }]
        );
    }

    #[test]
    fn test_parse_result() {
        let events = parse_line(
            r#"{"type":"result","subtype":"success","is_error":false,"duration_ms":4200,"total_cost_usd":0.0123,"result":"All done","session_id":"abc-123"}"#,
        );
        match &events[0] {
            StreamEvent::Result {
                subtype,
                cost_usd,
                duration_ms,
                is_error,
                result_text,
                ..
            } => {
                assert_eq!(subtype, "success");
                assert_eq!(*cost_usd, Some(0.0123));
                assert_eq!(*duration_ms, Some(4200));
                assert!(!is_error);
                assert_eq!(result_text.as_deref(), Some("All done"));
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_non_json_and_blank_lines() {
        assert!(parse_line("   ").is_empty());
        assert_eq!(
            parse_line("Warning: something"),
            vec![StreamEvent::Raw {
                text: "Warning: something".to_string()
            }]
        );
        assert_eq!(
            parse_line(r#"{"type":"stream_event"}"#),
            vec![StreamEvent::Unknown {
                msg_type: "stream_event".to_string()
            }]
        );
    }

    #[test]
    fn test_collect_text() {
        let events = vec![
            StreamEvent::AssistantText {
                text: "first".to_string(),
            },
            StreamEvent::ToolUse {
                id: "t".to_string(),
                name: "Bash".to_string(),
                input: Value::Null,
            },
            StreamEvent::AssistantText {
                text: "second".to_string(),
            },
        ];
        assert_eq!(collect_text(&events), "first\nsecond");

        let only_result = vec![StreamEvent::Result {
            subtype: "success".to_string(),
            session_id: None,
            result_text: Some("final".to_string()),
            cost_usd: None,
            duration_ms: None,
            is_error: false,
        }];
        assert_eq!(collect_text(&only_result), "final");
    }
}
