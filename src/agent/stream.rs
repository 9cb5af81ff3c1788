//! Tagged JSON parsing of the agent's stream-json protocol.
//!
//! Extends the upstream `assistant`/`user`/`result`/`system` tagged enum with
//! the fields the agent integration layer needs that a fire-and-forget
//! terminal prompt never cared about: a captured session id (from the
//! `system` init message) and cost/turn metadata on the terminal `result`.

use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub enum StreamEvent {
    #[serde(rename = "assistant")]
    Assistant {
        message: AssistantMessage,
        #[serde(default)]
        session_id: String,
    },

    #[serde(rename = "user")]
    User {
        #[serde(default)]
        tool_use_result: Option<ToolUseResult>,
    },

    #[serde(rename = "result")]
    Result {
        subtype: String,
        #[serde(default)]
        result: Option<String>,
        #[serde(default)]
        is_error: bool,
        #[serde(default)]
        duration_ms: Option<u64>,
        #[serde(default)]
        total_cost_usd: Option<f64>,
        #[serde(default)]
        num_turns: Option<u32>,
    },

    #[serde(rename = "system")]
    System {
        subtype: String,
        #[serde(default)]
        session_id: Option<String>,
    },
}

#[derive(Debug, Deserialize)]
pub struct AssistantMessage {
    #[serde(default)]
    pub content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub enum ContentBlock {
    #[serde(rename = "tool_use")]
    ToolUse {
        name: String,
        input: Value,
        #[serde(default)]
        id: String,
    },

    #[serde(rename = "text")]
    Text { text: String },
}

#[derive(Debug, Deserialize)]
pub struct ToolUseResult {
    #[serde(default)]
    pub file: Option<FileInfo>,
}

#[derive(Debug, Deserialize)]
pub struct FileInfo {
    #[serde(rename = "filePath")]
    pub file_path: String,
}

/// Name of the tool whose invocation the agent integration layer intercepts
/// and routes through the question handler (see DESIGN.md Open Questions —
/// no source material named a convention, so this one is adopted here).
pub const QUESTION_TOOL_NAME: &str = "AskHuman";

pub fn describe_tool_use(name: &str, input: &Value) -> String {
    match name {
        "Read" => format!("Reading: {}", file_path_or(input, "file")),
        "Write" => format!("Creating: {}", file_path_or(input, "file")),
        "Edit" => format!("Editing: {}", file_path_or(input, "file")),
        "Bash" => {
            let cmd = input
                .get("command")
                .and_then(|v| v.as_str())
                .map(|s| truncate_str(s, 40))
                .unwrap_or_else(|| "command".to_string());
            format!("Running: {cmd}")
        }
        "Glob" => {
            let pattern = input.get("pattern").and_then(|v| v.as_str()).unwrap_or("*");
            format!("Searching: {pattern}")
        }
        "Grep" => {
            let pattern = input
                .get("pattern")
                .and_then(|v| v.as_str())
                .map(|s| truncate_str(s, 30))
                .unwrap_or_else(|| "pattern".to_string());
            format!("Grep: {pattern}")
        }
        "Task" => {
            let desc = input
                .get("description")
                .and_then(|v| v.as_str())
                .unwrap_or("subagent");
            format!("Agent: {desc}")
        }
        QUESTION_TOOL_NAME => "Asking a question".to_string(),
        _ => name.to_string(),
    }
}

fn file_path_or(input: &Value, fallback: &str) -> String {
    input
        .get("file_path")
        .and_then(|v| v.as_str())
        .map(shorten_path)
        .unwrap_or_else(|| fallback.to_string())
}

pub fn tool_emoji(name: &str) -> &'static str {
    match name {
        "Read" => "\u{1F4D6}",
        "Write" => "\u{1F4DD}",
        "Edit" => "\u{270F}\u{FE0F}",
        "Bash" => "\u{2699}\u{FE0F}",
        "Glob" => "\u{1F50D}",
        "Grep" => "\u{1F50E}",
        "Task" => "\u{1F916}",
        QUESTION_TOOL_NAME => "\u{2753}",
        _ => "\u{1F527}",
    }
}

fn shorten_path(path: &str) -> String {
    let parts: Vec<&str> = path.split('/').collect();
    if parts.len() <= 2 {
        path.to_string()
    } else {
        parts[parts.len() - 2..].join("/")
    }
}

fn truncate_str(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        s.to_string()
    } else {
        format!("{}...", &s[..max_len - 3])
    }
}

pub fn truncate_thinking(text: &str, max_len: usize) -> String {
    let first_line = text.lines().next().unwrap_or(text);
    truncate_str(first_line.trim(), max_len)
}

/// Scan a verify step's result text for a trailing ```` ```gaps ```` fenced
/// block; one gap per non-blank line. Absence, or an empty fence, means no
/// gaps remain (see DESIGN.md Open Question: gap marker format).
pub fn extract_gaps(result_text: &str) -> Vec<String> {
    let Some(fence_start) = result_text.find("```gaps") else {
        return Vec::new();
    };
    let after_tag = &result_text[fence_start + "```gaps".len()..];
    let Some(fence_end) = after_tag.find("```") else {
        return Vec::new();
    };
    after_tag[..fence_end]
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_assistant_tool_use() {
        let json = r#"{"type":"assistant","message":{"content":[{"type":"tool_use","name":"Read","input":{"file_path":"/foo/bar.rs"},"id":"123"}]},"session_id":"abc"}"#;
        let event: StreamEvent = serde_json::from_str(json).unwrap();
        if let StreamEvent::Assistant { message, .. } = event {
            if let ContentBlock::ToolUse { name, input, .. } = &message.content[0] {
                assert_eq!(name, "Read");
                assert_eq!(input.get("file_path").unwrap().as_str().unwrap(), "/foo/bar.rs");
            } else {
                panic!("expected ToolUse");
            }
        } else {
            panic!("expected Assistant event");
        }
    }

    #[test]
    fn parses_assistant_text() {
        let json = r#"{"type":"assistant","message":{"content":[{"type":"text","text":"hello"}]},"session_id":"abc"}"#;
        let event: StreamEvent = serde_json::from_str(json).unwrap();
        if let StreamEvent::Assistant { message, .. } = event {
            if let ContentBlock::Text { text } = &message.content[0] {
                assert_eq!(text, "hello");
            } else {
                panic!("expected Text");
            }
        } else {
            panic!("expected Assistant event");
        }
    }

    #[test]
    fn parses_result_with_cost_and_turns() {
        let json = r#"{"type":"result","subtype":"success","result":"done","is_error":false,"duration_ms":1200,"total_cost_usd":0.04,"num_turns":3}"#;
        let event: StreamEvent = serde_json::from_str(json).unwrap();
        if let StreamEvent::Result {
            total_cost_usd,
            num_turns,
            ..
        } = event
        {
            assert_eq!(total_cost_usd, Some(0.04));
            assert_eq!(num_turns, Some(3));
        } else {
            panic!("expected Result event");
        }
    }

    #[test]
    fn describe_tool_use_formats_read() {
        let input = serde_json::json!({"file_path": "/Users/foo/project/src/main.rs"});
        assert_eq!(describe_tool_use("Read", &input), "Reading: src/main.rs");
    }

    #[test]
    fn extract_gaps_reads_fenced_block() {
        let text = "Verification complete.\n```gaps\nmissing error handling\nno test for edge case\n```\n";
        let gaps = extract_gaps(text);
        assert_eq!(gaps, vec!["missing error handling", "no test for edge case"]);
    }

    #[test]
    fn extract_gaps_empty_fence_means_no_gaps() {
        let text = "All good.\n```gaps\n```\n";
        assert!(extract_gaps(text).is_empty());
    }

    #[test]
    fn extract_gaps_absent_fence_means_no_gaps() {
        assert!(extract_gaps("Verification complete, no issues.").is_empty());
    }
}
