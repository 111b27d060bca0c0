//! Output interpreter - turns raw CLI output into a normalized result
//!
//! CLI tools interleave real responses with banners, progress chatter, and
//! printable errors, and can exit 0 while doing so. Interpretation therefore
//! runs three stages in order: strip known noise, classify known error
//! signatures, then (for tools with a machine-readable mode) parse the
//! newline-delimited JSON event stream into text and tool calls.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tracing::debug;

use crate::{error::ProviderError, models::ToolCall};

/// Normalized interpretation of raw process output
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Interpreted {
    /// Extracted response text
    pub content: String,
    /// Native tool invocations found in the stream
    pub tool_calls: Vec<ToolCall>,
}

/// Non-response preambles emitted by CLI tools before the actual answer
static NOISE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)^(applying|running|pending) (database )?migrations?\b",
        r"(?i)^migration \S+ (applied|complete)",
        r"(?i)^checking for updates",
        r"(?i)^a new version .+ is available",
        r"(?i)^(starting|initializing|loading|warming up) .*\.\.\.\s*$",
        r"^\s*\[\d+/\d+\]",
        r"^\d{1,3}% ",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("noise pattern"))
    .collect()
});

/// Whole-account resource exhaustion signals
static CREDIT_PATTERNS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)(credit balance is too low|insufficient credits|out of credits|quota (exceeded|exhausted)|billing hard limit)",
    )
    .expect("credit pattern")
});

/// Authentication failures printed to stdout
static AUTH_PATTERNS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)(not (currently )?logged in|please (log|sign) in|invalid api key|authentication (failed|error)|\b401 unauthorized\b|\b403 forbidden\b)",
    )
    .expect("auth pattern")
});

/// Connection-level failures
static NETWORK_PATTERNS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(connection refused|econnrefused|connection reset|network is unreachable|getaddrinfo)")
        .expect("network pattern")
});

/// Stack traces and error JSON that indicate the tool crashed internally
static FAILURE_PATTERNS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?m)(Traceback \(most recent call last\)|panicked at |^\s+at .+ \(.+:\d+:\d+\)$|^\s*\{"error")"#,
    )
    .expect("failure pattern")
});

/// Interpret raw output from a zero-exit process
pub fn interpret(raw: &str) -> Result<Interpreted, ProviderError> {
    let stripped = strip_noise(raw)?;
    classify_errors(&stripped)?;

    if looks_like_event_stream(&stripped) {
        return Ok(parse_event_stream(&stripped));
    }

    Ok(Interpreted {
        content: stripped,
        tool_calls: Vec::new(),
    })
}

/// Remove known non-response lines; all-noise output is a failure
pub fn strip_noise(raw: &str) -> Result<String, ProviderError> {
    let kept: Vec<&str> = raw
        .lines()
        .filter(|line| !NOISE_PATTERNS.iter().any(|p| p.is_match(line)))
        .collect();

    let cleaned = kept.join("\n").trim().to_string();
    if cleaned.is_empty() && !raw.trim().is_empty() {
        return Err(ProviderError::ExecutionFailed(
            "output was only noise".to_string(),
        ));
    }
    if cleaned.is_empty() {
        return Err(ProviderError::EmptyResponse);
    }
    Ok(cleaned)
}

/// Scan cleaned output for known error signatures
///
/// A CLI tool can print a readable error and still exit 0, so this runs on
/// every successful exit, not just nonzero ones.
pub fn classify_errors(text: &str) -> Result<(), ProviderError> {
    if let Some(m) = CREDIT_PATTERNS.find(text) {
        return Err(ProviderError::CreditsExhausted(m.as_str().to_string()));
    }
    if let Some(m) = AUTH_PATTERNS.find(text) {
        return Err(ProviderError::Auth(m.as_str().to_string()));
    }
    if let Some(m) = NETWORK_PATTERNS.find(text) {
        return Err(ProviderError::Network(m.as_str().to_string()));
    }
    if FAILURE_PATTERNS.is_match(text) {
        return Err(ProviderError::ExecutionFailed(
            "error signature detected in output".to_string(),
        ));
    }
    Ok(())
}

/// Whether the majority of non-blank lines parse as JSON objects
pub fn looks_like_event_stream(text: &str) -> bool {
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    if lines.is_empty() {
        return false;
    }
    let json_lines = lines
        .iter()
        .filter(|l| {
            serde_json::from_str::<Value>(l)
                .map(|v| v.is_object())
                .unwrap_or(false)
        })
        .count();
    json_lines * 2 > lines.len()
}

/// Walk an NDJSON event stream, accumulating text fragments, tool calls, and
/// tool results. Unparseable lines are skipped; a valid stream with nothing
/// extractable yields empty content rather than leaking raw event JSON.
pub fn parse_event_stream(text: &str) -> Interpreted {
    let mut fragments: Vec<String> = Vec::new();
    let mut tool_results: Vec<String> = Vec::new();
    let mut tool_calls: Vec<ToolCall> = Vec::new();

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Ok(Value::Object(event)) = serde_json::from_str::<Value>(line) else {
            continue;
        };

        if let Some(text) = event_text(&event) {
            match repair_escaped_tool_call(&text) {
                Some(call) => tool_calls.push(call),
                None => fragments.push(text),
            }
        }

        if let Some(call) = event_tool_call(&event) {
            if let Some(human) = human_message(&call.arguments) {
                fragments.push(human);
            }
            tool_calls.push(call);
        }

        if let Some(result) = event_tool_result(&event) {
            tool_results.push(result);
        }
    }

    let content = if fragments.is_empty() {
        tool_results.join("\n")
    } else {
        fragments.concat()
    };

    debug!(
        fragments = fragments.len(),
        tool_calls = tool_calls.len(),
        "Parsed event stream"
    );

    Interpreted {
        content,
        tool_calls,
    }
}

/// Extract the text payload of an event, across the shapes emitted by the
/// supported CLI tools.
fn event_text(event: &serde_json::Map<String, Value>) -> Option<String> {
    // {"type":"text","text":"..."}
    if let Some(text) = event.get("text").and_then(Value::as_str) {
        return Some(text.to_string());
    }
    // {"delta":{"text":"..."}}
    if let Some(text) = event
        .get("delta")
        .and_then(|d| d.get("text"))
        .and_then(Value::as_str)
    {
        return Some(text.to_string());
    }
    // {"message":{"content":"..."}} or content blocks
    if let Some(content) = event.get("message").and_then(|m| m.get("content")) {
        match content {
            Value::String(s) => return Some(s.clone()),
            Value::Array(blocks) => {
                let joined: String = blocks
                    .iter()
                    .filter_map(|b| b.get("text").and_then(Value::as_str))
                    .collect();
                if !joined.is_empty() {
                    return Some(joined);
                }
            }
            _ => {}
        }
    }
    None
}

/// Extract a tool invocation from an event
fn event_tool_call(event: &serde_json::Map<String, Value>) -> Option<ToolCall> {
    let kind = event.get("type").and_then(Value::as_str).unwrap_or("");
    if kind != "tool_use" && kind != "tool_call" {
        return None;
    }
    let name = event.get("name").and_then(Value::as_str)?.to_string();
    let arguments = event
        .get("input")
        .or_else(|| event.get("arguments"))
        .cloned()
        .unwrap_or(Value::Null);
    Some(ToolCall { name, arguments })
}

/// Extract a tool-result payload from an event
fn event_tool_result(event: &serde_json::Map<String, Value>) -> Option<String> {
    let kind = event.get("type").and_then(Value::as_str).unwrap_or("");
    if kind != "tool_result" {
        return None;
    }
    event
        .get("content")
        .or_else(|| event.get("output"))
        .or_else(|| event.get("result"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// Human-readable fields embedded in tool-invocation arguments
fn human_message(arguments: &Value) -> Option<String> {
    for field in ["message", "description", "explanation", "summary"] {
        if let Some(text) = arguments.get(field).and_then(Value::as_str) {
            if !text.trim().is_empty() {
                return Some(text.to_string());
            }
        }
    }
    None
}

/// Detect a structured tool-call payload that got string-escaped inside a
/// text field, and reverse the double escaping so downstream tool-call
/// parsing still works.
fn repair_escaped_tool_call(text: &str) -> Option<ToolCall> {
    let trimmed = text.trim();
    if !trimmed.contains("{\\\"") {
        return None;
    }
    // The fragment is a JSON string (or the body of one); parse it to undo
    // one level of escaping.
    let unescaped: String = if trimmed.starts_with('"') {
        serde_json::from_str(trimmed).ok()?
    } else {
        serde_json::from_str(&format!("\"{trimmed}\"")).ok()?
    };
    let value: Value = serde_json::from_str(&unescaped).ok()?;
    let name = value.get("name").and_then(Value::as_str)?.to_string();
    let arguments = value
        .get("arguments")
        .or_else(|| value.get("input"))
        .cloned()
        .unwrap_or(Value::Null);
    Some(ToolCall { name, arguments })
}
