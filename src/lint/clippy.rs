//! Clippy adapter (`cargo clippy --message-format=json`)

use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::model::{Span, ToolLevel};

use super::{ExternalTool, ToolCommand, ToolFinding};

#[derive(Debug, Default, Clone, Copy)]
pub struct ClippyTool;

impl ExternalTool for ClippyTool {
    fn name(&self) -> &'static str {
        "clippy"
    }

    fn applies_to(&self, root: &Path) -> bool {
        root.join("Cargo.toml").is_file()
    }

    fn command(&self, root: &Path) -> ToolCommand {
        ToolCommand {
            program: "cargo".to_string(),
            args: ["clippy", "--quiet", "--message-format=json", "--all-targets"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            cwd: root.to_path_buf(),
        }
    }

    fn parse_output(&self, stdout: &str, root: &Path) -> Vec<ToolFinding> {
        stdout
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| serde_json::from_str::<Value>(line).ok())
            .filter_map(|msg| parse_message(&msg, root))
            .collect()
    }
}

/// One `compiler-message` line, reduced to its primary span
fn parse_message(msg: &Value, root: &Path) -> Option<ToolFinding> {
    if msg.get("reason").and_then(Value::as_str) != Some("compiler-message") {
        return None;
    }
    let message = msg.get("message")?;

    let level = message.get("level").and_then(Value::as_str).unwrap_or("warning");
    let text = message.get("message").and_then(Value::as_str).unwrap_or("");
    if level == "note" || level == "help" || text.starts_with("aborting") {
        return None;
    }
    // Summary lines ("3 warnings emitted") carry no code and no span
    let code = message
        .get("code")
        .and_then(|c| c.get("code"))
        .and_then(Value::as_str)?;

    let span = message
        .get("spans")
        .and_then(Value::as_array)?
        .iter()
        .find(|s| s.get("is_primary").and_then(Value::as_bool) == Some(true))?;

    let number = |key: &str, default: usize| {
        span.get(key)
            .and_then(Value::as_u64)
            .map_or(default, |n| n as usize)
    };
    let line = number("line_start", 1);
    let column = number("column_start", 1);

    let file = span.get("file_name").and_then(Value::as_str)?;
    let file = PathBuf::from(file);
    let path = if file.is_absolute() { file } else { root.join(file) };

    Some(ToolFinding {
        path,
        span: Span::new(line, column, number("line_end", line), number("column_end", column)),
        rule: code.to_string(),
        message: text.to_string(),
        level: Some(ToolLevel::from_tool(level)),
    })
}
