use crate::error::ParseError;
use crate::model::ServerMessage;

/// One decoded line of a message log.
pub type InboundItem = Result<ServerMessage, ParseError>;

/// Decode a single JSONL line. Blank lines and `//` comments yield `None`.
///
/// # Functional Core
/// Pure function: no I/O. Structural validation is left to the engine.
pub fn parse_line(line: &str) -> Option<InboundItem> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with("//") {
        return None;
    }
    Some(serde_json::from_str::<ServerMessage>(trimmed).map_err(|e| ParseError::Json(e.to_string())))
}

/// Decode every line of a JSONL chunk, keeping malformed lines as errors so
/// the caller can report them.
pub fn parse_messages(content: &str) -> Vec<InboundItem> {
    content.lines().filter_map(parse_line).collect()
}
