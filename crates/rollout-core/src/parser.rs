//! Tool-call extraction from free-text model responses.
//!
//! A response may contain `<tool_call>...</tool_call>` blocks. Only the first
//! block is honored; everything after its close marker is dropped from the
//! history the model sees, which keeps one tool call per round.
//!
//! Inside the block two grammars are tried in order:
//!
//! 1. Attribute form: `<function=NAME>` followed by zero or more
//!    `<parameter=ARG>VALUE</parameter>` children. Values are whitespace
//!    stripped and otherwise kept verbatim.
//! 2. Loose JSON form: the outermost `{...}` span, repaired and parsed as
//!    `{"function": NAME, "parameters": {...}}`. Repair rules, applied in
//!    order:
//!    - a line break between two quoted strings becomes `", "`, unless the
//!      first quote opens a value (`: "`)
//!    - a line break right before a value's closing quote is removed, when
//!      the value has other non-whitespace content
//!    - every remaining whitespace run collapses to one space, so raw line
//!      breaks inside string literals no longer break the parse and a value
//!      made only of a line break reads back as `" "`
//!
//! A block that matches neither grammar yields no tool calls; the failure is
//! logged and the round falls back to reprompting.

use std::path::PathBuf;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::domain::Task;
use crate::tools::{ToolCall, ToolKind, ToolRegistry};

const OPEN_MARKER: &str = "<tool_call>";
const CLOSE_MARKER: &str = "</tool_call>";

static BLOCK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<tool_call>.*?</tool_call>").expect("valid regex"));
static FUNCTION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<function=([^>]+)>").expect("valid regex"));
static PARAMETER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<parameter=([^>]+)>(.*?)</parameter>").expect("valid regex")
});
static JSON_SPAN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\{.*\}").expect("valid regex"));
static BREAK_BETWEEN_STRINGS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""\s*\n\s*""#).expect("valid regex"));
static BREAK_BEFORE_CLOSE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#":\s*"([^"]*[^"\s])\s*\n\s*""#).expect("valid regex"));
static WHITESPACE_RUN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

/// Why a tool-call block yielded nothing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BlockParseError {
    #[error("block has neither a function marker nor a JSON object")]
    NoCallFound,

    #[error("invalid JSON in tool call block: {0}")]
    InvalidJson(String),

    #[error("tool call JSON is missing `{0}`")]
    MissingKey(&'static str),

    #[error("tool call JSON field `{0}` has the wrong type")]
    InvalidShape(&'static str),
}

/// Result of parsing one model response.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedResponse {
    /// Narration before the first block, trimmed.
    pub visible_prefix: String,
    /// At most one call under the first-block rule.
    pub tool_calls: Vec<ToolCall>,
    /// Response text up to and including the first block's close marker.
    pub preserved_text: String,
}

impl ParsedResponse {
    fn plain(text: &str) -> Self {
        Self {
            visible_prefix: text.to_string(),
            tool_calls: Vec::new(),
            preserved_text: text.to_string(),
        }
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }

    /// Whether any parsed call names the terminate capability.
    pub fn terminates(&self) -> bool {
        self.tool_calls.iter().any(ToolCall::is_terminate)
    }
}

/// Dual-grammar tool-call parser.
#[derive(Debug, Clone, Default)]
pub struct ToolCallParser {
    registry: ToolRegistry,
    database_root: Option<PathBuf>,
}

impl ToolCallParser {
    /// `database_root` is joined with a task's `db_id` to form the shell
    /// tool's default `work_dir`.
    pub fn new(registry: ToolRegistry, database_root: Option<PathBuf>) -> Self {
        Self {
            registry,
            database_root,
        }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn parse(&self, response: &str, task: &Task) -> ParsedResponse {
        let Some(block) = BLOCK_RE.find(response) else {
            return ParsedResponse::plain(response);
        };

        let inner = &block.as_str()[OPEN_MARKER.len()..block.len() - CLOSE_MARKER.len()];
        let tool_calls = match self.parse_block(inner) {
            Ok(call) => vec![self.with_default_work_dir(call, task)],
            Err(e) => {
                warn!(
                    instance_id = %task.instance_id,
                    error = %e,
                    "tool call block could not be parsed"
                );
                Vec::new()
            }
        };

        ParsedResponse {
            visible_prefix: response[..block.start()].trim().to_string(),
            tool_calls,
            preserved_text: response[..block.end()].to_string(),
        }
    }

    /// Parse the text between the block markers.
    pub fn parse_block(&self, inner: &str) -> Result<ToolCall, BlockParseError> {
        let (name, arguments) = match parse_attribute_form(inner) {
            Some(parsed) => parsed,
            None => parse_json_form(inner)?,
        };
        Ok(ToolCall::new(self.registry.resolve(&name), arguments))
    }

    fn with_default_work_dir(&self, mut call: ToolCall, task: &Task) -> ToolCall {
        if call.kind != ToolKind::Shell || call.arguments.contains_key("work_dir") {
            return call;
        }
        let Some(root) = &self.database_root else {
            return call;
        };
        let dir = match task.db_id.as_deref() {
            Some(db_id) => root.join(db_id),
            None => root.clone(),
        };
        debug!(work_dir = %dir.display(), "injecting default work_dir");
        call.arguments.insert(
            "work_dir".to_string(),
            Value::String(dir.display().to_string()),
        );
        call
    }
}

fn parse_attribute_form(inner: &str) -> Option<(String, Map<String, Value>)> {
    let name = FUNCTION_RE.captures(inner)?.get(1)?.as_str().trim().to_string();
    let arguments = PARAMETER_RE
        .captures_iter(inner)
        .filter_map(|caps| {
            let key = caps.get(1)?.as_str().trim().to_string();
            let value = caps.get(2)?.as_str().trim().to_string();
            Some((key, Value::String(value)))
        })
        .collect();
    Some((name, arguments))
}

fn parse_json_form(inner: &str) -> Result<(String, Map<String, Value>), BlockParseError> {
    let span = JSON_SPAN_RE
        .find(inner)
        .ok_or(BlockParseError::NoCallFound)?
        .as_str();
    let repaired = repair_json(span);

    let value: Value =
        serde_json::from_str(&repaired).map_err(|e| BlockParseError::InvalidJson(e.to_string()))?;
    let Value::Object(mut object) = value else {
        return Err(BlockParseError::InvalidShape("<root>"));
    };

    let name = match object.remove("function") {
        Some(Value::String(name)) => name,
        Some(_) => return Err(BlockParseError::InvalidShape("function")),
        None => return Err(BlockParseError::MissingKey("function")),
    };
    let arguments = match object.remove("parameters") {
        Some(Value::Object(arguments)) => arguments,
        Some(_) => return Err(BlockParseError::InvalidShape("parameters")),
        None => return Err(BlockParseError::MissingKey("parameters")),
    };
    Ok((name, arguments))
}

fn repair_json(span: &str) -> String {
    let repaired = join_broken_strings(span);
    let repaired = BREAK_BEFORE_CLOSE_RE.replace_all(&repaired, ": \"${1}\"");
    WHITESPACE_RUN_RE.replace_all(&repaired, " ").into_owned()
}

fn join_broken_strings(span: &str) -> String {
    let mut out = String::with_capacity(span.len());
    let mut last = 0;
    for m in BREAK_BETWEEN_STRINGS_RE.find_iter(span) {
        out.push_str(&span[last..m.start()]);
        if span[..m.start()].trim_end().ends_with(':') {
            out.push_str(m.as_str());
        } else {
            out.push_str("\", \"");
        }
        last = m.end();
    }
    out.push_str(&span[last..]);
    out
}
