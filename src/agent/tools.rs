use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Value, json};
use std::error::Error;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

use crate::model::{ToolCall, ToolSpec};

const TIME_NOW: &str = "time_now";
const MAX_TOOL_NAME_LEN: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    pub content: String,
}

impl ToolOutput {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolExecutionError {
    message: String,
}

impl ToolExecutionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for ToolExecutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl Error for ToolExecutionError {}

pub type ToolExecutionResult = std::result::Result<ToolOutput, ToolExecutionError>;
pub type ToolFuture<'a> = Pin<Box<dyn Future<Output = ToolExecutionResult> + 'a>>;

pub trait ToolRunner {
    fn execute<'a>(&'a self, call: &'a ToolCall) -> ToolFuture<'a>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinRunner;

/// Either `{name, description, parameters}` or the nested
/// `{name, description, definition: {type, function: {...}}}` form.
#[derive(Debug, Deserialize)]
struct CatalogEntry {
    name: Option<String>,
    description: Option<String>,
    parameters: Option<Value>,
    definition: Option<Value>,
}

pub fn builtin_specs() -> Vec<ToolSpec> {
    vec![ToolSpec {
        name: TIME_NOW.to_string(),
        description: "Returns the current UTC time and unix time in seconds.".to_string(),
        parameters: json!({"type": "object", "properties": {}}),
    }]
}

/// Both vendors accept only `[a-zA-Z0-9_-]{1,64}` as a tool name.
pub fn is_valid_tool_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= MAX_TOOL_NAME_LEN
        && name
            .bytes()
            .all(|byte| byte.is_ascii_alphanumeric() || byte == b'_' || byte == b'-')
}

fn empty_schema() -> Value {
    json!({"type": "object", "properties": {}})
}

fn normalize_entry(entry: CatalogEntry) -> Option<ToolSpec> {
    let function = entry
        .definition
        .as_ref()
        .and_then(|definition| definition.get("function"));

    let name = function
        .and_then(|function| function.get("name"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .or(entry.name)?;
    let name = name.trim().to_string();
    if !is_valid_tool_name(&name) {
        return None;
    }

    let description = function
        .and_then(|function| function.get("description"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .or(entry.description)?;
    let parameters = function
        .and_then(|function| function.get("parameters"))
        .cloned()
        .or(entry.parameters)
        .unwrap_or_else(empty_schema);

    Some(ToolSpec {
        name,
        description,
        parameters,
    })
}

/// Entries without a usable name or a description are skipped.
pub fn parse_catalog(raw: &Value) -> Vec<ToolSpec> {
    let Some(entries) = raw.as_array() else {
        warn!("tool catalog is not a JSON array");
        return Vec::new();
    };

    entries
        .iter()
        .filter_map(|value| {
            let parsed = serde_json::from_value::<CatalogEntry>(value.clone())
                .ok()
                .and_then(normalize_entry);
            if parsed.is_none() {
                warn!(entry = %value, "invalid tool entry detected");
            }
            parsed
        })
        .collect()
}

pub async fn fetch_catalog(client: &Client, tools_url: Option<&str>) -> Vec<ToolSpec> {
    let Some(url) = tools_url else {
        warn!("TOOLS_URL not set; only built-in tools are available");
        return Vec::new();
    };

    let response = match client.get(url).send().await {
        Ok(response) => response,
        Err(err) => {
            warn!(tools_url = %url, error = %err, "failed to load tools");
            return Vec::new();
        }
    };
    if !response.status().is_success() {
        warn!(tools_url = %url, status = %response.status(), "failed to load tools");
        return Vec::new();
    }

    match response.json::<Value>().await {
        Ok(raw) => {
            let tools = parse_catalog(&raw);
            debug!(tools_url = %url, tool_count = tools.len(), "loaded remote tools");
            tools
        }
        Err(err) => {
            warn!(tools_url = %url, error = %err, "tool catalog is not valid JSON");
            Vec::new()
        }
    }
}

/// Built-ins first; remote entries that reuse a built-in name are dropped.
pub fn catalog(remote: Vec<ToolSpec>) -> Vec<ToolSpec> {
    let mut tools = builtin_specs();
    for tool in remote {
        if tools.iter().any(|existing| existing.name == tool.name) {
            warn!(tool_name = %tool.name, "duplicate tool name ignored");
            continue;
        }
        tools.push(tool);
    }
    tools
}

impl ToolRunner for BuiltinRunner {
    fn execute<'a>(&'a self, call: &'a ToolCall) -> ToolFuture<'a> {
        Box::pin(async move {
            debug!(tool_name = %call.name, "running built-in tool");

            match call.name.as_str() {
                TIME_NOW => {
                    let now = SystemTime::now();
                    let secs = now
                        .duration_since(UNIX_EPOCH)
                        .map_err(|err| ToolExecutionError::new(format!("time_now failed: {err}")))?
                        .as_secs();
                    let timestamp =
                        DateTime::<Utc>::from(now).to_rfc3339_opts(SecondsFormat::Secs, true);
                    Ok(ToolOutput::new(format!("{timestamp} (unix: {secs})")))
                }
                _ => {
                    warn!(tool_name = %call.name, "tool has no local runner");
                    Err(ToolExecutionError::new(format!(
                        "tool '{}' is not available locally",
                        call.name
                    )))
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{
        BuiltinRunner, ToolRunner, builtin_specs, catalog, is_valid_tool_name, parse_catalog,
    };
    use crate::model::{ToolCall, ToolSpec};

    fn call(name: &str) -> ToolCall {
        ToolCall {
            id: "call_1".to_string(),
            name: name.to_string(),
            arguments: json!({}),
        }
    }

    #[test]
    fn parse_catalog_accepts_flat_and_nested_entries() {
        let raw = json!([
            {
                "name": "weather",
                "description": "Weather by city",
                "parameters": {"type": "object", "properties": {"city": {"type": "string"}}}
            },
            {
                "name": "search",
                "description": "outer description",
                "definition": {
                    "type": "function",
                    "function": {
                        "name": "web_search",
                        "description": "Search the web",
                        "parameters": {"type": "object", "properties": {"q": {"type": "string"}}}
                    }
                }
            },
            {"name": "no_params", "description": "Takes nothing"}
        ]);

        let tools = parse_catalog(&raw);
        assert_eq!(tools.len(), 3);
        assert_eq!(tools[0].name, "weather");
        assert_eq!(tools[0].parameters["properties"]["city"]["type"], "string");
        assert_eq!(tools[1].name, "web_search");
        assert_eq!(tools[1].description, "Search the web");
        assert_eq!(tools[2].parameters["type"], "object");
    }

    #[test]
    fn parse_catalog_skips_invalid_entries() {
        let raw = json!([
            {"description": "missing name"},
            {"name": "   ", "description": "blank name"},
            {"name": "no_description"},
            {"name": "web.search", "description": "dotted name"},
            {"name": "x".repeat(65), "description": "too long"},
            "not an object",
            {"name": "ok", "description": "fine"}
        ]);
        let tools = parse_catalog(&raw);
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].name, "ok");
    }

    #[test]
    fn tool_names_follow_the_vendor_pattern() {
        assert!(is_valid_tool_name("time_now"));
        assert!(is_valid_tool_name("get-weather2"));
        assert!(is_valid_tool_name(&"a".repeat(64)));
        assert!(!is_valid_tool_name(""));
        assert!(!is_valid_tool_name("time.now"));
        assert!(!is_valid_tool_name("has space"));
        assert!(!is_valid_tool_name(&"a".repeat(65)));
        assert!(builtin_specs().iter().all(|tool| is_valid_tool_name(&tool.name)));
    }

    #[test]
    fn parse_catalog_rejects_non_array_payloads() {
        assert!(parse_catalog(&json!({"tools": []})).is_empty());
    }

    #[test]
    fn catalog_puts_builtins_first_and_drops_duplicates() {
        let remote = vec![
            ToolSpec {
                name: "time_now".to_string(),
                description: "shadow".to_string(),
                parameters: json!({}),
            },
            ToolSpec {
                name: "weather".to_string(),
                description: "Weather".to_string(),
                parameters: json!({}),
            },
        ];
        let tools = catalog(remote);
        let names: Vec<&str> = tools.iter().map(|tool| tool.name.as_str()).collect();
        assert_eq!(names, vec!["time_now", "weather"]);
        assert_ne!(tools[0].description, "shadow");
    }

    #[tokio::test]
    async fn execute_time_now_returns_readable_and_unix() {
        let output = BuiltinRunner
            .execute(&call("time_now"))
            .await
            .expect("time_now should work")
            .content;
        assert!(output.contains("T"));
        assert!(output.contains("Z"));
        assert!(output.contains("(unix: "));
        assert!(output.ends_with(')'));
    }

    #[tokio::test]
    async fn execute_unknown_tool_returns_error() {
        let result = BuiltinRunner.execute(&call("weather")).await;
        let err = result.expect_err("remote tools have no local runner");
        assert!(err.to_string().contains("not available locally"));
    }
}
