use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::debug;

use super::{ModelInfo, ModelListing, ProviderError, require_api_key, send_json};
use crate::config::Config;
use crate::model::{
    ChatReply, ChatRequest, ProviderKind, ReasoningEffort, ToolCall, ToolSpec,
    is_anthropic_thinking_model,
};

const PROVIDER: ProviderKind = ProviderKind::Anthropic;
const ANTHROPIC_VERSION: &str = "2023-06-01";
const THINKING_TEMPERATURE: f32 = 1.0;
const MAX_TEMPERATURE: f32 = 1.0;
const MIN_THINKING_BUDGET: u32 = 1024;

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    thinking: Option<Thinking>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<AnthropicTool<'a>>,
}

#[derive(Debug, Serialize)]
struct Thinking {
    #[serde(rename = "type")]
    kind: &'static str,
    budget_tokens: u32,
}

#[derive(Debug, Serialize)]
struct AnthropicTool<'a> {
    name: &'a str,
    description: &'a str,
    input_schema: &'a Value,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<Value>,
    stop_reason: Option<String>,
    #[serde(default)]
    usage: TokenUsage,
}

#[derive(Debug, Default, Deserialize)]
struct TokenUsage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct ModelsResponse {
    #[serde(default)]
    data: Vec<RawModel>,
    #[serde(default)]
    has_more: bool,
}

#[derive(Debug, Deserialize)]
struct RawModel {
    id: String,
    display_name: Option<String>,
    created_at: Option<String>,
}

/// Extended-thinking budget, or `None` when thinking stays off.
fn thinking_budget(model: &str, effort: ReasoningEffort, max_tokens: u32) -> Option<u32> {
    if !is_anthropic_thinking_model(model) {
        return None;
    }
    let budget = match effort {
        ReasoningEffort::Low => return None,
        ReasoningEffort::Medium => max_tokens / 2,
        ReasoningEffort::High => (u64::from(max_tokens) * 9 / 10) as u32,
    };
    (budget >= MIN_THINKING_BUDGET).then_some(budget)
}

fn effective_temperature(requested: f32, thinking: bool) -> f32 {
    if thinking {
        return THINKING_TEMPERATURE;
    }
    if !requested.is_finite() {
        return 0.0;
    }
    requested.clamp(0.0, MAX_TEMPERATURE)
}

fn to_anthropic_messages(request: &ChatRequest) -> Vec<Value> {
    let mut messages: Vec<Value> = request
        .messages
        .iter()
        .map(|msg| {
            json!({
                "role": msg.role.as_str(),
                "content": msg.content,
            })
        })
        .collect();

    for exchange in &request.exchanges {
        messages.push(exchange.assistant.clone());
        let results: Vec<Value> = exchange
            .results
            .iter()
            .map(|result| {
                json!({
                    "type": "tool_result",
                    "tool_use_id": result.call_id,
                    "content": result.content,
                })
            })
            .collect();
        messages.push(json!({"role": "user", "content": results}));
    }

    messages
}

fn to_anthropic_tools(tools: &[ToolSpec]) -> Vec<AnthropicTool<'_>> {
    tools
        .iter()
        .map(|tool| AnthropicTool {
            name: &tool.name,
            description: &tool.description,
            input_schema: &tool.parameters,
        })
        .collect()
}

fn messages_body(request: &ChatRequest) -> MessagesRequest<'_> {
    let budget = thinking_budget(
        &request.model,
        request.reasoning_effort,
        request.max_tokens,
    );
    let system = Some(request.system.as_str()).filter(|system| !system.trim().is_empty());

    MessagesRequest {
        model: &request.model,
        max_tokens: request.max_tokens,
        messages: to_anthropic_messages(request),
        system,
        temperature: effective_temperature(request.temperature, budget.is_some()),
        thinking: budget.map(|budget_tokens| Thinking {
            kind: "enabled",
            budget_tokens,
        }),
        tools: to_anthropic_tools(&request.tools),
    }
}

fn parse_reply(response: MessagesResponse) -> Result<ChatReply, ProviderError> {
    let token_count = response.usage.input_tokens + response.usage.output_tokens;
    let mut text = String::new();
    let mut tool_calls = Vec::new();

    for block in &response.content {
        match block.get("type").and_then(Value::as_str) {
            Some("text") => {
                if let Some(part) = block.get("text").and_then(Value::as_str) {
                    text.push_str(part);
                }
            }
            Some("tool_use") => {
                let id = block.get("id").and_then(Value::as_str);
                let name = block.get("name").and_then(Value::as_str);
                let (Some(id), Some(name)) = (id, name) else {
                    return Err(ProviderError::response(
                        PROVIDER,
                        "tool_use block without id or name",
                    ));
                };
                tool_calls.push(ToolCall {
                    id: id.to_string(),
                    name: name.to_string(),
                    arguments: block.get("input").cloned().unwrap_or_else(|| json!({})),
                });
            }
            _ => {}
        }
    }

    if !tool_calls.is_empty() {
        let echo = json!({"role": "assistant", "content": response.content});
        return Ok(ChatReply {
            text,
            token_count,
            tool_calls,
            echo: Some(echo),
            audio: None,
        });
    }

    match response.stop_reason.as_deref() {
        None | Some("end_turn") | Some("max_tokens") | Some("stop_sequence") => {}
        Some(other) => {
            return Err(ProviderError::response(
                PROVIDER,
                format!("unexpected stop reason '{other}'"),
            ));
        }
    }

    if text.is_empty() {
        return Err(ProviderError::response(
            PROVIDER,
            "no text content in response",
        ));
    }

    Ok(ChatReply {
        text,
        token_count,
        ..ChatReply::default()
    })
}

fn parse_release_date(raw: Option<&str>) -> Option<DateTime<Utc>> {
    raw.and_then(|value| DateTime::parse_from_rfc3339(value).ok())
        .map(|date| date.with_timezone(&Utc))
}

pub async fn chat(
    client: &Client,
    cfg: &Config,
    request: &ChatRequest,
) -> Result<ChatReply, ProviderError> {
    let api_key = require_api_key(cfg, PROVIDER)?;
    let api_url = format!("{}/messages", cfg.base_url(PROVIDER));
    let body = messages_body(request);
    debug!(
        api_url = %api_url,
        model = %request.model,
        message_count = body.messages.len(),
        temperature = body.temperature,
        thinking_budget = ?body.thinking.as_ref().map(|thinking| thinking.budget_tokens),
        tool_count = body.tools.len(),
        "sending anthropic messages request"
    );

    let response: MessagesResponse = send_json(
        PROVIDER,
        &api_url,
        client
            .post(&api_url)
            .header("x-api-key", api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body),
    )
    .await?;
    let reply = parse_reply(response)?;
    debug!(
        model = %request.model,
        response_len = reply.text.len(),
        tool_calls = reply.tool_calls.len(),
        token_count = reply.token_count,
        "received anthropic messages response"
    );
    Ok(reply)
}

pub async fn list_models(client: &Client, cfg: &Config) -> Result<ModelListing, ProviderError> {
    let api_key = require_api_key(cfg, PROVIDER)?;
    let api_url = format!("{}/models", cfg.base_url(PROVIDER));
    debug!(api_url = %api_url, "listing anthropic models");

    let response: ModelsResponse = send_json(
        PROVIDER,
        &api_url,
        client
            .get(&api_url)
            .header("x-api-key", api_key)
            .header("anthropic-version", ANTHROPIC_VERSION),
    )
    .await?;

    let models = response
        .data
        .into_iter()
        .map(|model| ModelInfo {
            created: parse_release_date(model.created_at.as_deref()),
            id: model.id,
            display_name: model.display_name,
            owner: None,
        })
        .collect();

    Ok(ModelListing {
        provider: PROVIDER,
        models,
        has_more: response.has_more,
        ..ModelListing::default()
    })
}
