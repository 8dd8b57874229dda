use chrono::DateTime;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::path::Path;
use tracing::debug;

use super::{ModelInfo, ModelListing, ProviderError, require_api_key, send_bytes, send_json};
use crate::config::Config;
use crate::model::{
    ChatReply, ChatRequest, ProviderKind, ToolCall, ToolSpec, is_openai_reasoning_model,
};

const PROVIDER: ProviderKind = ProviderKind::OpenAi;
const REASONING_TEMPERATURE: f32 = 1.0;
const MAX_TEMPERATURE: f32 = 2.0;
const SPEECH_MODEL: &str = "tts-1-hd";
const SPEECH_VOICE: &str = "nova";

const CHAT_MODEL_MARKERS: [&str; 4] = ["gpt-", "o1-", "o3-", "o4-"];
const NON_CHAT_MODEL_MARKERS: [&str; 7] = [
    "realtime",
    "audio",
    "transcribe",
    "tts",
    "image",
    "pro",
    "deep-research",
];

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<Value>,
    max_completion_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reasoning_effort: Option<&'static str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<FunctionTool<'a>>,
}

#[derive(Debug, Serialize)]
struct FunctionTool<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    function: FunctionDefinition<'a>,
}

#[derive(Debug, Serialize)]
struct FunctionDefinition<'a> {
    name: &'a str,
    description: &'a str,
    parameters: &'a Value,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: AssistantMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    content: Option<String>,
    tool_calls: Option<Vec<RawToolCall>>,
}

#[derive(Debug, Deserialize, Serialize)]
struct RawToolCall {
    id: String,
    #[serde(rename = "type", default = "function_kind")]
    kind: String,
    function: RawFunction,
}

#[derive(Debug, Deserialize, Serialize)]
struct RawFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

fn function_kind() -> String {
    "function".to_string()
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    total_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct ModelsResponse {
    #[serde(default)]
    data: Vec<RawModel>,
}

#[derive(Debug, Deserialize)]
struct RawModel {
    id: String,
    #[serde(default)]
    created: i64,
    owned_by: Option<String>,
}

#[derive(Debug, Serialize)]
struct SpeechRequest<'a> {
    model: &'static str,
    voice: &'static str,
    input: &'a str,
    response_format: &'static str,
}

/// Container format for `--save-audio`, picked from the file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AudioFormat {
    #[default]
    Mp3,
    Opus,
    Aac,
    Flac,
    Wav,
    Pcm,
}

impl AudioFormat {
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase);
        match ext.as_deref() {
            Some("opus") => Self::Opus,
            Some("aac") => Self::Aac,
            Some("flac") => Self::Flac,
            Some("wav") => Self::Wav,
            Some("pcm") => Self::Pcm,
            _ => Self::Mp3,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mp3 => "mp3",
            Self::Opus => "opus",
            Self::Aac => "aac",
            Self::Flac => "flac",
            Self::Wav => "wav",
            Self::Pcm => "pcm",
        }
    }
}

fn system_role(model: &str) -> &'static str {
    if is_openai_reasoning_model(model) {
        "developer"
    } else {
        "system"
    }
}

fn effective_temperature(model: &str, requested: f32) -> Option<f32> {
    if is_openai_reasoning_model(model) {
        return Some(REASONING_TEMPERATURE);
    }
    if model.contains("search") {
        return None;
    }
    if !requested.is_finite() {
        return Some(0.0);
    }
    Some(requested.clamp(0.0, MAX_TEMPERATURE))
}

fn to_openai_messages(request: &ChatRequest) -> Vec<Value> {
    let mut messages = Vec::with_capacity(request.messages.len() + 1);
    if !request.system.trim().is_empty() {
        messages.push(json!({
            "role": system_role(&request.model),
            "content": request.system,
        }));
    }

    messages.extend(request.messages.iter().map(|msg| {
        json!({
            "role": msg.role.as_str(),
            "content": msg.content,
        })
    }));

    for exchange in &request.exchanges {
        messages.push(exchange.assistant.clone());
        messages.extend(exchange.results.iter().map(|result| {
            json!({
                "role": "tool",
                "tool_call_id": result.call_id,
                "content": result.content,
            })
        }));
    }

    messages
}

fn to_function_tools(tools: &[ToolSpec]) -> Vec<FunctionTool<'_>> {
    tools
        .iter()
        .map(|tool| FunctionTool {
            kind: "function",
            function: FunctionDefinition {
                name: &tool.name,
                description: &tool.description,
                parameters: &tool.parameters,
            },
        })
        .collect()
}

fn completion_body(request: &ChatRequest) -> CompletionRequest<'_> {
    let reasoning = is_openai_reasoning_model(&request.model);
    CompletionRequest {
        model: &request.model,
        messages: to_openai_messages(request),
        max_completion_tokens: request.max_tokens,
        temperature: effective_temperature(&request.model, request.temperature),
        reasoning_effort: reasoning.then(|| request.reasoning_effort.as_str()),
        tools: to_function_tools(&request.tools),
    }
}

fn parse_tool_calls(raw: &[RawToolCall]) -> Result<Vec<ToolCall>, ProviderError> {
    raw.iter()
        .map(|call| {
            let arguments = if call.function.arguments.trim().is_empty() {
                Value::Object(Default::default())
            } else {
                serde_json::from_str(&call.function.arguments).map_err(|err| {
                    ProviderError::response(
                        PROVIDER,
                        format!(
                            "tool call '{}' has invalid arguments: {err}",
                            call.function.name
                        ),
                    )
                })?
            };
            Ok(ToolCall {
                id: call.id.clone(),
                name: call.function.name.clone(),
                arguments,
            })
        })
        .collect()
}

fn parse_reply(response: CompletionResponse) -> Result<ChatReply, ProviderError> {
    let token_count = response.usage.map(|usage| usage.total_tokens).unwrap_or(0);
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::response(PROVIDER, "no choices in response"))?;
    let text = choice.message.content.unwrap_or_default();

    if let Some(raw_calls) = choice.message.tool_calls.filter(|calls| !calls.is_empty()) {
        let tool_calls = parse_tool_calls(&raw_calls)?;
        let echo = json!({
            "role": "assistant",
            "content": text.clone(),
            "tool_calls": raw_calls,
        });
        return Ok(ChatReply {
            text,
            token_count,
            tool_calls,
            echo: Some(echo),
            audio: None,
        });
    }

    match choice.finish_reason.as_deref() {
        None | Some("stop") | Some("length") => {}
        Some(other) => {
            return Err(ProviderError::response(
                PROVIDER,
                format!("unexpected finish reason '{other}'"),
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

pub fn is_chat_model(id: &str) -> bool {
    CHAT_MODEL_MARKERS.iter().any(|marker| id.contains(marker))
        && !NON_CHAT_MODEL_MARKERS
            .iter()
            .any(|marker| id.contains(marker))
}

pub async fn chat(
    client: &Client,
    cfg: &Config,
    request: &ChatRequest,
) -> Result<ChatReply, ProviderError> {
    let api_key = require_api_key(cfg, PROVIDER)?;
    let api_url = format!("{}/chat/completions", cfg.base_url(PROVIDER));
    let body = completion_body(request);
    debug!(
        api_url = %api_url,
        model = %request.model,
        message_count = body.messages.len(),
        temperature = ?body.temperature,
        reasoning_effort = ?body.reasoning_effort,
        tool_count = body.tools.len(),
        "sending openai chat request"
    );

    let response: CompletionResponse = send_json(
        PROVIDER,
        &api_url,
        client.post(&api_url).bearer_auth(api_key).json(&body),
    )
    .await?;
    let reply = parse_reply(response)?;
    debug!(
        model = %request.model,
        response_len = reply.text.len(),
        tool_calls = reply.tool_calls.len(),
        token_count = reply.token_count,
        "received openai chat response"
    );
    Ok(reply)
}

pub async fn list_models(client: &Client, cfg: &Config) -> Result<ModelListing, ProviderError> {
    let api_key = require_api_key(cfg, PROVIDER)?;
    let api_url = format!("{}/models", cfg.base_url(PROVIDER));
    debug!(api_url = %api_url, "listing openai models");

    let response: ModelsResponse = send_json(
        PROVIDER,
        &api_url,
        client.get(&api_url).bearer_auth(api_key),
    )
    .await?;

    let mut models: Vec<ModelInfo> = response
        .data
        .into_iter()
        .map(|model| ModelInfo {
            created: DateTime::from_timestamp(model.created, 0),
            id: model.id,
            display_name: None,
            owner: model.owned_by,
        })
        .collect();
    models.sort_by(|a, b| a.id.cmp(&b.id));

    Ok(ModelListing {
        provider: PROVIDER,
        models,
        ..ModelListing::default()
    })
}

pub async fn synthesize(
    client: &Client,
    cfg: &Config,
    text: &str,
    format: AudioFormat,
) -> Result<Vec<u8>, ProviderError> {
    let api_key = require_api_key(cfg, PROVIDER)?;
    let api_url = format!("{}/audio/speech", cfg.base_url(PROVIDER));
    let body = SpeechRequest {
        model: SPEECH_MODEL,
        voice: SPEECH_VOICE,
        input: text,
        response_format: format.as_str(),
    };
    debug!(
        api_url = %api_url,
        input_len = text.len(),
        format = format.as_str(),
        "requesting speech synthesis"
    );

    send_bytes(
        PROVIDER,
        &api_url,
        client.post(&api_url).bearer_auth(api_key).json(&body),
    )
    .await
}
