use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Remote vendor a request is sent to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    #[value(name = "openai")]
    OpenAi,
    Anthropic,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::OpenAi => "OpenAI",
            Self::Anthropic => "Anthropic",
        }
    }

    pub fn api_key_env(&self) -> &'static str {
        match self {
            Self::OpenAi => "OPENAI_API_KEY",
            Self::Anthropic => "ANTHROPIC_API_KEY",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ReasoningEffort {
    #[default]
    Low,
    Medium,
    High,
}

impl ReasoningEffort {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl fmt::Display for ReasoningEffort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }
}

/// A tool the model may call, described by a JSON schema for its arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolResult {
    pub call_id: String,
    pub content: String,
}

/// One completed tool round: the provider-native assistant message that
/// requested the tools, followed by the results sent back for each call.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolExchange {
    pub assistant: Value,
    pub results: Vec<ToolResult>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub provider: ProviderKind,
    pub model: String,
    pub system: String,
    pub messages: Vec<Message>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub reasoning_effort: ReasoningEffort,
    pub tools: Vec<ToolSpec>,
    pub exchanges: Vec<ToolExchange>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatReply {
    pub text: String,
    pub token_count: u64,
    pub tool_calls: Vec<ToolCall>,
    /// Assistant message to echo back when `tool_calls` is non-empty.
    pub echo: Option<Value>,
    /// Synthesized speech for `text`, filled only when audio was requested.
    pub audio: Option<Vec<u8>>,
}

/// OpenAI `o1`, `o3-mini`, `o4-mini`, and friends.
pub fn is_openai_reasoning_model(model: &str) -> bool {
    let mut chars = model.chars();
    chars.next() == Some('o') && chars.next().is_some_and(|c| c.is_ascii_digit())
}

const ANTHROPIC_THINKING_PREFIXES: [&str; 3] =
    ["claude-opus-4", "claude-sonnet-4", "claude-3-7-sonnet"];

pub fn is_anthropic_thinking_model(model: &str) -> bool {
    ANTHROPIC_THINKING_PREFIXES
        .iter()
        .any(|prefix| model.starts_with(prefix))
}

pub fn is_reasoning_model(model: &str) -> bool {
    is_openai_reasoning_model(model) || is_anthropic_thinking_model(model)
}

#[cfg(test)]
mod tests {
    use super::{
        ProviderKind, ReasoningEffort, is_anthropic_thinking_model, is_openai_reasoning_model,
        is_reasoning_model,
    };

    #[test]
    fn openai_reasoning_models_are_o_followed_by_digit() {
        assert!(is_openai_reasoning_model("o1"));
        assert!(is_openai_reasoning_model("o3-mini"));
        assert!(is_openai_reasoning_model("o4-mini-2025-04-16"));
        assert!(!is_openai_reasoning_model("gpt-4o"));
        assert!(!is_openai_reasoning_model("omni"));
        assert!(!is_openai_reasoning_model("o"));
    }

    #[test]
    fn anthropic_thinking_models_match_known_families() {
        assert!(is_anthropic_thinking_model("claude-sonnet-4-20250514"));
        assert!(is_anthropic_thinking_model("claude-3-7-sonnet-latest"));
        assert!(!is_anthropic_thinking_model("claude-3-5-haiku-latest"));
        assert!(is_reasoning_model("claude-opus-4-1"));
        assert!(!is_reasoning_model("gpt-3.5-turbo"));
    }

    #[test]
    fn enums_serialize_to_lowercase_names() {
        assert_eq!(
            serde_json::to_string(&ProviderKind::OpenAi).expect("serialize"),
            "\"openai\""
        );
        assert_eq!(
            serde_json::from_str::<ReasoningEffort>("\"high\"").expect("deserialize"),
            ReasoningEffort::High
        );
    }
}
