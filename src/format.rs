use chrono::{DateTime, Local};
use console::style;
use serde_json::{Value, json};

use crate::model::{ProviderKind, ToolCall, ToolSpec, is_reasoning_model};
use crate::providers::{ErrorKind, ModelFilter, ModelListing, ProviderError};
use crate::session::SessionConfig;

const LABEL_WIDTH: usize = 12;
const PROMPT_WIDTH: usize = 68;
const PROMPT_MAX_LINES: usize = 4;
const BOX_WIDTH: usize = 60;
const BOX_TEXT_WIDTH: usize = BOX_WIDTH - 6;

/// Greedy word wrap; returns at most `max_lines` lines plus the number cut off.
pub fn wrap_text(text: &str, width: usize, max_lines: usize) -> (Vec<String>, usize) {
    let mut lines: Vec<String> = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        let mut word: Vec<char> = word.chars().collect();
        while word.len() > width {
            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            lines.push(word.drain(..width).collect());
        }
        if word.is_empty() {
            continue;
        }
        let word: String = word.into_iter().collect();
        let needed = if current.is_empty() {
            word.chars().count()
        } else {
            current.chars().count() + 1 + word.chars().count()
        };
        if needed > width && !current.is_empty() {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(&word);
    }
    if !current.is_empty() {
        lines.push(current);
    }

    let remaining = lines.len().saturating_sub(max_lines);
    lines.truncate(max_lines);
    (lines, remaining)
}

fn section_header(text: &str) -> String {
    format!("\n{}\n", style(text).bold())
}

fn bullet(label: &str, value: impl std::fmt::Display) -> String {
    let label = format!("{label}:");
    format!(
        "  {} {label:<LABEL_WIDTH$} {}\n",
        style("•").color256(136),
        style(value).bold()
    )
}

fn wrapped_block(title: &str, text: &str) -> String {
    let mut out = section_header(title);
    let (lines, remaining) = wrap_text(text, PROMPT_WIDTH, PROMPT_MAX_LINES);
    for line in lines {
        out.push_str(&format!("  {line}\n"));
    }
    if remaining > 0 {
        out.push_str(&format!(
            "  {}\n",
            style(format!("... ({remaining} more lines)")).color256(236)
        ));
    }
    out
}

fn config_items(config: &SessionConfig) -> String {
    let mut out = bullet("Provider", config.provider);
    out.push_str(&bullet("Model", &config.model));
    if is_reasoning_model(&config.model) {
        out.push_str(&bullet("Reasoning", config.reasoning_effort));
    }
    out.push_str(&bullet("Max tokens", config.max_tokens));
    out.push_str(&bullet("Temperature", format!("{:?}", config.temperature)));
    out.push_str(&bullet(
        "Tools",
        if config.use_tools { "Enabled" } else { "Disabled" },
    ));
    out.push_str(&wrapped_block("System Prompt", &config.system));
    out
}

pub fn chat_details(config: &SessionConfig, message: &str, now: DateTime<Local>) -> String {
    let mut out = format!(
        "\n{} • {}\n\n{}\n",
        style("CHAT").color256(24).bold(),
        style(now.format("%Y-%m-%d %H:%M:%S")).color256(236),
        style("Configuration").bold()
    );
    out.push_str(&config_items(config));
    out.push_str(&wrapped_block("Latest User Message", message));
    out
}

pub fn settings(header: &str, config: &SessionConfig) -> String {
    let mut out = section_header(header);
    out.push_str(&config_items(config));
    out
}

pub fn response_header() -> String {
    format!("\n{}\n", style("MODEL RESPONSE:").color256(24).bold())
}

pub fn token_use(tokens: u64) -> String {
    format!(
        "\n{} {}",
        style("Tokens used:").color256(236),
        style(tokens).bold()
    )
}

fn display_json(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

pub fn tool_use(call: &ToolCall) -> String {
    let mut text = format!("Executing tool {}", style(&call.name).bold());
    match call.arguments.as_object().filter(|args| !args.is_empty()) {
        Some(args) => {
            text.push_str(" with args:\n");
            for (key, value) in args {
                text.push_str(&format!("• {key}: {}\n", display_json(value)));
            }
        }
        None => text.push_str(".\n"),
    }
    format!("\n{}", style(text).color256(23))
}

pub fn tool_list(tools: &[ToolSpec]) -> String {
    if tools.is_empty() {
        return "No tools are currently available.".to_string();
    }
    tools
        .iter()
        .map(|tool| {
            let entry = json!({
                "name": tool.name,
                "description": tool.description,
                "parameters": tool.parameters,
            });
            serde_json::to_string_pretty(&entry).unwrap_or_else(|_| entry.to_string())
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn created_date(created: Option<DateTime<chrono::Utc>>) -> String {
    created
        .map(|date| date.format("%B %d, %Y").to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

pub fn model_table(listing: &ModelListing) -> String {
    let (title, second, third, empty) = match (listing.provider, listing.filter) {
        (ProviderKind::OpenAi, ModelFilter::ChatModels) => (
            "AVAILABLE OPENAI CHAT MODELS",
            "OWNER",
            "CREATED",
            "No chat models available.",
        ),
        (ProviderKind::OpenAi, ModelFilter::GptPrefix) => (
            "AVAILABLE OPENAI GPT MODELS",
            "OWNER",
            "CREATED",
            "No GPT models available.",
        ),
        (ProviderKind::OpenAi, ModelFilter::Unfiltered) => (
            "AVAILABLE OPENAI MODELS",
            "OWNER",
            "CREATED",
            "No models available.",
        ),
        (ProviderKind::Anthropic, _) => (
            "AVAILABLE ANTHROPIC MODELS",
            "DISPLAY NAME",
            "RELEASE DATE",
            "No models available.",
        ),
    };
    if listing.models.is_empty() {
        return empty.to_string();
    }

    let rows: Vec<(&str, &str, String)> = listing
        .models
        .iter()
        .map(|model| {
            let detail = match listing.provider {
                ProviderKind::OpenAi => model.owner.as_deref(),
                ProviderKind::Anthropic => model.display_name.as_deref(),
            };
            (
                model.id.as_str(),
                detail.unwrap_or("-"),
                created_date(model.created),
            )
        })
        .collect();

    let id_width = rows
        .iter()
        .map(|row| row.0.chars().count())
        .max()
        .unwrap_or(0)
        .max("MODEL ID".len())
        + 2;
    let detail_width = rows
        .iter()
        .map(|row| row.1.chars().count())
        .max()
        .unwrap_or(0)
        .max(second.len())
        + 2;

    let header = format!("{:<id_width$} | {second:<detail_width$} | {third}", "MODEL ID");
    let rule = "-".repeat(header.chars().count());
    let mut out = format!("\n=== {title} ===\n\n{header}\n{rule}\n");
    for (id, detail, date) in &rows {
        out.push_str(&format!("{id:<id_width$} | {detail:<detail_width$} | {date}\n"));
    }
    out.push_str(&format!("\n{rule}\n"));

    match (listing.provider, listing.filter) {
        (ProviderKind::OpenAi, ModelFilter::ChatModels) => {
            out.push_str(&format!("Total chat models shown: {}\n", rows.len()));
            out.push_str(
                "Note: Only chat-compatible models are shown (gpt-, o1-, o3-, o4- prefixes).\n",
            );
        }
        (ProviderKind::OpenAi, ModelFilter::GptPrefix) => {
            out.push_str(&format!("Total GPT models shown: {}\n", rows.len()));
            out.push_str("Note: Every model whose id starts with gpt is shown.\n");
        }
        (ProviderKind::OpenAi, ModelFilter::Unfiltered) => {
            out.push_str(&format!("Total models shown: {}\n", rows.len()));
            out.push_str("To check all available models, refer to the OpenAI documentation.\n");
        }
        (ProviderKind::Anthropic, _) => {
            if listing.has_more {
                out.push_str("Note: More models are available. These are the most recent models.\n");
            }
            out.push_str(&format!("Total models shown: {}\n", rows.len()));
            out.push_str("To check all available models, refer to the Anthropic documentation.\n");
        }
    }
    out
}

struct ErrorBox {
    title: &'static str,
    intro: &'static str,
    what: String,
    steps: Vec<String>,
}

fn error_box(err: &ProviderError) -> ErrorBox {
    let provider = err.provider();
    match err.kind() {
        ErrorKind::Authentication => ErrorBox {
            title: "AUTHENTICATION ERROR",
            intro: "The API credentials are missing or were rejected.",
            what: format!("The {} API could not authenticate the request.", provider.display_name()),
            steps: vec![
                format!("Check that {} is set", provider.api_key_env()),
                "Verify your API key is valid and not expired".to_string(),
                "Confirm the key belongs to the selected provider".to_string(),
                "Switch providers with -p if needed".to_string(),
            ],
        },
        ErrorKind::Connection => ErrorBox {
            title: "CONNECTION ERROR",
            intro: "Unable to connect to the API server.",
            what: "The application couldn't reach the server.".to_string(),
            steps: vec![
                "Check your internet connection".to_string(),
                "Verify your firewall isn't blocking the connection".to_string(),
                "Confirm the API endpoint is correct".to_string(),
                "Try again in a few minutes".to_string(),
            ],
        },
        ErrorKind::NotFound => ErrorBox {
            title: "NOT FOUND ERROR",
            intro: "The requested resource was not found.",
            what: "The API couldn't find the resource you're looking for. This often means an invalid model name or endpoint.".to_string(),
            steps: vec![
                "Check that you've specified a valid model name".to_string(),
                "Ensure the model is available for your provider".to_string(),
                "Verify you have permission to access this resource".to_string(),
                "List models with ch --available-models".to_string(),
            ],
        },
        ErrorKind::RateLimit => ErrorBox {
            title: "RATE LIMIT ERROR",
            intro: "API rate limit has been exceeded.",
            what: "The API returned a 429 status code, indicating you've hit the request rate limits.".to_string(),
            steps: vec![
                "Reduce the frequency of your API calls".to_string(),
                "Wait a moment before trying again".to_string(),
                "Check your API usage limits in your account".to_string(),
                "Consider upgrading your API tier if available".to_string(),
            ],
        },
        ErrorKind::Status => ErrorBox {
            title: "API STATUS ERROR",
            intro: "The API rejected the request.",
            what: "The API returned an error status code.".to_string(),
            steps: vec![
                "Check the error details above".to_string(),
                "Verify your API key is valid and not expired".to_string(),
                "Ensure your request settings are correct".to_string(),
                "If persistent, check API service status".to_string(),
            ],
        },
        ErrorKind::ResponseFormat => ErrorBox {
            title: "UNEXPECTED RESPONSE",
            intro: "The API answered in a form this client can't use.",
            what: "The response was missing content or had an unknown shape.".to_string(),
            steps: vec![
                "Check the error details above".to_string(),
                "Try a different model".to_string(),
                "Raise max tokens if the reply was cut off".to_string(),
                "Try again or report the issue if it persists".to_string(),
            ],
        },
    }
}

fn box_lines(text: &str) -> Vec<String> {
    let (lines, _) = wrap_text(text, BOX_TEXT_WIDTH, usize::MAX);
    lines
        .into_iter()
        .map(|line| format!("  {line:<BOX_TEXT_WIDTH$}  "))
        .collect()
}

/// Titled box with troubleshooting steps.
pub fn provider_error(err: &ProviderError) -> String {
    let details = error_box(err);
    let empty = " ".repeat(BOX_WIDTH);

    let mut parts = vec![
        format!("\n─────────────────── {} ───────────────────", details.title),
        empty.clone(),
    ];
    parts.extend(box_lines(details.intro));
    parts.push(empty.clone());
    parts.extend(box_lines(&format!("What happened: {}", details.what)));
    parts.push(empty.clone());
    parts.extend(box_lines(&format!("Details: {err}")));
    parts.push(empty.clone());
    parts.extend(box_lines("Troubleshooting steps:"));
    for (index, step) in details.steps.iter().enumerate() {
        parts.extend(box_lines(&format!("{}. {step}", index + 1)));
    }
    parts.push(empty);

    style(parts.join("\n")).for_stderr().color256(124).to_string()
}

pub fn error_report(err: &anyhow::Error) -> String {
    match err.downcast_ref::<ProviderError>() {
        Some(provider_err) => provider_error(provider_err),
        None => format!("{} {err:#}", style("Error:").for_stderr().color256(124).bold()),
    }
}
