use anyhow::{Context, Result};
use chrono::Local;
use std::fs;
use std::io::Write;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::agent::Agent;
use crate::agent::tools::{self, BuiltinRunner};
use crate::cli::Cli;
use crate::format;
use crate::gateway::ChatGateway;
use crate::model::{ChatReply, ChatRequest, Message, ProviderKind, ToolCall};
use crate::providers::ModelFilter;
use crate::providers::openai::AudioFormat;
use crate::session::SessionConfig;

pub const API_ERROR_PLACEHOLDER: &str = "There was an error requesting the API. Please try again.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Success,
    /// The invocation did not name anything to do; usage was printed.
    Usage,
}

/// The session to persist travels back even when the action failed.
#[derive(Debug)]
pub struct Outcome {
    pub config: SessionConfig,
    pub result: Result<Status>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Action {
    ListModels,
    ListGptModels,
    ListTools,
    Chat(String),
    MissingMessage,
    NewConversation,
    SettingsUpdated,
    Usage,
}

fn plan(cli: &Cli) -> Action {
    if cli.available_models {
        Action::ListModels
    } else if cli.available_models_gpt {
        Action::ListGptModels
    } else if cli.available_tools {
        Action::ListTools
    } else if let Some(message) = cli.message_text() {
        Action::Chat(message)
    } else if cli.save_audio.is_some() {
        Action::MissingMessage
    } else if cli.conversation {
        Action::NewConversation
    } else if cli.has_setting_flags() {
        Action::SettingsUpdated
    } else {
        Action::Usage
    }
}

/// Explicit flags win over stored values.
pub fn merge(cli: &Cli, stored: SessionConfig) -> SessionConfig {
    let mut config = stored;
    if let Some(system) = &cli.system {
        config.system = system.clone();
    }
    if let Some(model) = &cli.model {
        config.model = model.clone();
    }
    match cli.temperature {
        Some(temperature) if temperature.is_finite() => config.temperature = temperature,
        Some(temperature) => warn!(temperature, "ignoring non-finite temperature"),
        None => {}
    }
    if let Some(use_tools) = cli.use_tools() {
        config.use_tools = use_tools;
    }
    if let Some(effort) = cli.reasoning_effort {
        config.reasoning_effort = effort;
    }
    if let Some(provider) = cli.provider {
        config.provider = provider;
    }
    if let Some(max_tokens) = cli.max_tokens {
        config.max_tokens = max_tokens;
    }
    config
}

pub async fn run_with<G>(
    cli: &Cli,
    stored: SessionConfig,
    gateway: &G,
    out: &mut dyn Write,
    approve: &mut dyn FnMut(&ToolCall) -> bool,
) -> Outcome
where
    G: ChatGateway + ?Sized,
{
    let mut config = merge(cli, stored);
    let action = plan(cli);
    info!(action = ?action, provider = %config.provider, model = %config.model, "running action");

    let result = match action {
        Action::ListModels => list_models(&config, gateway, out, false).await,
        Action::ListGptModels => list_models(&config, gateway, out, true).await,
        Action::ListTools => list_tools(gateway, out).await,
        Action::Chat(message) => {
            chat_turn(&mut config, cli, message, gateway, out, approve).await
        }
        Action::MissingMessage => usage(
            out,
            "No message specified.\nUsage: ch -m \"Your message.\" --save-audio path_to_file.aac",
        ),
        Action::NewConversation => {
            config.conversation = true;
            config.messages.clear();
            write!(
                out,
                "New conversation started.\nContinue chatting with: ch -c -m \"Your message.\"\n{}",
                format::settings("Current settings:", &config)
            )
            .map(|()| Status::Success)
            .context("Failed to write output")
        }
        Action::SettingsUpdated => write!(out, "{}", format::settings("Settings updated.", &config))
            .map(|()| Status::Success)
            .context("Failed to write output"),
        Action::Usage => usage(out, "Expected some arguments. Usage: ch -m \"Your message\""),
    };

    Outcome { config, result }
}

fn usage(out: &mut dyn Write, text: &str) -> Result<Status> {
    writeln!(out, "{text}").context("Failed to write output")?;
    Ok(Status::Usage)
}

async fn list_models<G>(
    config: &SessionConfig,
    gateway: &G,
    out: &mut dyn Write,
    gpt_only: bool,
) -> Result<Status>
where
    G: ChatGateway + ?Sized,
{
    let (provider, filter) = match (gpt_only, config.provider) {
        (true, _) => (ProviderKind::OpenAi, ModelFilter::GptPrefix),
        (false, ProviderKind::OpenAi) => (ProviderKind::OpenAi, ModelFilter::ChatModels),
        (false, ProviderKind::Anthropic) => (ProviderKind::Anthropic, ModelFilter::Unfiltered),
    };
    let listing = gateway.list_models(provider).await?.filtered(filter);
    debug!(provider = %provider, model_count = listing.models.len(), "listed models");
    writeln!(out, "{}", format::model_table(&listing)).context("Failed to write output")?;
    Ok(Status::Success)
}

async fn list_tools<G>(gateway: &G, out: &mut dyn Write) -> Result<Status>
where
    G: ChatGateway + ?Sized,
{
    let catalog = tools::catalog(gateway.remote_tools().await);
    writeln!(out, "{}", format::tool_list(&catalog)).context("Failed to write output")?;
    Ok(Status::Success)
}

async fn chat_turn<G>(
    config: &mut SessionConfig,
    cli: &Cli,
    message: String,
    gateway: &G,
    out: &mut dyn Write,
    approve: &mut dyn FnMut(&ToolCall) -> bool,
) -> Result<Status>
where
    G: ChatGateway + ?Sized,
{
    let conversation = cli.conversation;
    let mut history = if conversation {
        config.messages.clone()
    } else {
        Vec::new()
    };
    history.push(Message::user(message.as_str()));

    let tools = if config.use_tools {
        tools::catalog(gateway.remote_tools().await)
    } else {
        Vec::new()
    };
    let request = ChatRequest {
        provider: config.provider,
        model: config.model.clone(),
        system: config.system.clone(),
        messages: history.clone(),
        temperature: config.temperature,
        max_tokens: config.max_tokens,
        reasoning_effort: config.reasoning_effort,
        tools,
        exchanges: Vec::new(),
    };

    write!(out, "{}", format::chat_details(config, &message, Local::now()))
        .context("Failed to write output")?;

    let runner = BuiltinRunner;
    let result = Agent::new(gateway, &runner, approve).run_turn(request).await;

    config.conversation = conversation;
    let reply_text = match &result {
        Ok(reply) => reply.text.as_str(),
        Err(_) => API_ERROR_PLACEHOLDER,
    };
    if conversation {
        history.push(Message::assistant(reply_text));
        config.messages = history;
    } else {
        config.messages.clear();
    }

    let mut reply = result?;
    info!(token_count = reply.token_count, "chat turn finished");
    write!(
        out,
        "{}{}\n{}\n",
        format::response_header(),
        reply.text.trim(),
        format::token_use(reply.token_count)
    )
    .context("Failed to write output")?;

    if let Some(path) = &cli.save_audio {
        attach_speech(&mut reply, AudioFormat::from_path(path), gateway).await?;
        write_audio(&reply, path)?;
        writeln!(out, "Audio saved to {}", path.display()).context("Failed to write output")?;
    }
    Ok(Status::Success)
}

async fn attach_speech<G>(reply: &mut ChatReply, format: AudioFormat, gateway: &G) -> Result<()>
where
    G: ChatGateway + ?Sized,
{
    let audio = gateway.synthesize(&reply.text, format).await?;
    debug!(format = format.as_str(), bytes = audio.len(), "synthesized speech");
    reply.audio = Some(audio);
    Ok(())
}

fn write_audio(reply: &ChatReply, path: &Path) -> Result<()> {
    let audio = reply.audio.as_deref().unwrap_or_default();
    fs::write(path, audio)
        .with_context(|| format!("Failed to write audio file '{}'", path.display()))
}
