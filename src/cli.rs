use clap::Parser;
use std::path::PathBuf;

use crate::model::{ProviderKind, ReasoningEffort};

#[derive(Debug, Parser)]
#[command(
    name = "ch",
    version,
    about = "Chat with OpenAI and Anthropic models from the terminal",
    long_about = None
)]
pub struct Cli {
    /// Message to send; several words are joined with spaces
    #[arg(short = 'm', long = "message", alias = "messages", num_args = 1.., value_name = "MESSAGE")]
    pub message: Option<Vec<String>>,

    /// System prompt (remembered)
    #[arg(short, long)]
    pub system: Option<String>,

    /// Continue the stored conversation, or start a new one without -m
    #[arg(short, long)]
    pub conversation: bool,

    /// Model name (remembered)
    #[arg(long)]
    pub model: Option<String>,

    /// Sampling temperature (remembered)
    #[arg(short, long, allow_negative_numbers = true)]
    pub temperature: Option<f32>,

    /// Also write the reply as speech to this file
    #[arg(long, value_name = "PATH")]
    pub save_audio: Option<PathBuf>,

    /// List chat models of the selected provider
    #[arg(long)]
    pub available_models: bool,

    /// List OpenAI GPT models
    #[arg(long)]
    pub available_models_gpt: bool,

    /// List the tools the model can call
    #[arg(long)]
    pub available_tools: bool,

    /// Let the model call tools (remembered)
    #[arg(long = "use-tools", overrides_with = "no_tools")]
    enable_tools: bool,

    /// Stop offering tools to the model (remembered)
    #[arg(long = "no-tools", overrides_with = "enable_tools")]
    no_tools: bool,

    /// Reasoning effort for reasoning models (remembered)
    #[arg(short = 'e', long, value_enum)]
    pub reasoning_effort: Option<ReasoningEffort>,

    /// Provider to send requests to (remembered)
    #[arg(short, long, value_enum)]
    pub provider: Option<ProviderKind>,

    /// Upper bound on generated tokens (remembered)
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    pub max_tokens: Option<u32>,
}

impl Cli {
    /// `Some` only when `--use-tools` or `--no-tools` was given; the last one wins.
    pub fn use_tools(&self) -> Option<bool> {
        if self.enable_tools {
            Some(true)
        } else if self.no_tools {
            Some(false)
        } else {
            None
        }
    }

    pub fn message_text(&self) -> Option<String> {
        self.message.as_ref().map(|words| words.join(" "))
    }

    pub fn has_setting_flags(&self) -> bool {
        self.system.is_some()
            || self.model.is_some()
            || self.temperature.is_some()
            || self.use_tools().is_some()
            || self.reasoning_effort.is_some()
            || self.provider.is_some()
            || self.max_tokens.is_some()
    }
}
