use reqwest::Client;
use std::future::Future;
use std::pin::Pin;
use tracing::debug;

use crate::agent::tools;
use crate::config::Config;
use crate::model::{ChatReply, ChatRequest, ProviderKind, ToolSpec};
use crate::providers::openai::AudioFormat;
use crate::providers::{self, ModelListing, ProviderError};

pub type GatewayFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, ProviderError>> + 'a>>;
pub type CatalogFuture<'a> = Pin<Box<dyn Future<Output = Vec<ToolSpec>> + 'a>>;

/// Everything the orchestrator needs from the outside world.
pub trait ChatGateway {
    fn chat<'a>(&'a self, request: &'a ChatRequest) -> GatewayFuture<'a, ChatReply>;

    fn list_models<'a>(&'a self, provider: ProviderKind) -> GatewayFuture<'a, ModelListing>;

    fn synthesize<'a>(&'a self, text: &'a str, format: AudioFormat) -> GatewayFuture<'a, Vec<u8>>;

    /// Remote tool definitions; failures are logged and yield an empty list.
    fn remote_tools<'a>(&'a self) -> CatalogFuture<'a>;
}

pub struct HostGateway<'a> {
    client: &'a Client,
    cfg: &'a Config,
}

impl<'a> HostGateway<'a> {
    pub fn new(client: &'a Client, cfg: &'a Config) -> Self {
        Self { client, cfg }
    }
}

impl ChatGateway for HostGateway<'_> {
    fn chat<'a>(&'a self, request: &'a ChatRequest) -> GatewayFuture<'a, ChatReply> {
        Box::pin(async move {
            debug!(
                provider = %request.provider,
                model = %request.model,
                message_count = request.messages.len(),
                "dispatching chat request"
            );
            match request.provider {
                ProviderKind::OpenAi => providers::openai::chat(self.client, self.cfg, request).await,
                ProviderKind::Anthropic => {
                    providers::anthropic::chat(self.client, self.cfg, request).await
                }
            }
        })
    }

    fn list_models<'a>(&'a self, provider: ProviderKind) -> GatewayFuture<'a, ModelListing> {
        Box::pin(async move {
            match provider {
                ProviderKind::OpenAi => providers::openai::list_models(self.client, self.cfg).await,
                ProviderKind::Anthropic => {
                    providers::anthropic::list_models(self.client, self.cfg).await
                }
            }
        })
    }

    fn synthesize<'a>(&'a self, text: &'a str, format: AudioFormat) -> GatewayFuture<'a, Vec<u8>> {
        Box::pin(providers::openai::synthesize(
            self.client,
            self.cfg,
            text,
            format,
        ))
    }

    fn remote_tools<'a>(&'a self) -> CatalogFuture<'a> {
        Box::pin(tools::fetch_catalog(
            self.client,
            self.cfg.tools_url.as_deref(),
        ))
    }
}
