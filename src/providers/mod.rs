pub mod anthropic;
pub(crate) mod http_errors;
pub mod openai;

use chrono::{DateTime, Utc};
use reqwest::RequestBuilder;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

use crate::config::Config;
use crate::model::ProviderKind;
use http_errors::model_api_request_error;

/// Every failure talking to a vendor API collapses into this type.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Environment variable \"{env}\" not set; it is required for the {} provider.", .provider.display_name())]
    MissingApiKey {
        provider: ProviderKind,
        env: &'static str,
    },

    #[error("{message}")]
    Connection {
        provider: ProviderKind,
        message: String,
    },

    #[error("{} API returned status {status}: {message}", .provider.display_name())]
    Api {
        provider: ProviderKind,
        status: u16,
        message: String,
    },

    #[error("Unexpected {} response: {message}", .provider.display_name())]
    Response {
        provider: ProviderKind,
        message: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Authentication,
    Connection,
    NotFound,
    RateLimit,
    Status,
    ResponseFormat,
}

impl ProviderError {
    pub fn response(provider: ProviderKind, message: impl Into<String>) -> Self {
        Self::Response {
            provider,
            message: message.into(),
        }
    }

    pub fn provider(&self) -> ProviderKind {
        match self {
            Self::MissingApiKey { provider, .. }
            | Self::Connection { provider, .. }
            | Self::Api { provider, .. }
            | Self::Response { provider, .. } => *provider,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingApiKey { .. } => ErrorKind::Authentication,
            Self::Connection { .. } => ErrorKind::Connection,
            Self::Api { status, .. } => match status {
                401 | 403 => ErrorKind::Authentication,
                404 => ErrorKind::NotFound,
                429 => ErrorKind::RateLimit,
                _ => ErrorKind::Status,
            },
            Self::Response { .. } => ErrorKind::ResponseFormat,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelInfo {
    pub id: String,
    pub display_name: Option<String>,
    pub owner: Option<String>,
    pub created: Option<DateTime<Utc>>,
}

/// Which subset of a raw listing is shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ModelFilter {
    #[default]
    Unfiltered,
    ChatModels,
    GptPrefix,
}

impl ModelFilter {
    pub fn keeps(&self, id: &str) -> bool {
        match self {
            Self::Unfiltered => true,
            Self::ChatModels => openai::is_chat_model(id),
            Self::GptPrefix => id.starts_with("gpt"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ModelListing {
    pub provider: ProviderKind,
    pub models: Vec<ModelInfo>,
    pub has_more: bool,
    pub filter: ModelFilter,
}

impl ModelListing {
    pub fn filtered(mut self, filter: ModelFilter) -> Self {
        self.models.retain(|model| filter.keeps(&model.id));
        self.filter = filter;
        self
    }
}

pub(crate) fn require_api_key(cfg: &Config, provider: ProviderKind) -> Result<&str, ProviderError> {
    cfg.api_key(provider)
        .ok_or(ProviderError::MissingApiKey {
            provider,
            env: provider.api_key_env(),
        })
}

/// Pulls `error.message` out of a vendor error body, falling back to the raw text.
pub(crate) fn vendor_message(body: &str) -> String {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let message = parsed.as_ref().and_then(|value| {
        let error = value.get("error")?;
        error
            .get("message")
            .and_then(Value::as_str)
            .or_else(|| error.as_str())
            .map(str::to_string)
    });

    match message {
        Some(message) => message,
        None if body.trim().is_empty() => "<empty response body>".to_string(),
        None => body.trim().to_string(),
    }
}

async fn send_checked(
    provider: ProviderKind,
    api_url: &str,
    request: RequestBuilder,
) -> Result<reqwest::Response, ProviderError> {
    let response = request.send().await.map_err(|err| {
        warn!(
            provider = %provider,
            api_url = %api_url,
            error = %err,
            "provider request failed"
        );
        model_api_request_error(err, provider, api_url)
    })?;

    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<failed to read response body>".to_string());
    warn!(
        provider = %provider,
        api_url = %api_url,
        status = %status,
        response_body_len = body.len(),
        "provider returned non-success status"
    );
    Err(ProviderError::Api {
        provider,
        status: status.as_u16(),
        message: vendor_message(&body),
    })
}

pub(crate) async fn send_json<T: DeserializeOwned>(
    provider: ProviderKind,
    api_url: &str,
    request: RequestBuilder,
) -> Result<T, ProviderError> {
    let response = send_checked(provider, api_url, request).await?;
    response.json().await.map_err(|err| {
        ProviderError::response(provider, format!("failed to parse response body: {err}"))
    })
}

pub(crate) async fn send_bytes(
    provider: ProviderKind,
    api_url: &str,
    request: RequestBuilder,
) -> Result<Vec<u8>, ProviderError> {
    let response = send_checked(provider, api_url, request).await?;
    let bytes = response.bytes().await.map_err(|err| {
        ProviderError::response(provider, format!("failed to read response body: {err}"))
    })?;
    Ok(bytes.to_vec())
}
