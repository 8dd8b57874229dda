use std::error::Error as StdError;
use std::io::ErrorKind;

use super::ProviderError;
use crate::model::ProviderKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TransportFailure {
    TimedOut,
    Refused,
    Unreachable,
    Other,
}

/// Walks the source chain looking for an io error of `kind` or a message containing `needle`.
fn chain_matches(err: &(dyn StdError + 'static), kind: ErrorKind, needle: &str) -> bool {
    let mut current = Some(err);
    while let Some(source) = current {
        let io_match = source
            .downcast_ref::<std::io::Error>()
            .is_some_and(|io_err| io_err.kind() == kind);
        if io_match || source.to_string().to_ascii_lowercase().contains(needle) {
            return true;
        }
        current = source.source();
    }
    false
}

fn classify(err: &reqwest::Error) -> TransportFailure {
    if err.is_timeout() || chain_matches(err, ErrorKind::TimedOut, "timed out") {
        TransportFailure::TimedOut
    } else if err.is_connect()
        && chain_matches(err, ErrorKind::ConnectionRefused, "connection refused")
    {
        TransportFailure::Refused
    } else if err.is_connect() {
        TransportFailure::Unreachable
    } else {
        TransportFailure::Other
    }
}

fn base_url_env(provider: ProviderKind) -> &'static str {
    match provider {
        ProviderKind::OpenAi => "OPENAI_BASE_URL",
        ProviderKind::Anthropic => "ANTHROPIC_BASE_URL",
    }
}

pub(crate) fn model_api_request_error(
    err: reqwest::Error,
    provider: ProviderKind,
    api_url: &str,
) -> ProviderError {
    let name = provider.display_name();
    let message = match classify(&err) {
        TransportFailure::TimedOut => format!("Request to the {name} API at '{api_url}' timed out."),
        TransportFailure::Refused => format!(
            "Connection refused by the {name} API at '{api_url}'. Check {} and network connectivity.",
            base_url_env(provider)
        ),
        TransportFailure::Unreachable => format!(
            "Failed to connect to the {name} API at '{api_url}'. Check your internet connection and firewall."
        ),
        TransportFailure::Other => format!("Failed to call the {name} API at '{api_url}': {err}"),
    };

    ProviderError::Connection { provider, message }
}
