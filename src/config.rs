use std::env;
use std::path::PathBuf;

use crate::model::ProviderKind;

const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com/v1";
const DEFAULT_SESSION_FILE_NAME: &str = ".chatconfig.json";

/// Process-level settings taken from the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub openai_api_key: Option<String>,
    pub anthropic_api_key: Option<String>,
    pub openai_base_url: String,
    pub anthropic_base_url: String,
    pub tools_url: Option<String>,
    pub session_path: PathBuf,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_env_with(|key| env::var(key).ok())
    }

    pub(crate) fn from_env_with(mut get_var: impl FnMut(&str) -> Option<String>) -> Self {
        let mut get = |key: &str| non_blank(get_var(key));

        let openai_api_key = get("OPENAI_API_KEY");
        let anthropic_api_key = get("ANTHROPIC_API_KEY");
        let openai_base_url = parse_base_url(get("OPENAI_BASE_URL"), DEFAULT_OPENAI_BASE_URL);
        let anthropic_base_url =
            parse_base_url(get("ANTHROPIC_BASE_URL"), DEFAULT_ANTHROPIC_BASE_URL);
        let tools_url = get("TOOLS_URL");
        let session_path = get("CHAT_CONFIG_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(default_session_path);

        Self {
            openai_api_key,
            anthropic_api_key,
            openai_base_url,
            anthropic_base_url,
            tools_url,
            session_path,
        }
    }

    pub fn api_key(&self, provider: ProviderKind) -> Option<&str> {
        match provider {
            ProviderKind::OpenAi => self.openai_api_key.as_deref(),
            ProviderKind::Anthropic => self.anthropic_api_key.as_deref(),
        }
    }

    pub fn base_url(&self, provider: ProviderKind) -> &str {
        match provider {
            ProviderKind::OpenAi => &self.openai_base_url,
            ProviderKind::Anthropic => &self.anthropic_base_url,
        }
    }
}

fn non_blank(raw: Option<String>) -> Option<String> {
    raw.map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_base_url(raw: Option<String>, default: &str) -> String {
    raw.as_deref()
        .unwrap_or(default)
        .trim_end_matches('/')
        .to_string()
}

fn default_session_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(DEFAULT_SESSION_FILE_NAME)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::path::PathBuf;

    use super::{Config, DEFAULT_ANTHROPIC_BASE_URL, DEFAULT_OPENAI_BASE_URL, parse_base_url};
    use crate::model::ProviderKind;

    fn config_from_pairs(pairs: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| ((*key).to_string(), (*value).to_string()))
            .collect();
        Config::from_env_with(|key| vars.get(key).cloned())
    }

    #[test]
    fn from_env_uses_defaults_when_vars_are_missing() {
        let cfg = config_from_pairs(&[]);
        assert_eq!(cfg.openai_api_key, None);
        assert_eq!(cfg.anthropic_api_key, None);
        assert_eq!(cfg.openai_base_url, DEFAULT_OPENAI_BASE_URL);
        assert_eq!(cfg.anthropic_base_url, DEFAULT_ANTHROPIC_BASE_URL);
        assert_eq!(cfg.tools_url, None);
        assert!(cfg.session_path.ends_with(".chatconfig.json"));
    }

    #[test]
    fn from_env_reads_configured_values() {
        let cfg = config_from_pairs(&[
            ("OPENAI_API_KEY", "sk-openai"),
            ("ANTHROPIC_API_KEY", "sk-ant"),
            ("OPENAI_BASE_URL", "http://127.0.0.1:9999/v1/"),
            ("ANTHROPIC_BASE_URL", "http://127.0.0.1:9998/v1"),
            ("TOOLS_URL", "https://example.com/tools.json"),
            ("CHAT_CONFIG_PATH", "/tmp/chat.json"),
        ]);

        assert_eq!(cfg.api_key(ProviderKind::OpenAi), Some("sk-openai"));
        assert_eq!(cfg.api_key(ProviderKind::Anthropic), Some("sk-ant"));
        assert_eq!(
            cfg.base_url(ProviderKind::OpenAi),
            "http://127.0.0.1:9999/v1"
        );
        assert_eq!(
            cfg.base_url(ProviderKind::Anthropic),
            "http://127.0.0.1:9998/v1"
        );
        assert_eq!(
            cfg.tools_url.as_deref(),
            Some("https://example.com/tools.json")
        );
        assert_eq!(cfg.session_path, PathBuf::from("/tmp/chat.json"));
    }

    #[test]
    fn from_env_treats_blank_values_as_unset() {
        let cfg = config_from_pairs(&[("ANTHROPIC_API_KEY", "   "), ("TOOLS_URL", "")]);
        assert_eq!(cfg.api_key(ProviderKind::Anthropic), None);
        assert_eq!(cfg.tools_url, None);
    }

    #[test]
    fn parse_base_url_trims_trailing_slashes() {
        assert_eq!(
            parse_base_url(Some("http://localhost:8080//".to_string()), "unused"),
            "http://localhost:8080"
        );
        assert_eq!(parse_base_url(None, "http://default/"), "http://default");
    }
}
