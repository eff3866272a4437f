//! Environment-supplied configuration, consumed once at startup.
//!
//! Only deployment-level knobs live here. Behavioral limits (iteration cap,
//! tool timeout, output cap, sensitive path prefixes) are compile-time
//! constants next to the code they bound.

use anyhow::Context;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub upstream_base_url: String,
    pub upstream_api_key: String,
    /// Models clients may request. `None` allows everything.
    pub allowed_models: Option<Vec<String>>,
    pub listen_port: u16,
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_listen_port() -> u16 {
    8080
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(&|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: &dyn Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let upstream_api_key = lookup("TOOLGATE_UPSTREAM_API_KEY")
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .context("TOOLGATE_UPSTREAM_API_KEY is not set")?;

        let upstream_base_url = lookup("TOOLGATE_UPSTREAM_BASE_URL")
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(default_base_url);

        let allowed_models = lookup("TOOLGATE_ALLOWED_MODELS")
            .map(|raw| {
                raw.split(',')
                    .map(|m| m.trim().to_string())
                    .filter(|m| !m.is_empty())
                    .collect::<Vec<_>>()
            })
            .filter(|models| !models.is_empty());

        let listen_port = match lookup("TOOLGATE_LISTEN_PORT") {
            Some(raw) => raw
                .trim()
                .parse::<u16>()
                .with_context(|| format!("Invalid TOOLGATE_LISTEN_PORT '{}'", raw))?,
            None => default_listen_port(),
        };

        Ok(Self {
            upstream_base_url,
            upstream_api_key,
            allowed_models,
            listen_port,
        })
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn api_key_is_required() {
        let err = AppConfig::from_lookup(&lookup_from(&[])).unwrap_err();
        assert!(err.to_string().contains("TOOLGATE_UPSTREAM_API_KEY"));
    }

    #[test]
    fn defaults_fill_in_around_the_key() {
        let config =
            AppConfig::from_lookup(&lookup_from(&[("TOOLGATE_UPSTREAM_API_KEY", "sk-test")]))
                .unwrap();
        assert_eq!(config.upstream_base_url, "https://api.openai.com/v1");
        assert_eq!(config.listen_port, 8080);
        assert!(config.allowed_models.is_none());
    }

    #[test]
    fn allowed_models_parses_comma_list() {
        let config = AppConfig::from_lookup(&lookup_from(&[
            ("TOOLGATE_UPSTREAM_API_KEY", "sk-test"),
            ("TOOLGATE_ALLOWED_MODELS", "gpt-4o, gpt-4o-mini ,"),
        ]))
        .unwrap();
        assert_eq!(
            config.allowed_models,
            Some(vec!["gpt-4o".to_string(), "gpt-4o-mini".to_string()])
        );
    }

    #[test]
    fn empty_allowlist_means_allow_everything() {
        let config = AppConfig::from_lookup(&lookup_from(&[
            ("TOOLGATE_UPSTREAM_API_KEY", "sk-test"),
            ("TOOLGATE_ALLOWED_MODELS", " ,, "),
        ]))
        .unwrap();
        assert!(config.allowed_models.is_none());
    }

    #[test]
    fn invalid_port_is_an_error() {
        let err = AppConfig::from_lookup(&lookup_from(&[
            ("TOOLGATE_UPSTREAM_API_KEY", "sk-test"),
            ("TOOLGATE_LISTEN_PORT", "not-a-port"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("TOOLGATE_LISTEN_PORT"));
    }

    #[test]
    fn explicit_values_override_defaults() {
        let config = AppConfig::from_lookup(&lookup_from(&[
            ("TOOLGATE_UPSTREAM_API_KEY", "sk-test"),
            ("TOOLGATE_UPSTREAM_BASE_URL", "http://localhost:11434/v1"),
            ("TOOLGATE_LISTEN_PORT", "9090"),
        ]))
        .unwrap();
        assert_eq!(config.upstream_base_url, "http://localhost:11434/v1");
        assert_eq!(config.listen_port, 9090);
    }
}
