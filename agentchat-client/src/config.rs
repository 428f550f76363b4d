//! Widget runtime configuration.
//!
//! Values come from the environment and can be overridden by the query
//! string of the page the widget is embedded with
//! (`?token=...&sessionId=...&allowClose=true&parentOrigin=...`).

use reqwest::Url;
use std::time::Duration;

use crate::capabilities::{KeyValueStore, TOKEN_KEY};
use crate::error::ConfigError;

pub const DEFAULT_EXPORT_TIMEOUT: Duration = Duration::from_secs(10);

/// Failed sends that took at least this long get the time-limit message.
pub const TIME_LIMIT: Duration = Duration::from_secs(180);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WidgetConfig {
    pub api_base: String,
    /// Bearer token in effect. From the environment until [`sync_token`](Self::sync_token) runs.
    pub token: Option<String>,
    /// Token passed on the embed URL; beats stored and environment tokens.
    pub query_token: Option<String>,
    pub initial_session_id: Option<String>,
    pub allow_close: bool,
    /// Target origin for messages to the embedding page; `None` means `*`.
    pub parent_origin: Option<String>,
    pub export_timeout: Duration,
    pub time_limit: Duration,
}

impl Default for WidgetConfig {
    fn default() -> Self {
        Self {
            api_base: String::new(),
            token: None,
            query_token: None,
            initial_session_id: None,
            allow_close: false,
            parent_origin: None,
            export_timeout: DEFAULT_EXPORT_TIMEOUT,
            time_limit: TIME_LIMIT,
        }
    }
}

/// Strip a leading `Bearer ` and surrounding whitespace; empty means none.
pub fn normalize_token(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let token = match trimmed.get(..7) {
        Some(prefix) if prefix.eq_ignore_ascii_case("bearer ") => trimmed[7..].trim(),
        _ => trimmed,
    };
    (!token.is_empty()).then(|| token.to_string())
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

impl WidgetConfig {
    /// Read `AGENTCHAT_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`WidgetConfig::from_env`] with a custom variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = WidgetConfig {
            api_base: non_empty(lookup("AGENTCHAT_API_BASE")).unwrap_or_default(),
            token: lookup("AGENTCHAT_TOKEN").as_deref().and_then(normalize_token),
            initial_session_id: non_empty(lookup("AGENTCHAT_SESSION_ID")),
            allow_close: lookup("AGENTCHAT_ALLOW_CLOSE")
                .is_some_and(|v| v.trim().eq_ignore_ascii_case("true")),
            parent_origin: non_empty(lookup("AGENTCHAT_PARENT_ORIGIN")),
            ..WidgetConfig::default()
        };
        if let Some(raw) = non_empty(lookup("AGENTCHAT_EXPORT_TIMEOUT_MS")) {
            let ms: u64 = raw.parse().map_err(|_| ConfigError::InvalidNumber {
                var: "AGENTCHAT_EXPORT_TIMEOUT_MS",
                value: raw.clone(),
            })?;
            config.export_timeout = Duration::from_millis(ms);
        }
        Ok(config)
    }

    /// Apply overrides from the embed page URL. `token` wins over `bearer`.
    pub fn with_query(mut self, embed_url: &str) -> Result<Self, ConfigError> {
        let url = Url::parse(embed_url).map_err(|e| ConfigError::InvalidUrl(e.to_string()))?;
        let mut token = None;
        let mut bearer = None;
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "token" => token = normalize_token(&value),
                "bearer" => bearer = normalize_token(&value),
                "sessionId" if !value.trim().is_empty() => {
                    self.initial_session_id = Some(value.trim().to_string())
                }
                "allowClose" => self.allow_close = value.eq_ignore_ascii_case("true"),
                "parentOrigin" if !value.trim().is_empty() => {
                    self.parent_origin = Some(value.trim().to_string())
                }
                _ => {}
            }
        }
        if let Some(t) = token.or(bearer) {
            self.query_token = Some(t);
        }
        if self.api_base.is_empty() {
            // Same-origin `/api` proxy
            self.api_base = format!("{}/api", url.origin().ascii_serialization());
        }
        Ok(self)
    }

    /// Resolve the token: query parameter, then `store`, then environment.
    /// A query token is persisted so later loads without it keep working.
    pub fn sync_token(&mut self, store: &dyn KeyValueStore) {
        if let Some(token) = &self.query_token {
            store.set(TOKEN_KEY, token);
            self.token = Some(token.clone());
        } else if let Some(stored) = store.get(TOKEN_KEY).as_deref().and_then(normalize_token) {
            self.token = Some(stored);
        }
    }

    /// Target origin for messages to the embedding page.
    pub fn target_origin(&self) -> &str {
        self.parent_origin.as_deref().unwrap_or("*")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::MemoryStore;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_env_defaults() {
        let config = WidgetConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, WidgetConfig::default());
        assert_eq!(config.export_timeout, Duration::from_secs(10));
        assert_eq!(config.target_origin(), "*");
    }

    #[test]
    fn test_env_values() {
        let config = WidgetConfig::from_lookup(lookup(&[
            ("AGENTCHAT_API_BASE", "https://x.io/api"),
            ("AGENTCHAT_TOKEN", "Bearer abc"),
            ("AGENTCHAT_ALLOW_CLOSE", "TRUE"),
            ("AGENTCHAT_EXPORT_TIMEOUT_MS", "2500"),
        ]))
        .unwrap();
        assert_eq!(config.api_base, "https://x.io/api");
        assert_eq!(config.token.as_deref(), Some("abc"));
        assert!(config.allow_close);
        assert_eq!(config.export_timeout, Duration::from_millis(2500));

        let err = WidgetConfig::from_lookup(lookup(&[("AGENTCHAT_EXPORT_TIMEOUT_MS", "soon")]));
        assert!(matches!(err, Err(ConfigError::InvalidNumber { .. })));
    }

    #[test]
    fn test_query_overrides() {
        let config = WidgetConfig::default()
            .with_query("https://chat.example.com/widget?bearer=Bearer%20xyz&sessionId=s-1&allowClose=true&parentOrigin=https%3A%2F%2Fadmin.example.com")
            .unwrap();
        assert_eq!(config.query_token.as_deref(), Some("xyz"));
        assert_eq!(config.initial_session_id.as_deref(), Some("s-1"));
        assert!(config.allow_close);
        assert_eq!(config.target_origin(), "https://admin.example.com");
        assert_eq!(config.api_base, "https://chat.example.com/api");
    }

    #[test]
    fn test_token_persistence() {
        let store = MemoryStore::default();
        let mut config = WidgetConfig {
            token: Some("from-env".into()),
            query_token: Some("abc".into()),
            ..WidgetConfig::default()
        };
        config.sync_token(&store);
        assert_eq!(config.token.as_deref(), Some("abc"));

        let mut later = WidgetConfig {
            token: Some("from-env".into()),
            ..WidgetConfig::default()
        };
        later.sync_token(&store);
        assert_eq!(later.token.as_deref(), Some("abc"));
    }

    #[test]
    fn test_env_token_is_the_fallback() {
        let store = MemoryStore::default();
        let mut config = WidgetConfig {
            token: Some("from-env".into()),
            ..WidgetConfig::default()
        };
        config.sync_token(&store);
        assert_eq!(config.token.as_deref(), Some("from-env"));
        assert_eq!(store.get(TOKEN_KEY), None);
    }
}
