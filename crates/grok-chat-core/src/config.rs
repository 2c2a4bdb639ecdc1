use std::fmt;
use std::time::Duration;

use crate::errors::ChatError;
use crate::observability::redact_secret;

pub const DEFAULT_BASE_URL: &str = "https://api.x.ai";
pub const DEFAULT_MODEL: &str = "grok-3-mini-beta";

/// Configuration for [`ChatClient`](crate::ChatClient).
#[derive(Clone)]
pub struct ChatClientConfig {
    /// Opaque bearer token.
    pub api_key: String,
    /// Base URL of the OpenAI-compatible endpoint. Useful for proxies or
    /// local test servers.
    pub base_url: String,
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
    /// Request a streamed (SSE) response. When false the client falls back
    /// to a single JSON completion.
    pub stream: bool,
    pub connect_timeout: Duration,
    /// Optional cap on the whole request, body included. Unset by default
    /// because long replies stream for minutes.
    pub request_timeout: Option<Duration>,
    /// Bounded event buffer between the exchange task and its consumer.
    pub event_buffer_capacity: usize,
}

impl ChatClientConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            temperature: 0.7,
            max_tokens: 8192,
            stream: true,
            connect_timeout: Duration::from_secs(30),
            request_timeout: None,
            event_buffer_capacity: 128,
        }
    }

    /// Builds a config from `GROK_API_KEY`, honouring the optional
    /// `GROK_BASE_URL` and `GROK_MODEL` overrides.
    pub fn from_env() -> Result<Self, ChatError> {
        let api_key = std::env::var("GROK_API_KEY").unwrap_or_default();
        if api_key.trim().is_empty() {
            return Err(ChatError::Config("missing GROK_API_KEY".into()));
        }
        let mut config = Self::new(api_key.trim());
        if let Some(base_url) = non_empty_env("GROK_BASE_URL") {
            config.base_url = base_url;
        }
        if let Some(model) = non_empty_env("GROK_MODEL") {
            config.model = model;
        }
        Ok(config)
    }

    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn stream(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn event_buffer_capacity(mut self, capacity: usize) -> Self {
        self.event_buffer_capacity = capacity;
        self
    }

    /// Checks values that would otherwise only fail at request time.
    pub fn validate(&self) -> Result<(), ChatError> {
        if self.api_key.trim().is_empty() {
            return Err(ChatError::Config("api_key must not be empty".into()));
        }
        if self.model.trim().is_empty() {
            return Err(ChatError::Config("model must not be empty".into()));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ChatError::Config(format!(
                "temperature must be within 0.0..=2.0, got {}",
                self.temperature
            )));
        }
        if self.max_tokens == 0 {
            return Err(ChatError::Config("max_tokens must be greater than 0".into()));
        }
        if self.event_buffer_capacity == 0 {
            return Err(ChatError::Config(
                "event_buffer_capacity must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    pub(crate) fn chat_completions_url(&self) -> String {
        format!("{}/v1/chat/completions", self.base_url.trim_end_matches('/'))
    }

    pub(crate) fn models_url(&self) -> String {
        format!("{}/v1/models", self.base_url.trim_end_matches('/'))
    }
}

impl fmt::Debug for ChatClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatClientConfig")
            .field("api_key", &redact_secret(&self.api_key))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("stream", &self.stream)
            .field("connect_timeout", &self.connect_timeout)
            .field("request_timeout", &self.request_timeout)
            .field("event_buffer_capacity", &self.event_buffer_capacity)
            .finish()
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
