use std::path::PathBuf;

use clap::Parser;
use grok_chat_core::ChatClientConfig;

/// Stream a chat reply from a Grok-compatible API.
///
/// Reads `GROK_API_KEY` (and optionally `GROK_BASE_URL`, `GROK_MODEL`) from
/// the environment or a `.env` file.
#[derive(Debug, Parser)]
#[command(name = "grok-chat", version)]
pub struct Args {
    /// Message to send.
    pub prompt: Option<String>,

    /// Model name, e.g. `grok-3-mini-beta`.
    #[arg(long)]
    pub model: Option<String>,

    /// API base URL.
    #[arg(long)]
    pub base_url: Option<String>,

    #[arg(long)]
    pub temperature: Option<f64>,

    #[arg(long)]
    pub max_tokens: Option<u32>,

    /// Ask for one JSON reply instead of a stream.
    #[arg(long)]
    pub no_stream: bool,

    /// Conversation file to continue. Created if missing; the new exchange
    /// is appended and saved back.
    #[arg(long, value_name = "FILE", conflicts_with = "store")]
    pub transcript: Option<PathBuf>,

    /// Session store holding several conversations. Created if missing.
    #[arg(long, value_name = "FILE")]
    pub store: Option<PathBuf>,

    /// Session to use inside the store; created when no session has this name.
    #[arg(long, value_name = "NAME", requires = "store")]
    pub session: Option<String>,

    /// Import an exported conversation into the store as a new session.
    #[arg(long, value_name = "FILE", requires = "store")]
    pub import: Option<PathBuf>,

    /// List the sessions in the store and exit.
    #[arg(long, requires = "store")]
    pub list_sessions: bool,

    /// Delete the named session from the store and exit.
    #[arg(long, value_name = "NAME", requires = "store")]
    pub delete_session: Option<String>,

    /// Print the final reply as sanitized HTML after streaming it.
    #[arg(long)]
    pub html: bool,

    /// Only verify the API key and exit.
    #[arg(long)]
    pub check_key: bool,
}

impl Args {
    /// Layers flags over an environment-derived config. `transcript_model`
    /// (the model recorded in a loaded or imported export) is used when no
    /// `--model` flag is given.
    pub fn apply(
        &self,
        mut config: ChatClientConfig,
        transcript_model: Option<&str>,
    ) -> ChatClientConfig {
        if let Some(model) = self.model.as_deref().or(transcript_model) {
            config = config.model(model);
        }
        if let Some(base_url) = &self.base_url {
            config = config.base_url(base_url.clone());
        }
        if let Some(temperature) = self.temperature {
            config = config.temperature(temperature);
        }
        if let Some(max_tokens) = self.max_tokens {
            config = config.max_tokens(max_tokens);
        }
        config.stream(!self.no_stream)
    }
}
