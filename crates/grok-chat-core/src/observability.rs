use std::path::PathBuf;

use once_cell::sync::OnceCell;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

static INIT: OnceCell<()> = OnceCell::new();

const ENABLED_VAR: &str = "GROK_CHAT_OBSERVABILITY_ENABLED";
const LEVEL_VAR: &str = "GROK_CHAT_LOG_LEVEL";
const JSON_PATH_VAR: &str = "GROK_CHAT_JSON_LOG_PATH";
const DEFAULT_JSON_FILE: &str = "grok-chat.logs.jsonl";

/// Logging settings resolved from the environment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogSettings {
    pub enabled: bool,
    /// `EnvFilter` directive, e.g. `warn` or `grok_chat_core=debug`.
    pub filter: String,
    /// JSON-lines file; console output on stderr when unset.
    pub json_path: Option<PathBuf>,
}

impl LogSettings {
    /// Resolves settings from process environment variables.
    pub fn from_env(default_level: &str) -> Self {
        Self::resolve(default_level, |key| std::env::var(key).ok())
    }

    /// Resolves settings through `lookup`.
    ///
    /// `GROK_CHAT_LOG_LEVEL` beats `RUST_LOG`, which beats `default_level`.
    /// Filters that do not parse are skipped.
    pub fn resolve(default_level: &str, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let enabled = lookup(ENABLED_VAR)
            .map(|value| parse_bool_env(&value).unwrap_or(true))
            .unwrap_or(true);
        let filter = [LEVEL_VAR, "RUST_LOG"]
            .into_iter()
            .filter_map(&lookup)
            .map(|value| value.trim().to_string())
            .find(|value| {
                !value.is_empty() && tracing_subscriber::EnvFilter::try_new(value).is_ok()
            })
            .unwrap_or_else(|| default_level.to_string());
        let json_path = lookup(JSON_PATH_VAR)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .map(PathBuf::from);
        Self {
            enabled,
            filter,
            json_path,
        }
    }
}

fn parse_bool_env(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" | "enabled" => Some(true),
        "0" | "false" | "no" | "off" | "disabled" => Some(false),
        _ => None,
    }
}

/// Initialize logging once per process.
///
/// Environment variables:
/// - `GROK_CHAT_OBSERVABILITY_ENABLED`: optional enable/disable flag (default enabled).
/// - `GROK_CHAT_LOG_LEVEL`: optional level/filter override (`info`, `debug`, etc.).
/// - `RUST_LOG`: used when `GROK_CHAT_LOG_LEVEL` is unset.
/// - `GROK_CHAT_JSON_LOG_PATH`: optional log file path. If set, logs are JSONL in that file.
///
/// Without a log file, logs go to stderr so they never interleave with a
/// reply printed on stdout.
pub fn init_observability(default_level: &str) {
    INIT.get_or_init(|| install(LogSettings::from_env(default_level)));
}

fn install(settings: LogSettings) {
    if !settings.enabled {
        return;
    }
    let env_filter = tracing_subscriber::EnvFilter::try_new(&settings.filter)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));

    match settings.json_path {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                let _ = std::fs::create_dir_all(parent);
            }
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| std::path::Path::new("."));
            let file_name = path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or(DEFAULT_JSON_FILE);
            let writer = tracing_appender::rolling::never(dir, file_name);
            let json_layer = tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(true)
                .with_span_list(true)
                .with_target(false)
                .with_writer(writer);
            let _ = tracing_subscriber::registry()
                .with(env_filter)
                .with(json_layer)
                .try_init();
        }
        None => {
            let console_layer = tracing_subscriber::fmt::layer()
                .compact()
                .with_target(false)
                .with_writer(std::io::stderr);
            let _ = tracing_subscriber::registry()
                .with(env_filter)
                .with(console_layer)
                .try_init();
        }
    }
}

/// Span wrapping everything logged while one exchange runs.
pub fn exchange_span(exchange_id: uuid::Uuid) -> tracing::Span {
    tracing::info_span!("exchange", %exchange_id)
}

/// Masks a credential for logs and `Debug` output, keeping only the last
/// four characters of long values.
pub fn redact_secret(secret: &str) -> String {
    let count = secret.chars().count();
    if count <= 8 {
        return "****".to_string();
    }
    let tail: String = secret.chars().skip(count - 4).collect();
    format!("****{tail}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| vars.get(key).cloned()
    }

    #[test]
    fn parses_common_boolean_spellings() {
        assert_eq!(parse_bool_env(" ON "), Some(true));
        assert_eq!(parse_bool_env("disabled"), Some(false));
        assert_eq!(parse_bool_env("maybe"), None);
    }

    #[test]
    fn defaults_without_variables() {
        let settings = LogSettings::resolve("warn", lookup(&[]));
        assert_eq!(
            settings,
            LogSettings {
                enabled: true,
                filter: "warn".into(),
                json_path: None,
            }
        );
    }

    #[test]
    fn own_level_beats_rust_log_and_bad_filters_are_skipped() {
        let settings = LogSettings::resolve(
            "warn",
            lookup(&[(LEVEL_VAR, "debug"), ("RUST_LOG", "trace")]),
        );
        assert_eq!(settings.filter, "debug");

        let settings = LogSettings::resolve(
            "warn",
            lookup(&[(LEVEL_VAR, "grok=loud"), ("RUST_LOG", "info")]),
        );
        assert_eq!(settings.filter, "info");
    }

    #[test]
    fn json_path_and_disable_flag() {
        let settings = LogSettings::resolve(
            "warn",
            lookup(&[(ENABLED_VAR, "off"), (JSON_PATH_VAR, " logs/chat.jsonl ")]),
        );
        assert!(!settings.enabled);
        assert_eq!(settings.json_path, Some(PathBuf::from("logs/chat.jsonl")));

        let settings = LogSettings::resolve("warn", lookup(&[(ENABLED_VAR, "maybe")]));
        assert!(settings.enabled);
    }

    #[test]
    fn secrets_keep_only_a_short_tail() {
        assert_eq!(redact_secret("xai-1234567890abcd"), "****abcd");
        assert_eq!(redact_secret("short"), "****");
        assert_eq!(redact_secret(""), "****");
    }

    #[test]
    fn init_is_idempotent() {
        init_observability("warn");
        init_observability("debug");
    }
}
