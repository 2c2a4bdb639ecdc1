//! Conversation history and the `GrokWebChat_v1` import/export format.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{ChatError, TranscriptError};

pub const EXPORT_FORMAT_VERSION: &str = "GrokWebChat_v1";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// One turn of a conversation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub role: Role,
    pub content: String,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub edited: bool,
    /// Time of the last edit, in epoch milliseconds.
    #[serde(
        default,
        rename = "lastUpdatedAt",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_updated_at: Option<i64>,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: new_message_id(),
            role,
            content: content.into(),
            timestamp: now_millis(),
            edited: false,
            last_updated_at: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// Message as sent to the API: role and content only.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestMessage {
    pub role: Role,
    pub content: String,
}

/// A named, ordered chat history.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub session_id: String,
    pub name: String,
    pub messages: Vec<ChatMessage>,
    pub created_at: i64,
    pub last_updated_at: i64,
}

impl Conversation {
    pub fn new(name: impl Into<String>) -> Self {
        let now = now_millis();
        let session_id = format!("session-{}", uuid::Uuid::new_v4().simple());
        let mut name = name.into().trim().to_string();
        if name.is_empty() {
            name = default_name(&session_id);
        }
        Self {
            session_id,
            name,
            messages: Vec::new(),
            created_at: now,
            last_updated_at: now,
        }
    }

    pub fn push(&mut self, message: ChatMessage) {
        self.messages.push(message);
        self.touch();
    }

    /// Renames the conversation. Blank names are rejected.
    pub fn rename(&mut self, name: &str) -> Result<(), ChatError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ChatError::Validation(
                "conversation name must not be empty".into(),
            ));
        }
        self.name = name.to_string();
        self.touch();
        Ok(())
    }

    /// Replaces a message's content and marks it edited.
    ///
    /// Blank content is rejected. Returns `Ok(false)` when the id is unknown.
    pub fn edit_message(
        &mut self,
        id: &str,
        content: impl Into<String>,
    ) -> Result<bool, ChatError> {
        let content = content.into();
        if content.trim().is_empty() {
            return Err(ChatError::Validation(
                "message content must not be empty".into(),
            ));
        }
        let Some(message) = self.messages.iter_mut().find(|m| m.id == id) else {
            return Ok(false);
        };
        let now = now_millis();
        message.content = content;
        message.edited = true;
        message.last_updated_at = Some(now);
        self.last_updated_at = now;
        Ok(true)
    }

    pub fn delete_message(&mut self, id: &str) -> bool {
        let before = self.messages.len();
        self.messages.retain(|m| m.id != id);
        let removed = self.messages.len() != before;
        if removed {
            self.touch();
        }
        removed
    }

    /// User and assistant turns in order, stripped to what the API needs.
    pub fn request_messages(&self) -> Vec<RequestMessage> {
        self.messages
            .iter()
            .filter(|m| matches!(m.role, Role::User | Role::Assistant))
            .map(|m| RequestMessage {
                role: m.role,
                content: m.content.clone(),
            })
            .collect()
    }

    pub fn export(&self, model_used: Option<&str>) -> TranscriptExport {
        TranscriptExport {
            format_version: EXPORT_FORMAT_VERSION.to_string(),
            session_id: self.session_id.clone(),
            name: self.name.clone(),
            model_used: model_used.map(ToOwned::to_owned),
            timestamp: Utc::now(),
            created_at: self.created_at,
            last_updated_at: self.last_updated_at,
            history: self.messages.clone(),
        }
    }

    /// Suggested download name, e.g. `grok-chat-my_chat-2026-01-01T10-00-00-000Z.json`.
    pub fn export_file_name(&self, at: DateTime<Utc>) -> String {
        let safe_name: String = self
            .name
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                    c.to_ascii_lowercase()
                } else {
                    '_'
                }
            })
            .collect();
        let stamp = at
            .to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
            .replace([':', '.'], "-");
        format!("grok-chat-{safe_name}-{stamp}.json")
    }

    /// Imports either an exported transcript or a bare array of messages.
    ///
    /// Messages without an id get one; items lacking a known role or a
    /// string content are dropped. Fails if nothing usable remains.
    pub fn import_json(text: &str, fallback_name: &str) -> Result<Imported, TranscriptError> {
        let value: Value = serde_json::from_str(text)?;
        let now = now_millis();
        let (items, name, model_used, created_at, last_updated_at) = match value {
            Value::Array(items) if items.iter().all(looks_like_message) => {
                (items, None, None, now, now)
            }
            Value::Object(mut fields) => {
                let Some(Value::Array(items)) = fields.remove("history") else {
                    return Err(TranscriptError::UnrecognizedFormat);
                };
                let str_field = |key: &str| {
                    fields
                        .get(key)
                        .and_then(Value::as_str)
                        .filter(|s| !s.trim().is_empty())
                        .map(ToOwned::to_owned)
                };
                let int_field = |key: &str| fields.get(key).and_then(Value::as_i64);
                (
                    items,
                    str_field("name"),
                    str_field("modelUsed"),
                    int_field("createdAt").unwrap_or(now),
                    int_field("lastUpdatedAt").unwrap_or(now),
                )
            }
            _ => return Err(TranscriptError::UnrecognizedFormat),
        };
        if items.is_empty() {
            return Err(TranscriptError::NoMessages);
        }

        let messages: Vec<ChatMessage> = items
            .into_iter()
            .filter_map(|item| serde_json::from_value::<ImportedMessage>(item).ok())
            .map(|m| ChatMessage {
                id: m
                    .id
                    .filter(|id| !id.is_empty())
                    .unwrap_or_else(|| format!("imported-{}", new_message_id())),
                role: m.role,
                content: m.content,
                timestamp: m.timestamp.unwrap_or(now),
                edited: m.edited,
                last_updated_at: m.last_updated_at,
            })
            .collect();
        if messages.is_empty() {
            return Err(TranscriptError::NoMessages);
        }

        let mut conversation = Conversation::new(name.as_deref().unwrap_or(fallback_name));
        conversation.messages = messages;
        conversation.created_at = created_at;
        conversation.last_updated_at = last_updated_at;
        Ok(Imported {
            conversation,
            model_used,
        })
    }

    pub fn load_from_path(path: &Path) -> Result<Imported, TranscriptError> {
        let text = std::fs::read_to_string(path)?;
        let fallback = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("imported chat");
        Self::import_json(&text, fallback)
    }

    pub fn save_to_path(
        &self,
        path: &Path,
        model_used: Option<&str>,
    ) -> Result<(), TranscriptError> {
        let json = serde_json::to_string_pretty(&self.export(model_used))?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, json)?;
        Ok(())
    }

    fn touch(&mut self) {
        self.last_updated_at = now_millis();
    }
}

/// Result of [`Conversation::import_json`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Imported {
    pub conversation: Conversation,
    /// Model recorded in the export, if any.
    pub model_used: Option<String>,
}

/// On-disk export document.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptExport {
    pub format_version: String,
    pub session_id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_used: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub created_at: i64,
    pub last_updated_at: i64,
    pub history: Vec<ChatMessage>,
}

#[derive(Deserialize)]
struct ImportedMessage {
    #[serde(default)]
    id: Option<String>,
    role: Role,
    content: String,
    #[serde(default)]
    timestamp: Option<i64>,
    #[serde(default)]
    edited: bool,
    #[serde(default, rename = "lastUpdatedAt")]
    last_updated_at: Option<i64>,
}

fn looks_like_message(item: &Value) -> bool {
    item.get("role").is_some_and(|r| !r.is_null()) && item.get("content").is_some()
}

fn default_name(session_id: &str) -> String {
    let tail: String = session_id
        .chars()
        .rev()
        .take(4)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    format!("Chat {tail}")
}

fn new_message_id() -> String {
    format!("msg-{}", uuid::Uuid::new_v4().simple())
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}
