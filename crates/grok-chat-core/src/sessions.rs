//! Several named conversations persisted together in one JSON file.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::errors::{ChatError, TranscriptError};
use crate::transcript::{Conversation, Imported};

/// Session list plus the id of the one currently in use.
///
/// Sessions are kept most recently updated first. The store never becomes
/// empty through [`delete_session`](Self::delete_session).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStore {
    #[serde(default)]
    active_session_id: Option<String>,
    #[serde(default)]
    sessions: Vec<Conversation>,
}

impl SessionStore {
    /// A store holding one fresh session named `name`.
    pub fn with_session(name: &str) -> Self {
        let mut store = Self::default();
        store.new_session(name);
        store
    }

    pub fn sessions(&self) -> &[Conversation] {
        &self.sessions
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn active_id(&self) -> Option<&str> {
        self.active_session_id.as_deref()
    }

    pub fn active(&self) -> Option<&Conversation> {
        let id = self.active_session_id.as_deref()?;
        self.sessions.iter().find(|s| s.session_id == id)
    }

    pub fn active_mut(&mut self) -> Option<&mut Conversation> {
        let id = self.active_session_id.as_deref()?;
        self.sessions.iter_mut().find(|s| s.session_id == id)
    }

    pub fn get(&self, session_id: &str) -> Option<&Conversation> {
        self.sessions.iter().find(|s| s.session_id == session_id)
    }

    /// First session whose name matches exactly.
    pub fn find_by_name(&self, name: &str) -> Option<&Conversation> {
        let name = name.trim();
        self.sessions.iter().find(|s| s.name == name)
    }

    /// Creates a session at the top of the list and makes it active.
    pub fn new_session(&mut self, name: &str) -> &mut Conversation {
        self.insert_active(Conversation::new(name))
    }

    /// Adds an imported conversation as a new active session.
    pub fn import(&mut self, imported: Imported) -> &mut Conversation {
        self.insert_active(imported.conversation)
    }

    pub fn select(&mut self, session_id: &str) -> Result<(), ChatError> {
        if self.get(session_id).is_none() {
            return Err(ChatError::Validation(format!("unknown session {session_id}")));
        }
        self.active_session_id = Some(session_id.to_string());
        Ok(())
    }

    /// Activates the session named `name`, creating it when none matches.
    pub fn select_or_create(&mut self, name: &str) -> &mut Conversation {
        let wanted = name.trim();
        match self.sessions.iter().position(|s| s.name == wanted) {
            Some(index) => {
                self.active_session_id = Some(self.sessions[index].session_id.clone());
                &mut self.sessions[index]
            }
            None => self.new_session(name),
        }
    }

    /// Removes a session. The last remaining session cannot be deleted.
    ///
    /// Deleting the active session activates its predecessor in the list
    /// (or the new first session).
    pub fn delete_session(&mut self, session_id: &str) -> Result<Conversation, ChatError> {
        let Some(index) = self.sessions.iter().position(|s| s.session_id == session_id) else {
            return Err(ChatError::Validation(format!("unknown session {session_id}")));
        };
        if self.sessions.len() <= 1 {
            return Err(ChatError::Validation("cannot delete the last session".into()));
        }
        let removed = self.sessions.remove(index);
        if self.active_session_id.as_deref() == Some(session_id) {
            let next = index.saturating_sub(1);
            self.active_session_id = self.sessions.get(next).map(|s| s.session_id.clone());
        }
        info!(session_id, remaining = self.sessions.len(), "session deleted");
        Ok(removed)
    }

    /// Orders sessions by last update, newest first.
    pub fn sort(&mut self) {
        self.sessions.sort_by(|a, b| b.last_updated_at.cmp(&a.last_updated_at));
    }

    /// Reads a store written by [`save_to_path`](Self::save_to_path).
    ///
    /// An empty store gets one fresh session; a missing or stale active id
    /// falls back to the first session.
    pub fn load_from_path(path: &Path) -> Result<Self, TranscriptError> {
        let text = std::fs::read_to_string(path)?;
        let mut store: Self = serde_json::from_str(&text)?;
        if store.sessions.is_empty() {
            store.new_session("");
        }
        store.sort();
        if store.active().is_none() {
            store.active_session_id = store.sessions.first().map(|s| s.session_id.clone());
        }
        debug!(path = %path.display(), sessions = store.sessions.len(), "session store loaded");
        Ok(store)
    }

    /// Loads `path`, or starts a store with one session named `name` when
    /// the file does not exist yet.
    pub fn load_or_create(path: &Path, name: &str) -> Result<Self, TranscriptError> {
        if !path.exists() {
            return Ok(Self::with_session(name));
        }
        Self::load_from_path(path)
    }

    /// Sorts, then writes the whole store as pretty JSON.
    pub fn save_to_path(&mut self, path: &Path) -> Result<(), TranscriptError> {
        self.sort();
        let json = serde_json::to_string_pretty(self)?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, json)?;
        Ok(())
    }

    fn insert_active(&mut self, conversation: Conversation) -> &mut Conversation {
        self.active_session_id = Some(conversation.session_id.clone());
        self.sessions.insert(0, conversation);
        &mut self.sessions[0]
    }
}
