use std::path::{Path, PathBuf};

use anyhow::Context as _;
use grok_chat_core::{Conversation, Imported, SessionStore};
use tracing::info;

use crate::args::Args;

const DEFAULT_NAME: &str = "grok-chat";

/// Where the conversation for this run lives.
enum Target {
    Memory(Conversation),
    Transcript {
        path: PathBuf,
        conversation: Conversation,
    },
    Store {
        path: PathBuf,
        store: SessionStore,
    },
}

/// Conversation for this run plus where to persist it.
pub struct History {
    target: Target,
    model_used: Option<String>,
}

impl History {
    /// Opens the transcript or store named by the flags, or an unsaved
    /// conversation when neither is given.
    pub fn open(args: &Args) -> anyhow::Result<Self> {
        if let Some(path) = &args.transcript {
            return Self::open_transcript(path);
        }
        if let Some(path) = &args.store {
            return Self::open_store(path, args.session.as_deref(), args.import.as_deref());
        }
        Ok(Self {
            target: Target::Memory(Conversation::new(DEFAULT_NAME)),
            model_used: None,
        })
    }

    fn open_transcript(path: &Path) -> anyhow::Result<Self> {
        let (conversation, model_used) = if path.exists() {
            let Imported {
                conversation,
                model_used,
            } = Conversation::load_from_path(path)
                .with_context(|| format!("loading transcript {}", path.display()))?;
            (conversation, model_used)
        } else {
            let name = path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or(DEFAULT_NAME);
            (Conversation::new(name), None)
        };
        Ok(Self {
            target: Target::Transcript {
                path: path.to_path_buf(),
                conversation,
            },
            model_used,
        })
    }

    fn open_store(
        path: &Path,
        session: Option<&str>,
        import: Option<&Path>,
    ) -> anyhow::Result<Self> {
        let mut store = SessionStore::load_or_create(path, session.unwrap_or(DEFAULT_NAME))
            .with_context(|| format!("loading session store {}", path.display()))?;
        let mut model_used = None;
        if let Some(import) = import {
            let imported = Conversation::load_from_path(import)
                .with_context(|| format!("importing {}", import.display()))?;
            model_used = imported.model_used.clone();
            let name = store.import(imported).name.clone();
            info!(session = %name, "imported conversation as a new session");
        }
        if let Some(name) = session {
            store.select_or_create(name);
        }
        Ok(Self {
            target: Target::Store {
                path: path.to_path_buf(),
                store,
            },
            model_used,
        })
    }

    /// Model recorded by a loaded or imported export.
    pub fn model_used(&self) -> Option<&str> {
        self.model_used.as_deref()
    }

    pub fn store(&self) -> Option<&SessionStore> {
        match &self.target {
            Target::Store { store, .. } => Some(store),
            _ => None,
        }
    }

    pub fn store_mut(&mut self) -> Option<&mut SessionStore> {
        match &mut self.target {
            Target::Store { store, .. } => Some(store),
            _ => None,
        }
    }

    pub fn conversation(&self) -> anyhow::Result<&Conversation> {
        match &self.target {
            Target::Memory(conversation) | Target::Transcript { conversation, .. } => {
                Ok(conversation)
            }
            Target::Store { store, .. } => {
                store.active().context("session store has no active session")
            }
        }
    }

    pub fn conversation_mut(&mut self) -> anyhow::Result<&mut Conversation> {
        match &mut self.target {
            Target::Memory(conversation) | Target::Transcript { conversation, .. } => {
                Ok(conversation)
            }
            Target::Store { store, .. } => store
                .active_mut()
                .context("session store has no active session"),
        }
    }

    /// Writes the conversation back. Unsaved conversations are a no-op.
    pub fn save(&mut self, model: &str) -> anyhow::Result<()> {
        match &mut self.target {
            Target::Memory(_) => {}
            Target::Transcript { path, conversation } => {
                conversation
                    .save_to_path(path, Some(model))
                    .with_context(|| format!("saving transcript to {}", path.display()))?;
                info!(
                    path = %path.display(),
                    messages = conversation.messages.len(),
                    "transcript saved"
                );
            }
            Target::Store { path, store } => {
                store
                    .save_to_path(path)
                    .with_context(|| format!("saving session store to {}", path.display()))?;
                info!(path = %path.display(), sessions = store.len(), "session store saved");
            }
        }
        Ok(())
    }
}
