//! Conversation history persistence.
//!
//! Stores the conversation list as one pretty-printed JSON file, newest
//! first. Each entry is the minimal tuple a transcript needs to be
//! restored: id, timestamp, messages.

use std::fs;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use color_eyre::{eyre::WrapErr, Result};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::state::ChatMessage;

/// One stored conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub messages: Vec<ChatMessage>,
}

impl Conversation {
    /// A new conversation with a fresh id, stamped now.
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            messages,
        }
    }

    /// Re-stamp an existing conversation with updated messages.
    pub fn updated(id: String, messages: Vec<ChatMessage>) -> Self {
        Self {
            id,
            timestamp: Utc::now(),
            messages,
        }
    }
}

/// JSON-file-backed store for the conversation list.
#[derive(Debug, Clone)]
pub struct HistoryStore {
    dir: PathBuf,
}

impl HistoryStore {
    /// Store under the platform data directory, falling back to a local
    /// `data` directory when none is known.
    pub fn open_default() -> Result<Self> {
        let dir = dirs::data_dir()
            .map(|d| d.join("rill"))
            .unwrap_or_else(|| PathBuf::from("data"));
        Self::open(dir)
    }

    /// Open a store rooted at `dir`, creating it if needed.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        if !dir.exists() {
            fs::create_dir_all(&dir).wrap_err("Failed to create history directory")?;
        }
        Ok(Self { dir })
    }

    fn file_path(&self) -> PathBuf {
        self.dir.join("history.json")
    }

    /// Load all conversations, newest first. A missing file is an empty
    /// list.
    pub fn load(&self) -> Result<Vec<Conversation>> {
        let file_path = self.file_path();
        if !file_path.exists() {
            return Ok(Vec::new());
        }

        let json = fs::read_to_string(&file_path)
            .wrap_err(format!("Failed to read history from {:?}", file_path))?;
        let conversations =
            serde_json::from_str(&json).wrap_err("Failed to deserialize history")?;
        Ok(conversations)
    }

    /// Persist the full list.
    pub fn save(&self, conversations: &[Conversation]) -> Result<()> {
        let file_path = self.file_path();
        let json = serde_json::to_string_pretty(conversations)
            .wrap_err("Failed to serialize history")?;
        fs::write(&file_path, json)
            .wrap_err(format!("Failed to write history to {:?}", file_path))?;
        Ok(())
    }

    /// Update the entry with a matching id in place, or insert at the
    /// front.
    pub fn upsert(&self, conversation: Conversation) -> Result<()> {
        let mut all = self.load()?;
        match all.iter_mut().find(|c| c.id == conversation.id) {
            Some(existing) => *existing = conversation,
            None => all.insert(0, conversation),
        }
        self.save(&all)
    }
}
