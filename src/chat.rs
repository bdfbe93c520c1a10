//! Multi-conversation chat with a persistent JSON store.
//!
//! The store file holds every conversation and the id of the active one:
//!
//! ```json
//! {
//!   "chats": { "chat_1": { "title": "Untitled Chat", "messages": [ ... ] } },
//!   "active_chat": "chat_1"
//! }
//! ```
//!
//! Every mutating call saves the file.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::llm::{ChatMessage, Role};

pub const UNTITLED: &str = "Untitled Chat";
const TITLE_CHARS: usize = 30;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub title: String,
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct StoreFile {
    #[serde(default)]
    chats: BTreeMap<String, Conversation>,
    #[serde(default)]
    active_chat: Option<String>,
}

/// Conversations persisted at a fixed path.
#[derive(Debug)]
pub struct ChatStore {
    path: PathBuf,
    system_prompt: String,
    data: StoreFile,
}

impl ChatStore {
    /// Open the store at `path`, creating a first conversation if it is
    /// missing or empty.
    pub fn open(path: impl Into<PathBuf>, system_prompt: impl Into<String>) -> Result<Self> {
        let path = path.into();
        let data = if path.exists() {
            let raw = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read chat history: {}", path.display()))?;
            serde_json::from_str(&raw)
                .with_context(|| format!("Failed to parse chat history: {}", path.display()))?
        } else {
            StoreFile::default()
        };
        let mut store = Self {
            path,
            system_prompt: system_prompt.into(),
            data,
        };
        store.ensure_active()?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&self.data)?;
        std::fs::write(&self.path, json)
            .with_context(|| format!("Failed to write chat history: {}", self.path.display()))
    }

    /// Make sure the active id names an existing conversation.
    fn ensure_active(&mut self) -> Result<()> {
        let valid = self
            .data
            .active_chat
            .as_ref()
            .is_some_and(|id| self.data.chats.contains_key(id));
        if valid {
            return Ok(());
        }
        match self.data.chats.keys().next().cloned() {
            Some(id) => {
                self.data.active_chat = Some(id);
                self.save()
            }
            None => self.new_chat().map(|_| ()),
        }
    }

    fn next_id(&self) -> String {
        let mut n = self.data.chats.len() + 1;
        loop {
            let id = format!("chat_{}", n);
            if !self.data.chats.contains_key(&id) {
                return id;
            }
            n += 1;
        }
    }

    /// Start a new conversation, make it active and return its id.
    pub fn new_chat(&mut self) -> Result<String> {
        let id = self.next_id();
        self.data.chats.insert(
            id.clone(),
            Conversation {
                title: UNTITLED.to_string(),
                messages: vec![ChatMessage::system(self.system_prompt.clone())],
            },
        );
        self.data.active_chat = Some(id.clone());
        self.save()?;
        Ok(id)
    }

    pub fn active_id(&self) -> &str {
        self.data.active_chat.as_deref().unwrap_or_default()
    }

    pub fn active(&self) -> Option<&Conversation> {
        self.data.chats.get(self.active_id())
    }

    /// `(id, title)` pairs ordered by id.
    pub fn list(&self) -> Vec<(&str, &str)> {
        self.data
            .chats
            .iter()
            .map(|(id, c)| (id.as_str(), c.title.as_str()))
            .collect()
    }

    pub fn switch(&mut self, id: &str) -> Result<()> {
        if !self.data.chats.contains_key(id) {
            bail!("no chat with id '{}'", id);
        }
        self.data.active_chat = Some(id.to_string());
        self.save()
    }

    /// Delete a conversation. Deleting the active one activates another, or
    /// a fresh conversation when none remain.
    pub fn delete(&mut self, id: &str) -> Result<()> {
        if self.data.chats.remove(id).is_none() {
            bail!("no chat with id '{}'", id);
        }
        if self.data.active_chat.as_deref() == Some(id) {
            self.data.active_chat = None;
        }
        self.ensure_active()?;
        self.save()
    }

    /// Append a user turn to the active conversation and return the full
    /// message list to send to the model.
    pub fn push_user(&mut self, prompt: &str) -> Result<Vec<ChatMessage>> {
        let id = self.active_id().to_string();
        let chat = self
            .data
            .chats
            .get_mut(&id)
            .with_context(|| format!("active chat '{}' is missing", id))?;
        if chat.title == UNTITLED {
            chat.title = prompt.trim().chars().take(TITLE_CHARS).collect();
        }
        chat.messages.push(ChatMessage::user(prompt));
        let messages = chat.messages.clone();
        self.save()?;
        Ok(messages)
    }

    /// Append the model's reply to the active conversation.
    pub fn push_assistant(&mut self, reply: &str) -> Result<()> {
        let id = self.active_id().to_string();
        let chat = self
            .data
            .chats
            .get_mut(&id)
            .with_context(|| format!("active chat '{}' is missing", id))?;
        chat.messages.push(ChatMessage::assistant(reply));
        self.save()
    }

    /// Drop a trailing user turn that never got a reply.
    pub fn pop_unanswered(&mut self) -> Result<()> {
        let id = self.active_id().to_string();
        if let Some(chat) = self.data.chats.get_mut(&id) {
            if chat.messages.last().is_some_and(|m| m.role == Role::User) {
                chat.messages.pop();
                return self.save();
            }
        }
        Ok(())
    }
}
