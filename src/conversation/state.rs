//! Per-chat conversation state and its registry.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::commands::Command;
use crate::error::{BotError, Result};

/// Where a chat is in the two-turn protocol.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "step", content = "command")]
pub enum Step {
    #[default]
    Idle,
    /// The command was invoked and its single follow-up is expected next.
    AwaitingInput(Command),
}

/// Memory of one chat.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatState {
    pub chat_id: i64,
    /// Normalized sender handle, refreshed on every message.
    #[serde(default)]
    pub sender_handle: String,
    #[serde(default)]
    pub step: Step,
    /// Addresses handed out to this chat.
    #[serde(default)]
    pub given_addresses: u64,
    /// File name → transport file id.
    #[serde(default)]
    pub file_ids: HashMap<String, String>,
}

impl ChatState {
    pub fn new(chat_id: i64) -> Self {
        Self {
            chat_id,
            ..Self::default()
        }
    }

    /// Command awaiting its follow-up, if any.
    pub fn pending(&self) -> Option<Command> {
        match self.step {
            Step::Idle => None,
            Step::AwaitingInput(cmd) => Some(cmd),
        }
    }
}

/// Shared handle to one chat's state.
pub type SharedChatState = Arc<tokio::sync::Mutex<ChatState>>;

/// Persisted form of every chat.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversationSnapshot {
    #[serde(default = "default_snapshot_version")]
    pub version: u8,
    #[serde(default)]
    pub chats: Vec<ChatState>,
}

fn default_snapshot_version() -> u8 {
    1
}

/// Registry of chat states, created lazily on first message.
#[derive(Debug, Default)]
pub struct ConversationStore {
    chats: Mutex<HashMap<i64, SharedChatState>>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// State for `chat_id`, inserted under the same lock if missing.
    pub fn get_or_create(&self, chat_id: i64) -> Result<SharedChatState> {
        let mut chats = self.lock()?;
        let state = chats
            .entry(chat_id)
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(ChatState::new(chat_id))));
        Ok(Arc::clone(state))
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.lock()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.lock()?.is_empty())
    }

    /// Copy of every chat, ordered by chat id.
    ///
    /// Waits for chats that are mid-update.
    pub async fn snapshot(&self) -> Result<ConversationSnapshot> {
        let handles: Vec<SharedChatState> = self.lock()?.values().cloned().collect();
        let mut chats = Vec::with_capacity(handles.len());
        for handle in handles {
            chats.push(handle.lock().await.clone());
        }
        chats.sort_by_key(|chat| chat.chat_id);
        Ok(ConversationSnapshot {
            version: default_snapshot_version(),
            chats,
        })
    }

    /// Replace every chat with the snapshot contents.
    pub fn restore(&self, snapshot: ConversationSnapshot) -> Result<()> {
        let restored: HashMap<i64, SharedChatState> = snapshot
            .chats
            .into_iter()
            .map(|chat| (chat.chat_id, Arc::new(tokio::sync::Mutex::new(chat))))
            .collect();
        *self.lock()? = restored;
        Ok(())
    }

    /// Store restored from `path`; empty when the file does not exist.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let bytes = match std::fs::read(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::new()),
            Err(e) => return Err(BotError::State(format!("cannot read state: {e}"))),
        };
        let snapshot: ConversationSnapshot = serde_json::from_slice(&bytes)
            .map_err(|e| BotError::State(format!("cannot parse state: {e}")))?;

        let store = Self::new();
        debug!(
            path = %path.display(),
            chats = snapshot.chats.len(),
            "conversation state loaded"
        );
        store.restore(snapshot)?;
        Ok(store)
    }

    /// Persist every chat to `path` as JSON.
    pub async fn save_to_path(&self, path: &Path) -> Result<()> {
        let snapshot = self.snapshot().await?;
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .map_err(|e| BotError::State(format!("cannot create state dir: {e}")))?;
        }
        let json = serde_json::to_string_pretty(&snapshot)
            .map_err(|e| BotError::State(format!("cannot serialize state: {e}")))?;
        std::fs::write(path, json)
            .map_err(|e| BotError::State(format!("cannot write state: {e}")))?;
        debug!(path = %path.display(), chats = snapshot.chats.len(), "conversation state saved");
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<i64, SharedChatState>>> {
        self.chats.lock().map_err(|e| BotError::Lock(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[tokio::test]
    async fn get_or_create_reuses_state() {
        let store = ConversationStore::new();
        let first = store.get_or_create(7).unwrap();
        first.lock().await.given_addresses = 3;

        let second = store.get_or_create(7).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.lock().await.given_addresses, 3);
        assert_eq!(store.len().unwrap(), 1);
    }

    #[tokio::test]
    async fn concurrent_first_messages_share_one_state() {
        let store = Arc::new(ConversationStore::new());
        let mut tasks = Vec::new();
        for _ in 0..16 {
            let store = Arc::clone(&store);
            tasks.push(tokio::spawn(async move {
                let state = store.get_or_create(42).unwrap();
                state.lock().await.given_addresses += 1;
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }
        assert_eq!(store.len().unwrap(), 1);
        let state = store.get_or_create(42).unwrap();
        assert_eq!(state.lock().await.given_addresses, 16);
    }

    #[test]
    fn pending_reflects_step() {
        let mut state = ChatState::new(1);
        assert_eq!(state.pending(), None);
        state.step = Step::AwaitingInput(Command::AddAddress);
        assert_eq!(state.pending(), Some(Command::AddAddress));
    }

    #[tokio::test]
    async fn save_and_load_round_trip() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("state/chats.json");

        let store = ConversationStore::new();
        {
            let chat = store.get_or_create(5).unwrap();
            let mut chat = chat.lock().await;
            chat.sender_handle = "ivan".to_owned();
            chat.step = Step::AwaitingInput(Command::GiveAddress);
            chat.given_addresses = 2;
            chat.file_ids.insert("help".to_owned(), "file-1".to_owned());
        }
        store.save_to_path(&path).await.unwrap();

        let loaded = ConversationStore::load_from_path(&path).unwrap();
        let chat = loaded.get_or_create(5).unwrap();
        let chat = chat.lock().await;
        assert_eq!(chat.sender_handle, "ivan");
        assert_eq!(chat.pending(), Some(Command::GiveAddress));
        let help = chat.file_ids.get("help");
        assert_eq!(help.map(String::as_str), Some("file-1"));
    }

    #[test]
    fn missing_state_file_is_empty_store() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = ConversationStore::load_from_path(&dir.path().join("absent.json")).unwrap();
        assert!(store.is_empty().unwrap());
    }

    #[test]
    fn corrupt_state_file_is_an_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            ConversationStore::load_from_path(&path),
            Err(BotError::State(_))
        ));
    }
}
