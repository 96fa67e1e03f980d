//! Chat persistence as append-only JSONL rollouts, one file per chat.

use super::{ChatStore, StoreError};
use chrono::{DateTime, Utc};
use log::{debug, info};
use parking_lot::Mutex;
use parley_rs_protocol::{Chat, ChatMessage, UserId};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use uuid::Uuid;

const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum RolloutEvent {
    SchemaVersion {
        version: u32,
    },
    ChatCreated {
        chat: Chat,
    },
    Message {
        is_user_message: bool,
        content: String,
        created_at: DateTime<Utc>,
    },
}

#[derive(Default)]
struct Rollout {
    version: Option<u32>,
    chat: Option<Chat>,
    messages: Vec<ChatMessage>,
}

impl Rollout {
    fn apply(&mut self, event: RolloutEvent) -> Result<(), StoreError> {
        match event {
            RolloutEvent::SchemaVersion { version } => {
                if version > SCHEMA_VERSION {
                    return Err(StoreError::UnsupportedSchema(version));
                }
                self.version = Some(version);
            }
            RolloutEvent::ChatCreated { chat } => self.chat = Some(chat),
            RolloutEvent::Message {
                is_user_message,
                content,
                created_at,
            } => {
                let chat = self.chat.as_ref().ok_or(StoreError::MissingMetadata)?;
                self.messages.push(ChatMessage {
                    is_user_message,
                    content,
                    chat_id: chat.id.clone(),
                    created_at,
                });
            }
        }
        Ok(())
    }

    fn finish(self) -> Result<(Chat, Vec<ChatMessage>), StoreError> {
        self.version.ok_or(StoreError::MissingMetadata)?;
        let chat = self.chat.ok_or(StoreError::MissingMetadata)?;
        Ok((chat, self.messages))
    }
}

/// JSONL-backed chat store.
pub struct JsonlChatStore {
    root: PathBuf,
    /// Serializes writes to rollout files.
    write_lock: Mutex<()>,
}

impl JsonlChatStore {
    /// Create a store under `root`, creating the directory if needed.
    pub fn new(root: impl AsRef<Path>) -> Result<Self, StoreError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        info!("initialized JSONL chat store (root={})", root.display());
        Ok(Self {
            root,
            write_lock: Mutex::new(()),
        })
    }

    /// Rollout path for a chat; `None` for ids that are not UUIDs.
    fn rollout_path(&self, chat_id: &str) -> Option<PathBuf> {
        let id = Uuid::parse_str(chat_id).ok()?;
        Some(self.root.join(format!("{id}.jsonl")))
    }

    fn write_line(file: &mut fs::File, event: &RolloutEvent) -> Result<(), StoreError> {
        let line = serde_json::to_string(event)?;
        writeln!(file, "{line}")?;
        Ok(())
    }

    fn read_rollout(&self, chat_id: &str) -> Result<Option<(Chat, Vec<ChatMessage>)>, StoreError> {
        let Some(path) = self.rollout_path(chat_id) else {
            return Ok(None);
        };
        if !path.exists() {
            return Ok(None);
        }
        let reader = BufReader::new(OpenOptions::new().read(true).open(&path)?);
        let mut rollout = Rollout::default();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            rollout.apply(serde_json::from_str(&line)?)?;
        }
        rollout.finish().map(Some)
    }
}

impl ChatStore for JsonlChatStore {
    fn create_chat(
        &self,
        user_id: &UserId,
        system_prompt: Option<String>,
        system_prompt_id: Option<String>,
    ) -> Result<Chat, StoreError> {
        let id = Uuid::new_v4();
        let chat = Chat {
            id: id.to_string(),
            user_id: user_id.clone(),
            system_prompt,
            system_prompt_id,
        };
        let path = self.root.join(format!("{id}.jsonl"));
        let _guard = self.write_lock.lock();
        let mut file = OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(&path)?;
        Self::write_line(
            &mut file,
            &RolloutEvent::SchemaVersion {
                version: SCHEMA_VERSION,
            },
        )?;
        Self::write_line(&mut file, &RolloutEvent::ChatCreated { chat: chat.clone() })?;
        info!("created chat rollout (chat_id={}, user_id={})", chat.id, user_id);
        Ok(chat)
    }

    fn get_chat(&self, chat_id: &str) -> Result<Option<Chat>, StoreError> {
        Ok(self.read_rollout(chat_id)?.map(|(chat, _)| chat))
    }

    fn chat_messages(
        &self,
        user_id: &UserId,
        chat_id: &str,
    ) -> Result<Vec<ChatMessage>, StoreError> {
        match self.read_rollout(chat_id)? {
            Some((chat, messages)) if &chat.user_id == user_id => Ok(messages),
            _ => Ok(Vec::new()),
        }
    }

    fn append_message(
        &self,
        chat_id: &str,
        is_user_message: bool,
        content: &str,
    ) -> Result<ChatMessage, StoreError> {
        let path = self
            .rollout_path(chat_id)
            .filter(|path| path.exists())
            .ok_or_else(|| StoreError::UnknownChat(chat_id.to_string()))?;
        let message = ChatMessage {
            is_user_message,
            content: content.to_string(),
            chat_id: chat_id.to_string(),
            created_at: Utc::now(),
        };
        debug!(
            "appending chat message (chat_id={}, is_user={}, content_len={})",
            chat_id,
            is_user_message,
            content.len()
        );
        let _guard = self.write_lock.lock();
        let mut file = OpenOptions::new().append(true).open(path)?;
        Self::write_line(
            &mut file,
            &RolloutEvent::Message {
                is_user_message,
                content: message.content.clone(),
                created_at: message.created_at,
            },
        )?;
        Ok(message)
    }
}
