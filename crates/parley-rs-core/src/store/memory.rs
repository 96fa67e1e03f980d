//! In-memory implementation of every storage collaborator.

use super::{AliasStore, ChatStore, ModelAlias, PromptStore, StoreError, UsageRecorder};
use crate::usage::RequestLog;
use chrono::Utc;
use log::debug;
use parking_lot::{Mutex, RwLock};
use parley_rs_protocol::{Chat, ChatId, ChatMessage, ProjectId, Prompt, UserId};
use std::collections::HashMap;
use uuid::Uuid;

/// Process-local store for tests and single-node deployments.
#[derive(Default)]
pub struct InMemoryStore {
    chats: RwLock<HashMap<ChatId, Chat>>,
    /// One lock for all transcripts keeps appends ordered per chat.
    messages: Mutex<HashMap<ChatId, Vec<ChatMessage>>>,
    prompts: RwLock<HashMap<String, Prompt>>,
    aliases: RwLock<HashMap<(ProjectId, String), ModelAlias>>,
    request_logs: Mutex<Vec<RequestLog>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a chat with a caller-chosen id.
    pub fn insert_chat(&self, chat: Chat) {
        self.messages.lock().entry(chat.id.clone()).or_default();
        self.chats.write().insert(chat.id.clone(), chat);
    }

    pub fn insert_prompt(&self, prompt: Prompt) {
        self.prompts.write().insert(prompt.id.clone(), prompt);
    }

    pub fn insert_alias(
        &self,
        project_id: impl Into<ProjectId>,
        alias: impl Into<String>,
        target: ModelAlias,
    ) {
        self.aliases
            .write()
            .insert((project_id.into(), alias.into()), target);
    }

    /// Snapshot of billed requests, oldest first.
    pub fn request_logs(&self) -> Vec<RequestLog> {
        self.request_logs.lock().clone()
    }

    pub fn prompt(&self, id: &str) -> Option<Prompt> {
        self.prompts.read().get(id).cloned()
    }
}

impl ChatStore for InMemoryStore {
    fn create_chat(
        &self,
        user_id: &UserId,
        system_prompt: Option<String>,
        system_prompt_id: Option<String>,
    ) -> Result<Chat, StoreError> {
        let chat = Chat {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.clone(),
            system_prompt,
            system_prompt_id,
        };
        debug!("created chat (chat_id={}, user_id={})", chat.id, user_id);
        self.insert_chat(chat.clone());
        Ok(chat)
    }

    fn get_chat(&self, chat_id: &str) -> Result<Option<Chat>, StoreError> {
        Ok(self.chats.read().get(chat_id).cloned())
    }

    fn chat_messages(
        &self,
        user_id: &UserId,
        chat_id: &str,
    ) -> Result<Vec<ChatMessage>, StoreError> {
        let owned = self
            .chats
            .read()
            .get(chat_id)
            .is_some_and(|chat| &chat.user_id == user_id);
        if !owned {
            return Ok(Vec::new());
        }
        Ok(self
            .messages
            .lock()
            .get(chat_id)
            .cloned()
            .unwrap_or_default())
    }

    fn append_message(
        &self,
        chat_id: &str,
        is_user_message: bool,
        content: &str,
    ) -> Result<ChatMessage, StoreError> {
        if !self.chats.read().contains_key(chat_id) {
            return Err(StoreError::UnknownChat(chat_id.to_string()));
        }
        let mut messages = self.messages.lock();
        let transcript = messages.entry(chat_id.to_string()).or_default();
        // Timestamps never go backwards within a transcript.
        let now = Utc::now();
        let created_at = transcript
            .last()
            .map_or(now, |last| last.created_at.max(now));
        let message = ChatMessage {
            is_user_message,
            content: content.to_string(),
            chat_id: chat_id.to_string(),
            created_at,
        };
        transcript.push(message.clone());
        Ok(message)
    }
}

impl PromptStore for InMemoryStore {
    fn prompt_by_id_or_slug(&self, id: &str) -> Result<Option<Prompt>, StoreError> {
        let prompts = self.prompts.read();
        Ok(prompts
            .get(id)
            .or_else(|| prompts.values().find(|prompt| prompt.slug == id))
            .cloned())
    }

    fn update_prompt_use(&self, id: &str, use_count: u64) -> Result<(), StoreError> {
        let mut prompts = self.prompts.write();
        let prompt = prompts
            .get_mut(id)
            .ok_or_else(|| StoreError::UnknownPrompt(id.to_string()))?;
        prompt.use_count = use_count;
        Ok(())
    }
}

impl UsageRecorder for InMemoryStore {
    fn log_request(&self, entry: &RequestLog) -> Result<(), StoreError> {
        self.request_logs.lock().push(entry.clone());
        Ok(())
    }
}

impl AliasStore for InMemoryStore {
    fn model_by_alias(
        &self,
        alias: &str,
        project_id: &ProjectId,
    ) -> Result<Option<ModelAlias>, StoreError> {
        Ok(self
            .aliases
            .read()
            .get(&(project_id.clone(), alias.to_string()))
            .cloned())
    }
}
