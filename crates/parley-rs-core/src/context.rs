//! Prompt assembly from chat history, memory context and system prompts.

use crate::error::GatewayError;
use crate::store::{ChatStore, PromptStore};
use crate::system_prompt::resolve_system_prompt;
use log::{debug, info};
use parley_rs_config::{HistoryConfig, MemoryConfig};
use parley_rs_memory::{MemoryRetriever, RecallOptions, fill_context};
use parley_rs_protocol::{ChatId, ChatMessage, GenerateRequest, MemoryMatch, ProviderOptions, UserId};
use std::sync::Arc;

const HUMAN_TAG: &str = "\nHuman: ";
const AI_TAG: &str = "\nAI: ";

/// Most recent messages whose combined content fits in `budget` characters.
///
/// Walks backward from the newest message and stops at the first one that
/// would overflow the budget; everything older is dropped with it.
pub fn cut_chat_history(messages: &[ChatMessage], budget: usize) -> &[ChatMessage] {
    let mut used = 0usize;
    let mut start = messages.len();
    for (idx, message) in messages.iter().enumerate().rev() {
        used += message.content.chars().count();
        if used > budget {
            break;
        }
        start = idx;
    }
    &messages[start..]
}

/// Render `prefix`, the history in chronological order and the new task,
/// ending with an empty AI turn.
pub fn format_prompt(prefix: &str, history: &[ChatMessage], task: &str) -> String {
    let mut prompt = String::from(prefix);
    for message in history {
        prompt.push_str(if message.is_user_message {
            HUMAN_TAG
        } else {
            AI_TAG
        });
        prompt.push_str(&message.content);
    }
    prompt.push_str(HUMAN_TAG);
    prompt.push_str(task);
    prompt.push_str(AI_TAG);
    prompt
}

/// Caller stop words first, then `extra`, without duplicates.
pub fn merge_stop_words(caller: Option<&[String]>, extra: &[String]) -> Vec<String> {
    let mut merged: Vec<String> = Vec::new();
    for word in caller.unwrap_or_default().iter().chain(extra) {
        if !merged.contains(word) {
            merged.push(word.clone());
        }
    }
    merged
}

/// Prompt and side data produced for one generation call.
#[derive(Debug, Clone, PartialEq)]
pub struct AssembledContext {
    /// Final prompt sent to the provider.
    pub prompt: String,
    /// Memory snippets fused into the prompt.
    pub resources: Vec<MemoryMatch>,
    /// Options forwarded verbatim to the provider.
    pub options: ProviderOptions,
    /// Chat receiving the assistant reply, when generating inside a chat.
    pub chat_id: Option<ChatId>,
}

/// Builds prompts and records the user's turn in chat mode.
#[derive(Clone)]
pub struct ContextAssembler {
    chats: Arc<dyn ChatStore>,
    prompts: Arc<dyn PromptStore>,
    memory: Option<Arc<dyn MemoryRetriever>>,
    history: HistoryConfig,
    memory_config: MemoryConfig,
}

impl ContextAssembler {
    pub fn new(
        chats: Arc<dyn ChatStore>,
        prompts: Arc<dyn PromptStore>,
        memory: Option<Arc<dyn MemoryRetriever>>,
        history: HistoryConfig,
        memory_config: MemoryConfig,
    ) -> Self {
        Self {
            chats,
            prompts,
            memory,
            history,
            memory_config,
        }
    }

    /// Assemble the prompt for `request` on behalf of `user_id`.
    ///
    /// In chat mode the user message is appended before this returns and is
    /// kept even if generation later fails.
    pub async fn assemble(
        &self,
        user_id: &UserId,
        request: &GenerateRequest,
    ) -> Result<AssembledContext, GatewayError> {
        let chat_id = request.chat_id.as_deref().filter(|id| !id.is_empty());
        // Ownership is settled before a stored prompt's use is counted.
        let chat = match chat_id {
            Some(chat_id) => Some(
                self.chats
                    .get_chat(chat_id)
                    .map_err(|err| GatewayError::internal("get chat", err))?
                    .filter(|chat| &chat.user_id == user_id)
                    .ok_or_else(|| GatewayError::NotFound(format!("chat {chat_id}")))?,
            ),
            None => None,
        };
        let explicit = resolve_system_prompt(
            self.prompts.as_ref(),
            request.system_prompt.as_deref(),
            request.system_prompt_id.as_deref(),
        )?;
        let (context_block, resources) = self.memory_context(user_id, request).await?;

        let (Some(chat_id), Some(chat)) = (chat_id, chat) else {
            let prefix = join_prefix(&context_block, explicit.as_deref().unwrap_or_default());
            let prompt = if prefix.is_empty() {
                request.task.clone()
            } else {
                format!("{prefix}\n{}", request.task)
            };
            return Ok(AssembledContext {
                prompt,
                resources,
                options: ProviderOptions {
                    stop_words: request.stop_words.clone(),
                },
                chat_id: None,
            });
        };

        let system = explicit
            .or(chat.system_prompt.filter(|text| !text.is_empty()))
            .unwrap_or_default();
        let messages = self
            .chats
            .chat_messages(user_id, chat_id)
            .map_err(|err| GatewayError::internal("get chat messages", err))?;
        let history = cut_chat_history(&messages, self.history.budget);
        debug!(
            "cut chat history (chat_id={}, kept={}, total={})",
            chat_id,
            history.len(),
            messages.len()
        );
        let prompt = format_prompt(&join_prefix(&context_block, &system), history, &request.task);

        self.chats
            .append_message(chat_id, true, &request.task)
            .map_err(|err| GatewayError::internal("append user message", err))?;
        info!(
            "assembled chat prompt (chat_id={}, prompt_len={}, resources={})",
            chat_id,
            prompt.len(),
            resources.len()
        );
        Ok(AssembledContext {
            prompt,
            resources,
            options: ProviderOptions {
                stop_words: Some(merge_stop_words(
                    request.stop_words.as_deref(),
                    &self.history.stop_words,
                )),
            },
            chat_id: Some(chat_id.to_string()),
        })
    }

    async fn memory_context(
        &self,
        user_id: &UserId,
        request: &GenerateRequest,
    ) -> Result<(String, Vec<MemoryMatch>), GatewayError> {
        let memory_ids = request.memory_id_list();
        if memory_ids.is_empty() {
            return Ok((String::new(), Vec::new()));
        }
        let retriever = self.memory.as_ref().ok_or_else(|| {
            GatewayError::internal("retrieve memory", "no memory retriever configured")
        })?;
        let options = RecallOptions {
            limit: self.memory_config.recall_limit,
            ..RecallOptions::default()
        };
        let matches = retriever
            .retrieve(user_id, &memory_ids, &request.task, options)
            .await
            .map_err(|err| GatewayError::internal("retrieve memory", err))?;
        let block = fill_context(&matches, self.memory_config.max_context_chars);
        debug!(
            "retrieved memory context (memory_ids={}, matches={}, context_len={})",
            memory_ids.len(),
            matches.len(),
            block.len()
        );
        Ok((block, matches))
    }
}

fn join_prefix(context_block: &str, system: &str) -> String {
    [context_block, system]
        .into_iter()
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;
    use parley_rs_protocol::{Chat, ErrorKind, Prompt};
    use pretty_assertions::assert_eq;

    fn messages(contents: &[&str]) -> Vec<ChatMessage> {
        contents
            .iter()
            .enumerate()
            .map(|(idx, content)| {
                if idx % 2 == 0 {
                    ChatMessage::user("c1", *content)
                } else {
                    ChatMessage::assistant("c1", *content)
                }
            })
            .collect()
    }

    fn assembler(store: Arc<InMemoryStore>) -> ContextAssembler {
        ContextAssembler::new(
            store.clone(),
            store,
            None,
            HistoryConfig::default(),
            MemoryConfig::default(),
        )
    }

    fn chat(store: &InMemoryStore, system_prompt: Option<&str>) {
        store.insert_chat(Chat {
            id: "c1".to_string(),
            user_id: "u1".to_string(),
            system_prompt: system_prompt.map(str::to_string),
            system_prompt_id: None,
        });
    }

    #[test]
    fn history_keeps_most_recent_within_budget() {
        let history = messages(&["aaaa", "bbbb", "cccc", "dddd", "eeee"]);
        let kept = cut_chat_history(&history, 13);
        let kept: Vec<&str> = kept.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(kept, vec!["cccc", "dddd", "eeee"]);
        assert_eq!(cut_chat_history(&history, 3).len(), 0);
        assert_eq!(cut_chat_history(&history, 20).len(), 5);
    }

    #[test]
    fn format_prompt_renders_roles_in_order() {
        let history = messages(&["Hi", "Hello!"]);
        assert_eq!(
            format_prompt("Be brief.", &history, "How are you?"),
            "Be brief.\nHuman: Hi\nAI: Hello!\nHuman: How are you?\nAI: "
        );
    }

    #[test]
    fn stop_words_merge_without_duplicates() {
        let caller = vec!["END".to_string(), "AI:".to_string()];
        assert_eq!(
            merge_stop_words(Some(&caller), &HistoryConfig::default().stop_words),
            vec!["END".to_string(), "AI:".to_string(), "Human:".to_string()]
        );
    }

    #[tokio::test]
    async fn empty_chat_yields_bare_turn_and_records_user_message() {
        let store = Arc::new(InMemoryStore::new());
        chat(&store, None);
        let assembled = assembler(store.clone())
            .assemble(&"u1".to_string(), &GenerateRequest::new("Hi").with_chat("c1"))
            .await
            .expect("assemble");
        assert_eq!(assembled.prompt, "\nHuman: Hi\nAI: ");
        assert_eq!(assembled.chat_id.as_deref(), Some("c1"));
        let stored = store
            .chat_messages(&"u1".to_string(), "c1")
            .expect("messages");
        assert_eq!(stored.len(), 1);
        assert!(stored[0].is_user_message);
    }

    #[tokio::test]
    async fn explicit_system_prompt_beats_chat_prompt() {
        let store = Arc::new(InMemoryStore::new());
        chat(&store, Some("Stored prompt."));
        let assembler = assembler(store);
        let mut request = GenerateRequest::new("Hi").with_chat("c1");
        let stored = assembler
            .assemble(&"u1".to_string(), &request)
            .await
            .expect("assemble");
        assert!(stored.prompt.starts_with("Stored prompt.\nHuman: "));

        request.system_prompt = Some("Call prompt.".to_string());
        let explicit = assembler
            .assemble(&"u1".to_string(), &request)
            .await
            .expect("assemble");
        assert!(explicit.prompt.starts_with("Call prompt.\nHuman: "));
    }

    #[tokio::test]
    async fn foreign_chat_is_not_found() {
        let store = Arc::new(InMemoryStore::new());
        chat(&store, None);
        let result = assembler(store)
            .assemble(&"u2".to_string(), &GenerateRequest::new("Hi").with_chat("c1"))
            .await;
        assert_eq!(result.map_err(|err| err.kind()), Err(ErrorKind::NotFound));
    }

    #[tokio::test]
    async fn foreign_chat_does_not_count_prompt_use() {
        let store = Arc::new(InMemoryStore::new());
        chat(&store, None);
        store.insert_prompt(Prompt {
            id: "0b7f2d1e-5c3a-4e6f-8a9b-1c2d3e4f5a6b".to_string(),
            slug: "terse".to_string(),
            prompt: "Be terse.".to_string(),
            use_count: 2,
        });
        let mut request = GenerateRequest::new("Hi").with_chat("c1");
        request.system_prompt_id = Some("terse".to_string());

        let result = assembler(store.clone())
            .assemble(&"u2".to_string(), &request)
            .await;

        assert_eq!(result.map_err(|err| err.kind()), Err(ErrorKind::NotFound));
        let prompt = store
            .prompt("0b7f2d1e-5c3a-4e6f-8a9b-1c2d3e4f5a6b")
            .expect("prompt");
        assert_eq!(prompt.use_count, 2);
    }

    #[tokio::test]
    async fn memory_ids_without_retriever_is_internal() {
        let store = Arc::new(InMemoryStore::new());
        let request = GenerateRequest::new("Hi").with_memory(vec!["m1".to_string()]);
        let result = assembler(store).assemble(&"u1".to_string(), &request).await;
        assert_eq!(result.map_err(|err| err.kind()), Err(ErrorKind::InternalError));
    }

    #[tokio::test]
    async fn plain_request_passes_caller_stop_words() {
        let store = Arc::new(InMemoryStore::new());
        let mut request = GenerateRequest::new("Summarize");
        request.system_prompt = Some("Be brief.".to_string());
        request.stop_words = Some(vec!["END".to_string()]);
        let assembled = assembler(store)
            .assemble(&"u1".to_string(), &request)
            .await
            .expect("assemble");
        assert_eq!(assembled.prompt, "Be brief.\nSummarize");
        assert_eq!(
            assembled.options.stop_words,
            Some(vec!["END".to_string()])
        );
        assert_eq!(assembled.chat_id, None);
    }
}
