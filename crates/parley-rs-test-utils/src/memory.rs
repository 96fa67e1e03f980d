use async_trait::async_trait;
use parking_lot::Mutex;
use parley_rs_memory::{MemoryError, MemoryRetriever, RecallOptions};
use parley_rs_protocol::{MemoryId, MemoryMatch};

#[derive(Debug, Default)]
pub struct StubMemory {
    matches: Vec<MemoryMatch>,
    queries: Mutex<Vec<(Vec<MemoryId>, String)>>,
}

impl StubMemory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_matches(matches: Vec<MemoryMatch>) -> Self {
        Self {
            matches,
            queries: Mutex::new(Vec::new()),
        }
    }

    /// Memory ids and query of every retrieval, in call order.
    pub fn queries(&self) -> Vec<(Vec<MemoryId>, String)> {
        self.queries.lock().clone()
    }
}

#[async_trait]
impl MemoryRetriever for StubMemory {
    async fn retrieve(
        &self,
        _user_id: &str,
        memory_ids: &[MemoryId],
        query: &str,
        options: RecallOptions,
    ) -> Result<Vec<MemoryMatch>, MemoryError> {
        self.queries
            .lock()
            .push((memory_ids.to_vec(), query.to_string()));
        Ok(self.matches.iter().take(options.limit).cloned().collect())
    }
}
