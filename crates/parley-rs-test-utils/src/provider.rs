use async_trait::async_trait;
use futures_util::{Stream, stream};
use parking_lot::Mutex;
use parley_rs_core::{ProviderAdapter, ProviderError, ProviderFactory, ProviderStream};
use parley_rs_protocol::ProviderOptions;
use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::task::{Context, Poll};
use tokio_util::sync::CancellationToken;

/// Factory handing out the same adapter for every model.
pub fn factory_for(adapter: Arc<dyn ProviderAdapter>) -> Arc<dyn ProviderFactory> {
    Arc::new(move |_model: &str| Ok::<_, ProviderError>(adapter.clone()))
}

fn chunk_stream(chunks: Vec<String>) -> ProviderStream {
    Box::pin(stream::iter(chunks.into_iter().map(Ok)))
}

#[derive(Debug, Clone)]
pub struct FixedProvider {
    model: String,
    chunks: Vec<String>,
    completion: String,
    follows_rate_limit: bool,
}

impl FixedProvider {
    pub fn new(chunks: Vec<&str>) -> Self {
        Self {
            model: "fixed-model".to_string(),
            chunks: chunks.into_iter().map(str::to_string).collect(),
            completion: "mock completion".to_string(),
            follows_rate_limit: true,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_completion(mut self, completion: impl Into<String>) -> Self {
        self.completion = completion.into();
        self
    }

    pub fn without_rate_limit(mut self) -> Self {
        self.follows_rate_limit = false;
        self
    }
}

#[async_trait]
impl ProviderAdapter for FixedProvider {
    fn name(&self) -> &str {
        "fixed"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn stream(
        &self,
        _prompt: &str,
        _options: &ProviderOptions,
        _cancel: CancellationToken,
    ) -> Result<ProviderStream, ProviderError> {
        Ok(chunk_stream(self.chunks.clone()))
    }

    async fn complete(&self, _prompt: &str) -> Result<String, ProviderError> {
        Ok(self.completion.clone())
    }

    fn follows_rate_limit(&self) -> bool {
        self.follows_rate_limit
    }
}

#[derive(Debug, Default)]
pub struct FailingProvider {
    calls: AtomicU32,
}

impl FailingProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProviderAdapter for FailingProvider {
    fn name(&self) -> &str {
        "failing"
    }

    fn model(&self) -> &str {
        "failing-model"
    }

    async fn stream(
        &self,
        _prompt: &str,
        _options: &ProviderOptions,
        _cancel: CancellationToken,
    ) -> Result<ProviderStream, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(ProviderError::Transport("connection refused".to_string()))
    }

    async fn complete(&self, _prompt: &str) -> Result<String, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(ProviderError::Api {
            status: 503,
            message: "overloaded".to_string(),
        })
    }
}

/// Fails its first attempts, each differently, then streams `chunks`.
#[derive(Debug)]
pub struct FlakyProvider {
    failures: u32,
    chunks: Vec<String>,
    calls: AtomicU32,
}

impl FlakyProvider {
    pub fn new(failures: u32, chunks: Vec<&str>) -> Self {
        Self {
            failures,
            chunks: chunks.into_iter().map(str::to_string).collect(),
            calls: AtomicU32::new(0),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProviderAdapter for FlakyProvider {
    fn name(&self) -> &str {
        "flaky"
    }

    fn model(&self) -> &str {
        "flaky-model"
    }

    async fn stream(
        &self,
        _prompt: &str,
        _options: &ProviderOptions,
        _cancel: CancellationToken,
    ) -> Result<ProviderStream, ProviderError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call > self.failures {
            return Ok(chunk_stream(self.chunks.clone()));
        }
        if call % 2 == 1 {
            return Err(ProviderError::Transport(format!("reset on call {call}")));
        }
        Ok(Box::pin(stream::iter(vec![Err(ProviderError::Malformed(
            format!("bad frame on call {call}"),
        ))])))
    }

    async fn complete(&self, _prompt: &str) -> Result<String, ProviderError> {
        Err(ProviderError::Transport("not supported".to_string()))
    }
}

/// Streams `chunks` and then drops the connection.
#[derive(Debug)]
pub struct BreakingProvider {
    chunks: Vec<String>,
    calls: AtomicU32,
}

impl BreakingProvider {
    pub fn new(chunks: Vec<&str>) -> Self {
        Self {
            chunks: chunks.into_iter().map(str::to_string).collect(),
            calls: AtomicU32::new(0),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProviderAdapter for BreakingProvider {
    fn name(&self) -> &str {
        "breaking"
    }

    fn model(&self) -> &str {
        "breaking-model"
    }

    async fn stream(
        &self,
        _prompt: &str,
        _options: &ProviderOptions,
        _cancel: CancellationToken,
    ) -> Result<ProviderStream, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let items = self
            .chunks
            .iter()
            .cloned()
            .map(Ok)
            .chain([Err(ProviderError::Transport("connection reset".to_string()))]);
        Ok(Box::pin(stream::iter(items.collect::<Vec<_>>())))
    }

    async fn complete(&self, _prompt: &str) -> Result<String, ProviderError> {
        Err(ProviderError::Transport("not supported".to_string()))
    }
}

/// Answers one-shot completions from a queue and counts the calls.
#[derive(Debug, Default)]
pub struct ScriptedProvider {
    completions: Mutex<VecDeque<Result<String, ProviderError>>>,
    calls: AtomicU32,
}

impl ScriptedProvider {
    pub fn new(completions: Vec<Result<&str, ProviderError>>) -> Self {
        Self {
            completions: Mutex::new(
                completions
                    .into_iter()
                    .map(|item| item.map(str::to_string))
                    .collect(),
            ),
            calls: AtomicU32::new(0),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProviderAdapter for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    fn model(&self) -> &str {
        "scripted-model"
    }

    async fn stream(
        &self,
        _prompt: &str,
        _options: &ProviderOptions,
        _cancel: CancellationToken,
    ) -> Result<ProviderStream, ProviderError> {
        Err(ProviderError::Transport("not supported".to_string()))
    }

    async fn complete(&self, _prompt: &str) -> Result<String, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.completions
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(ProviderError::Transport("script exhausted".to_string())))
    }
}

/// Streams `chunks` and records every prompt and option set it receives.
#[derive(Debug, Default)]
pub struct RecordingProvider {
    chunks: Vec<String>,
    calls: Mutex<Vec<(String, ProviderOptions)>>,
}

impl RecordingProvider {
    pub fn new(chunks: Vec<&str>) -> Self {
        Self {
            chunks: chunks.into_iter().map(str::to_string).collect(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.calls.lock().iter().map(|(prompt, _)| prompt.clone()).collect()
    }

    pub fn options(&self) -> Vec<ProviderOptions> {
        self.calls.lock().iter().map(|(_, options)| options.clone()).collect()
    }
}

#[async_trait]
impl ProviderAdapter for RecordingProvider {
    fn name(&self) -> &str {
        "recording"
    }

    fn model(&self) -> &str {
        "recording-model"
    }

    async fn stream(
        &self,
        prompt: &str,
        options: &ProviderOptions,
        _cancel: CancellationToken,
    ) -> Result<ProviderStream, ProviderError> {
        self.calls.lock().push((prompt.to_string(), options.clone()));
        Ok(chunk_stream(self.chunks.clone()))
    }

    async fn complete(&self, prompt: &str) -> Result<String, ProviderError> {
        self.calls
            .lock()
            .push((prompt.to_string(), ProviderOptions::default()));
        Ok(self.chunks.concat())
    }
}

/// Emits one chunk and then never finishes on its own.
#[derive(Debug, Default)]
pub struct StallingProvider {
    token: Mutex<Option<CancellationToken>>,
    released: Arc<AtomicBool>,
}

impl StallingProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// True once the token handed to the provider call was cancelled.
    pub fn observed_cancel(&self) -> bool {
        self.token
            .lock()
            .as_ref()
            .is_some_and(CancellationToken::is_cancelled)
    }

    /// True once the provider stream was dropped.
    pub fn released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }
}

struct ReleaseFlag(Arc<AtomicBool>);

impl Drop for ReleaseFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

struct StallStream {
    first: Option<String>,
    _flag: ReleaseFlag,
}

impl Stream for StallStream {
    type Item = Result<String, ProviderError>;

    fn poll_next(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match self.first.take() {
            Some(text) => Poll::Ready(Some(Ok(text))),
            None => Poll::Pending,
        }
    }
}

#[async_trait]
impl ProviderAdapter for StallingProvider {
    fn name(&self) -> &str {
        "stalling"
    }

    fn model(&self) -> &str {
        "stalling-model"
    }

    async fn stream(
        &self,
        _prompt: &str,
        _options: &ProviderOptions,
        cancel: CancellationToken,
    ) -> Result<ProviderStream, ProviderError> {
        *self.token.lock() = Some(cancel);
        Ok(Box::pin(StallStream {
            first: Some("thinking".to_string()),
            _flag: ReleaseFlag(self.released.clone()),
        }))
    }

    async fn complete(&self, _prompt: &str) -> Result<String, ProviderError> {
        Err(ProviderError::Transport("not supported".to_string()))
    }
}
