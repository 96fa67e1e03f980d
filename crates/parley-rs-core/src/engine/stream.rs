//! Retrying stream producer.

use super::{GenerationHooks, GenerationStream};
use crate::provider::ProviderAdapter;
use crate::usage::UsageCallback;
use futures_util::StreamExt;
use log::{debug, error, info, warn};
use parley_rs_protocol::{ErrorKind, PartialResult, ProviderOptions, TokenUsage};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Parameters for one streamed generation.
pub struct GenerationParams {
    pub adapter: Arc<dyn ProviderAdapter>,
    pub prompt: String,
    pub options: ProviderOptions,
    pub max_attempts: u32,
    /// Items buffered before the producer waits for the consumer.
    pub buffer: usize,
    pub usage: Option<UsageCallback>,
    pub hooks: GenerationHooks,
}

enum Outcome {
    Completed { output: String, usage: TokenUsage },
    Failed,
    Cancelled,
}

/// Spawn the producer task and return the consumer side.
///
/// Must be called inside a tokio runtime.
pub fn spawn_generation(params: GenerationParams) -> GenerationStream {
    let (sender, receiver) = mpsc::channel(params.buffer.max(1));
    let cancel = CancellationToken::new();
    let attempts = Arc::new(AtomicU32::new(0));
    tokio::spawn(run_generation(
        params,
        sender,
        cancel.clone(),
        attempts.clone(),
    ));
    GenerationStream::new(receiver, cancel, attempts)
}

async fn run_generation(
    params: GenerationParams,
    sender: mpsc::Sender<PartialResult>,
    cancel: CancellationToken,
    attempts: Arc<AtomicU32>,
) {
    let GenerationParams {
        adapter,
        prompt,
        options,
        max_attempts,
        buffer: _,
        usage,
        hooks,
    } = params;
    let input = adapter.count_tokens(&prompt);
    info!(
        "starting generation (provider={}, model={}, prompt_len={}, input_tokens={})",
        adapter.name(),
        adapter.model(),
        prompt.len(),
        input
    );

    let outcome = tokio::select! {
        biased;
        _ = cancel.cancelled() => Outcome::Cancelled,
        outcome = drive_attempts(
            adapter.as_ref(),
            &prompt,
            &options,
            max_attempts,
            input,
            &sender,
            &cancel,
            &attempts,
        ) => outcome,
    };

    match outcome {
        Outcome::Completed { output, usage: total } => {
            if let Some(callback) = &usage {
                callback(adapter.model(), total);
            }
            let marker = match hooks.succeed(&output) {
                Ok(()) => PartialResult::completed(),
                Err(err) => {
                    error!("completion hook failed (model={}, error={})", adapter.model(), err);
                    PartialResult::failed(ErrorKind::InternalError)
                }
            };
            info!(
                "generation completed (model={}, attempts={}, output_tokens={})",
                adapter.model(),
                attempts.load(Ordering::Acquire),
                total.output
            );
            let _ = sender.send(marker).await;
        }
        Outcome::Failed => {
            hooks.fail(ErrorKind::GenerationFailed);
            error!(
                "generation failed (model={}, attempts={})",
                adapter.model(),
                attempts.load(Ordering::Acquire)
            );
            let _ = sender
                .send(PartialResult::failed(ErrorKind::GenerationFailed))
                .await;
        }
        Outcome::Cancelled => {
            hooks.fail(ErrorKind::GenerationFailed);
            debug!("generation cancelled (model={})", adapter.model());
            // Errors at once when the consumer is gone.
            let _ = sender
                .send(PartialResult::failed(ErrorKind::GenerationFailed))
                .await;
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn drive_attempts(
    adapter: &dyn ProviderAdapter,
    prompt: &str,
    options: &ProviderOptions,
    max_attempts: u32,
    input: u32,
    sender: &mpsc::Sender<PartialResult>,
    cancel: &CancellationToken,
    attempts: &AtomicU32,
) -> Outcome {
    for attempt in 1..=max_attempts {
        attempts.store(attempt, Ordering::Release);
        let mut stream = match adapter.stream(prompt, options, cancel.child_token()).await {
            Ok(stream) => stream,
            Err(err) => {
                warn!(
                    "provider call failed (model={}, attempt={}/{}, error={})",
                    adapter.model(),
                    attempt,
                    max_attempts,
                    err
                );
                continue;
            }
        };

        let mut output = String::new();
        let mut output_tokens = 0u32;
        let mut failure = None;
        while let Some(item) = stream.next().await {
            match item {
                Ok(text) if text.is_empty() => {}
                Ok(text) => {
                    let tokens = adapter.count_tokens(&text);
                    output_tokens = output_tokens.saturating_add(tokens);
                    output.push_str(&text);
                    let chunk = PartialResult::chunk(text, TokenUsage::new(input, tokens));
                    if sender.send(chunk).await.is_err() {
                        return Outcome::Cancelled;
                    }
                }
                Err(err) => {
                    failure = Some(err);
                    break;
                }
            }
        }

        match failure {
            None => {
                return Outcome::Completed {
                    output,
                    usage: TokenUsage::new(input, output_tokens),
                };
            }
            // Delivered chunks stand; the attempt ends with what was sent.
            Some(err) if !output.is_empty() => {
                warn!(
                    "provider stream broke after output, keeping partial reply (model={}, attempt={}/{}, output_tokens={}, error={})",
                    adapter.model(),
                    attempt,
                    max_attempts,
                    output_tokens,
                    err
                );
                return Outcome::Completed {
                    output,
                    usage: TokenUsage::new(input, output_tokens),
                };
            }
            Some(err) => {
                warn!(
                    "provider stream failed (model={}, attempt={}/{}, error={})",
                    adapter.model(),
                    attempt,
                    max_attempts,
                    err
                );
            }
        }
    }
    Outcome::Failed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{ProviderError, ProviderStream};
    use async_trait::async_trait;
    use futures_util::stream;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use std::collections::VecDeque;

    /// Replays one scripted result per attempt.
    struct Script {
        attempts: Mutex<VecDeque<Result<Vec<Result<String, ProviderError>>, ProviderError>>>,
    }

    impl Script {
        fn new(
            attempts: Vec<Result<Vec<Result<String, ProviderError>>, ProviderError>>,
        ) -> Arc<Self> {
            Arc::new(Self {
                attempts: Mutex::new(attempts.into()),
            })
        }
    }

    #[async_trait]
    impl ProviderAdapter for Script {
        fn name(&self) -> &str {
            "script"
        }

        fn model(&self) -> &str {
            "script-1"
        }

        async fn stream(
            &self,
            _prompt: &str,
            _options: &ProviderOptions,
            _cancel: CancellationToken,
        ) -> Result<ProviderStream, ProviderError> {
            let next = self
                .attempts
                .lock()
                .pop_front()
                .unwrap_or_else(|| Err(ProviderError::Transport("script exhausted".into())));
            next.map(|items| Box::pin(stream::iter(items)) as ProviderStream)
        }

        async fn complete(&self, _prompt: &str) -> Result<String, ProviderError> {
            Err(ProviderError::Transport("not scripted".into()))
        }
    }

    fn params(adapter: Arc<dyn ProviderAdapter>) -> GenerationParams {
        GenerationParams {
            adapter,
            prompt: "prompt".to_string(),
            options: ProviderOptions::default(),
            max_attempts: 5,
            buffer: 4,
            usage: None,
            hooks: GenerationHooks::new(),
        }
    }

    #[tokio::test]
    async fn empty_failed_attempts_are_retried() {
        let script = Script::new(vec![
            Err(ProviderError::Transport("reset".into())),
            Ok(vec![Err(ProviderError::Malformed("bad frame".into()))]),
            Ok(vec![Ok("Hel".into()), Ok("lo!".into())]),
        ]);
        let stream = spawn_generation(params(script));
        let (text, usage) = stream.collect().await.expect("collect");
        assert_eq!(text, "Hello!");
        assert_eq!(usage, TokenUsage::new(2, 2));
    }

    #[tokio::test]
    async fn break_after_output_completes_attempt() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let script = Script::new(vec![
            Ok(vec![Ok("partial".into()), Err(ProviderError::Transport("eof".into()))]),
            Ok(vec![Ok("never".into())]),
        ]);
        let mut params = params(script.clone());
        params.usage = Some(Arc::new(move |model: &str, usage: TokenUsage| {
            sink.lock().push((model.to_string(), usage));
        }));
        let items: Vec<PartialResult> = StreamExt::collect(spawn_generation(params)).await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].text, "partial");
        assert_eq!(items[1], PartialResult::completed());
        assert_eq!(
            seen.lock().clone(),
            vec![("script-1".to_string(), TokenUsage::new(2, 2))]
        );
        assert_eq!(script.attempts.lock().len(), 1);
    }

    /// Yields the same chunk forever.
    struct Endless;

    #[async_trait]
    impl ProviderAdapter for Endless {
        fn name(&self) -> &str {
            "endless"
        }

        fn model(&self) -> &str {
            "endless-1"
        }

        async fn stream(
            &self,
            _prompt: &str,
            _options: &ProviderOptions,
            _cancel: CancellationToken,
        ) -> Result<ProviderStream, ProviderError> {
            Ok(Box::pin(stream::repeat_with(|| Ok("tick".to_string()))))
        }

        async fn complete(&self, _prompt: &str) -> Result<String, ProviderError> {
            Err(ProviderError::Transport("not scripted".into()))
        }
    }

    #[tokio::test]
    async fn cancel_with_full_buffer_still_ends_with_marker() {
        let mut params = params(Arc::new(Endless));
        params.buffer = 2;
        let mut generation = spawn_generation(params);
        let first = generation.next().await.expect("first chunk");
        assert_eq!(first.text, "tick");
        tokio::task::yield_now().await;

        generation.cancel();
        let rest: Vec<PartialResult> = StreamExt::collect(generation).await;

        let terminal: Vec<&PartialResult> = rest.iter().filter(|item| item.terminal).collect();
        assert_eq!(terminal.len(), 1);
        assert_eq!(
            rest.last(),
            Some(&PartialResult::failed(ErrorKind::GenerationFailed))
        );
        assert!(rest.len() <= 4);
    }

    #[tokio::test]
    async fn usage_callback_fires_once_with_totals() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let script = Script::new(vec![Ok(vec![Ok("abcd".into()), Ok("efgh".into())])]);
        let mut params = params(script);
        params.usage = Some(Arc::new(move |model: &str, usage: TokenUsage| {
            sink.lock().push((model.to_string(), usage));
        }));
        spawn_generation(params).collect().await.expect("collect");
        assert_eq!(
            seen.lock().clone(),
            vec![("script-1".to_string(), TokenUsage::new(2, 2))]
        );
    }
}
