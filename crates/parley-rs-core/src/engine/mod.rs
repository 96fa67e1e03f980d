//! Generation engines: the retrying stream and the typed JSON loop.

mod stream;
mod typed;

pub use stream::{GenerationParams, spawn_generation};
pub use typed::{TypedGeneration, generate_typed, strip_code_fence, typed_prompt};

use crate::error::{GatewayError, GenerationFailure};
use futures_util::{Stream, StreamExt};
use log::error;
use parley_rs_protocol::{ErrorKind, PartialResult, TokenUsage};
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::{CancellationToken, DropGuard};

/// Runs once with the full output of a successful generation.
pub type SuccessHook = Box<dyn FnOnce(&str) -> Result<(), GatewayError> + Send>;
/// Runs once when a generation fails or is cancelled.
pub type FailureHook = Box<dyn FnOnce(ErrorKind) + Send>;

/// Completion hooks owned by one generation.
#[derive(Default)]
pub struct GenerationHooks {
    on_success: Vec<SuccessHook>,
    on_failure: Vec<FailureHook>,
}

impl GenerationHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_success(
        mut self,
        hook: impl FnOnce(&str) -> Result<(), GatewayError> + Send + 'static,
    ) -> Self {
        self.on_success.push(Box::new(hook));
        self
    }

    pub fn on_failure(mut self, hook: impl FnOnce(ErrorKind) + Send + 'static) -> Self {
        self.on_failure.push(Box::new(hook));
        self
    }

    /// Run success hooks in registration order, stopping at the first error.
    pub(crate) fn succeed(self, output: &str) -> Result<(), GatewayError> {
        for hook in self.on_success {
            hook(output)?;
        }
        Ok(())
    }

    pub(crate) fn fail(self, kind: ErrorKind) {
        for hook in self.on_failure {
            hook(kind);
        }
    }
}

/// Live sequence of partial results for one generation.
///
/// Ends with exactly one terminal item. Dropping the stream cancels the
/// producer and the provider call it is driving.
pub struct GenerationStream {
    inner: ReceiverStream<PartialResult>,
    attempts: Arc<AtomicU32>,
    cancel: CancellationToken,
    _guard: DropGuard,
}

impl GenerationStream {
    pub(crate) fn new(
        receiver: mpsc::Receiver<PartialResult>,
        cancel: CancellationToken,
        attempts: Arc<AtomicU32>,
    ) -> Self {
        Self {
            inner: ReceiverStream::new(receiver),
            attempts,
            _guard: cancel.clone().drop_guard(),
            cancel,
        }
    }

    /// Attempts started so far.
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::Acquire)
    }

    /// Stop the producer without dropping the stream.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Drain the stream into the full text and its usage.
    ///
    /// Output tokens are summed over chunks; the input count is the
    /// attempt's fixed prompt size.
    pub async fn collect(mut self) -> Result<(String, TokenUsage), GatewayError> {
        let mut text = String::new();
        let mut usage = TokenUsage::default();
        while let Some(item) = self.next().await {
            if let Some(kind) = item.error {
                return Err(match kind {
                    ErrorKind::GenerationFailed => GatewayError::GenerationFailed(
                        GenerationFailure::new(self.attempts(), usage),
                    ),
                    other => GatewayError::Internal(format!(
                        "generation ended with {}",
                        other.as_str()
                    )),
                });
            }
            if item.terminal {
                return Ok((text, usage));
            }
            text.push_str(&item.text);
            usage.absorb_chunk(item.token_usage);
        }
        error!(
            "generation stream closed without terminal marker (attempts={})",
            self.attempts()
        );
        Err(GatewayError::Internal(
            "generation stream closed early".to_string(),
        ))
    }
}

impl Stream for GenerationStream {
    type Item = PartialResult;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.get_mut().inner).poll_next(cx)
    }
}
