//! Usage accounting for billing and quota.

use crate::store::UsageRecorder;
use log::{debug, error};
use parley_rs_protocol::{TokenUsage, UserId};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Kind of request being billed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    Completion,
    Embedding,
}

/// One billed provider call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RequestLog {
    pub user_id: UserId,
    pub model: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub kind: RequestKind,
}

/// Invoked once per successful attempt with the model and its usage.
pub type UsageCallback = Arc<dyn Fn(&str, TokenUsage) + Send + Sync>;

/// Callback that bills completions to `user_id` through `recorder`.
///
/// Recorder failures are logged; billing never fails a generation that
/// already succeeded.
pub fn completion_callback(recorder: Arc<dyn UsageRecorder>, user_id: UserId) -> UsageCallback {
    Arc::new(move |model: &str, usage: TokenUsage| {
        let entry = RequestLog {
            user_id: user_id.clone(),
            model: model.to_string(),
            input_tokens: usage.input,
            output_tokens: usage.output,
            kind: RequestKind::Completion,
        };
        match recorder.log_request(&entry) {
            Ok(()) => debug!(
                "logged request usage (model={}, input={}, output={})",
                model, usage.input, usage.output
            ),
            Err(err) => error!(
                "failed to log request usage (model={}, error={})",
                model, err
            ),
        }
    })
}
