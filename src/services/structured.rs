//! Structured language-model calls.
//!
//! Every prompt-driven stage goes through [`StructuredCaller`]: it reserves a
//! call from the run budget, waits on the shared throttle, asks the model,
//! extracts the JSON object from the reply and hands it to a stage-specific
//! interpreter. Parse and interpretation failures are malformed output, which
//! the retry policy treats as retryable. Retries may send a shortened prompt;
//! see [`super::truncation`].

use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

use crate::domain::errors::BackendError;
use crate::domain::ports::{CompletionRequest, LanguageModel};
use crate::infrastructure::resilience::{RequestThrottle, RetryPolicy, Retryable};

use super::budget::{BudgetExhausted, RunBudget};
use super::truncation::fit_request;

/// Failure of a structured call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallError {
    /// The model failed or its reply could not be used.
    Backend(BackendError),
    /// The run budget refused another attempt.
    Budget(BudgetExhausted),
}

impl std::fmt::Display for CallError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Backend(err) => write!(f, "{err}"),
            Self::Budget(reason) => write!(f, "{reason}"),
        }
    }
}

impl Retryable for CallError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Backend(err) => err.is_retryable(),
            Self::Budget(_) => false,
        }
    }
}

/// Budgeted, throttled and retried access to the language model, shared by
/// every prompt-driven stage of a run.
#[derive(Clone)]
pub struct StructuredCaller {
    model: Arc<dyn LanguageModel>,
    retry: RetryPolicy,
    throttle: RequestThrottle,
    retry_input_max_chars: Option<usize>,
}

impl StructuredCaller {
    /// Caller that always resends the full prompt.
    pub fn new(model: Arc<dyn LanguageModel>, retry: RetryPolicy, throttle: RequestThrottle) -> Self {
        Self {
            model,
            retry,
            throttle,
            retry_input_max_chars: None,
        }
    }

    /// Shorten prompts to at most `max_chars` characters from the second
    /// attempt on. `None` keeps the full prompt on every attempt.
    #[must_use]
    pub const fn with_retry_input_limit(mut self, max_chars: Option<usize>) -> Self {
        self.retry_input_max_chars = max_chars;
        self
    }

    /// Name of the underlying model.
    pub fn model_name(&self) -> &str {
        self.model.model_name()
    }

    /// Ask the model and interpret its JSON reply as `T`, then map it through
    /// `interpret`. An `Err` from `interpret` marks the reply as malformed.
    #[instrument(skip_all, fields(task = %request.task))]
    pub async fn call<T, U, F>(
        &self,
        request: &CompletionRequest,
        budget: &RunBudget,
        interpret: F,
    ) -> Result<U, CallError>
    where
        T: DeserializeOwned + Send,
        U: Send,
        F: Fn(T) -> Result<U, String> + Sync,
    {
        let label = request.task.to_string();
        let interpret = &interpret;
        self.retry
            .execute(&label, |attempt| async move {
                budget.acquire_call().map_err(CallError::Budget)?;
                self.throttle.acquire().await;
                debug!(attempt, "calling language model");

                let shortened = match self.retry_input_max_chars {
                    Some(max_chars) if attempt > 1 => fit_request(request, max_chars),
                    _ => None,
                };
                if let Some(shortened) = &shortened {
                    warn!(
                        attempt,
                        system_chars = shortened.system.chars().count(),
                        user_chars = shortened.user.chars().count(),
                        "retrying with truncated prompt"
                    );
                }

                let completion = self
                    .model
                    .complete(shortened.as_ref().unwrap_or(request))
                    .await
                    .map_err(CallError::Backend)?;
                let parsed: T = parse_json(&completion.content).map_err(CallError::Backend)?;
                interpret(parsed).map_err(|reason| CallError::Backend(BackendError::Malformed(reason)))
            })
            .await
    }
}

impl std::fmt::Debug for StructuredCaller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StructuredCaller")
            .field("model", &self.model.model_name())
            .field("retry", &self.retry)
            .field("retry_input_max_chars", &self.retry_input_max_chars)
            .finish_non_exhaustive()
    }
}

/// Locate the JSON object in a model reply: strips markdown fences and any
/// prose around the outermost braces.
pub fn extract_json(response: &str) -> &str {
    let mut trimmed = response.trim();

    if let Some(rest) = trimmed.strip_prefix("```") {
        let rest = rest.strip_prefix("json").unwrap_or(rest);
        trimmed = rest.trim_end().strip_suffix("```").unwrap_or(rest).trim();
    }

    if trimmed.starts_with('{') && trimmed.ends_with('}') {
        return trimmed;
    }

    match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(start), Some(end)) if end > start => &trimmed[start..=end],
        _ => trimmed,
    }
}

/// Deserialize the JSON object embedded in a model reply.
pub fn parse_json<T: DeserializeOwned>(response: &str) -> Result<T, BackendError> {
    serde_json::from_str(extract_json(response))
        .map_err(|err| BackendError::Malformed(format!("{err}; reply was: {}", preview(response))))
}

fn preview(text: &str) -> String {
    const LIMIT: usize = 200;
    match text.char_indices().nth(LIMIT) {
        Some((idx, _)) => format!("{}…", &text[..idx]),
        None => text.to_string(),
    }
}
