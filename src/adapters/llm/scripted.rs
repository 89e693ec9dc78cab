//! Scripted language model for tests and dry runs.
//!
//! Replies are routed by [`PromptTask`]. Each task has a queue of one-shot
//! replies, consumed first, then an optional handler or a fallback reply that
//! is repeated for every further call. Every request is recorded.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::domain::errors::BackendError;
use crate::domain::ports::{Completion, CompletionRequest, LanguageModel, PromptTask};

type Handler = Arc<dyn Fn(&CompletionRequest) -> Result<String, BackendError> + Send + Sync>;

#[derive(Default)]
struct Script {
    queued: HashMap<PromptTask, VecDeque<Result<String, BackendError>>>,
    fallback: HashMap<PromptTask, Result<String, BackendError>>,
    handlers: HashMap<PromptTask, Handler>,
    delays: HashMap<PromptTask, Duration>,
    calls: Vec<CompletionRequest>,
}

/// Language model replaying scripted replies per [`PromptTask`].
#[derive(Default)]
pub struct ScriptedLanguageModel {
    script: Mutex<Script>,
}

impl ScriptedLanguageModel {
    /// Model with no replies scripted; every task fails permanently.
    pub fn new() -> Self {
        Self::default()
    }

    fn script(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue a one-shot reply for `task`.
    pub fn push(&self, task: PromptTask, reply: impl Into<String>) -> &Self {
        self.script().queued.entry(task).or_default().push_back(Ok(reply.into()));
        self
    }

    /// Queue a one-shot failure for `task`.
    pub fn push_error(&self, task: PromptTask, error: BackendError) -> &Self {
        self.script().queued.entry(task).or_default().push_back(Err(error));
        self
    }

    /// Reply used whenever the queue for `task` is empty.
    pub fn set_fallback(&self, task: PromptTask, reply: impl Into<String>) -> &Self {
        self.script().fallback.insert(task, Ok(reply.into()));
        self
    }

    /// Failure returned whenever the queue for `task` is empty.
    pub fn set_fallback_error(&self, task: PromptTask, error: BackendError) -> &Self {
        self.script().fallback.insert(task, Err(error));
        self
    }

    /// Compute replies for `task` from the request once its queue is empty.
    /// Takes precedence over a fallback reply.
    pub fn set_handler<F>(&self, task: PromptTask, handler: F) -> &Self
    where
        F: Fn(&CompletionRequest) -> Result<String, BackendError> + Send + Sync + 'static,
    {
        self.script().handlers.insert(task, Arc::new(handler));
        self
    }

    /// Delay every reply for `task`.
    pub fn set_delay(&self, task: PromptTask, delay: Duration) -> &Self {
        self.script().delays.insert(task, delay);
        self
    }

    /// Every request received so far, in arrival order.
    pub fn calls(&self) -> Vec<CompletionRequest> {
        self.script().calls.clone()
    }

    /// Requests received for `task`.
    pub fn call_count(&self, task: PromptTask) -> usize {
        self.script().calls.iter().filter(|c| c.task == task).count()
    }

    fn next_reply(&self, request: &CompletionRequest) -> (Result<String, BackendError>, Option<Duration>) {
        let mut script = self.script();
        script.calls.push(request.clone());
        let delay = script.delays.get(&request.task).copied();

        if let Some(reply) = script.queued.get_mut(&request.task).and_then(VecDeque::pop_front) {
            return (reply, delay);
        }
        if let Some(handler) = script.handlers.get(&request.task).cloned() {
            drop(script);
            return (handler(request), delay);
        }
        let reply = script.fallback.get(&request.task).cloned().unwrap_or_else(|| {
            Err(BackendError::Permanent(format!("no scripted reply for {}", request.task)))
        });
        (reply, delay)
    }
}

#[async_trait]
impl LanguageModel for ScriptedLanguageModel {
    fn model_name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, BackendError> {
        let (reply, delay) = self.next_reply(request);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        reply.map(|content| Completion {
            content,
            model: "scripted".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(task: PromptTask) -> CompletionRequest {
        CompletionRequest {
            task,
            system: String::new(),
            user: "u".to_string(),
            temperature: 0.0,
        }
    }

    #[tokio::test]
    async fn test_queue_then_fallback() {
        let model = ScriptedLanguageModel::new();
        model
            .push(PromptTask::Sufficiency, "first")
            .set_fallback(PromptTask::Sufficiency, "again");

        let first = model.complete(&request(PromptTask::Sufficiency)).await.unwrap();
        let second = model.complete(&request(PromptTask::Sufficiency)).await.unwrap();
        let third = model.complete(&request(PromptTask::Sufficiency)).await.unwrap();
        assert_eq!(first.content, "first");
        assert_eq!(second.content, "again");
        assert_eq!(third.content, "again");
        assert_eq!(model.call_count(PromptTask::Sufficiency), 3);
    }

    #[tokio::test]
    async fn test_unscripted_task_is_permanent_error() {
        let model = ScriptedLanguageModel::new();
        let err = model.complete(&request(PromptTask::Report)).await.unwrap_err();
        assert!(matches!(err, BackendError::Permanent(_)));
    }

    #[tokio::test]
    async fn test_handler_sees_request() {
        let model = ScriptedLanguageModel::new();
        model.set_handler(PromptTask::QueryGeneration, |req| Ok(format!("echo {}", req.user)));
        let reply = model.complete(&request(PromptTask::QueryGeneration)).await.unwrap();
        assert_eq!(reply.content, "echo u");
    }
}
