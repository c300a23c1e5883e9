//! Reasoning delegate seam.
//!
//! A delegate turns a task description (plus optional context and tool
//! names) into a response, typically by prompting a language model. The
//! measurement pipeline never depends on one; [`NullDelegate`] is the
//! default.

use async_trait::async_trait;

/// Failure on the narration path. Never affects measurements.
#[derive(Debug, thiserror::Error)]
pub enum DelegateError {
    #[error("delegate unavailable: {0}")]
    Unavailable(String),
    #[error("delegate rejected task: {0}")]
    Rejected(String),
    #[error("delegate timed out")]
    Timeout,
}

/// A unit of work handed to a delegate.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DelegateTask {
    pub description: String,
    pub context: String,
    pub tools: Vec<String>,
}

impl DelegateTask {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            ..Self::default()
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = context.into();
        self
    }

    pub fn with_tools<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tools = tools.into_iter().map(Into::into).collect();
        self
    }
}

/// Something that can narrate or decide based on measurement data.
#[async_trait]
pub trait ReasoningDelegate: Send + Sync {
    async fn describe(&self, task: &DelegateTask) -> Result<String, DelegateError>;
}

/// The absent delegate: answers every task with an empty response.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullDelegate;

#[async_trait]
impl ReasoningDelegate for NullDelegate {
    async fn describe(&self, _task: &DelegateTask) -> Result<String, DelegateError> {
        Ok(String::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn null_delegate_answers_empty() {
        let task = DelegateTask::new("Summarise")
            .with_context("network_latency: 12 ms")
            .with_tools(["network_latency"]);
        assert_eq!(task.tools, vec!["network_latency".to_string()]);
        assert_eq!(NullDelegate.describe(&task).await.unwrap(), "");
    }
}
