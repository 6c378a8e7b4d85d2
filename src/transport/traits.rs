//! Publisher trait abstraction for the local message bus

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

/// Errors from a single publish attempt
#[derive(Error, Debug, Clone)]
pub enum PublishError {
    #[error("Publish to {topic} failed: {reason}")]
    Failed { topic: String, reason: String },
}

impl PublishError {
    pub fn failed(topic: &str, reason: impl Into<String>) -> Self {
        PublishError::Failed {
            topic: topic.to_string(),
            reason: reason.into(),
        }
    }

    /// Failure cause without the topic
    pub fn reason(&self) -> &str {
        match self {
            PublishError::Failed { reason, .. } => reason,
        }
    }
}

/// A sink for actuator commands on the message bus
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Publish `payload` to `topic` with at-least-once delivery, no retain
    async fn publish(&self, topic: &str, payload: Bytes) -> Result<(), PublishError>;
}
