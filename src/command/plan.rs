//! Publish plans: the topics and payloads one command fans out to

use bytes::Bytes;
use relay_shared::CommandKind;
use serde_json::{json, Value};

/// Encoding of a publish payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadFormat {
    /// `{id, action, args}` JSON object
    Json,
    /// Bare ASCII command word for legacy firmware
    Text,
}

/// One publish of a plan
#[derive(Debug, Clone, PartialEq)]
pub struct PublishAttempt {
    pub topic: String,
    pub payload: Bytes,
    pub format: PayloadFormat,
    /// Failure is expected on some fleets and only logged at debug level
    pub best_effort: bool,
}

impl PublishAttempt {
    pub fn json(topic: impl Into<String>, body: &Value) -> Self {
        Self {
            topic: topic.into(),
            payload: Bytes::from(body.to_string()),
            format: PayloadFormat::Json,
            best_effort: false,
        }
    }

    pub fn text(topic: impl Into<String>, word: &'static str) -> Self {
        Self {
            topic: topic.into(),
            payload: Bytes::from_static(word.as_bytes()),
            format: PayloadFormat::Text,
            best_effort: false,
        }
    }

    pub fn best_effort(mut self) -> Self {
        self.best_effort = true;
        self
    }

    /// Payload as text, for logging
    pub fn payload_str(&self) -> &str {
        std::str::from_utf8(&self.payload).unwrap_or("<binary>")
    }
}

/// Every publish needed to deliver one command
#[derive(Debug, Clone, PartialEq)]
pub struct PublishPlan {
    pub kind: CommandKind,
    pub target: String,
    pub attempts: Vec<PublishAttempt>,
}

/// JSON body understood by current actuator firmware
pub fn wire_command(id: &str, action: &str, args: Value) -> Value {
    json!({
        "id": id,
        "action": action,
        "args": args,
    })
}
