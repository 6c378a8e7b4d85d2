//! In-memory ledger and publisher fakes for unit tests

use crate::ledger::{Ledger, LedgerError, LedgerResult};
use crate::transport::{PublishError, Publisher};
use async_trait::async_trait;
use bytes::Bytes;
use relay_shared::Command;
use std::collections::HashSet;
use std::sync::Mutex;

/// Ledger that claims each id once and records every call
#[derive(Default)]
pub struct FakeLedger {
    pub pending: Mutex<Vec<Command>>,
    pub claimed: Mutex<HashSet<String>>,
    pub acks: Mutex<Vec<String>>,
    pub completions: Mutex<Vec<(String, bool, Option<String>)>>,
    pub polls: Mutex<usize>,
    /// Ids whose claim RPC fails with a transport error
    pub unreachable_claims: Mutex<HashSet<String>>,
    pub fail_completions: bool,
    pub fail_polls: bool,
}

impl FakeLedger {
    pub fn with_pending(commands: Vec<Command>) -> Self {
        Self {
            pending: Mutex::new(commands),
            ..Default::default()
        }
    }

    pub fn ack_count(&self, id: &str) -> usize {
        self.acks.lock().unwrap().iter().filter(|a| *a == id).count()
    }

    pub fn completion(&self, id: &str) -> Option<(bool, Option<String>)> {
        self.completions
            .lock()
            .unwrap()
            .iter()
            .find(|(c, _, _)| c == id)
            .map(|(_, success, error)| (*success, error.clone()))
    }
}

fn unreachable(operation: &str) -> LedgerError {
    LedgerError::Protocol(format!("{operation}: connection refused"))
}

#[async_trait]
impl Ledger for FakeLedger {
    async fn pending_for_device(&self, _device_id: &str) -> LedgerResult<Vec<Command>> {
        *self.polls.lock().unwrap() += 1;
        if self.fail_polls {
            return Err(unreachable("pending_for_device"));
        }
        let claimed = self.claimed.lock().unwrap().clone();
        Ok(self
            .pending
            .lock()
            .unwrap()
            .iter()
            .filter(|c| !claimed.contains(&c.id))
            .cloned()
            .collect())
    }

    async fn ack_command(&self, command_id: &str) -> LedgerResult<bool> {
        self.acks.lock().unwrap().push(command_id.to_string());
        // let a concurrent delivery of the same id reach its claim first
        tokio::task::yield_now().await;
        if self.unreachable_claims.lock().unwrap().contains(command_id) {
            return Err(unreachable("ack_command"));
        }
        Ok(self.claimed.lock().unwrap().insert(command_id.to_string()))
    }

    async fn complete_command(
        &self,
        command_id: &str,
        success: bool,
        error_message: Option<&str>,
    ) -> LedgerResult<()> {
        self.completions.lock().unwrap().push((
            command_id.to_string(),
            success,
            error_message.map(str::to_string),
        ));
        if self.fail_completions {
            return Err(unreachable("complete_command"));
        }
        Ok(())
    }
}

type FailRule = Box<dyn Fn(&str, &str) -> bool + Send + Sync>;

/// Publisher recording `(topic, payload)` and failing where `fail_when` says
pub struct FakePublisher {
    pub published: Mutex<Vec<(String, String)>>,
    fail_when: FailRule,
}

impl Default for FakePublisher {
    fn default() -> Self {
        Self::failing(|_, _| false)
    }
}

impl FakePublisher {
    pub fn failing(rule: impl Fn(&str, &str) -> bool + Send + Sync + 'static) -> Self {
        Self {
            published: Mutex::new(Vec::new()),
            fail_when: Box::new(rule),
        }
    }

    /// Successful publishes only
    pub fn delivered(&self) -> Vec<(String, String)> {
        self.published.lock().unwrap().clone()
    }
}

#[async_trait]
impl Publisher for FakePublisher {
    async fn publish(&self, topic: &str, payload: Bytes) -> Result<(), PublishError> {
        let text = String::from_utf8_lossy(&payload).to_string();
        if (self.fail_when)(topic, &text) {
            return Err(PublishError::failed(topic, "broker unreachable"));
        }
        self.published.lock().unwrap().push((topic.to_string(), text));
        Ok(())
    }
}
