//! Command executor - claims, dispatches and completes ledger commands

use super::fanout;
use super::handlers::{self, HandlerContext};
use super::plan::PublishPlan;
use crate::ledger::Ledger;
use crate::transport::Publisher;
use relay_shared::{topics, Command, CommandKind, DedupeGuard};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Why a claimed command could not be delivered
#[derive(Error, Debug)]
pub enum CommandError {
    #[error("unsupported command type {0:?}")]
    Unsupported(String),

    #[error("all {attempts} publish attempts failed: {details}")]
    Undelivered { attempts: usize, details: String },
}

/// Result of processing one command record
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessOutcome {
    /// Already handled by this process; nothing was called
    Duplicate,
    /// Claim RPC failed; the command stays claimable
    ClaimFailed { error: String },
    /// Claimed elsewhere or no longer pending
    NotClaimed,
    /// Dispatched and reported to the ledger
    Completed {
        success: bool,
        error: Option<String>,
    },
}

/// Executes ledger commands against the actuator bus
pub struct CommandExecutor {
    site_id: String,
    ledger: Arc<dyn Ledger>,
    publisher: Arc<dyn Publisher>,
    dedupe: Mutex<DedupeGuard>,
}

impl CommandExecutor {
    /// Create a new command executor
    pub fn new(
        site_id: impl Into<String>,
        ledger: Arc<dyn Ledger>,
        publisher: Arc<dyn Publisher>,
    ) -> Self {
        Self {
            site_id: site_id.into(),
            ledger,
            publisher,
            dedupe: Mutex::new(DedupeGuard::new()),
        }
    }

    /// Number of command ids currently remembered as handled
    pub async fn handled_count(&self) -> usize {
        self.dedupe.lock().await.len()
    }

    /// Run one command through claim, dispatch and completion.
    ///
    /// Never fails: every error ends up in the returned outcome or in the
    /// completion reported to the ledger.
    pub async fn process(&self, command: &Command) -> ProcessOutcome {
        if self.dedupe.lock().await.contains(&command.id) {
            debug!(command_id = %command.id, "Skipping already handled command");
            return ProcessOutcome::Duplicate;
        }

        let explicit_target = handlers::explicit_target(command);
        let kind = effective_kind(command.kind(), explicit_target.as_deref());
        let target = explicit_target.or_else(|| handlers::default_target(kind).map(str::to_string));

        info!(
            command_id = %command.id,
            command_type = %command.command_type,
            kind = %kind,
            target = target.as_deref().unwrap_or("-"),
            "Executing command"
        );

        match self.ledger.ack_command(&command.id).await {
            Ok(true) => {}
            Ok(false) => {
                debug!(command_id = %command.id, "Command not claimable, handled elsewhere");
                self.dedupe.lock().await.mark(&command.id);
                return ProcessOutcome::NotClaimed;
            }
            Err(e) => {
                warn!(command_id = %command.id, "Claim failed, leaving command pending: {}", e);
                return ProcessOutcome::ClaimFailed {
                    error: e.to_string(),
                };
            }
        }

        let (success, error) = match self.dispatch(command, kind, target).await {
            Ok(()) => (true, None),
            Err(e) => {
                warn!(command_id = %command.id, "Command failed: {}", e);
                (false, Some(e.to_string()))
            }
        };

        // not retried: a redelivery would actuate again
        if let Err(e) = self
            .ledger
            .complete_command(&command.id, success, error.as_deref())
            .await
        {
            error!(command_id = %command.id, "Failed to report completion: {}", e);
        }

        self.dedupe.lock().await.mark(&command.id);
        ProcessOutcome::Completed { success, error }
    }

    /// Publish the command's plan and judge delivery
    async fn dispatch(
        &self,
        command: &Command,
        kind: CommandKind,
        target: Option<String>,
    ) -> Result<(), CommandError> {
        let plan = self.plan(command, kind, target)?;
        let report = fanout::publish_all(self.publisher.as_ref(), &plan).await;

        for failure in report.failures() {
            if let Err(e) = &failure.result {
                if failure.best_effort {
                    debug!(
                        command_id = %command.id,
                        topic = %failure.topic,
                        "Best-effort publish failed: {}",
                        e.reason()
                    );
                } else {
                    warn!(
                        command_id = %command.id,
                        topic = %failure.topic,
                        "Publish failed: {}",
                        e.reason()
                    );
                }
            }
        }

        if !report.delivered() {
            return Err(CommandError::Undelivered {
                attempts: plan.attempts.len(),
                details: report.failure_message(),
            });
        }

        info!(
            command_id = %command.id,
            kind = %plan.kind,
            target = %plan.target,
            "Command delivered ({}/{} publishes)",
            report.succeeded(),
            plan.attempts.len()
        );
        Ok(())
    }

    fn plan(
        &self,
        command: &Command,
        kind: CommandKind,
        target: Option<String>,
    ) -> Result<PublishPlan, CommandError> {
        let Some(target) = target.filter(|_| kind != CommandKind::Unknown) else {
            return Err(CommandError::Unsupported(command.command_type.clone()));
        };

        let ctx = HandlerContext {
            site_id: self.site_id.clone(),
            command_id: command.id.clone(),
            target,
        };

        let plan = match kind {
            CommandKind::OpenDoor => handlers::plan_open_door(&ctx, command),
            CommandKind::WaterPulse => handlers::plan_water_pulse(&ctx, command),
            CommandKind::ChairStart => handlers::plan_chair_start(&ctx, command),
            CommandKind::Stop => handlers::plan_chair_stop(&ctx, command),
            CommandKind::FanStart => handlers::plan_fan_start(&ctx),
            CommandKind::FanStop => handlers::plan_fan_stop(&ctx),
            CommandKind::Unknown => {
                return Err(CommandError::Unsupported(command.command_type.clone()))
            }
        };
        Ok(plan)
    }
}

/// Chair commands addressed to a fan are fan commands
fn effective_kind(kind: CommandKind, explicit_target: Option<&str>) -> CommandKind {
    let fan_target = explicit_target.is_some_and(topics::is_fan_target);
    match kind {
        CommandKind::ChairStart if fan_target => CommandKind::FanStart,
        CommandKind::Stop if fan_target => CommandKind::FanStop,
        other => other,
    }
}
