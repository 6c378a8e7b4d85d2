//! Intake coordinator
//!
//! Feeds the executor from two channels: realtime inserts pushed by the
//! ledger and a periodic poll of the device's pending commands. Both run in
//! one task, so a push and a poll for the same id interleave only at await
//! points and the executor's dedupe and the ledger claim settle the race.

use crate::command::{CommandExecutor, ProcessOutcome};
use crate::ledger::{Ledger, RealtimeEvent};
use relay_shared::limits;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval_at, sleep, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Intake timing
#[derive(Debug, Clone)]
pub struct IntakeConfig {
    pub device_id: String,
    /// Period between safety-net polls
    pub poll_interval: Duration,
    /// Pause between commands taken from one poll
    pub command_spacing: Duration,
}

impl IntakeConfig {
    pub fn new(device_id: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            poll_interval: Duration::from_millis(limits::DEFAULT_POLL_INTERVAL_MS),
            command_spacing: Duration::from_millis(limits::POLL_COMMAND_SPACING_MS),
        }
    }
}

pub struct IntakeCoordinator {
    config: IntakeConfig,
    executor: Arc<CommandExecutor>,
    ledger: Arc<dyn Ledger>,
}

impl IntakeCoordinator {
    pub fn new(
        config: IntakeConfig,
        executor: Arc<CommandExecutor>,
        ledger: Arc<dyn Ledger>,
    ) -> Self {
        Self {
            config,
            executor,
            ledger,
        }
    }

    /// Poll once at boot, then serve the push and poll channels.
    ///
    /// Runs until cancelled; the push side ending does not stop polling.
    pub async fn run(&self, events: mpsc::Receiver<RealtimeEvent>) {
        info!(
            device_id = %self.config.device_id,
            "Intake starting (poll every {:?})",
            self.config.poll_interval
        );
        self.poll_once().await;
        tokio::join!(self.poll_loop(), self.push_loop(events));
    }

    /// Fetch pending commands and run them in ledger order.
    ///
    /// Returns the number of commands fetched.
    pub async fn poll_once(&self) -> usize {
        let commands = match self.ledger.pending_for_device(&self.config.device_id).await {
            Ok(commands) => commands,
            Err(e) => {
                warn!("Poll failed: {}", e);
                return 0;
            }
        };

        if commands.is_empty() {
            debug!("Poll found no pending commands");
            return 0;
        }

        info!("Poll found {} pending command(s)", commands.len());
        for (index, command) in commands.iter().enumerate() {
            if index > 0 {
                sleep(self.config.command_spacing).await;
            }
            self.execute(command, "poll").await;
        }
        commands.len()
    }

    async fn poll_loop(&self) {
        let period = self.config.poll_interval;
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            self.poll_once().await;
        }
    }

    async fn push_loop(&self, mut events: mpsc::Receiver<RealtimeEvent>) {
        while let Some(event) = events.recv().await {
            match event {
                RealtimeEvent::Inserted(command) => self.execute(&command, "push").await,
                RealtimeEvent::Connecting => debug!("[REALTIME] Connecting"),
                RealtimeEvent::Subscribed => info!("[REALTIME] Subscribed to command inserts"),
                RealtimeEvent::ChannelError { reason } => {
                    error!("[REALTIME] Channel error: {}", reason)
                }
                RealtimeEvent::Disconnected { reason } => {
                    warn!("[REALTIME] Disconnected: {}", reason)
                }
            }
        }
        warn!("[REALTIME] Event stream closed, continuing on polls only");
    }

    async fn execute(&self, command: &relay_shared::Command, source: &'static str) {
        let outcome = self.executor.process(command).await;
        match &outcome {
            ProcessOutcome::Completed { success: true, .. } => {
                info!(command_id = %command.id, source, "Command completed")
            }
            ProcessOutcome::Completed { error, .. } => info!(
                command_id = %command.id,
                source,
                "Command completed with failure: {}",
                error.as_deref().unwrap_or("unknown")
            ),
            other => debug!(command_id = %command.id, source, "Command outcome: {:?}", other),
        }
    }
}
