//! Command ledger collaborator
//!
//! This module handles:
//! - Device sign-in and session refresh against the ledger backend
//! - The claim / complete / pending RPCs used by the executor
//! - The realtime change feed that pushes newly inserted commands

mod client;
mod error;
pub mod realtime;

pub use client::{LedgerClient, LedgerCredentials};
pub use error::{LedgerError, LedgerResult};
pub use realtime::{RealtimeConfig, RealtimeEvent, RealtimeSubscription};

use async_trait::async_trait;
use relay_shared::Command;

/// RPC surface of the command ledger
#[async_trait]
pub trait Ledger: Send + Sync {
    /// All pending commands addressed to `device_id`
    async fn pending_for_device(&self, device_id: &str) -> LedgerResult<Vec<Command>>;

    /// Claim `command_id`. True iff this call moved it to claimed.
    async fn ack_command(&self, command_id: &str) -> LedgerResult<bool>;

    /// Record the final outcome of `command_id`
    async fn complete_command(
        &self,
        command_id: &str,
        success: bool,
        error_message: Option<&str>,
    ) -> LedgerResult<()>;
}
