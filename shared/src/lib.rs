//! Edge Relay Shared Command Vocabulary
//!
//! This crate holds the pure, I/O-free pieces of the command delivery
//! pipeline: the ledger command record, the canonical command kinds, the
//! payload fallback accessor, topic resolution and the dedupe guard.

pub mod command;
pub mod dedupe;
pub mod payload;
pub mod topics;

pub use command::{Command, CommandKind};
pub use dedupe::DedupeGuard;

/// Fixed limits and defaults of the delivery pipeline
pub mod limits {
    /// Maximum number of command ids remembered by the dedupe guard
    pub const DEDUPE_CAPACITY: usize = 2000;

    /// Number of oldest ids evicted once the dedupe guard overflows
    pub const DEDUPE_EVICT_BATCH: usize = 500;

    /// Default interval between ledger polls
    pub const DEFAULT_POLL_INTERVAL_MS: u64 = 30_000;

    /// Spacing between commands executed from a single poll result
    pub const POLL_COMMAND_SPACING_MS: u64 = 250;

    /// Door and water pulse duration when the payload carries none
    pub const DEFAULT_PULSE_MS: u64 = 2000;

    /// Chair session length when the payload carries none
    pub const DEFAULT_CHAIR_MINUTES: u64 = 15;

    /// Shortest chair session accepted
    pub const MIN_CHAIR_MINUTES: u64 = 1;

    /// Chair stop relay off-time default
    pub const DEFAULT_STOP_OFF_MS: u64 = 2000;

    /// Chair stop relay on-time default
    pub const DEFAULT_STOP_ON_MS: u64 = 20_000;
}

/// Default actuator targets substituted when a command names none
pub mod targets {
    pub const DEFAULT_DOOR: &str = "esp-door-01";
    pub const DEFAULT_COOLER: &str = "esp-cooler-01";
    pub const DEFAULT_CHAIR: &str = "esp-chair-03";
    pub const DEFAULT_FAN: &str = "esp-fan-01";
}
