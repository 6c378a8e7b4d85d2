//! Command intake from the ledger's push and poll channels

mod coordinator;

pub use coordinator::{IntakeConfig, IntakeCoordinator};
