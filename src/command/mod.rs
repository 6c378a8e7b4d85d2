//! Command execution for the relay
//!
//! This module handles:
//! - Normalizing command types and resolving actuator targets
//! - Building per-kind publish plans
//! - Fanning plans out to the bus and judging delivery
//! - Claiming and completing commands on the ledger

mod executor;
pub mod fanout;
pub mod handlers;
pub mod plan;

pub use executor::{CommandExecutor, ProcessOutcome};
