//! Ledger command record and the canonical command kinds
//!
//! Command types arrive as free-form strings, often from older firmware
//! tooling. They are normalized against a closed synonym table; anything
//! not in the table is `Unknown`.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;

/// A command row as stored by the ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    /// Ledger-assigned id, stable across push and poll delivery
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,
    /// Raw command type, possibly legacy or misspelled
    #[serde(default, deserialize_with = "deserialize_nullable_string")]
    pub command_type: String,
    /// Loosely structured arguments, read only through `payload` accessors
    #[serde(default)]
    pub payload: Value,
    /// Ledger-owned lifecycle status
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub device_id: Option<String>,
}

impl Command {
    /// Build a command with the given id, type and payload
    pub fn new(id: impl Into<String>, command_type: impl Into<String>, payload: Value) -> Self {
        Self {
            id: id.into(),
            command_type: command_type.into(),
            payload,
            status: None,
            device_id: None,
        }
    }

    /// Normalized kind of this command
    pub fn kind(&self) -> CommandKind {
        CommandKind::normalize(&self.command_type)
    }
}

fn deserialize_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "command id must be a string or number, got {other}"
        ))),
    }
}

fn deserialize_nullable_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// Canonical command kinds understood by the actuators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    OpenDoor,
    WaterPulse,
    ChairStart,
    Stop,
    FanStart,
    FanStop,
    Unknown,
}

impl CommandKind {
    /// Map a raw command type onto a canonical kind.
    ///
    /// Trims and uppercases, then matches exactly. No substring inference.
    pub fn normalize(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "OPEN_DOOR" | "DOOR_OPEN" | "OPEN_DOOR_COMMAND" => CommandKind::OpenDoor,
            "DISPENSE_WATER" | "WATER_ACTIVATE" | "WATER_PULSE" => CommandKind::WaterPulse,
            "CHAIR_START" | "CHAIR_ACTIVATE" | "CHAIR_START_MINUTES" | "START" => {
                CommandKind::ChairStart
            }
            "STOP" | "CHAIR_STOP" | "CHAIR_DEACTIVATE" => CommandKind::Stop,
            "FAN_START" | "START_FAN" => CommandKind::FanStart,
            "FAN_STOP" | "STOP_FAN" => CommandKind::FanStop,
            _ => CommandKind::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CommandKind::OpenDoor => "open_door",
            CommandKind::WaterPulse => "water_pulse",
            CommandKind::ChairStart => "chair_start",
            CommandKind::Stop => "stop",
            CommandKind::FanStart => "fan_start",
            CommandKind::FanStop => "fan_stop",
            CommandKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
