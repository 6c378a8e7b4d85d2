//! Publish plan builders for each actuator class

mod chair;
mod door;
mod fan;
mod water;

pub use chair::{plan_chair_start, plan_chair_stop};
pub use door::plan_open_door;
pub use fan::{plan_fan_start, plan_fan_stop};
pub use water::plan_water_pulse;

use relay_shared::payload::{self, Path};
use relay_shared::{targets, Command, CommandKind};

/// Payload keys naming the actuator, in lookup order
const TARGET_PATHS: &[Path<'static>] = &[&["target"], &["machine_id"]];

/// Context passed to plan builders
#[derive(Debug, Clone)]
pub struct HandlerContext {
    pub site_id: String,
    pub command_id: String,
    pub target: String,
}

/// Target named by the command payload, if any
pub fn explicit_target(command: &Command) -> Option<String> {
    payload::first_text(&command.payload, TARGET_PATHS)
}

/// Target substituted when the payload names none
pub fn default_target(kind: CommandKind) -> Option<&'static str> {
    match kind {
        CommandKind::OpenDoor => Some(targets::DEFAULT_DOOR),
        CommandKind::WaterPulse => Some(targets::DEFAULT_COOLER),
        CommandKind::ChairStart | CommandKind::Stop => Some(targets::DEFAULT_CHAIR),
        CommandKind::FanStart | CommandKind::FanStop => Some(targets::DEFAULT_FAN),
        CommandKind::Unknown => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_target_falls_back_to_machine_id() {
        let cmd = Command::new("c1", "CHAIR_START", json!({ "machine_id": "esp-chair-09" }));
        assert_eq!(explicit_target(&cmd).as_deref(), Some("esp-chair-09"));

        let cmd = Command::new(
            "c2",
            "CHAIR_START",
            json!({ "target": "esp-chair-01", "machine_id": "esp-chair-09" }),
        );
        assert_eq!(explicit_target(&cmd).as_deref(), Some("esp-chair-01"));
    }

    #[test]
    fn test_no_target() {
        let cmd = Command::new("c1", "OPEN_DOOR", serde_json::Value::Null);
        assert_eq!(explicit_target(&cmd), None);
        assert_eq!(default_target(CommandKind::OpenDoor), Some("esp-door-01"));
        assert_eq!(default_target(CommandKind::Unknown), None);
    }
}
