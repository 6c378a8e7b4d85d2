//! Door strike handler

use super::HandlerContext;
use crate::command::plan::{wire_command, PublishAttempt, PublishPlan};
use relay_shared::payload::{self, Path};
use relay_shared::{limits, topics, Command, CommandKind};
use serde_json::json;

pub(super) const PULSE_PATHS: &[Path<'static>] = &[&["pulse_ms"], &["args", "pulse_ms"]];

/// OPEN_DOOR: pulse the strike through the canonical topic and the door alias
pub fn plan_open_door(ctx: &HandlerContext, command: &Command) -> PublishPlan {
    let pulse_ms =
        payload::first_number(&command.payload, PULSE_PATHS).unwrap_or(limits::DEFAULT_PULSE_MS);

    let body = wire_command(
        &ctx.command_id,
        "OPEN_DOOR",
        json!({ "pulse_ms": pulse_ms }),
    );

    PublishPlan {
        kind: CommandKind::OpenDoor,
        target: ctx.target.clone(),
        attempts: vec![
            PublishAttempt::json(topics::canonical_topic(&ctx.site_id, &ctx.target), &body),
            PublishAttempt::json(topics::DOOR_ALIAS_TOPIC, &body),
        ],
    }
}
