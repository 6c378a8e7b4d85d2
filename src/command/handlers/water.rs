//! Water cooler handler

use super::door::PULSE_PATHS;
use super::HandlerContext;
use crate::command::plan::{wire_command, PublishAttempt, PublishPlan};
use relay_shared::payload;
use relay_shared::{limits, topics, Command, CommandKind};
use serde_json::json;

/// DISPENSE_WATER: JSON to the canonical topic and the water alias, plus a
/// bare `START` on the alias for coolers that predate JSON commands
pub fn plan_water_pulse(ctx: &HandlerContext, command: &Command) -> PublishPlan {
    let pulse_ms =
        payload::first_number(&command.payload, PULSE_PATHS).unwrap_or(limits::DEFAULT_PULSE_MS);

    let body = wire_command(
        &ctx.command_id,
        "DISPENSE_WATER",
        json!({ "pulse_ms": pulse_ms }),
    );

    PublishPlan {
        kind: CommandKind::WaterPulse,
        target: ctx.target.clone(),
        attempts: vec![
            PublishAttempt::json(topics::canonical_topic(&ctx.site_id, &ctx.target), &body),
            PublishAttempt::json(topics::WATER_ALIAS_TOPIC, &body),
            PublishAttempt::text(topics::WATER_ALIAS_TOPIC, "START").best_effort(),
        ],
    }
}
