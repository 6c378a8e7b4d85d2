//! Fan handlers
//!
//! Fans run older firmware that only listens on the fan alias, so the bare
//! command word is the primary path and the canonical JSON is best-effort.

use super::HandlerContext;
use crate::command::plan::{wire_command, PublishAttempt, PublishPlan};
use relay_shared::{topics, CommandKind};
use serde_json::json;

pub fn plan_fan_start(ctx: &HandlerContext) -> PublishPlan {
    plan_fan(ctx, CommandKind::FanStart, "START")
}

pub fn plan_fan_stop(ctx: &HandlerContext) -> PublishPlan {
    plan_fan(ctx, CommandKind::FanStop, "STOP")
}

fn plan_fan(ctx: &HandlerContext, kind: CommandKind, word: &'static str) -> PublishPlan {
    let body = wire_command(&ctx.command_id, word, json!({}));

    PublishPlan {
        kind,
        target: ctx.target.clone(),
        attempts: vec![
            PublishAttempt::text(topics::FAN_ALIAS_TOPIC, word),
            PublishAttempt::json(topics::canonical_topic(&ctx.site_id, &ctx.target), &body)
                .best_effort(),
        ],
    }
}
