//! Massage chair handlers (start, stop)

use super::HandlerContext;
use crate::command::plan::{wire_command, PublishAttempt, PublishPlan};
use relay_shared::payload::{self, Path};
use relay_shared::{limits, topics, Command, CommandKind};
use serde_json::json;

const MINUTES_PATHS: &[Path<'static>] = &[&["minutes"], &["chairMinutes"], &["args", "minutes"]];
const OFF_MS_PATHS: &[Path<'static>] = &[&["off_ms"], &["args", "off_ms"]];
const ON_MS_PATHS: &[Path<'static>] = &[&["on_ms"], &["args", "on_ms"]];

/// CHAIR_START: JSON session length to the canonical topic, bare `START`
/// to the legacy chair topic when the target carries a chair number
pub fn plan_chair_start(ctx: &HandlerContext, command: &Command) -> PublishPlan {
    let minutes = payload::first_number(&command.payload, MINUTES_PATHS)
        .unwrap_or(limits::DEFAULT_CHAIR_MINUTES)
        .max(limits::MIN_CHAIR_MINUTES);

    let body = wire_command(&ctx.command_id, "START", json!({ "minutes": minutes }));

    let mut attempts = vec![PublishAttempt::json(
        topics::canonical_topic(&ctx.site_id, &ctx.target),
        &body,
    )];
    if let Some(alias) = topics::chair_alias(&ctx.target) {
        attempts.push(PublishAttempt::text(alias, "START"));
    }

    PublishPlan {
        kind: CommandKind::ChairStart,
        target: ctx.target.clone(),
        attempts,
    }
}

/// STOP: relay off/on timings to the canonical topic, bare `STOP` to the
/// legacy chair topic when one resolves
pub fn plan_chair_stop(ctx: &HandlerContext, command: &Command) -> PublishPlan {
    let off_ms = payload::first_number(&command.payload, OFF_MS_PATHS)
        .unwrap_or(limits::DEFAULT_STOP_OFF_MS);
    let on_ms = payload::first_number(&command.payload, ON_MS_PATHS)
        .unwrap_or(limits::DEFAULT_STOP_ON_MS);

    let body = wire_command(
        &ctx.command_id,
        "STOP",
        json!({ "off_ms": off_ms, "on_ms": on_ms }),
    );

    let mut attempts = vec![PublishAttempt::json(
        topics::canonical_topic(&ctx.site_id, &ctx.target),
        &body,
    )];
    if let Some(alias) = topics::chair_alias(&ctx.target) {
        attempts.push(PublishAttempt::text(alias, "STOP"));
    }

    PublishPlan {
        kind: CommandKind::Stop,
        target: ctx.target.clone(),
        attempts,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn ctx(target: &str) -> HandlerContext {
        HandlerContext {
            site_id: "gym".into(),
            command_id: "c2".into(),
            target: target.into(),
        }
    }

    #[test]
    fn test_chair_start_floors_minutes() {
        let cmd = Command::new(
            "c2",
            "CHAIR_START",
            json!({ "target": "esp-chair-07", "minutes": 0 }),
        );
        let plan = plan_chair_start(&ctx("esp-chair-07"), &cmd);

        assert_eq!(plan.attempts.len(), 2);
        assert_eq!(plan.attempts[0].topic, "site/gym/esp/esp-chair-07/cmd");
        assert_eq!(
            plan.attempts[0].payload_str(),
            r#"{"id":"c2","action":"START","args":{"minutes":1}}"#
        );
        assert_eq!(plan.attempts[1].topic, "chair7/control");
        assert_eq!(plan.attempts[1].payload_str(), "START");
    }

    #[test]
    fn test_chair_minutes_fallback_chain() {
        let cmd = Command::new("c2", "START", json!({ "chairMinutes": 20 }));
        let plan = plan_chair_start(&ctx("esp-chair-03"), &cmd);
        assert!(plan.attempts[0].payload_str().contains(r#""minutes":20"#));

        let cmd = Command::new("c2", "START", json!({ "args": { "minutes": 9 } }));
        let plan = plan_chair_start(&ctx("esp-chair-03"), &cmd);
        assert!(plan.attempts[0].payload_str().contains(r#""minutes":9"#));

        let cmd = Command::new("c2", "START", Value::Null);
        let plan = plan_chair_start(&ctx("esp-chair-03"), &cmd);
        assert!(plan.attempts[0].payload_str().contains(r#""minutes":15"#));
        assert_eq!(plan.attempts[1].topic, "chair3/control");
    }

    #[test]
    fn test_chair_start_without_alias() {
        let cmd = Command::new("c2", "CHAIR_START", json!({ "target": "lounge" }));
        let plan = plan_chair_start(&ctx("lounge"), &cmd);
        assert_eq!(plan.attempts.len(), 1);
    }

    #[test]
    fn test_chair_stop_defaults_and_args() {
        let cmd = Command::new("c2", "STOP", Value::Null);
        let plan = plan_chair_stop(&ctx("esp-chair-03"), &cmd);
        assert_eq!(
            plan.attempts[0].payload_str(),
            r#"{"id":"c2","action":"STOP","args":{"off_ms":2000,"on_ms":20000}}"#
        );
        assert_eq!(plan.attempts[1].topic, "chair3/control");
        assert_eq!(plan.attempts[1].payload_str(), "STOP");

        let cmd = Command::new(
            "c2",
            "CHAIR_STOP",
            json!({ "off_ms": 500, "args": { "off_ms": 1, "on_ms": 100 } }),
        );
        let plan = plan_chair_stop(&ctx("esp-chair-03"), &cmd);
        assert!(plan.attempts[0]
            .payload_str()
            .contains(r#""args":{"off_ms":500,"on_ms":100}"#));
    }
}
