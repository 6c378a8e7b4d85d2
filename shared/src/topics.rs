//! Topic resolution for actuator commands
//!
//! Every command goes to a canonical, site-scoped JSON topic. Older
//! firmware listens on fixed per-class alias topics instead; those aliases
//! stay in service once a device class has shipped with them.

use regex::Regex;
use std::sync::OnceLock;

/// Door controller alias topic
pub const DOOR_ALIAS_TOPIC: &str = "door/control";

/// Water cooler alias topic
pub const WATER_ALIAS_TOPIC: &str = "water/control";

/// Fan controller alias topic
pub const FAN_ALIAS_TOPIC: &str = "fan/control";

/// Canonical command topic for `target` at `site_id`.
///
/// The target is interpolated verbatim.
pub fn canonical_topic(site_id: &str, target: &str) -> String {
    format!("site/{site_id}/esp/{target}/cmd")
}

/// Wildcard filter covering every topic under the site prefix
pub fn site_wildcard(site_id: &str) -> String {
    format!("site/{site_id}/#")
}

/// Legacy chair topic (`chair<N>/control`) for `target`, if it carries a number
pub fn chair_alias(target: &str) -> Option<String> {
    static CHAIR: OnceLock<Regex> = OnceLock::new();
    static DIGITS: OnceLock<Regex> = OnceLock::new();

    let chair = CHAIR.get_or_init(|| {
        Regex::new(r"(?i)(?:esp-)?chair[-_ ]?([0-9]+)").expect("chair pattern compiles")
    });
    let digits = DIGITS.get_or_init(|| Regex::new(r"([0-9]+)").expect("digit pattern compiles"));

    let run = chair
        .captures(target)
        .or_else(|| digits.captures(target))?
        .get(1)?
        .as_str();

    let trimmed = run.trim_start_matches('0');
    let number = if trimmed.is_empty() { "0" } else { trimmed };
    Some(format!("chair{number}/control"))
}

/// Whether `target` names a fan actuator, whatever the command kind says
pub fn is_fan_target(target: &str) -> bool {
    target.to_ascii_lowercase().contains("fan")
}
