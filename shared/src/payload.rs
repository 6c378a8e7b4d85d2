//! Ordered-fallback reads over a loosely structured command payload
//!
//! Each field has a fixed lookup order (top-level key, then the nested
//! `args` map, ...). The order mirrors what deployed firmware tooling has
//! historically sent and must not be generalized.

use serde_json::Value;

/// A path of object keys into the payload
pub type Path<'a> = &'a [&'a str];

/// First non-null value found along `paths`, in order
pub fn first_present<'v>(payload: &'v Value, paths: &[Path<'_>]) -> Option<&'v Value> {
    paths.iter().find_map(|path| {
        let value = path
            .iter()
            .try_fold(payload, |node, key| node.as_object()?.get(*key))?;
        (!value.is_null()).then_some(value)
    })
}

/// First present value coerced to a non-negative integer.
///
/// Numbers and numeric strings are accepted; fractions truncate and
/// negatives clamp to zero. A present but non-numeric value yields `None`.
pub fn first_number(payload: &Value, paths: &[Path<'_>]) -> Option<u64> {
    let value = first_present(payload, paths)?;
    let number = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    if !number.is_finite() {
        return None;
    }
    Some(number.max(0.0).trunc() as u64)
}

/// First non-blank string along `paths`; numbers render as decimal text.
///
/// Blank strings count as absent so the next path is consulted.
pub fn first_text(payload: &Value, paths: &[Path<'_>]) -> Option<String> {
    paths.iter().find_map(|path| match first_present(payload, &[*path])? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const PULSE: &[Path<'static>] = &[&["pulse_ms"], &["args", "pulse_ms"]];

    #[test]
    fn test_top_level_wins_over_args() {
        let payload = json!({ "pulse_ms": 1500, "args": { "pulse_ms": 900 } });
        assert_eq!(first_number(&payload, PULSE), Some(1500));
    }

    #[test]
    fn test_falls_back_to_args() {
        let payload = json!({ "args": { "pulse_ms": 900 } });
        assert_eq!(first_number(&payload, PULSE), Some(900));
    }

    #[test]
    fn test_null_is_absent() {
        let payload = json!({ "pulse_ms": null, "args": { "pulse_ms": 700 } });
        assert_eq!(first_number(&payload, PULSE), Some(700));
    }

    #[test]
    fn test_missing_everywhere() {
        assert_eq!(first_number(&json!({}), PULSE), None);
        assert_eq!(first_number(&Value::Null, PULSE), None);
        assert_eq!(first_number(&json!({ "args": "oops" }), PULSE), None);
    }

    #[test]
    fn test_numeric_coercion() {
        assert_eq!(first_number(&json!({ "pulse_ms": "1200" }), PULSE), Some(1200));
        assert_eq!(first_number(&json!({ "pulse_ms": 2.9 }), PULSE), Some(2));
        assert_eq!(first_number(&json!({ "pulse_ms": -5 }), PULSE), Some(0));
        assert_eq!(first_number(&json!({ "pulse_ms": "soon" }), PULSE), None);
        assert_eq!(first_number(&json!({ "pulse_ms": true }), PULSE), None);
    }

    #[test]
    fn test_text_skips_blank_values() {
        let paths: &[Path<'_>] = &[&["target"], &["machine_id"]];
        let payload = json!({ "target": "  ", "machine_id": "esp-chair-07" });
        assert_eq!(first_text(&payload, paths).as_deref(), Some("esp-chair-07"));

        let payload = json!({ "machine_id": 7 });
        assert_eq!(first_text(&payload, paths).as_deref(), Some("7"));

        assert_eq!(first_text(&json!({}), paths), None);
    }
}
