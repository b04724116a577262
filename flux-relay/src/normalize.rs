//! Canonical shaping for heterogeneous control payloads.
//!
//! Several historical payload shapes are still in circulation: controller
//! index arrives as `controller`, `ctrl`, or positional `d1`; the value as
//! `value`, `velocity`, or `d2`; the channel as `ch` or `channel`. Everything
//! downstream gets exactly one shape.
//!
//! Resolution is a fixed priority chain per field — canonical name first,
//! then legacy alias, then positional alias, then a hard default. Numeric
//! strings are coerced to numbers; absent channels default to 1.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A normalized control event.
///
/// Serialized with the wire spellings (`type`, `ch`, `d1`, `d2`, `value`),
/// so a normalized event can be fed straight back through a producer's
/// `send` and re-normalize to itself on the far side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlEvent {
    /// Event kind, always lower-cased: `noteon`, `noteoff`, `cc`, `pitch`, …
    #[serde(rename = "type")]
    pub kind: String,
    /// Channel number, defaults to 1 when the payload carries none.
    #[serde(rename = "ch")]
    pub channel: i64,
    /// Primary value: note number for notes, controller index for `cc`.
    #[serde(rename = "d1", skip_serializing_if = "Option::is_none")]
    pub data1: Option<i64>,
    /// Secondary value: velocity for notes, controller value for `cc`.
    #[serde(rename = "d2", skip_serializing_if = "Option::is_none")]
    pub data2: Option<i64>,
    /// Raw value, mirroring `data2` for shaped kinds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    /// Fields carried through untouched for kinds the normalizer does not
    /// shape. Empty for `cc`, `noteon`, `noteoff`, and `pitch`.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Normalize an arbitrary payload into a [`ControlEvent`].
///
/// Pure and total: non-object payloads produce an event with an empty kind
/// and all defaults.
pub fn normalize(payload: &Value) -> ControlEvent {
    let empty = Map::new();
    let obj = payload.as_object().unwrap_or(&empty);

    let kind = obj
        .get("type")
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_lowercase();
    let channel = pick_number(obj, &["ch", "channel"])
        .map(|n| n as i64)
        .unwrap_or(1);

    match kind.as_str() {
        "cc" => {
            let controller = pick_number(obj, &["controller", "ctrl", "d1"]).unwrap_or(0.0);
            let value = pick_number(obj, &["value", "velocity", "d2"]).unwrap_or(0.0);
            ControlEvent {
                kind,
                channel,
                data1: Some(controller as i64),
                data2: Some(value as i64),
                value: Some(value),
                extra: Map::new(),
            }
        }
        "noteon" | "noteoff" => {
            let note = pick_number(obj, &["note", "d1"]).unwrap_or(0.0);
            let value = pick_number(obj, &["value", "velocity", "d2"]).unwrap_or(0.0);
            ControlEvent {
                kind,
                channel,
                data1: Some(note as i64),
                data2: Some(value as i64),
                value: Some(value),
                extra: Map::new(),
            }
        }
        "pitch" => {
            let value = pick_number(obj, &["value", "velocity", "d2"]).unwrap_or(0.0);
            ControlEvent {
                kind,
                channel,
                data1: None,
                data2: None,
                value: Some(value),
                extra: Map::new(),
            }
        }
        // Unknown kinds pass through so newer payload shapes survive the
        // trip; only the type casing and channel are normalized.
        _ => {
            let extra: Map<String, Value> = obj
                .iter()
                .filter(|(k, _)| !matches!(k.as_str(), "type" | "ch" | "channel"))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            ControlEvent {
                kind,
                channel,
                data1: None,
                data2: None,
                value: None,
                extra,
            }
        }
    }
}

/// First key in `keys` that is present and coerces to a number.
///
/// Numbers pass through; numeric strings parse; null and anything else is
/// treated as absent.
fn pick_number(obj: &Map<String, Value>, keys: &[&str]) -> Option<f64> {
    keys.iter().find_map(|k| obj.get(*k).and_then(coerce_number))
}

fn coerce_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_noteon_with_legacy_spellings() {
        let event = normalize(&json!({
            "type": "noteOn", "note": 60, "velocity": 90, "ch": 2
        }));
        assert_eq!(event.kind, "noteon");
        assert_eq!(event.channel, 2);
        assert_eq!(event.data1, Some(60));
        assert_eq!(event.data2, Some(90));
        assert_eq!(event.value, Some(90.0));
        assert!(event.extra.is_empty());
    }

    #[test]
    fn test_cc_alias_priority() {
        // Canonical name wins over the positional alias.
        let event = normalize(&json!({
            "type": "cc", "controller": 7, "d1": 99, "value": 100
        }));
        assert_eq!(event.data1, Some(7));
        assert_eq!(event.data2, Some(100));
        assert_eq!(event.value, Some(100.0));

        let event = normalize(&json!({"type": "cc", "ctrl": 10, "d2": 64}));
        assert_eq!(event.data1, Some(10));
        assert_eq!(event.data2, Some(64));
    }

    #[test]
    fn test_numeric_string_coercion() {
        let event = normalize(&json!({
            "type": "cc", "controller": "7", "value": "100", "ch": "3"
        }));
        assert_eq!(event.channel, 3);
        assert_eq!(event.data1, Some(7));
        assert_eq!(event.data2, Some(100));
        assert_eq!(event.value, Some(100.0));
    }

    #[test]
    fn test_channel_defaults_to_one() {
        let event = normalize(&json!({"type": "noteOff", "note": 64}));
        assert_eq!(event.channel, 1);
    }

    #[test]
    fn test_channel_alias() {
        let event = normalize(&json!({"type": "pitch", "channel": 5, "value": 8192}));
        assert_eq!(event.channel, 5);
    }

    #[test]
    fn test_pitch_has_no_data_bytes() {
        let event = normalize(&json!({"type": "pitch", "value": 8192, "ch": 1}));
        assert_eq!(event.kind, "pitch");
        assert_eq!(event.data1, None);
        assert_eq!(event.data2, None);
        assert_eq!(event.value, Some(8192.0));
    }

    #[test]
    fn test_unknown_kind_passes_fields_through() {
        let event = normalize(&json!({
            "type": "SysEx", "ch": "4", "bytes": [240, 1, 247], "vendor": "x"
        }));
        assert_eq!(event.kind, "sysex");
        assert_eq!(event.channel, 4);
        assert_eq!(event.data1, None);
        assert_eq!(event.value, None);
        assert_eq!(event.extra["bytes"], json!([240, 1, 247]));
        assert_eq!(event.extra["vendor"], json!("x"));
        assert!(!event.extra.contains_key("type"));
        assert!(!event.extra.contains_key("ch"));
    }

    #[test]
    fn test_idempotent_on_canonical_cc() {
        let first = normalize(&json!({"type": "cc", "controller": 21, "value": 64, "ch": 9}));
        let second = normalize(&serde_json::to_value(&first).unwrap());
        assert_eq!(first, second);
    }

    #[test]
    fn test_idempotent_on_canonical_notes() {
        for kind in ["noteOn", "noteOff"] {
            let first = normalize(&json!({"type": kind, "note": 33, "velocity": 127, "ch": 16}));
            let second = normalize(&serde_json::to_value(&first).unwrap());
            assert_eq!(first, second);
        }
    }

    #[test]
    fn test_missing_fields_hard_default() {
        let event = normalize(&json!({"type": "cc"}));
        assert_eq!(event.data1, Some(0));
        assert_eq!(event.data2, Some(0));
        assert_eq!(event.value, Some(0.0));
    }

    #[test]
    fn test_non_object_payload() {
        let event = normalize(&json!("garbage"));
        assert_eq!(event.kind, "");
        assert_eq!(event.channel, 1);
        assert!(event.extra.is_empty());
    }

    #[test]
    fn test_wire_serialization_uses_short_names() {
        let event = normalize(&json!({"type": "noteOn", "note": 60, "velocity": 90}));
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value, json!({"type": "noteon", "ch": 1, "d1": 60, "d2": 90, "value": 90.0}));
    }
}
