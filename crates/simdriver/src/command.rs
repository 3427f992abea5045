//! Commands understood by the insert driver.

use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::clock::Ticks;

/// One instruction pulled from a command source.
///
/// On the wire a command is a JSON object tagged by `type`:
/// `{"type":"apply","payload":"p1"}` or `{"type":"pause","duration":5}`.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Command {
    /// Hand `payload` to the storage target now.
    ///
    /// Any bytes are accepted in memory, but only UTF-8 payloads can be
    /// encoded back into a wire record.
    Apply {
        #[serde(with = "payload_text")]
        payload: Bytes,
    },
    /// Let `duration` ticks of virtual time pass before the next command.
    /// Zero or negative durations do nothing.
    ///
    /// Decoding accepts any JSON number; fractions round up to whole ticks.
    Pause {
        #[serde(deserialize_with = "duration_ticks::deserialize")]
        duration: Ticks,
    },
}

impl Command {
    /// Creates an apply command.
    pub fn apply(payload: impl Into<Bytes>) -> Self {
        Self::Apply {
            payload: payload.into(),
        }
    }

    /// Creates a pause command.
    pub fn pause(duration: Ticks) -> Self {
        Self::Pause { duration }
    }

    /// Decodes a raw record, rejecting anything that is not a known command.
    pub fn from_value(value: serde_json::Value) -> Result<Self, UnrecognizedCommand> {
        match Self::deserialize(&value) {
            Ok(command) => Ok(command),
            Err(_) => Err(UnrecognizedCommand { value }),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Apply { payload } => write!(f, "apply {}", String::from_utf8_lossy(payload)),
            Self::Pause { duration } => write!(f, "pause {duration}"),
        }
    }
}

/// A pulled record that does not decode into any [`Command`] variant.
#[derive(Debug, Clone, Eq, PartialEq, thiserror::Error)]
#[error("unrecognized command: {value}")]
pub struct UnrecognizedCommand {
    /// The offending record, as it was pulled.
    pub value: serde_json::Value,
}

/// Converts a fractional tick count, rounding up. Non-finite values have no
/// tick equivalent.
pub(crate) fn ticks_from_f64(value: f64) -> Option<Ticks> {
    value.is_finite().then(|| value.ceil() as Ticks)
}

/// Payloads travel as text in JSON and as raw bytes in memory.
mod payload_text {
    use bytes::Bytes;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(payload: &Bytes, serializer: S) -> Result<S::Ok, S::Error> {
        let text = std::str::from_utf8(payload).map_err(serde::ser::Error::custom)?;
        serializer.serialize_str(text)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Bytes, D::Error> {
        String::deserialize(deserializer).map(Bytes::from)
    }
}

/// Pause durations: integers verbatim, larger-than-`Ticks` integers saturate,
/// fractions round up.
mod duration_ticks {
    use serde::{Deserialize, Deserializer};
    use serde_json::Number;

    use crate::clock::Ticks;

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Ticks, D::Error> {
        let number = Number::deserialize(deserializer)?;
        if let Some(ticks) = number.as_i64() {
            return Ok(ticks);
        }
        if number.as_u64().is_some() {
            return Ok(Ticks::MAX);
        }
        number
            .as_f64()
            .and_then(super::ticks_from_f64)
            .ok_or_else(|| serde::de::Error::custom(format!("duration {number} has no tick value")))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn decodes_apply_and_pause_records() {
        let apply = Command::from_value(json!({"type": "apply", "payload": "p1"})).unwrap();
        assert_eq!(apply, Command::apply("p1"));

        let pause = Command::from_value(json!({"type": "pause", "duration": -2})).unwrap();
        assert_eq!(pause, Command::pause(-2));
    }

    #[test]
    fn unknown_tag_keeps_offending_value() {
        let raw = json!({"badtag": true});
        let err = Command::from_value(raw.clone()).unwrap_err();
        assert_eq!(err.value, raw);
        assert_eq!(err.to_string(), r#"unrecognized command: {"badtag":true}"#);
    }

    #[test]
    fn malformed_fields_are_unrecognized() {
        assert!(Command::from_value(json!({"type": "pause", "duration": "soon"})).is_err());
        assert!(Command::from_value(json!({"type": "apply"})).is_err());
        assert!(Command::from_value(json!({"type": "sleep", "delay": 3})).is_err());
    }

    #[test]
    fn fractional_pauses_round_up_to_whole_ticks() {
        let decode = |duration: serde_json::Value| {
            Command::from_value(json!({"type": "pause", "duration": duration})).unwrap()
        };
        assert_eq!(decode(json!(-0.5)), Command::pause(0));
        assert_eq!(decode(json!(0.0)), Command::pause(0));
        assert_eq!(decode(json!(3.0)), Command::pause(3));
        assert_eq!(decode(json!(2.5)), Command::pause(3));
        assert_eq!(decode(json!(-2.5)), Command::pause(-2));
    }

    #[test]
    fn oversized_pause_saturates() {
        let pause = Command::from_value(json!({"type": "pause", "duration": u64::MAX})).unwrap();
        assert_eq!(pause, Command::pause(Ticks::MAX));
    }

    #[test]
    fn wire_record_shape() {
        let command = Command::apply("part-7");
        assert_eq!(
            serde_json::to_value(&command).unwrap(),
            json!({"type": "apply", "payload": "part-7"})
        );
        assert_eq!(
            serde_json::to_value(Command::pause(4)).unwrap(),
            json!({"type": "pause", "duration": 4})
        );
        assert_eq!(command.to_string(), "apply part-7");
    }

    #[test]
    fn non_utf8_payload_refuses_to_encode() {
        let command = Command::apply(Bytes::from_static(b"ok\xff"));
        assert!(serde_json::to_value(&command).is_err());
        assert_eq!(command.to_string(), "apply ok\u{fffd}");
    }
}
