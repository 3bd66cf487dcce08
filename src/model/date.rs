//! `{"__type":"Date","value":"<ISO-8601>"}` envelope for persisted timestamps.
//! Keeps date values distinguishable from plain strings and numbers in the
//! stored log, with millisecond precision.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

const DATE_TAG: &str = "Date";

#[derive(Serialize, Deserialize)]
struct DateEnvelope {
    #[serde(rename = "__type")]
    kind: String,
    value: String,
}

pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
    DateEnvelope {
        kind: DATE_TAG.to_string(),
        value: ts.to_rfc3339_opts(SecondsFormat::Millis, true),
    }
    .serialize(serializer)
}

pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
    let envelope = DateEnvelope::deserialize(deserializer)?;
    if envelope.kind != DATE_TAG {
        return Err(D::Error::custom(format!(
            "expected __type \"{DATE_TAG}\", found \"{}\"",
            envelope.kind
        )));
    }
    DateTime::parse_from_rfc3339(&envelope.value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(D::Error::custom)
}

/// Drop sub-millisecond precision so a timestamp survives the envelope unchanged.
pub fn truncate_to_millis(ts: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ts.timestamp_millis()).unwrap_or(ts)
}

/// Current wall-clock time at millisecond precision.
pub fn now_millis() -> DateTime<Utc> {
    truncate_to_millis(Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Stamped {
        #[serde(with = "super")]
        at: DateTime<Utc>,
    }

    #[test]
    fn test_envelope_shape() {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 10, 20, 30).unwrap()
            + chrono::Duration::milliseconds(123);
        let json = serde_json::to_value(Stamped { at }).unwrap();
        assert_eq!(json["at"]["__type"], "Date");
        assert_eq!(json["at"]["value"], "2024-05-01T10:20:30.123Z");
    }

    #[test]
    fn test_round_trip_preserves_millis() {
        let at = truncate_to_millis(Utc.timestamp_opt(1_714_558_830, 987_654_321).unwrap());
        let json = serde_json::to_string(&Stamped { at }).unwrap();
        let back: Stamped = serde_json::from_str(&json).unwrap();
        assert_eq!(back.at, at);
        assert_eq!(back.at.timestamp_millis(), 1_714_558_830_987);
    }

    #[test]
    fn test_plain_string_is_rejected() {
        let err = serde_json::from_str::<Stamped>(r#"{"at":"2024-05-01T10:20:30.123Z"}"#);
        assert!(err.is_err());
        let err = serde_json::from_str::<Stamped>(r#"{"at":1714558830123}"#);
        assert!(err.is_err());
    }

    #[test]
    fn test_wrong_tag_is_rejected() {
        let err = serde_json::from_str::<Stamped>(
            r#"{"at":{"__type":"Map","value":"2024-05-01T10:20:30.123Z"}}"#,
        );
        assert!(err.is_err());
    }

    #[test]
    fn test_now_has_no_sub_millisecond_part() {
        let now = now_millis();
        assert_eq!(now.timestamp_subsec_nanos() % 1_000_000, 0);
    }
}
