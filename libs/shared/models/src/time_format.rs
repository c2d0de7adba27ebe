//! Serde adapters for the clinic's `HH:MM` time-of-day representation.

use chrono::NaiveTime;
use serde::{Deserialize, Deserializer, Serializer};

pub const SLOT_FORMAT: &str = "%H:%M";

pub fn format_slot(time: &NaiveTime) -> String {
    time.format(SLOT_FORMAT).to_string()
}

/// Postgres `time` columns come back as `HH:MM:SS`, so both forms are accepted.
fn parse_stored(raw: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(raw, SLOT_FORMAT)
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M:%S"))
        .ok()
}

pub mod hhmm {
    use super::*;

    pub fn serialize<S: Serializer>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format_slot(time))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse_stored(&raw).ok_or_else(|| serde::de::Error::custom(format!("invalid time of day '{}'", raw)))
    }
}

pub mod hhmm_option {
    use super::*;

    pub fn serialize<S: Serializer>(time: &Option<NaiveTime>, serializer: S) -> Result<S::Ok, S::Error> {
        match time {
            Some(time) => serializer.serialize_some(&format_slot(time)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<NaiveTime>, D::Error> {
        match Option::<String>::deserialize(deserializer)? {
            Some(raw) => parse_stored(&raw)
                .map(Some)
                .ok_or_else(|| serde::de::Error::custom(format!("invalid time of day '{}'", raw))),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Serialize, Deserialize)]
    struct Row {
        #[serde(with = "hhmm")]
        time: NaiveTime,
        #[serde(with = "hhmm_option", default)]
        follow_up: Option<NaiveTime>,
    }

    #[test]
    fn postgres_time_is_normalised_to_slot_format() {
        let row: Row = serde_json::from_str(r#"{"time":"09:30:00","follow_up":null}"#).unwrap();
        let out = serde_json::to_value(&row).unwrap();
        assert_eq!(out["time"], "09:30");
        assert!(out["follow_up"].is_null());
    }

    #[test]
    fn garbage_time_is_rejected() {
        let result: Result<Row, _> = serde_json::from_str(r#"{"time":"half past nine"}"#);
        assert!(result.is_err());
    }
}
