use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serializer};

pub fn format_date(date: &NaiveDateTime) -> String {
    DateTime::<Utc>::from_naive_utc_and_offset(*date, Utc).to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn serialize_date<S>(date: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&format_date(date))
}

/// Wraps a present value in `Some`, so that `Option<Option<T>>` fields can
/// tell an explicit `null` apart from an absent key.
pub fn deserialize_some<'de, T, D>(deserializer: D) -> Result<Option<T>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    T::deserialize(deserializer).map(Some)
}

/// Current time truncated to microseconds, the precision timestamps are
/// rendered with.
pub fn now() -> NaiveDateTime {
    let now = Utc::now().naive_utc();
    let micros = now.and_utc().timestamp_micros();
    DateTime::from_timestamp_micros(micros)
        .map(|dt| dt.naive_utc())
        .unwrap_or(now)
}
