use chrono::format::StrftimeItems;
use chrono::{DateTime, Utc};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

const NANOS_PER_SECOND: i64 = 1_000_000_000;

/// current timestamp
pub fn now() -> Duration {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
}

/// now_unix_nano returns the current time as nanoseconds since the Unix epoch.
pub fn now_unix_nano() -> i64 {
    now().as_nanos() as i64
}

/// unix_nano_to_time converts a nanosecond timestamp to a UTC calendar time.
/// Timestamps before the epoch keep their sub-second part.
pub fn unix_nano_to_time(unix_nano: i64) -> Option<DateTime<Utc>> {
    let secs = unix_nano.div_euclid(NANOS_PER_SECOND);
    let nsecs = unix_nano.rem_euclid(NANOS_PER_SECOND);
    DateTime::from_timestamp(secs, nsecs as u32)
}

pub fn time_format(dt: DateTime<Utc>) -> String {
    let fmt = StrftimeItems::new("%Y-%m-%d %H:%M:%S%.9f");
    format!("{}", dt.format_with_items(fmt))
}

/// unix_nano_format renders a nanosecond timestamp, falling back to the raw
/// number when it does not map to a calendar time.
pub fn unix_nano_format(unix_nano: i64) -> String {
    match unix_nano_to_time(unix_nano) {
        Some(dt) => time_format(dt),
        None => unix_nano.to_string(),
    }
}
