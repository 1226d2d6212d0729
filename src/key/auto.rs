//! Auto fields injected into every key template
//!
//! Time fields are taken from a [`Clock`] in UTC and `@uid` is a ULID, so
//! keys generated later sort after keys generated earlier.

use super::Fields;
use chrono::{DateTime, Datelike, Timelike, Utc};
use ulid::Ulid;

/// Names of all auto fields, in the order they are generated
pub const AUTO_FIELD_NAMES: [&str; 11] = [
    "@second",
    "@minute",
    "@hour",
    "@day",
    "@month",
    "@year",
    "@timestamp",
    "@date_path",
    "@date_slug",
    "@datetime_slug",
    "@uid",
];

/// Source of the current time for key resolution
///
/// Tests swap in [`FixedClock`] to get deterministic keys.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock frozen at one instant
#[derive(Clone, Copy, Debug)]
pub struct FixedClock {
    at: DateTime<Utc>,
}

impl FixedClock {
    pub fn new(at: DateTime<Utc>) -> Self {
        FixedClock { at }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.at
    }
}

/// Generate a fresh time-ordered unique id for `at`
pub fn generate_uid(at: DateTime<Utc>) -> Ulid {
    let timestamp_ms = at.timestamp_millis().max(0) as u64;
    Ulid::from_parts(timestamp_ms, rand::random())
}

/// Compute the auto fields for the clock's current instant
///
/// Never cached: each call reads the clock and mints a new `@uid`.
pub fn auto_fields(clock: &dyn Clock) -> Fields {
    let dt = clock.now();
    let mut fields = Fields::new();
    fields.insert("@second", format!("{:02}", dt.second()));
    fields.insert("@minute", format!("{:02}", dt.minute()));
    fields.insert("@hour", format!("{:02}", dt.hour()));
    fields.insert("@day", format!("{:02}", dt.day()));
    fields.insert("@month", format!("{:02}", dt.month()));
    fields.insert("@year", dt.year().to_string());
    fields.insert("@timestamp", dt.timestamp().to_string());
    fields.insert("@date_path", dt.format("%Y/%m/%d").to_string());
    fields.insert("@date_slug", dt.format("%Y-%m-%d").to_string());
    fields.insert("@datetime_slug", dt.format("%Y-%m-%d-%H-%M-%S").to_string());
    fields.insert("@uid", generate_uid(dt).to_string());
    fields
}
