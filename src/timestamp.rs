//! Windows FILETIME tick counts to Unix time and printable strings.

use chrono::{DateTime, Datelike, Local, Offset, TimeZone};
use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// Ticks (100 ns) per second.
pub const TICKS_PER_SECOND: i64 = 10_000_000;
/// Seconds between 1601-01-01 and 1970-01-01.
pub const EPOCH_DELTA_SECONDS: i64 = 11_644_473_600;
/// Latest calendar year rendered before reporting out of range.
pub const MAX_YEAR: i32 = 9999;

pub const OVERFLOW_MARKER: &str = "#overflow#";
pub const OUT_OF_RANGE_MARKER: &str = "#Out of range#";
pub const CORRUPTED_MARKER: &str = "#data corrupted#";

/// How decoded timestamps are rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
pub enum TimestampFormat {
    /// `2004-03-12T09:15:00.123400000+01:00`
    Iso8601,
    /// `Fri Mar 12 09:15:00 2004`
    #[default]
    Calendar,
}

/// Unix-epoch time split the way `struct timespec` is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnixTime {
    pub seconds: i64,
    pub nanoseconds: i64,
}

/// A raw FILETIME tick count, read LE and reinterpreted as signed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileTime(pub i64);

impl FileTime {
    pub fn from_raw(raw: u64) -> Self {
        Self(raw as i64)
    }

    /// Zero ticks means the field was never set.
    pub fn is_absent(&self) -> bool {
        self.0 == 0
    }

    pub fn to_unix(&self) -> UnixTime {
        UnixTime {
            seconds: self.0 / TICKS_PER_SECOND - EPOCH_DELTA_SECONDS,
            nanoseconds: (self.0 % TICKS_PER_SECOND) * 100,
        }
    }

    /// Render in the process local time zone.
    pub fn render(&self, format: TimestampFormat) -> String {
        self.render_in(&Local, format)
    }

    /// Render in an explicit time zone. Never fails: problems become markers.
    pub fn render_in<Tz: TimeZone>(&self, tz: &Tz, format: TimestampFormat) -> String
    where
        Tz::Offset: Display,
    {
        if self.is_absent() {
            return String::new();
        }
        let unix = self.to_unix();
        if unix.seconds < 0 || unix.nanoseconds < 0 {
            return OVERFLOW_MARKER.to_string();
        }
        let Some(dt) = tz
            .timestamp_opt(unix.seconds, unix.nanoseconds as u32)
            .earliest()
        else {
            return CORRUPTED_MARKER.to_string();
        };
        if dt.year() > MAX_YEAR {
            return OUT_OF_RANGE_MARKER.to_string();
        }
        match format {
            TimestampFormat::Iso8601 => iso8601(&dt),
            TimestampFormat::Calendar => dt.format("%a %b %e %H:%M:%S %Y").to_string(),
        }
    }
}

fn iso8601<Tz: TimeZone>(dt: &DateTime<Tz>) -> String
where
    Tz::Offset: Display,
{
    let base = dt.format("%Y-%m-%dT%H:%M:%S");
    let nanos = dt.timestamp_subsec_nanos();
    let fraction = if nanos == 0 {
        String::new()
    } else {
        format!(".{:09}", nanos)
    };
    let offset_secs = dt.offset().fix().local_minus_utc();
    let offset = if offset_secs == 0 {
        "Z".to_string()
    } else {
        let sign = if offset_secs > 0 { '+' } else { '-' };
        let minutes = offset_secs.abs() / 60;
        format!("{}{:02}:{:02}", sign, minutes / 60, minutes % 60)
    };
    format!("{}{}{}", base, fraction, offset)
}
