//! Timestamp formatters.
//!
//! RFC 1903 DateAndTime:
//!
//! ```text
//! octets  contents            range
//! 1-2     year (big-endian)   0..65536
//! 3       month               1..12
//! 4       day                 1..31
//! 5       hour                0..23
//! 6       minutes             0..59
//! 7       seconds             0..60
//! 8       deci-seconds        0..9
//! 9       direction from UTC  '+' / '-'
//! 10      hours from UTC      0..13
//! 11      minutes from UTC    0..59
//! ```
//!
//! The human-readable variant renders the same fields through the
//! DISPLAY-HINT `2d-1d-1d,1d:1d:1d.1d,1a1d:1d`. Both forms keep
//! deci-second precision; anything finer is truncated.

use std::fmt::Write;

use bytes::Bytes;
use chrono::format::{Item, StrftimeItems};
use chrono::{
    DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeZone,
    Timelike, Utc,
};

use super::{octet_text, unsupported, wrong_type};
use crate::attribute::AttributeValue;
use crate::error::ConversionError;
use crate::value::Value;

/// Formatter name for the binary DateAndTime layout.
pub const RFC1903: &str = "rfc1903";
/// Formatter name for the DISPLAY-HINT rendering.
pub const RFC1903_HUMAN_READABLE: &str = "rfc1903-human-readable";

/// Timestamp wire encoding selected per attribute.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DateFormatter {
    #[default]
    Rfc1903,
    Rfc1903HumanReadable,
    /// chrono strftime pattern.
    Pattern(String),
}

impl DateFormatter {
    /// Resolve a `displayFormat` option. Unknown names are patterns.
    ///
    /// A pattern chrono cannot interpret falls back to RFC 1903.
    pub fn from_name(name: Option<&str>) -> Self {
        match name.map(str::trim) {
            None | Some("") => Self::Rfc1903,
            Some(n) if n.eq_ignore_ascii_case(RFC1903) => Self::Rfc1903,
            Some(n) if n.eq_ignore_ascii_case(RFC1903_HUMAN_READABLE) => {
                Self::Rfc1903HumanReadable
            }
            Some(pattern) if !valid_pattern(pattern) => {
                tracing::warn!(
                    display_format = pattern,
                    "invalid date pattern, using {}",
                    RFC1903
                );
                Self::Rfc1903
            }
            Some(pattern) => Self::Pattern(pattern.to_string()),
        }
    }

    pub fn format(&self, time: &DateTime<Utc>) -> Result<Bytes, ConversionError> {
        match self {
            Self::Rfc1903 => Ok(Bytes::copy_from_slice(&date_and_time(time))),
            Self::Rfc1903HumanReadable => Ok(Bytes::from(human_readable(time))),
            Self::Pattern(pattern) => {
                let mut text = String::new();
                write!(text, "{}", time.format(pattern)).map_err(|_| {
                    ConversionError::Malformed(format!("invalid date pattern '{}'", pattern))
                })?;
                Ok(Bytes::from(text))
            }
        }
    }

    /// Format, falling back to the binary layout when the pattern fails.
    pub fn format_lossy(&self, time: &DateTime<Utc>) -> Bytes {
        self.format(time).unwrap_or_else(|err| {
            tracing::warn!(error = %err, "date formatting failed");
            Bytes::copy_from_slice(&date_and_time(time))
        })
    }

    pub fn parse(&self, data: &[u8]) -> Result<DateTime<Utc>, ConversionError> {
        match self {
            Self::Rfc1903 => parse_date_and_time(data),
            Self::Rfc1903HumanReadable => parse_human_readable(&utf8(data)?),
            Self::Pattern(pattern) => parse_pattern(&utf8(data)?, pattern),
        }
    }

    pub(super) fn to_wire(&self, value: &AttributeValue) -> Result<Value, ConversionError> {
        match value {
            AttributeValue::Date(time) => self.format(time).map(Value::OctetString),
            other => Err(unsupported("Date", other)),
        }
    }

    pub(super) fn from_wire(&self, value: &Value) -> Result<AttributeValue, ConversionError> {
        let data = match value {
            Value::OctetString(data) => data,
            other => return Err(wrong_type("OCTET STRING", other)),
        };
        self.parse(data).map(AttributeValue::Date)
    }
}

fn valid_pattern(pattern: &str) -> bool {
    StrftimeItems::new(pattern).all(|item| !matches!(item, Item::Error))
}

fn utf8(data: &[u8]) -> Result<String, ConversionError> {
    octet_text(&Value::OctetString(Bytes::copy_from_slice(data)))
}

fn malformed(what: impl std::fmt::Display) -> ConversionError {
    ConversionError::Malformed(format!("invalid DateAndTime: {}", what))
}

fn deci_seconds(time: &DateTime<Utc>) -> u8 {
    (time.nanosecond().min(999_999_999) / 100_000_000) as u8
}

fn date_and_time(time: &DateTime<Utc>) -> [u8; 11] {
    let year = time.year().clamp(0, i32::from(u16::MAX)) as u16;
    let [hi, lo] = year.to_be_bytes();
    [
        hi,
        lo,
        time.month() as u8,
        time.day() as u8,
        time.hour() as u8,
        time.minute() as u8,
        time.second() as u8,
        deci_seconds(time),
        b'+',
        0,
        0,
    ]
}

fn human_readable(time: &DateTime<Utc>) -> String {
    format!(
        "{}-{}-{},{}:{}:{}.{},+0:0",
        time.year(),
        time.month(),
        time.day(),
        time.hour(),
        time.minute(),
        time.second(),
        deci_seconds(time)
    )
}

/// Build a UTC instant from local fields and an offset east of UTC in minutes.
fn assemble(
    date: (i32, u32, u32),
    clock: (u32, u32, u32, u32),
    offset_minutes: i32,
) -> Result<DateTime<Utc>, ConversionError> {
    let (year, month, day) = date;
    let (hour, minute, second, deci) = clock;
    if deci > 9 {
        return Err(malformed(format!("deci-seconds {}", deci)));
    }
    let local = NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|d| d.and_hms_milli_opt(hour, minute, second.min(59), deci * 100))
        .ok_or_else(|| {
            malformed(format!(
                "{}-{}-{} {}:{}:{}",
                year, month, day, hour, minute, second
            ))
        })?;
    let local = if second == 60 {
        local + Duration::seconds(1)
    } else {
        local
    };
    let offset = FixedOffset::east_opt(offset_minutes * 60)
        .ok_or_else(|| malformed(format!("offset {} minutes", offset_minutes)))?;
    offset
        .from_local_datetime(&local)
        .single()
        .map(|t| t.with_timezone(&Utc))
        .ok_or_else(|| malformed("ambiguous local time"))
}

fn parse_date_and_time(data: &[u8]) -> Result<DateTime<Utc>, ConversionError> {
    if data.len() != 8 && data.len() != 11 {
        return Err(malformed(format!("length {} (expected 8 or 11)", data.len())));
    }
    let year = i32::from(u16::from_be_bytes([data[0], data[1]]));
    let offset = if data.len() == 11 {
        if data[9] > 13 || data[10] > 59 {
            return Err(malformed(format!("offset {}:{}", data[9], data[10])));
        }
        let minutes = i32::from(data[9]) * 60 + i32::from(data[10]);
        match data[8] {
            b'+' => minutes,
            b'-' => -minutes,
            other => return Err(malformed(format!("direction byte {:#04x}", other))),
        }
    } else {
        0
    };
    assemble(
        (year, u32::from(data[2]), u32::from(data[3])),
        (
            u32::from(data[4]),
            u32::from(data[5]),
            u32::from(data[6]),
            u32::from(data[7]),
        ),
        offset,
    )
}

fn parse_human_readable(text: &str) -> Result<DateTime<Utc>, ConversionError> {
    let mut parts = text.trim().split(',');
    let (Some(date), Some(clock)) = (parts.next(), parts.next()) else {
        return Err(malformed(text));
    };
    let zone = parts.next();
    if parts.next().is_some() {
        return Err(malformed(text));
    }

    let number = |s: &str| s.trim().parse::<u32>().map_err(|_| malformed(text));

    let date: Vec<&str> = date.split('-').collect();
    let [year, month, day] = date.as_slice() else {
        return Err(malformed(text));
    };
    let (hms, deci) = clock.split_once('.').unwrap_or((clock, "0"));
    let hms: Vec<&str> = hms.split(':').collect();
    let [hour, minute, second] = hms.as_slice() else {
        return Err(malformed(text));
    };

    let offset = match zone.map(str::trim) {
        None | Some("") => 0,
        Some(zone) => {
            let (sign, rest) = match zone.as_bytes().first() {
                Some(b'+') => (1, &zone[1..]),
                Some(b'-') => (-1, &zone[1..]),
                _ => return Err(malformed(text)),
            };
            let (h, m) = rest.split_once(':').unwrap_or((rest, "0"));
            let (h, m) = (number(h)?, number(m)?);
            if h > 13 || m > 59 {
                return Err(malformed(format!("offset {}:{}", h, m)));
            }
            sign * (h as i32 * 60 + m as i32)
        }
    };

    assemble(
        (
            i32::try_from(number(year)?).map_err(|_| malformed(text))?,
            number(month)?,
            number(day)?,
        ),
        (number(hour)?, number(minute)?, number(second)?, number(deci)?),
        offset,
    )
}

fn parse_pattern(text: &str, pattern: &str) -> Result<DateTime<Utc>, ConversionError> {
    if let Ok(time) = DateTime::parse_from_str(text, pattern) {
        return Ok(time.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(text, pattern)
        .map(|naive| naive.and_utc())
        .or_else(|_| {
            NaiveDate::parse_from_str(text, pattern)
                .map(|date| date.and_time(NaiveTime::default()).and_utc())
        })
        .map_err(|e| {
            ConversionError::Malformed(format!("'{}' does not match '{}': {}", text, pattern, e))
        })
}
