//! Shared primitives for the rate-limit decision engine: the request
//! attribute bag, numeric/IP literal parsing, and wall-clock helpers used by
//! the counter algorithms' day-boundary expiry.

#![deny(unsafe_code)]

use std::collections::HashMap;

/// A request's named attributes, e.g. `{"act": "ask", "uid": "u1"}`.
///
/// Keys and values are always strings; callers are responsible for encoding
/// whatever numeric or IP-shaped values a rule expects.
pub type Attributes = HashMap<String, String>;

/// Errors produced by the core numeric/IP parsing helpers.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CoreError {
    /// The value could not be parsed as a decimal integer or dotted-quad.
    #[error("value '{0}' is not a valid integer or IP literal")]
    NotNumeric(String),
    /// A dotted-quad octet was outside the `0..=255` range.
    #[error("octet '{0}' out of range 0-255")]
    OctetOutOfRange(String),
}

pub mod numeric {
    //! Numeric and IP-literal value parsing, per spec.md §4.2 / §3.
    use super::CoreError;

    /// True if `s` looks like a dotted-quad (exactly four `.`-separated
    /// parts). Does not validate that the parts are numeric.
    #[must_use]
    pub fn looks_like_ip(s: &str) -> bool {
        s.split('.').count() == 4
    }

    /// Parse a dotted quad `a.b.c.d` into its big-endian 32-bit integer
    /// value: `a*256^3 + b*256^2 + c*256 + d`. Each octet must be in
    /// `0..=255`.
    pub fn parse_dotted_quad(s: &str) -> Result<i64, CoreError> {
        let mut result: i64 = 0;
        let parts: Vec<&str> = s.split('.').collect();
        for (i, part) in parts.iter().enumerate() {
            let octet: i64 = part
                .parse()
                .map_err(|_| CoreError::NotNumeric(s.to_string()))?;
            if !(0..=255).contains(&octet) {
                return Err(CoreError::OctetOutOfRange((*part).to_string()));
            }
            result += octet << ((3 - i) * 8);
        }
        Ok(result)
    }

    /// Parse a request value to an integer for range-key matching: dotted
    /// quads use the IP transform, everything else is a plain decimal
    /// integer parse.
    pub fn parse_value(s: &str) -> Result<i64, CoreError> {
        if looks_like_ip(s) {
            parse_dotted_quad(s)
        } else {
            s.parse().map_err(|_| CoreError::NotNumeric(s.to_string()))
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn dotted_quad_transform() {
            assert_eq!(parse_dotted_quad("10.0.0.1").unwrap(), 167_772_161);
        }

        #[test]
        fn plain_decimal() {
            assert_eq!(parse_value("42").unwrap(), 42);
        }

        #[test]
        fn octet_out_of_range_is_rejected() {
            assert!(parse_dotted_quad("10.0.0.300").is_err());
        }

        #[test]
        fn non_numeric_is_rejected() {
            assert!(parse_value("not-a-number").is_err());
        }
    }
}

pub mod time {
    //! Wall-clock helpers for the counter algorithms' day-boundary expiry.
    use std::time::{SystemTime, UNIX_EPOCH};

    /// Seconds since the Unix epoch.
    #[must_use]
    pub fn now_unix() -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock before epoch")
            .as_secs() as i64
    }

    /// Seconds remaining until the end of the current calendar day in a
    /// fixed-offset zone (`offset_minutes` east of UTC, e.g. `480` for
    /// Asia/Shanghai / UTC+8). Used to align `count`/`base` TTLs to calendar
    /// days (spec.md §4.5).
    #[must_use]
    pub fn seconds_until_day_end(offset_minutes: i32, now_unix_secs: i64) -> i64 {
        let offset_secs = i64::from(offset_minutes) * 60;
        let local = now_unix_secs + offset_secs;
        let secs_into_day = local.rem_euclid(86_400);
        86_400 - secs_into_day
    }

    /// The current calendar date bucket (`YYYYMMDD`) in a fixed-offset zone,
    /// used as the stats aggregator's bucket key (spec.md §4.7).
    #[must_use]
    pub fn date_bucket(offset_minutes: i32, now_unix_secs: i64) -> String {
        let offset_secs = i64::from(offset_minutes) * 60;
        let local_days = (now_unix_secs + offset_secs).div_euclid(86_400);
        let (y, m, d) = civil_from_days(local_days);
        format!("{y:04}{m:02}{d:02}")
    }

    /// Howard Hinnant's `civil_from_days`: days-since-epoch to (year, month,
    /// day), proleptic Gregorian, without a calendar dependency.
    fn civil_from_days(z: i64) -> (i64, u32, u32) {
        let z = z + 719_468;
        let era = if z >= 0 { z } else { z - 146_096 } / 146_097;
        let doe = (z - era * 146_097) as u64; // [0, 146096]
        let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146_096) / 365; // [0, 399]
        let y = yoe as i64 + era * 400;
        let doy = doe - (365 * yoe + yoe / 4 - yoe / 100); // [0, 365]
        let mp = (5 * doy + 2) / 153; // [0, 11]
        let d = (doy - (153 * mp + 2) / 5 + 1) as u32; // [1, 31]
        let m = if mp < 10 { mp + 3 } else { mp - 9 } as u32; // [1, 12]
        (if m <= 2 { y + 1 } else { y }, m, d)
    }

}
