//! Duration-string parsing for configuration values
//!
//! Accepts the compact unit notation used in the config file: `"300ms"`,
//! `"2s"`, `"5m"`, `"1h"`, including fractions (`"1.5s"`) and
//! concatenations (`"1m30s"`). Bare numbers without a unit are rejected.

use std::fmt;
use std::time::Duration;

use serde::de::{self, Deserializer, Visitor};

/// Parse a duration string such as `"50ms"`, `"2s"` or `"1m30s"`.
pub(crate) fn parse_duration(input: &str) -> Result<Duration, String> {
    let s = input.trim();
    if s.is_empty() {
        return Err("empty duration".to_string());
    }
    if s == "0" {
        return Ok(Duration::ZERO);
    }

    let mut total_ns: f64 = 0.0;
    let mut rest = s;

    while !rest.is_empty() {
        let digits = rest
            .find(|c: char| !c.is_ascii_digit() && c != '.')
            .ok_or_else(|| format!("missing unit in duration '{input}'"))?;
        if digits == 0 {
            return Err(format!("invalid duration '{input}'"));
        }

        let value: f64 = rest[..digits]
            .parse()
            .map_err(|_| format!("invalid number in duration '{input}'"))?;
        rest = &rest[digits..];

        let (unit_ns, unit_len) = match_unit(rest)
            .ok_or_else(|| format!("unknown unit in duration '{input}'"))?;
        rest = &rest[unit_len..];

        total_ns += value * unit_ns;
    }

    if total_ns < 0.0 || !total_ns.is_finite() {
        return Err(format!("duration out of range: '{input}'"));
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    Ok(Duration::from_nanos(total_ns as u64))
}

/// Returns (nanoseconds per unit, length of the unit suffix consumed).
fn match_unit(s: &str) -> Option<(f64, usize)> {
    // Longest suffixes first so "ms" is not read as "m".
    for (unit, ns) in [
        ("ns", 1.0),
        ("us", 1_000.0),
        ("µs", 1_000.0),
        ("ms", 1_000_000.0),
        ("s", 1_000_000_000.0),
        ("m", 60_000_000_000.0),
        ("h", 3_600_000_000_000.0),
    ] {
        if s.starts_with(unit) {
            return Some((ns, unit.len()));
        }
    }
    None
}

/// Serde deserializer for duration fields expressed as strings.
pub(crate) fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    struct DurationVisitor;

    impl Visitor<'_> for DurationVisitor {
        type Value = Duration;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a duration string such as \"50ms\", \"2s\" or \"5m\"")
        }

        fn visit_str<E: de::Error>(self, value: &str) -> Result<Duration, E> {
            parse_duration(value).map_err(de::Error::custom)
        }
    }

    deserializer.deserialize_str(DurationVisitor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_basic_units() {
        assert_eq!(parse_duration("2s").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_duration("50ms").unwrap(), Duration::from_millis(50));
        assert_eq!(parse_duration("5m").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_duration("1h").unwrap(), Duration::from_secs(3600));
        assert_eq!(parse_duration("100us").unwrap(), Duration::from_micros(100));
        assert_eq!(parse_duration("250ns").unwrap(), Duration::from_nanos(250));
    }

    #[test]
    fn test_parse_fractions_and_compound() {
        assert_eq!(parse_duration("1.5s").unwrap(), Duration::from_millis(1500));
        assert_eq!(parse_duration("1m30s").unwrap(), Duration::from_secs(90));
        assert_eq!(parse_duration("0.5ms").unwrap(), Duration::from_micros(500));
    }

    #[test]
    fn test_parse_zero() {
        assert_eq!(parse_duration("0").unwrap(), Duration::ZERO);
        assert_eq!(parse_duration("0s").unwrap(), Duration::ZERO);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("5").is_err());
        assert!(parse_duration("abc").is_err());
        assert!(parse_duration("5x").is_err());
        assert!(parse_duration("s5").is_err());
    }

    #[test]
    fn test_ms_not_parsed_as_minutes() {
        // "1ms" must be one millisecond, not one minute followed by junk.
        assert_eq!(parse_duration("1ms").unwrap(), Duration::from_millis(1));
    }
}
