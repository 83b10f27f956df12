// Utility helpers for parsing raw cells and formatting counts.
//
// Raw feeds are messy: empty cells, stray whitespace, several timestamp
// layouts. Everything here returns `None` for "no value" so that the loader
// can tell an empty cell apart from a malformed one.
use chrono::{NaiveDate, NaiveDateTime};
use num_format::{Locale, ToFormattedString};

/// Timestamp layouts seen in the daily case reports over the years.
const TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    // Two-digit years first: `%Y` would happily read "20" as year 20.
    "%m/%d/%y %H:%M",
    "%m/%d/%Y %H:%M",
];

/// Trim a cell and map the empty string to `None`.
pub fn non_empty(s: &str) -> Option<&str> {
    let s = s.trim();
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

/// Integer cell. Integral counts written as "12.0" are accepted; exponents,
/// fractions and values outside `i64` are not.
pub fn parse_i64_safe(s: &str) -> Option<i64> {
    let s = s.trim();
    let (whole, fraction) = s.split_once('.').unwrap_or((s, ""));
    if !fraction.bytes().all(|b| b == b'0') {
        return None;
    }
    whole.parse::<i64>().ok()
}

pub fn parse_f64_safe(s: &str) -> Option<f64> {
    s.trim().parse::<f64>().ok()
}

/// Parse a timestamp in any of the known layouts. A bare `YYYY-MM-DD` is
/// accepted as midnight.
pub fn parse_timestamp_safe(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    for fmt in TIMESTAMP_FORMATS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(ts);
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

/// Parse the leading `YYYY-MM-DD` of a cell such as `2018-12-31 00:00:00+00:00`.
pub fn parse_day_prefix(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    let head = s.get(..10)?;
    NaiveDate::parse_from_str(head, "%Y-%m-%d").ok()
}

/// True when the text looks like a number rather than a name. Rows shifted by
/// a missing column put coordinates or counts where the country belongs.
pub fn looks_numeric(s: &str) -> bool {
    s.trim().parse::<f64>().is_ok()
}

pub fn percentage(part: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    part as f64 / total as f64 * 100.0
}

pub fn format_int<T>(n: T) -> String
where
    T: ToFormattedString,
{
    n.to_formatted_string(&Locale::en)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_timestamp_layouts() {
        let expected = NaiveDate::from_ymd_opt(2020, 3, 22).unwrap();
        for raw in [
            "2020-03-22 23:45:00",
            "2020-03-22T23:45:00",
            "3/22/2020 23:45",
            "3/22/20 23:45",
            "2020-03-22",
        ] {
            let ts = parse_timestamp_safe(raw).unwrap_or_else(|| panic!("failed on {raw}"));
            assert_eq!(ts.date(), expected, "{raw}");
        }
        assert!(parse_timestamp_safe("yesterday").is_none());
    }

    #[test]
    fn integer_cells_accept_integral_floats_only() {
        assert_eq!(parse_i64_safe(" 166 "), Some(166));
        assert_eq!(parse_i64_safe("12.0"), Some(12));
        assert_eq!(parse_i64_safe("12.5"), None);
        assert_eq!(parse_i64_safe("abc"), None);
    }

    #[test]
    fn integer_cells_reject_exponents_and_out_of_range_values() {
        assert_eq!(parse_i64_safe("1e19"), None);
        assert_eq!(parse_i64_safe("1e300"), None);
        assert_eq!(parse_i64_safe("9223372036854775807"), Some(i64::MAX));
        assert_eq!(parse_i64_safe("9223372036854775808.0"), None);
        assert_eq!(parse_i64_safe("-3.00"), Some(-3));
        assert_eq!(parse_i64_safe("."), None);
    }

    #[test]
    fn day_prefix_reads_flight_day_column() {
        assert_eq!(
            parse_day_prefix("2018-12-31 00:00:00+00:00"),
            NaiveDate::from_ymd_opt(2018, 12, 31)
        );
        assert_eq!(parse_day_prefix("2018-12"), None);
    }

    #[test]
    fn numeric_country_is_detected() {
        assert!(looks_numeric("33.93911"));
        assert!(looks_numeric("-7"));
        assert!(!looks_numeric("Afghanistan"));
        assert!(!looks_numeric("Korea, South"));
    }

    #[test]
    fn format_int_uses_thousands_separators() {
        assert_eq!(format_int(1_234_567_usize), "1,234,567");
        assert_eq!(percentage(1, 4), 25.0);
        assert_eq!(percentage(3, 0), 0.0);
    }
}
