//! Prometheus duration strings such as `5m`, `1h30m` or `1w`.

use std::time::Duration;

use crate::Error;

const UNITS: &[(&str, u64)] = &[
    ("ms", 1),
    ("s", 1_000),
    ("m", 60 * 1_000),
    ("h", 60 * 60 * 1_000),
    ("d", 24 * 60 * 60 * 1_000),
    ("w", 7 * 24 * 60 * 60 * 1_000),
    ("y", 365 * 24 * 60 * 60 * 1_000),
];

/// Parse a Prometheus duration. Units must appear from largest to smallest and each at most
/// once, e.g. `1d12h` but not `12h1d`.
///
/// # Errors
///
/// Returns [`Error::InvalidDuration`] if the string is empty, contains an unknown unit, has
/// units out of order, or overflows.
pub fn parse_duration(input: &str) -> Result<Duration, Error> {
    let invalid = || Error::InvalidDuration(input.to_string());
    if input.is_empty() {
        return Err(invalid());
    }

    let mut rest = input;
    let mut total_ms: u64 = 0;
    // UNITS is sorted from smallest to largest, so the index doubles as the unit's rank.
    let mut last_unit: Option<usize> = None;

    while !rest.is_empty() {
        let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
        if digits == 0 {
            return Err(invalid());
        }
        let (number, tail) = rest.split_at(digits);
        let value: u64 = number.parse().map_err(|_| invalid())?;

        // "ms" comes before "m" in UNITS, so it wins the prefix match.
        let (unit_idx, &(unit, factor)) = UNITS
            .iter()
            .enumerate()
            .find(|(_, (unit, _))| tail.starts_with(unit))
            .ok_or_else(invalid)?;

        if last_unit.is_some_and(|last| last <= unit_idx) {
            return Err(invalid());
        }
        last_unit = Some(unit_idx);

        total_ms = value
            .checked_mul(factor)
            .and_then(|ms| total_ms.checked_add(ms))
            .ok_or_else(invalid)?;
        rest = tail.get(unit.len()..).unwrap_or_default();
    }

    Ok(Duration::from_millis(total_ms))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("5m", 300)]
    #[case("1h30m", 5_400)]
    #[case("1w", 604_800)]
    #[case("12h", 43_200)]
    #[case("1y", 31_536_000)]
    #[case("2d", 172_800)]
    fn test_parse_duration_seconds(#[case] input: &str, #[case] seconds: u64) {
        assert_eq!(parse_duration(input), Ok(Duration::from_secs(seconds)));
    }

    #[test]
    fn test_parse_duration_milliseconds() {
        assert_eq!(parse_duration("1s500ms"), Ok(Duration::from_millis(1_500)));
    }

    #[test]
    fn test_one_week_in_nanoseconds() {
        let week = parse_duration("1w").map(|d| d.as_nanos());
        assert_eq!(week, Ok(604_800_000_000_000));
    }

    #[rstest]
    #[case("")]
    #[case("5")]
    #[case("m")]
    #[case("5x")]
    #[case("1m1h")]
    #[case("1m1m")]
    #[case("-1m")]
    fn test_parse_duration_rejects(#[case] input: &str) {
        assert_eq!(
            parse_duration(input),
            Err(Error::InvalidDuration(input.to_string()))
        );
    }
}
