//! Derivation of persisted interval rows from raw zone intervals.

use super::{Error, Result};
use crate::{store::IntervalRow, tzdb::RawInterval};
use std::borrow::Cow;
use time::{OffsetDateTime, PrimitiveDateTime};

/// The timestamp standing in for the unbounded past.
pub(super) const MIN_TIMESTAMP: PrimitiveDateTime = PrimitiveDateTime::MIN;

/// The timestamp standing in for the unbounded future.
pub(super) const MAX_TIMESTAMP: PrimitiveDateTime = PrimitiveDateTime::MAX;

/// Derives the persistable rows for one zone, preserving enumeration order.
///
/// Fatal errors are reserved for broken input: a finite bound outside the
/// representable timestamp range, or an offset that cannot fit the 16-bit
/// minute column. A failed local wall-clock projection only defaults that
/// one value to its sentinel and records a warning.
pub(super) fn rows(
    zone: &str,
    intervals: &[RawInterval<'_>],
    warnings: &mut Vec<String>,
) -> Result<Vec<IntervalRow>> {
    let mut rows = Vec::with_capacity(intervals.len());
    for interval in intervals {
        let utc_start = timestamp(interval.start, MIN_TIMESTAMP)?;
        let utc_end = timestamp(interval.end, MAX_TIMESTAMP)?;
        let local_start = local(zone, interval.start, interval.ut_offset, MIN_TIMESTAMP, warnings);
        let local_end = local(zone, interval.end, interval.ut_offset, MAX_TIMESTAMP, warnings);

        let minutes = i64::from(interval.ut_offset) / 60;
        let offset_minutes = i16::try_from(minutes).map_err(|_| Error::OffsetRange(minutes))?;

        rows.push(IntervalRow {
            utc_start,
            utc_end,
            local_start,
            local_end,
            offset_minutes,
            abbreviation: normalize_abbreviation(interval.abbreviation).into_owned(),
        });
    }
    Ok(rows)
}

/// Corrects the POSIX sign convention in fixed-offset zone names: an
/// `Etc/GMT+N` zone lies N hours west of Greenwich, so its display name
/// flips to `GMT-N`, and vice versa. Names without the `Etc/` prefix pass
/// through unchanged. Applying the rule to its own output changes nothing.
pub(super) fn normalize_abbreviation(name: &str) -> Cow<'_, str> {
    let Some(rest) = name.strip_prefix("Etc/") else {
        return Cow::Borrowed(name);
    };
    if let Some(suffix) = rest.strip_prefix("GMT+") {
        Cow::Owned(format!("GMT-{suffix}"))
    } else if let Some(suffix) = rest.strip_prefix("GMT-") {
        Cow::Owned(format!("GMT+{suffix}"))
    } else {
        Cow::Borrowed(rest)
    }
}

/// Converts one interval bound to a timestamp. An infinite bound becomes
/// `sentinel`; a finite bound outside the representable range is an error.
fn timestamp(bound: Option<i64>, sentinel: PrimitiveDateTime) -> Result<PrimitiveDateTime> {
    bound.map_or(Ok(sentinel), |unix_time| {
        let utc = OffsetDateTime::from_unix_timestamp(unix_time)?;
        Ok(PrimitiveDateTime::new(utc.date(), utc.time()))
    })
}

/// Projects one interval bound into the zone's local wall clock. An infinite
/// bound propagates as the sentinel; a projection that falls outside the
/// representable range defaults to the sentinel and records a warning.
fn local(
    zone: &str,
    bound: Option<i64>,
    ut_offset: i32,
    sentinel: PrimitiveDateTime,
    warnings: &mut Vec<String>,
) -> PrimitiveDateTime {
    let Some(unix_time) = bound else {
        return sentinel;
    };
    match OffsetDateTime::from_unix_timestamp(unix_time.saturating_add(i64::from(ut_offset))) {
        Ok(local) => PrimitiveDateTime::new(local.date(), local.time()),
        Err(err) => {
            warnings.push(format!(
                "{zone}: local projection of {unix_time} failed: {err}"
            ));
            sentinel
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn raw(start: Option<i64>, end: Option<i64>, ut_offset: i32) -> RawInterval<'static> {
        RawInterval {
            start,
            end,
            ut_offset,
            abbreviation: "TST",
        }
    }

    #[test]
    fn infinite_bounds_become_sentinels() {
        let mut warnings = Vec::new();
        let rows = rows("Etc/UTC", &[raw(None, None, 0)], &mut warnings).unwrap();
        assert_eq!(rows[0].utc_start, MIN_TIMESTAMP);
        assert_eq!(rows[0].utc_end, MAX_TIMESTAMP);
        assert_eq!(rows[0].local_start, MIN_TIMESTAMP);
        assert_eq!(rows[0].local_end, MAX_TIMESTAMP);
        assert!(warnings.is_empty());
    }

    #[test]
    fn finite_bounds_convert_to_utc_and_local() {
        let mut warnings = Vec::new();
        let rows = rows(
            "America/New_York",
            &[raw(Some(0), Some(86_400), -18_000)],
            &mut warnings,
        )
        .unwrap();
        let row = &rows[0];
        assert_eq!(row.utc_start, datetime!(1970-01-01 00:00));
        assert_eq!(row.utc_end, datetime!(1970-01-02 00:00));
        assert_eq!(row.local_start, datetime!(1969-12-31 19:00));
        assert_eq!(row.local_end, datetime!(1970-01-01 19:00));
        assert_eq!(row.offset_minutes, -300);
        assert!(warnings.is_empty());
    }

    #[test]
    fn offsets_truncate_toward_zero() {
        let mut warnings = Vec::new();
        let rows = rows(
            "Test/Zone",
            &[raw(None, Some(0), 3_599), raw(Some(0), None, -3_599)],
            &mut warnings,
        )
        .unwrap();
        assert_eq!(rows[0].offset_minutes, 59);
        assert_eq!(rows[1].offset_minutes, -59);
    }

    #[test]
    fn oversized_offset_is_fatal() {
        let mut warnings = Vec::new();
        let result = rows("Test/Zone", &[raw(None, None, i32::MAX)], &mut warnings);
        assert!(matches!(result, Err(Error::OffsetRange(35_791_394))));
    }

    #[test]
    fn failed_local_projection_defaults_and_warns() {
        // A bound at the edge of the representable range converts to UTC but
        // cannot survive the local offset shift.
        let edge = MAX_TIMESTAMP.assume_utc().unix_timestamp();
        let mut warnings = Vec::new();
        let rows = rows("Test/Zone", &[raw(Some(edge), None, 3_600)], &mut warnings).unwrap();
        assert_eq!(rows[0].local_start, MIN_TIMESTAMP);
        assert_eq!(rows[0].local_end, MAX_TIMESTAMP);
        assert_ne!(rows[0].utc_start, MIN_TIMESTAMP);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].starts_with("Test/Zone:"), "{}", warnings[0]);
    }

    #[test]
    fn etc_names_flip_their_sign() {
        assert_eq!(normalize_abbreviation("Etc/GMT+5"), "GMT-5");
        assert_eq!(normalize_abbreviation("Etc/GMT-3"), "GMT+3");
        assert_eq!(normalize_abbreviation("Etc/GMT"), "GMT");
        assert_eq!(normalize_abbreviation("Etc/UTC"), "UTC");
        assert_eq!(normalize_abbreviation("EST"), "EST");
        assert_eq!(normalize_abbreviation("America/New_York"), "America/New_York");
    }

    #[test]
    fn normalization_is_a_fixed_point() {
        for name in ["Etc/GMT+5", "Etc/GMT-3", "Etc/UTC", "EST", "GMT-5", "GMT+12"] {
            let once = normalize_abbreviation(name).into_owned();
            let twice = normalize_abbreviation(&once).into_owned();
            assert_eq!(once, twice, "{name} is not a fixed point");
        }
    }
}
