//! Per-zone validity-interval enumeration.
//!
//! A zone's history comes in two parts: the explicit transitions compiled
//! into the zone data, and the extra rule that governs everything after the
//! last of them. The extra rule is only queryable point-wise, so future
//! transitions are located by probing it at a coarse step and bisecting down
//! to the exact second wherever the local time type changes.

use super::{Error, Result};
use tz::{LocalTimeType, TimeZoneRef};

/// One contiguous period over which a zone keeps the same UTC offset and
/// display abbreviation. Bounds are in Unix seconds; `None` stands for the
/// unbounded past (`start`) or the unbounded future (`end`).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) struct RawInterval<'a> {
    /// Start of the period (inclusive).
    pub start: Option<i64>,
    /// End of the period (exclusive).
    pub end: Option<i64>,
    /// UT offset in seconds east of Greenwich.
    pub ut_offset: i32,
    /// The display abbreviation of the period.
    pub abbreviation: &'a str,
}

/// Probe step for scanning the extra rule. Rule-driven periods last months,
/// so a two-week step cannot pass over one.
const PROBE_STEP: i64 = 14 * 86_400;

/// One nominal rule year. The extra rule repeats annually, so a scan this
/// long that finds no change proves there is none to find.
const RULE_YEAR: i64 = 366 * 86_400;

/// Enumerates the validity intervals of `zone` from the unbounded past up to
/// `horizon`, in chronological order. Adjacent periods with the same local
/// time type are merged, so every interval is maximal. The final interval is
/// open-ended if the zone never changes again, and ends exactly at `horizon`
/// otherwise.
pub(super) fn enumerate<'a>(
    id: &'a str,
    zone: TimeZoneRef<'static>,
    horizon: i64,
) -> Result<Vec<RawInterval<'a>>> {
    let types = zone.local_time_types();
    let transitions = zone.transitions();

    // A zone with no transition history is a fixed zone. Its one interval
    // takes the zone identifier as its display name, the convention that
    // gives the "Etc/GMT±N" names their sign correction downstream.
    if transitions.is_empty() {
        let current = find(id, zone, 0)?;
        return Ok(vec![RawInterval {
            start: None,
            end: None,
            ut_offset: current.ut_offset(),
            abbreviation: id,
        }]);
    }

    let mut current = &types[0];
    let mut segments: Vec<(Option<i64>, &LocalTimeType)> =
        Vec::with_capacity(transitions.len() + 1);
    segments.push((None, current));

    let mut clipped = false;
    let mut last_at = None;
    for transition in transitions {
        let at = unix_time(zone, transition.unix_leap_time());
        if at >= horizon {
            clipped = true;
            break;
        }
        last_at = Some(at);
        let next = &types[transition.local_time_type_index()];
        if !same_type(current, next) {
            segments.push((Some(at), next));
            current = next;
        }
    }

    let open_ended = match (clipped, last_at, zone.extra_rule()) {
        // Cut mid-history: the zone keeps changing at or beyond the horizon.
        (true, ..) => false,
        // Nothing is specified beyond the last transition, so its local time
        // type holds forever.
        (_, _, None) => true,
        (false, Some(last), Some(_)) => scan_rule(id, zone, last, horizon, &mut segments)?,
        // Transitions are non-empty, so an unclipped walk saw at least one.
        (false, None, Some(_)) => true,
    };

    let mut intervals = Vec::with_capacity(segments.len());
    for pair in segments.windows(2) {
        let (start, info) = pair[0];
        intervals.push(RawInterval {
            start,
            end: pair[1].0,
            ut_offset: info.ut_offset(),
            abbreviation: info.time_zone_designation(),
        });
    }
    if let Some(&(start, info)) = segments.last() {
        intervals.push(RawInterval {
            start,
            end: (!open_ended).then_some(horizon),
            ut_offset: info.ut_offset(),
            abbreviation: info.time_zone_designation(),
        });
    }
    Ok(intervals)
}

/// Walks the extra rule from the last explicit transition up to `horizon`,
/// appending every change of local time type, and reports whether the zone
/// is quiescent from its final segment onwards.
fn scan_rule(
    id: &str,
    zone: TimeZoneRef<'static>,
    last: i64,
    horizon: i64,
    segments: &mut Vec<(Option<i64>, &'static LocalTimeType)>,
) -> Result<bool> {
    let mut changed = false;
    let mut cursor = last;
    let mut current = find(id, zone, cursor)?;
    while cursor < horizon {
        let next = horizon.min(cursor + PROBE_STEP);
        if same_type(current, find(id, zone, next)?) {
            cursor = next;
            continue;
        }
        let boundary = bisect(id, zone, cursor, next, current)?;
        changed = true;
        if boundary >= horizon {
            break;
        }
        current = find(id, zone, boundary)?;
        segments.push((Some(boundary), current));
        cursor = boundary;
    }

    if changed {
        return Ok(false);
    }

    // Nothing changed up to the horizon. The rule repeats yearly, so if one
    // full year after the last transition is also quiet, the zone never
    // changes again.
    let end = last.saturating_add(RULE_YEAR);
    let mut cursor = last;
    while cursor < end {
        let next = end.min(cursor + PROBE_STEP);
        if !same_type(current, find(id, zone, next)?) {
            return Ok(false);
        }
        cursor = next;
    }
    Ok(true)
}

/// Finds the first instant in `(lo, hi]` where the local time type stops
/// matching `from`. The type at `hi` must already differ.
fn bisect(
    id: &str,
    zone: TimeZoneRef<'static>,
    mut lo: i64,
    mut hi: i64,
    from: &LocalTimeType,
) -> Result<i64> {
    while hi - lo > 1 {
        let mid = lo + (hi - lo) / 2;
        if same_type(from, find(id, zone, mid)?) {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    Ok(hi)
}

/// Two local time types describe the same interval contents.
fn same_type(a: &LocalTimeType, b: &LocalTimeType) -> bool {
    a.ut_offset() == b.ut_offset()
        && a.is_dst() == b.is_dst()
        && a.time_zone_designation() == b.time_zone_designation()
}

/// Looks up the local time type in effect at `at`, tagging failures with the
/// zone name.
fn find(id: &str, zone: TimeZoneRef<'static>, at: i64) -> Result<&'static LocalTimeType> {
    zone.find_local_time_type(at)
        .map_err(|err| Error::Rules(id.to_string(), tz::Error::Tz(err)))
}

/// Converts a transition's Unix leap time to a Unix time using the zone's
/// leap-second table. Compiled tzdb zones carry no leap-second records, so
/// this is normally the identity.
fn unix_time(zone: TimeZoneRef<'static>, unix_leap_time: i64) -> i64 {
    let mut correction = 0;
    for leap_second in zone.leap_seconds() {
        if leap_second.unix_leap_time() > unix_leap_time.saturating_sub(1) {
            break;
        }
        correction = leap_second.correction();
    }
    unix_leap_time.saturating_sub(i64::from(correction))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 2045-01-01T00:00:00Z.
    const HORIZON: i64 = 2_366_841_600;

    #[track_caller]
    fn intervals_of(id: &str) -> Vec<RawInterval<'_>> {
        let zone = tzdb_data::find_tz(id.as_bytes()).unwrap();
        enumerate(id, *zone, HORIZON).unwrap()
    }

    #[test]
    fn fixed_offset_zone_is_one_unbounded_interval() {
        assert_eq!(
            intervals_of("Etc/GMT+5"),
            [RawInterval {
                start: None,
                end: None,
                ut_offset: -18_000,
                abbreviation: "Etc/GMT+5",
            }]
        );
    }

    #[test]
    fn history_is_contiguous_and_ordered() {
        let intervals = intervals_of("Europe/Paris");
        assert!(intervals.len() > 2);
        assert_eq!(intervals[0].start, None);
        for pair in intervals.windows(2) {
            assert_eq!(pair[0].end, pair[1].start, "{pair:?}");
        }
        assert!(intervals.iter().filter_map(|i| i.start).is_sorted());
        // Paris alternates CET/CEST indefinitely, so its history is cut at
        // the horizon rather than open-ended.
        assert_eq!(intervals.last().unwrap().end, Some(HORIZON));
    }

    #[test]
    fn history_starts_with_local_mean_time() {
        let first = intervals_of("Europe/Paris")[0];
        assert_eq!(first.abbreviation, "LMT");
        assert_eq!(first.ut_offset, 561);
    }

    #[test]
    fn adjacent_intervals_are_maximal() {
        for pair in intervals_of("America/New_York").windows(2) {
            assert!(
                pair[0].ut_offset != pair[1].ut_offset
                    || pair[0].abbreviation != pair[1].abbreviation,
                "{pair:?} should have been merged"
            );
        }
    }

    #[test]
    fn rule_scan_finds_exact_boundaries() {
        let intervals = intervals_of("America/New_York");
        // In 2040, US daylight saving starts on the second Sunday in March
        // at 02:00 EST and ends on the first Sunday in November at 02:00 EDT.
        let spring = 2_215_062_000; // 2040-03-11T07:00:00Z
        let fall = 2_235_621_600; // 2040-11-04T06:00:00Z
        assert!(
            intervals
                .iter()
                .any(|i| i.start == Some(spring) && i.ut_offset == -14_400
                    && i.abbreviation == "EDT"),
            "missing 2040 spring-forward interval"
        );
        assert!(
            intervals
                .iter()
                .any(|i| i.start == Some(fall) && i.ut_offset == -18_000
                    && i.abbreviation == "EST"),
            "missing 2040 fall-back interval"
        );
    }

    #[test]
    fn horizon_clips_history_midway() {
        let zone = tzdb_data::find_tz(b"Europe/Paris").unwrap();
        let horizon = -1_262_304_000; // 1930-01-01T00:00:00Z
        let intervals = enumerate("Europe/Paris", *zone, horizon).unwrap();
        assert!(!intervals.is_empty());
        assert_eq!(intervals.last().unwrap().end, Some(horizon));
        for interval in &intervals {
            if let Some(start) = interval.start {
                assert!(start < horizon);
            }
        }
    }
}
