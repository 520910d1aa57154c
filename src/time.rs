//! GPS time helpers and truncated timestamp resolution
use hifitime::{Epoch, TimeScale};

/// Seconds in one GPS week
pub const WEEK_SECONDS: f64 = 604800.0;

/// Seconds in one day
pub const DAY_SECONDS: f64 = 86400.0;

const WEEK_NANOS: i64 = 604_800_000_000_000;

/// Builds a GPST [Epoch] from week counter and time of week in seconds.
/// Time of week may lie outside [0, 604800[, the week is adjusted accordingly.
pub fn gpst(week: u32, tow: f64) -> Epoch {
    let nanos = (tow * 1.0E9).round() as i64;
    let week = week as i64 + nanos.div_euclid(WEEK_NANOS);
    let nanos = nanos.rem_euclid(WEEK_NANOS);
    Epoch::from_time_of_week(week.max(0) as u32, nanos as u64, TimeScale::GPST)
}

/// Splits an [Epoch] into GPS week and time of week in seconds.
pub fn week_tow(t: Epoch) -> (u32, f64) {
    let (week, nanos) = t.to_time_scale(TimeScale::GPST).to_time_of_week();
    (week, nanos as f64 / 1.0E9)
}

/// Resolves a time of week against a reference [Epoch]:
/// returns the instant closest to `reference`, in the previous,
/// current or next week.
pub fn adjust_week(reference: Epoch, tow: f64) -> Epoch {
    let (week, tow_ref) = week_tow(reference);
    if tow < tow_ref - WEEK_SECONDS / 2.0 {
        gpst(week + 1, tow)
    } else if tow > tow_ref + WEEK_SECONDS / 2.0 {
        gpst(week.saturating_sub(1), tow)
    } else {
        gpst(week, tow)
    }
}

/// Resolves a time of day (GPST) against a reference [Epoch]:
/// returns the instant closest to `reference`, in the previous,
/// current or next day.
pub fn adjust_day(reference: Epoch, tod: f64) -> Epoch {
    let (week, tow_ref) = week_tow(reference);
    let day = (tow_ref / DAY_SECONDS).floor() * DAY_SECONDS;
    let tod_ref = tow_ref - day;
    let tod = if tod < tod_ref - DAY_SECONDS / 2.0 {
        tod + DAY_SECONDS
    } else if tod > tod_ref + DAY_SECONDS / 2.0 {
        tod - DAY_SECONDS
    } else {
        tod
    };
    gpst(week, day + tod)
}

/// Extends a week counter truncated to `bits` bits (8 bit almanac weeks,
/// 10 bit legacy weeks..) to the full week closest to `reference`.
pub fn extend_week(truncated: u32, bits: u32, reference: u32) -> u32 {
    let modulus = 1i64 << bits;
    let reference = reference as i64;
    let mut week =
        reference - reference.rem_euclid(modulus) + (truncated as i64).rem_euclid(modulus);
    if week > reference + modulus / 2 {
        week -= modulus;
    } else if week + modulus / 2 < reference {
        week += modulus;
    }
    week.max(0) as u32
}

#[cfg(test)]
mod test {
    use super::*;
    use hifitime::Unit;
    use rstest::*;
    use std::str::FromStr;

    #[test]
    fn week_round_trip() {
        let t = gpst(2190, 518400.5);
        assert_eq!(t.time_scale, TimeScale::GPST);
        assert_eq!(week_tow(t), (2190, 518400.5));
        assert_eq!(gpst(2190, WEEK_SECONDS + 10.0), gpst(2191, 10.0));
        assert_eq!(gpst(2190, -10.0), gpst(2189, WEEK_SECONDS - 10.0));

        let utc = Epoch::from_str("2022-01-01T00:00:00 UTC").unwrap();
        let (week, _) = week_tow(utc);
        assert_eq!(week, 2190);
    }

    #[test]
    fn week_rollover() {
        let reference = gpst(2190, 604700.0);
        let t = adjust_week(reference, 50.0);
        assert_eq!(week_tow(t), (2191, 50.0));
        assert_eq!(t - reference, 150.0 * Unit::Second);
    }

    #[rstest]
    #[case(2190, 100.0, 604750.0, 2189)]
    #[case(2190, 300000.0, 300100.0, 2190)]
    #[case(2190, 300000.0, 1.0, 2190)]
    #[case(2190, 604799.0, 0.0, 2191)]
    fn week_resolution(
        #[case] week: u32,
        #[case] tow_ref: f64,
        #[case] tow: f64,
        #[case] expected: u32,
    ) {
        let t = adjust_week(gpst(week, tow_ref), tow);
        assert_eq!(week_tow(t), (expected, tow));
    }

    #[test]
    fn day_rollover() {
        // last seconds of monday
        let reference = gpst(2190, 2.0 * DAY_SECONDS - 5.0);
        let t = adjust_day(reference, 3.0);
        assert_eq!(week_tow(t), (2190, 2.0 * DAY_SECONDS + 3.0));

        let t = adjust_day(reference, DAY_SECONDS - 10.0);
        assert_eq!(week_tow(t), (2190, 2.0 * DAY_SECONDS - 10.0));

        // first seconds of the week: day rolls back into previous week
        let reference = gpst(2191, 2.0);
        let t = adjust_day(reference, DAY_SECONDS - 1.0);
        assert_eq!(week_tow(t), (2190, WEEK_SECONDS - 1.0));
    }

    #[rstest]
    #[case(142, 8, 2190, 2190)]
    #[case(140, 8, 2190, 2188)]
    #[case(10, 8, 2190, 2314)]
    #[case(250, 8, 2050, 2042)]
    #[case(142, 10, 2190, 2190)]
    #[case(1023, 10, 2048, 2047)]
    fn week_extension(
        #[case] truncated: u32,
        #[case] bits: u32,
        #[case] reference: u32,
        #[case] expected: u32,
    ) {
        assert_eq!(extend_week(truncated, bits, reference), expected);
    }
}
