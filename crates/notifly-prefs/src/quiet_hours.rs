// SPDX-FileCopyrightText: 2026 Notifly Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Quiet-hours evaluation.
//!
//! A window is a pair of local wall-clock times. `start` is inclusive and
//! `end` exclusive; a window whose start is after its end wraps past
//! midnight, and a window whose start equals its end is never quiet.

use chrono::{DateTime, Days, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, TimeZone, Utc};
use chrono_tz::Tz;
use notifly_core::{NotificationSettings, NotiflyError};

/// Parse `"HH:MM"` (or `"HH:MM:SS"`, as the backend's `time` columns render).
pub fn parse_hhmm(value: &str) -> Result<NaiveTime, NotiflyError> {
    NaiveTime::parse_from_str(value, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M:%S"))
        .map_err(|_| NotiflyError::Validation(format!("`{value}` is not a valid HH:MM time")))
}

/// A parsed quiet-hours window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuietWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl QuietWindow {
    pub fn parse(start: &str, end: &str) -> Result<Self, NotiflyError> {
        Ok(Self {
            start: parse_hhmm(start)?,
            end: parse_hhmm(end)?,
        })
    }

    /// The user's window, or `None` when quiet hours are turned off.
    pub fn from_settings(settings: &NotificationSettings) -> Result<Option<Self>, NotiflyError> {
        if !settings.quiet_hours_enabled {
            return Ok(None);
        }
        Self::parse(&settings.quiet_hours_start, &settings.quiet_hours_end).map(Some)
    }

    pub fn contains(&self, now: NaiveTime) -> bool {
        if self.start == self.end {
            false
        } else if self.start < self.end {
            self.start <= now && now < self.end
        } else {
            now >= self.start || now < self.end
        }
    }

    /// First instant after `now` at which the local clock in `tz` reads `end`.
    pub fn next_end_after(&self, now: DateTime<Utc>, tz: Tz) -> DateTime<Utc> {
        let local_date = now.with_timezone(&tz).date_naive();
        for offset in 0..3u64 {
            let Some(date) = local_date.checked_add_days(Days::new(offset)) else {
                break;
            };
            if let Some(at) = resolve_local(tz, date, self.end, now) {
                return at;
            }
        }
        // Only reachable at the edge of the representable range.
        now
    }
}

/// Map a local wall-clock time to the earliest matching instant after
/// `after`. Times skipped by a DST jump move forward to the first valid
/// local time.
fn resolve_local(tz: Tz, date: NaiveDate, time: NaiveTime, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let mut naive = NaiveDateTime::new(date, time);
    for _ in 0..8 {
        let mapped = tz.from_local_datetime(&naive);
        let candidates = [mapped.earliest(), mapped.latest()];
        if candidates.iter().any(Option::is_some) {
            return candidates
                .into_iter()
                .flatten()
                .map(|at| at.with_timezone(&Utc))
                .find(|at| *at > after);
        }
        naive = naive.checked_add_signed(TimeDelta::minutes(30))?;
    }
    None
}

/// Whether `now` falls in the `[start, end)` window given as `"HH:MM"` strings.
pub fn is_in_quiet_hours(now: NaiveTime, start: &str, end: &str) -> Result<bool, NotiflyError> {
    Ok(QuietWindow::parse(start, end)?.contains(now))
}

/// Whether `settings` silence notifications at `now` on a device in `tz`.
pub fn is_quiet_at(settings: &NotificationSettings, now: DateTime<Utc>, tz: Tz) -> Result<bool, NotiflyError> {
    Ok(match QuietWindow::from_settings(settings)? {
        Some(window) => window.contains(now.with_timezone(&tz).time()),
        None => false,
    })
}

/// `now` when notifications may be shown, else the end of the current
/// quiet period.
pub fn next_available_time(
    settings: &NotificationSettings,
    now: DateTime<Utc>,
    tz: Tz,
) -> Result<DateTime<Utc>, NotiflyError> {
    let Some(window) = QuietWindow::from_settings(settings)? else {
        return Ok(now);
    };
    if !window.contains(now.with_timezone(&tz).time()) {
        return Ok(now);
    }
    Ok(window.next_end_after(now, tz))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    fn quiet(start: &str, end: &str) -> NotificationSettings {
        NotificationSettings {
            quiet_hours_enabled: true,
            quiet_hours_start: start.into(),
            quiet_hours_end: end.into(),
            ..NotificationSettings::defaults_for("u1")
        }
    }

    #[test]
    fn wrapping_window_samples() {
        let cases = [
            (t(22, 0), true),
            (t(23, 30), true),
            (t(0, 0), true),
            (t(3, 15), true),
            (t(6, 59), true),
            (t(7, 0), false),
            (t(12, 0), false),
            (t(21, 59), false),
        ];
        for (now, expected) in cases {
            assert_eq!(
                is_in_quiet_hours(now, "22:00", "07:00").unwrap(),
                expected,
                "at {now}"
            );
        }
    }

    #[test]
    fn same_day_window() {
        assert!(is_in_quiet_hours(t(13, 0), "13:00", "15:00").unwrap());
        assert!(is_in_quiet_hours(t(14, 59), "13:00", "15:00").unwrap());
        assert!(!is_in_quiet_hours(t(15, 0), "13:00", "15:00").unwrap());
        assert!(!is_in_quiet_hours(t(12, 59), "13:00", "15:00").unwrap());
    }

    #[test]
    fn equal_bounds_are_never_quiet() {
        for now in [t(0, 0), t(9, 0), t(9, 1), t(23, 59)] {
            assert!(!is_in_quiet_hours(now, "09:00", "09:00").unwrap());
        }
    }

    #[test]
    fn malformed_times_are_validation_errors() {
        for bad in ["25:00", "7pm", "", "12:60"] {
            let err = is_in_quiet_hours(t(1, 0), bad, "07:00").unwrap_err();
            assert!(matches!(err, NotiflyError::Validation(_)), "{bad}");
        }
        assert_eq!(parse_hhmm("22:00:00").unwrap(), t(22, 0));
    }

    #[test]
    fn disabled_settings_are_always_available() {
        let mut settings = quiet("22:00", "07:00");
        settings.quiet_hours_enabled = false;
        let now = utc(2026, 5, 1, 23, 0);
        assert!(!is_quiet_at(&settings, now, Tz::UTC).unwrap());
        assert_eq!(next_available_time(&settings, now, Tz::UTC).unwrap(), now);
    }

    #[test]
    fn next_available_before_and_after_midnight() {
        let settings = quiet("22:00", "07:00");
        assert_eq!(
            next_available_time(&settings, utc(2026, 5, 1, 23, 0), Tz::UTC).unwrap(),
            utc(2026, 5, 2, 7, 0)
        );
        assert_eq!(
            next_available_time(&settings, utc(2026, 5, 2, 3, 0), Tz::UTC).unwrap(),
            utc(2026, 5, 2, 7, 0)
        );
        let noon = utc(2026, 5, 2, 12, 0);
        assert_eq!(next_available_time(&settings, noon, Tz::UTC).unwrap(), noon);
    }

    #[test]
    fn evaluated_in_device_time_zone() {
        let settings = quiet("22:00", "07:00");
        // 03:00 UTC is 23:00 the previous evening in New York (EDT, UTC-4)
        // and noon in Tokyo.
        let now = utc(2026, 5, 1, 3, 0);
        assert!(!is_quiet_at(&settings, now, Tz::Asia__Tokyo).unwrap());
        assert!(is_quiet_at(&settings, now, Tz::America__New_York).unwrap());
        assert_eq!(
            next_available_time(&settings, now, Tz::America__New_York).unwrap(),
            utc(2026, 5, 1, 11, 0)
        );
    }

    #[test]
    fn end_inside_dst_gap_moves_forward() {
        // Berlin skips 02:00-03:00 local on 2026-03-29.
        let settings = quiet("23:00", "02:30");
        let now = utc(2026, 3, 29, 0, 30); // 01:30 CET
        assert!(is_quiet_at(&settings, now, Tz::Europe__Berlin).unwrap());
        assert_eq!(
            next_available_time(&settings, now, Tz::Europe__Berlin).unwrap(),
            utc(2026, 3, 29, 1, 0) // 03:00 CEST
        );
    }

    proptest! {
        #[test]
        fn matches_minute_arithmetic(start in 0u32..1440, end in 0u32..1440, now in 0u32..1440) {
            let window = QuietWindow { start: t(start / 60, start % 60), end: t(end / 60, end % 60) };
            let expected = if start == end {
                false
            } else if start < end {
                start <= now && now < end
            } else {
                now >= start || now < end
            };
            prop_assert_eq!(window.contains(t(now / 60, now % 60)), expected);
        }

        #[test]
        fn next_available_is_never_quiet(start in 0u32..1440, end in 0u32..1440, now in 0u32..1440) {
            let fmt = |m: u32| format!("{:02}:{:02}", m / 60, m % 60);
            let settings = quiet(&fmt(start), &fmt(end));
            let now = utc(2026, 6, 10, now / 60, now % 60);
            let next = next_available_time(&settings, now, Tz::UTC).unwrap();
            prop_assert!(next >= now);
            prop_assert!(next - now <= TimeDelta::hours(24));
            prop_assert!(!is_quiet_at(&settings, next, Tz::UTC).unwrap());
        }
    }
}
