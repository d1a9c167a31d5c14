//! Weekly passage-mode windows and the auto-relock policy built on them.
//!
//! Everything here is pure: callers pass a local time (a `DateTime` already
//! converted to the lock's timezone, or a `NaiveDateTime` in tests) and get a
//! decision back.

use std::collections::BTreeSet;
use std::time::Duration;

use chrono::{Datelike, Timelike};
use serde::{Deserialize, Serialize};

use crate::state::LockState;

/// Minutes in a day.
pub const MINUTES_PER_DAY: u16 = 24 * 60;

/// Recurring weekly window during which the lock stays in passage mode.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PassageModeWindow {
    /// Passage mode switched on.
    pub enabled: bool,
    /// Unlock automatically when the window opens.
    pub auto_unlock: bool,
    /// The window covers the whole of each selected day.
    pub all_day: bool,
    /// Window start, minutes since local midnight.
    pub start_minute: u16,
    /// Window end, minutes since local midnight. At or before `start_minute` means the window wraps past midnight.
    pub end_minute: u16,
    /// Selected weekdays, Monday = 1 .. Sunday = 7.
    pub week_days: BTreeSet<u8>,
}

impl PassageModeWindow {
    /// `true` if `minute` of the day falls inside `[start_minute, end_minute)`,
    /// wrapping past midnight when the end is not after the start.
    #[must_use]
    pub fn covers_minute(&self, minute: u16) -> bool {
        if self.all_day {
            return true;
        }
        if self.start_minute < self.end_minute {
            (self.start_minute..self.end_minute).contains(&minute)
        } else {
            // [start, 1440) ∪ [0, end); start == end covers the whole day
            minute >= self.start_minute || minute < self.end_minute
        }
    }
}

/// `true` if the window is enabled and `at` falls on a selected weekday inside the window.
pub fn is_within_window<T>(window: &PassageModeWindow, at: &T) -> bool
where
    T: Datelike + Timelike,
{
    if !window.enabled {
        return false;
    }

    // number_from_monday is 1..=7, which always fits in u8
    let weekday = u8::try_from(at.weekday().number_from_monday()).unwrap_or(0);
    if !window.week_days.contains(&weekday) {
        return false;
    }

    let minute = u16::try_from(at.hour() * 60 + at.minute()).unwrap_or(0);
    window.covers_minute(minute)
}

/// Relock delay for an unlock that happened at local time `at`.
///
/// `None` when auto-lock is disabled or `at` falls inside the passage-mode window.
pub fn auto_lock_delay<T>(state: &LockState, at: &T) -> Option<Duration>
where
    T: Datelike + Timelike,
{
    let seconds = state.auto_lock_seconds.filter(|s| *s > 0)?;

    if let Some(window) = &state.passage_mode_config {
        if is_within_window(window, at) {
            return None;
        }
    }

    u64::try_from(seconds).ok().map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveDateTime, TimeZone, Utc};

    // 2023-04-23 is a Sunday
    fn at(day: u32, hour: u32, minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2023, 4, day)
            .unwrap()
            .and_hms_opt(hour, minute, 0)
            .unwrap()
    }

    fn window(start_minute: u16, end_minute: u16, week_days: &[u8]) -> PassageModeWindow {
        PassageModeWindow {
            enabled: true,
            auto_unlock: false,
            all_day: false,
            start_minute,
            end_minute,
            week_days: week_days.iter().copied().collect(),
        }
    }

    fn weekdays_daytime() -> PassageModeWindow {
        window(6 * 60, 18 * 60, &[1, 2, 3, 4, 5])
    }

    fn state_with(auto_lock: Option<i64>, window: Option<PassageModeWindow>) -> LockState {
        LockState {
            auto_lock_seconds: auto_lock,
            passage_mode_config: window,
            ..LockState::default()
        }
    }

    #[test]
    fn test_inside_weekday_window() {
        // Wednesday 10:00
        assert!(is_within_window(&weekdays_daytime(), &at(26, 10, 0)));
    }

    #[test]
    fn test_outside_on_unselected_day() {
        // Sunday 23:59
        assert!(!is_within_window(&weekdays_daytime(), &at(23, 23, 59)));
    }

    #[test]
    fn test_outside_before_start() {
        // Tuesday 05:59
        assert!(!is_within_window(&weekdays_daytime(), &at(25, 5, 59)));
    }

    #[test]
    fn test_end_is_exclusive() {
        let window = weekdays_daytime();
        assert!(is_within_window(&window, &at(27, 6, 0)));
        assert!(is_within_window(&window, &at(27, 17, 59)));
        assert!(!is_within_window(&window, &at(27, 18, 0)));
    }

    #[test]
    fn test_disabled_window_never_matches() {
        let mut window = weekdays_daytime();
        window.enabled = false;
        assert!(!is_within_window(&window, &at(26, 10, 0)));
    }

    #[test]
    fn test_all_day_ignores_minutes() {
        let mut window = window(0, 0, &[7]);
        window.all_day = true;
        assert!(is_within_window(&window, &at(23, 0, 0)));
        assert!(is_within_window(&window, &at(23, 23, 59)));
        assert!(!is_within_window(&window, &at(24, 12, 0)));
    }

    #[test]
    fn test_midnight_wraparound() {
        // 22:00 - 02:00 every day
        let window = window(22 * 60, 2 * 60, &[1, 2, 3, 4, 5, 6, 7]);
        assert!(is_within_window(&window, &at(24, 23, 30)));
        assert!(is_within_window(&window, &at(25, 1, 59)));
        assert!(!is_within_window(&window, &at(25, 2, 0)));
        assert!(!is_within_window(&window, &at(25, 12, 0)));
        assert!(is_within_window(&window, &at(25, 22, 0)));
    }

    #[test]
    fn test_wraparound_holds_for_every_minute() {
        let window = window(22 * 60, 2 * 60, &[1, 2, 3, 4, 5, 6, 7]);
        for minute in 0..MINUTES_PER_DAY {
            let expected = minute >= 22 * 60 || minute < 2 * 60;
            assert_eq!(window.covers_minute(minute), expected, "minute {minute}");
        }
    }

    #[test]
    fn test_equal_start_and_end_covers_day() {
        let window = window(8 * 60, 8 * 60, &[1]);
        assert!(window.covers_minute(0));
        assert!(window.covers_minute(8 * 60));
        assert!(window.covers_minute(MINUTES_PER_DAY - 1));
    }

    #[test]
    fn test_delay_disabled() {
        assert_eq!(auto_lock_delay(&state_with(None, None), &at(26, 10, 0)), None);
        assert_eq!(auto_lock_delay(&state_with(Some(-1), None), &at(26, 10, 0)), None);
        assert_eq!(auto_lock_delay(&state_with(Some(0), None), &at(26, 10, 0)), None);
    }

    #[test]
    fn test_delay_without_window() {
        assert_eq!(
            auto_lock_delay(&state_with(Some(1), None), &at(26, 10, 0)),
            Some(Duration::from_secs(1))
        );
    }

    #[test]
    fn test_delay_suppressed_inside_window() {
        let state = state_with(Some(30), Some(weekdays_daytime()));
        assert_eq!(auto_lock_delay(&state, &at(26, 10, 0)), None);
        assert_eq!(
            auto_lock_delay(&state, &at(26, 19, 0)),
            Some(Duration::from_secs(30))
        );
    }

    #[test]
    fn test_delay_uses_local_time() {
        // 2023-04-23T10:08:17Z, a Sunday
        let event_time = Utc.timestamp_millis_opt(1_682_244_497_000).unwrap();
        let state = state_with(
            Some(1),
            Some(window(6 * 60, 18 * 60, &[1, 2, 3, 4, 5, 6, 7])),
        );

        let utc = event_time.with_timezone(&chrono_tz::UTC);
        assert_eq!(auto_lock_delay(&state, &utc), None);

        // 03:08 in Los Angeles
        let pacific = event_time.with_timezone(&chrono_tz::America::Los_Angeles);
        assert_eq!(
            auto_lock_delay(&state, &pacific),
            Some(Duration::from_secs(1))
        );
    }
}
