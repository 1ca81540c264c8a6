use chrono::{DateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

use crate::db::models::UserPreference;

/// Earliest UTC instant at which delivery may proceed given a user's quiet
/// hours window. Returns `now` unchanged when no window is configured or the
/// current local time falls outside it.
///
/// Mirrors the wrap-around handling of a window like 22:00 -> 08:00: the
/// window may cross midnight, so "inside the window" is evaluated
/// differently depending on whether `start <= end` or the window wraps.
pub fn calculate_eta(preference: &UserPreference, now: DateTime<Utc>) -> DateTime<Utc> {
    let (start, end) = match (preference.quiet_hours_start, preference.quiet_hours_end) {
        (Some(s), Some(e)) => (s, e),
        _ => return now,
    };

    let tz: Tz = preference.timezone.parse().unwrap_or(chrono_tz::UTC);
    let now_local = now.with_timezone(&tz);
    let current = now_local.time();

    if !is_in_quiet_hours(current, start, end) {
        return now;
    }

    let mut end_local = now_local
        .date_naive()
        .and_time(end)
        .and_local_timezone(tz)
        .single()
        .unwrap_or(now_local);

    if end_local <= now_local {
        end_local += chrono::Duration::days(1);
    }

    end_local.with_timezone(&Utc)
}

fn is_in_quiet_hours(current: NaiveTime, start: NaiveTime, end: NaiveTime) -> bool {
    if start <= end {
        current >= start && current < end
    } else {
        current >= start || current < end
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveTime;

    fn preference(start: &str, end: &str, tz: &str) -> UserPreference {
        UserPreference {
            user_id: "u1".to_string(),
            channels: "[\"email\"]".to_string(),
            quiet_hours_start: Some(NaiveTime::parse_from_str(start, "%H:%M").unwrap()),
            quiet_hours_end: Some(NaiveTime::parse_from_str(end, "%H:%M").unwrap()),
            timezone: tz.to_string(),
        }
    }

    #[test]
    fn no_window_returns_now_unchanged() {
        let pref = UserPreference {
            user_id: "u1".to_string(),
            channels: "[\"email\"]".to_string(),
            quiet_hours_start: None,
            quiet_hours_end: None,
            timezone: "UTC".to_string(),
        };
        let now = Utc.with_ymd_and_hms(2026, 7, 28, 23, 0, 0).unwrap();
        assert_eq!(calculate_eta(&pref, now), now);
    }

    #[test]
    fn outside_window_returns_now_unchanged() {
        let pref = preference("22:00", "08:00", "UTC");
        let now = Utc.with_ymd_and_hms(2026, 7, 28, 12, 0, 0).unwrap();
        assert_eq!(calculate_eta(&pref, now), now);
    }

    #[test]
    fn wraparound_window_defers_to_next_morning() {
        let pref = preference("22:00", "08:00", "UTC");
        let now = Utc.with_ymd_and_hms(2026, 7, 28, 23, 30, 0).unwrap();
        let eta = calculate_eta(&pref, now);
        assert_eq!(eta, Utc.with_ymd_and_hms(2026, 7, 29, 8, 0, 0).unwrap());
    }

    #[test]
    fn wraparound_window_just_before_end_defers_same_day() {
        let pref = preference("22:00", "08:00", "UTC");
        let now = Utc.with_ymd_and_hms(2026, 7, 29, 5, 0, 0).unwrap();
        let eta = calculate_eta(&pref, now);
        assert_eq!(eta, Utc.with_ymd_and_hms(2026, 7, 29, 8, 0, 0).unwrap());
    }
}
