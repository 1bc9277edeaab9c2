//! Daily quota reset boundary.
//!
//! Free-tier allowances renew at 00:00 UTC. Users see that instant in WIB
//! (UTC+7), where it reads as 07:00.

use chrono::{DateTime, Duration, NaiveTime, Utc};

/// Hours between UTC and the display zone.
const DISPLAY_OFFSET_HOURS: i64 = 7;
const DISPLAY_ZONE: &str = "WIB";

/// The next 00:00 UTC strictly after the start of `now`'s UTC day.
pub fn next_reset(now: DateTime<Utc>) -> DateTime<Utc> {
    let today = now.date_naive().and_time(NaiveTime::MIN).and_utc();
    // `now` is never before its own midnight, so only the first arm is taken
    // while the boundary stays at 00:00.
    if now >= today {
        today + Duration::days(1)
    } else {
        today
    }
}

/// `2026-10-20 07:00 WIB`
pub fn display(reset: DateTime<Utc>) -> String {
    let local = reset.naive_utc() + Duration::hours(DISPLAY_OFFSET_HOURS);
    format!("{} {DISPLAY_ZONE}", local.format("%Y-%m-%d %H:%M"))
}
