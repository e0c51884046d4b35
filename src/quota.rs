//! Daily quota gate: day-bucket arithmetic, king lookup, and the clamp
//! applied when a session is finalized.

use chrono::{DateTime, Duration, Local, LocalResult, NaiveDate, NaiveTime, TimeZone, Utc};

use crate::store::{ClaimStore, StoreError};

/// Calendar-month bucket ("2025-03") in the user's local calendar.
pub fn period_key(time: DateTime<Utc>) -> String {
    time.with_timezone(&Local).format("%Y-%m").to_string()
}

/// The local-midnight day window containing `reference`, as UTC instants.
/// Day membership everywhere in the crate means `day_start <= t < day_end`.
pub fn local_day_bounds(reference: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    let local = reference.with_timezone(&Local);
    let date = local.date_naive();

    let start = local_midnight(date)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(reference);
    let end = date
        .succ_opt()
        .and_then(local_midnight)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(start + Duration::days(1));

    (start, end)
}

fn local_midnight(date: NaiveDate) -> Option<DateTime<Local>> {
    match Local.from_local_datetime(&date.and_time(NaiveTime::MIN)) {
        LocalResult::Single(dt) => Some(dt),
        LocalResult::Ambiguous(dt, _) => Some(dt),
        // Midnight fell into a DST gap; take the first instant after it.
        LocalResult::None => {
            Local.from_local_datetime(&(date.and_time(NaiveTime::MIN) + Duration::hours(1)))
                .earliest()
        }
    }
}

/// Seconds already claimed today at this POI. Fetched once per session at
/// entry completion; mid-session accounting stays in memory.
pub async fn daily_seconds_used(
    store: &dyn ClaimStore,
    user_id: &str,
    poi_id: &str,
    reference: DateTime<Utc>,
) -> Result<u32, StoreError> {
    let (day_start, day_end) = local_day_bounds(reference);
    store
        .daily_seconds_for_poi(user_id, poi_id, day_start, day_end)
        .await
}

/// Whether this user holds the strictly greatest all-time total at the POI.
pub async fn is_king(
    store: &dyn ClaimStore,
    user_id: &str,
    poi_id: &str,
) -> Result<bool, StoreError> {
    store.is_user_king_of_poi(user_id, poi_id).await
}

pub fn remaining_today(starting_offset: u32, daily_cap: u32) -> u32 {
    daily_cap.saturating_sub(starting_offset)
}

/// Re-clamp at finalization time: base seconds may not exceed what the day
/// still allowed when the session started; bonus seconds ride on top
/// untouched. Guards against drift from concurrent writers (same account on
/// a second device) between the in-memory counter and the store.
pub fn clamp_submission(
    base_earned: u32,
    bonus_earned: u32,
    starting_offset: u32,
    daily_cap: u32,
) -> u32 {
    base_earned.min(remaining_today(starting_offset, daily_cap)) + bonus_earned
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn period_key_is_year_month() {
        let t = Utc.with_ymd_and_hms(2025, 3, 15, 12, 0, 0).unwrap();
        let key = period_key(t);
        assert_eq!(key.len(), 7);
        assert!(key.starts_with("2025-"));
    }

    #[test]
    fn day_bounds_span_one_day_and_contain_reference() {
        let reference = Utc::now();
        let (start, end) = local_day_bounds(reference);
        assert!(start <= reference && reference < end);
        let span = end - start;
        // DST transitions make 23h and 25h days legitimate.
        assert!(span >= Duration::hours(23) && span <= Duration::hours(25));
    }

    #[test]
    fn full_minute_submission_keeps_its_bonus() {
        // 60 base + 10 bonus with a clean slate submits all 70.
        assert_eq!(clamp_submission(60, 10, 0, 60), 70);
    }

    #[test]
    fn clamp_caps_base_against_offset() {
        // 5 base + 10 bonus on top of 55 already used: 15.
        assert_eq!(clamp_submission(5, 10, 55, 60), 15);
        // Stale offset cannot push base past the remainder.
        assert_eq!(clamp_submission(30, 0, 50, 60), 10);
    }

    #[test]
    fn remaining_saturates_at_zero() {
        assert_eq!(remaining_today(70, 60), 0);
        assert_eq!(remaining_today(0, 60), 60);
    }
}
