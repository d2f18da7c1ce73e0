//! Freshness policy for stored pages

use chrono::{DateTime, Utc};

/// Default number of days a stored page is served before it is refreshed
pub const DEFAULT_THRESHOLD_DAYS: u32 = 60;

/// Decide whether a stored page must be re-acquired.
///
/// A page with no previous refresh is always stale. Otherwise it is stale once
/// the number of whole days elapsed since `last_refreshed_at` reaches
/// `threshold_days`.
pub fn is_stale(last_refreshed_at: Option<DateTime<Utc>>, threshold_days: u32) -> bool {
    is_stale_at(last_refreshed_at, threshold_days, Utc::now())
}

/// Same as [`is_stale`] but evaluated against an explicit `now`
pub fn is_stale_at(
    last_refreshed_at: Option<DateTime<Utc>>,
    threshold_days: u32,
    now: DateTime<Utc>,
) -> bool {
    let Some(last) = last_refreshed_at else {
        return true;
    };

    // Truncated, and a timestamp in the future counts as zero days
    let elapsed_days = (now - last).num_days().max(0);
    elapsed_days >= i64::from(threshold_days)
}
