use std::time::SystemTime;
use std::time::UNIX_EPOCH;

/// return second since epoch
pub fn get_now_as_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

/// Negative timestamps are offsets back from `now`; everything else is absolute.
///
/// resolve_relative_time(-60, 1000) = 940
/// resolve_relative_time(500, 1000) = 500
pub fn resolve_relative_time(
    ts: i64,
    now: i64,
) -> i64 {
    if ts < 0 {
        now.saturating_add(ts)
    } else {
        ts
    }
}
