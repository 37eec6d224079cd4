//! Retention clamping of the requested history window

use chrono::{DateTime, Duration, Utc};

use crate::models::log::LogWindow;

/// Oldest instant the backend still retains logs for.
///
/// Saturates at the earliest representable instant for retentions reaching
/// beyond chrono's range.
pub fn earliest_retained(now: DateTime<Utc>, retention_days: u32) -> DateTime<Utc> {
    Duration::try_days(i64::from(retention_days))
        .and_then(|retention| now.checked_sub_signed(retention))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Bound `requested` to what the retention quota guarantees.
///
/// Without a quota the window passes through untouched; callers must not query
/// with it. Each bound is clamped on its own, so a window that predates the
/// retention entirely collapses onto the earliest retained instant.
pub fn clamp_window(
    requested: LogWindow,
    retention_days: Option<u32>,
    now: DateTime<Utc>,
) -> LogWindow {
    let Some(days) = retention_days else {
        return requested;
    };

    let earliest = earliest_retained(now, days);
    LogWindow {
        start: requested.start.max(earliest),
        end: requested.end.max(earliest),
    }
}
