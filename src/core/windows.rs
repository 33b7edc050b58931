use crate::domain::model::Window;
use crate::utils::error::{HarvestError, Result};
use chrono::{Duration, NaiveDate};

/// Widest date range the report API accepts in a single submission.
pub const MAX_WINDOW_DAYS: i64 = 180;

/// Splits `[from, to]` into consecutive windows of at most [`MAX_WINDOW_DAYS`]
/// days. The sequence is contiguous, non-overlapping and covers the full
/// range; only the final window may be narrower than the cap.
pub fn plan_windows(from: NaiveDate, to: NaiveDate) -> Result<Vec<Window>> {
    if to < from {
        return Err(HarvestError::InvalidRange {
            message: format!("--to {} must be >= --from {}", to, from),
        });
    }

    let step = Duration::days(MAX_WINDOW_DAYS);
    let mut windows = Vec::new();
    let mut cursor = from;
    while cursor <= to {
        let mut end = cursor + step - Duration::days(1);
        if end > to {
            end = to;
        }
        windows.push(Window { start: cursor, end });
        cursor = end + Duration::days(1);
    }
    Ok(windows)
}
