//! Small helpers shared by the engine.

use std::time::{SystemTime, UNIX_EPOCH};

/// Seconds since epoch; 0 if the clock is before 1970.
pub fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// `file` / `files`, `directory` / `directories`.
pub fn plural<'a>(n: u32, one: &'a str, many: &'a str) -> &'a str {
    if n == 1 { one } else { many }
}
